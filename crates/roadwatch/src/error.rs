// Copyright 2026 Roadwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the acquisition pipeline.
//!
//! Each component has its own error enum. Task-level failures never escape
//! the orchestrator: they are rendered into the report as `Failed(reason)`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the artifact store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the bulk fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, DNS, timeout, or a body stream cut short.
    #[error("network error: {0}")]
    Network(String),

    /// The source answered with a non-2xx status. Never retried.
    #[error("HTTP {status} for URL: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("write error: {0}")]
    Write(#[from] StoreError),
}

impl FetchError {
    /// Only transport-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Network(_))
    }

    pub fn from_reqwest(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

/// Errors from the reducer.
#[derive(Debug, Error)]
pub enum ReduceError {
    #[error("parse error in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// The projection names a field the source does not carry.
    #[error("column `{column}` missing from {}", path.display())]
    MissingColumn { column: String, path: PathBuf },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure of a single directory sub-page. Never fatal to the crawl.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("timed out after {timeout_ms}ms waiting for `{selector}` on {url}")]
    Timeout {
        url: String,
        selector: String,
        timeout_ms: u64,
    },

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("extraction failed on {url}: {message}")]
    Extraction { url: String, message: String },
}

/// Errors that end a crawl run.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("browser launch failed after {attempts} attempt(s): {message}")]
    Launch { attempts: u32, message: String },

    /// The directory page never produced its links, so no sub-page is known.
    #[error("crawl aborted: {0}")]
    CrawlAborted(#[source] PageError),

    #[error("failed to persist crawl results: {0}")]
    Store(#[from] StoreError),
}
