// Copyright 2026 Roadwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bulk fetcher: one HTTP GET, streamed straight into an artifact.
//!
//! The body is copied chunk by chunk into a scoped store write, so large
//! sources never sit in memory. Transport failures are retried with
//! exponential backoff; HTTP status failures are not.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use crate::config::FetchSettings;
use crate::error::FetchError;
use crate::store::ArtifactStore;

/// Retrieves one dataset and persists it under an artifact path.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, locator: &str, artifact: &Path) -> Result<(), FetchError>;
}

/// HTTP implementation of [`Fetch`].
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    store: ArtifactStore,
    settings: FetchSettings,
}

impl HttpFetcher {
    pub fn new(store: ArtifactStore, settings: FetchSettings) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(settings.connect_timeout_ms))
            .read_timeout(Duration::from_millis(settings.read_timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(settings.user_agent.clone())
            .build()
            .unwrap_or_default();

        Self {
            client,
            store,
            settings,
        }
    }

    /// One attempt. Returns the number of bytes persisted.
    async fn fetch_once(&self, locator: &str, artifact: &Path) -> Result<u64, FetchError> {
        let resp = self
            .client
            .get(locator)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: locator.to_string(),
            });
        }

        // Dropping `writer` on any early return discards the staged bytes.
        let mut writer = self.store.begin_write(artifact)?;
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(FetchError::from_reqwest)?;
            writer.write_chunk(&chunk)?;
        }
        let written = writer.written();
        writer.commit()?;
        Ok(written)
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, locator: &str, artifact: &Path) -> Result<(), FetchError> {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.fetch_once(locator, artifact).await {
                Ok(bytes) => {
                    tracing::info!(
                        "downloaded {} ({bytes} bytes, attempt {attempt})",
                        artifact.display()
                    );
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.settings.delay_after(attempt);
                    tracing::warn!(
                        "attempt {attempt}/{max_attempts} for {locator} failed: {e}; retrying in {}ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
