// Copyright 2026 Roadwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Roadwatch: acquisition core for the Hauts-de-Seine road-safety dataset.
//!
//! Fetches accident records, commune boundaries, and radar locations over
//! HTTP, crawls driving-school listings with a headless browser, and reduces
//! the heavy accident file to the columns the dashboard reads. Callers run
//! [`Orchestrator::acquire_all`], inspect the report, then read artifacts
//! from the [`ArtifactStore`].

pub mod config;
pub mod crawler;
pub mod dataset;
pub mod error;
pub mod fetcher;
pub mod orchestrator;
pub mod progress;
pub mod reducer;
pub mod renderer;
pub mod store;

pub use config::AcquireConfig;
pub use crawler::{CrawlSummary, SchoolRecord, Scrape, ScrapeCrawler};
pub use dataset::{default_catalog, DatasetSpec, Reduction, RetrievalKind, SizeClass};
pub use error::{CrawlError, FetchError, PageError, ReduceError, StoreError};
pub use fetcher::{Fetch, HttpFetcher};
pub use orchestrator::{AcquisitionReport, DatasetStatus, Orchestrator, Outcome, TaskReport};
pub use store::ArtifactStore;
