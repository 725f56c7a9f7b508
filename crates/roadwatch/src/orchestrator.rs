// Copyright 2026 Roadwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Acquisition orchestrator.
//!
//! Checks every dataset against the store, dispatches the missing ones onto
//! a bounded pool of workers, and blocks until each has a terminal outcome.
//! A task's failure is recorded in the report and never stops its siblings.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Serialize, Serializer};

use crate::config::AcquireConfig;
use crate::crawler::{Scrape, ScrapeCrawler};
use crate::dataset::{DatasetSpec, Reduction, RetrievalKind};
use crate::fetcher::{Fetch, HttpFetcher};
use crate::progress::{ProgressEventKind, ProgressHandle, ProgressSender};
use crate::reducer;
use crate::renderer::chromium::ChromiumLauncher;
use crate::store::ArtifactStore;

/// Terminal state of one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    /// Already satisfied; nothing was fetched.
    Skipped,
    Fetched,
    Failed(String),
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skipped => write!(f, "skipped"),
            Self::Fetched => write!(f, "fetched"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Result record of one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub id: String,
    pub outcome: Outcome,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

/// Outcome of every spec passed to [`Orchestrator::acquire_all`], in input order.
#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionReport {
    pub started_at: DateTime<Utc>,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
    pub entries: Vec<TaskReport>,
}

impl AcquisitionReport {
    pub fn failed(&self) -> impl Iterator<Item = &TaskReport> {
        self.entries.iter().filter(|e| e.outcome.is_failed())
    }

    /// True when no entry failed, i.e. every artifact is on disk.
    pub fn all_satisfied(&self) -> bool {
        self.failed().next().is_none()
    }

    pub fn fetched_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome == Outcome::Fetched)
            .count()
    }

    pub fn get(&self, id: &str) -> Option<&TaskReport> {
        self.entries.iter().find(|e| e.id == id)
    }
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Presence of one dataset's artifacts, without fetching.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetStatus {
    pub id: String,
    pub satisfied: bool,
    pub missing: Vec<PathBuf>,
}

/// Presence of every spec's artifacts in `store`. Never writes.
pub fn status(store: &ArtifactStore, specs: &[DatasetSpec]) -> Vec<DatasetStatus> {
    specs
        .iter()
        .map(|spec| {
            let missing: Vec<PathBuf> = spec
                .outputs()
                .into_iter()
                .filter(|p| !store.exists(p))
                .map(Path::to_path_buf)
                .collect();
            DatasetStatus {
                id: spec.id.clone(),
                satisfied: missing.is_empty(),
                missing,
            }
        })
        .collect()
}

/// Coordinates one acquisition run.
pub struct Orchestrator {
    store: ArtifactStore,
    fetcher: Arc<dyn Fetch>,
    scraper: Arc<dyn Scrape>,
    workers: usize,
    progress: Option<ProgressSender>,
}

impl Orchestrator {
    pub fn new(
        store: ArtifactStore,
        fetcher: Arc<dyn Fetch>,
        scraper: Arc<dyn Scrape>,
        workers: usize,
    ) -> Self {
        Self {
            store,
            fetcher,
            scraper,
            workers: workers.max(1),
            progress: None,
        }
    }

    /// Wire the HTTP fetcher and the Chromium crawler from a config.
    pub fn from_config(config: &AcquireConfig) -> crate::error::StoreResult<Self> {
        let store = ArtifactStore::open(&config.data_dir)?;
        let fetcher = HttpFetcher::new(store.clone(), config.fetch.clone());
        let crawler = ScrapeCrawler::new(
            Arc::new(ChromiumLauncher::new(config.browser.clone())),
            store.clone(),
            config.crawl.clone(),
        );
        Ok(Self::new(
            store,
            Arc::new(fetcher),
            Arc::new(crawler),
            config.effective_workers(),
        ))
    }

    /// Send progress events to `tx` during runs.
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Report which datasets are satisfied.
    pub fn status(&self, specs: &[DatasetSpec]) -> Vec<DatasetStatus> {
        status(&self.store, specs)
    }

    /// Acquire every missing dataset and report on all of them.
    pub async fn acquire_all(&self, specs: &[DatasetSpec]) -> AcquisitionReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let progress = ProgressHandle::new(
            self.progress.clone(),
            &format!("run-{}", started_at.timestamp_millis()),
        );

        let mut entries: Vec<Option<TaskReport>> = vec![None; specs.len()];
        let mut claimed: HashSet<&Path> = HashSet::new();
        let mut pending = Vec::new();

        for (slot, spec) in specs.iter().enumerate() {
            if spec.is_satisfied(&self.store) {
                tracing::info!("{} already present, skipping", spec.id);
                progress.emit(ProgressEventKind::TaskSkipped {
                    dataset: spec.id.clone(),
                });
                entries[slot] = Some(TaskReport {
                    id: spec.id.clone(),
                    outcome: Outcome::Skipped,
                    elapsed: Duration::ZERO,
                });
                continue;
            }

            // No two tasks of one run may target the same artifact path.
            if let Some(taken) = spec.outputs().into_iter().find(|p| claimed.contains(p)) {
                let reason = format!(
                    "artifact {} is already targeted by another dataset in this run",
                    taken.display()
                );
                tracing::error!("{}: {reason}", spec.id);
                entries[slot] = Some(TaskReport {
                    id: spec.id.clone(),
                    outcome: Outcome::Failed(reason),
                    elapsed: Duration::ZERO,
                });
                continue;
            }
            claimed.extend(spec.outputs());

            progress.emit(ProgressEventKind::TaskQueued {
                dataset: spec.id.clone(),
            });
            pending.push((slot, spec.clone()));
        }

        tracing::info!(
            "dispatching {} of {} datasets on {} worker(s)",
            pending.len(),
            specs.len(),
            self.workers
        );

        let finished: Vec<(usize, TaskReport)> = stream::iter(pending)
            .map(|(slot, spec)| {
                let task = Task {
                    store: self.store.clone(),
                    fetcher: Arc::clone(&self.fetcher),
                    scraper: Arc::clone(&self.scraper),
                    progress: progress.clone(),
                };
                let events = progress.clone();
                async move {
                    let id = spec.id.clone();
                    let began = Instant::now();
                    let handle = tokio::spawn(task.run(spec));
                    let outcome = handle.await.unwrap_or_else(|e| {
                        Outcome::Failed(format!("worker terminated abnormally: {e}"))
                    });
                    let elapsed = began.elapsed();
                    match &outcome {
                        Outcome::Failed(reason) => tracing::error!("{id} failed: {reason}"),
                        other => tracing::info!("{id} {other} in {}ms", elapsed.as_millis()),
                    }
                    task_finished(&events, &id, &outcome, elapsed);
                    (slot, TaskReport { id, outcome, elapsed })
                }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        for (slot, report) in finished {
            entries[slot] = Some(report);
        }

        AcquisitionReport {
            started_at,
            elapsed: start.elapsed(),
            entries: entries.into_iter().flatten().collect(),
        }
    }
}

fn task_finished(progress: &ProgressHandle, id: &str, outcome: &Outcome, elapsed: Duration) {
    progress.emit(ProgressEventKind::TaskFinished {
        dataset: id.to_string(),
        outcome: outcome.to_string(),
        elapsed_ms: elapsed.as_millis() as u64,
    });
}

/// One dispatched dataset. Owns clones of everything it touches.
struct Task {
    store: ArtifactStore,
    fetcher: Arc<dyn Fetch>,
    scraper: Arc<dyn Scrape>,
    progress: ProgressHandle,
}

impl Task {
    async fn run(self, spec: DatasetSpec) -> Outcome {
        self.progress.emit(ProgressEventKind::TaskStarted {
            dataset: spec.id.clone(),
        });

        if !self.store.exists(&spec.artifact_path) {
            let acquired = match spec.retrieval {
                RetrievalKind::BulkDownload => self
                    .fetcher
                    .fetch(&spec.source, &spec.artifact_path)
                    .await
                    .map_err(|e| e.to_string()),
                RetrievalKind::Scrape => self
                    .scraper
                    .scrape(&spec.source, &spec.artifact_path, &self.progress)
                    .await
                    .map(|summary| {
                        tracing::debug!("{} crawl summary: {summary:?}", spec.id);
                    })
                    .map_err(|e| e.to_string()),
            };
            if let Err(reason) = acquired {
                return Outcome::Failed(reason);
            }
        }

        // Only reached once the primary artifact exists.
        if let Some(reduction) = &spec.reduction {
            if let Err(reason) = self.reduce(&spec, reduction).await {
                return Outcome::Failed(reason);
            }
        }

        Outcome::Fetched
    }

    async fn reduce(&self, spec: &DatasetSpec, reduction: &Reduction) -> Result<(), String> {
        self.progress.emit(ProgressEventKind::ReductionStarted {
            dataset: spec.id.clone(),
            target: reduction.artifact_path.display().to_string(),
        });

        let store = self.store.clone();
        let heavy = spec.artifact_path.clone();
        let reduction = reduction.clone();
        tokio::task::spawn_blocking(move || {
            reducer::reduce_if_missing(
                &store,
                &heavy,
                &reduction.projection,
                &reduction.artifact_path,
            )
        })
        .await
        .map_err(|e| format!("reduction worker terminated abnormally: {e}"))?
        .map(|_| ())
        .map_err(|e| e.to_string())
    }
}
