// Copyright 2026 Roadwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Progress event types and broadcast channel for acquisition telemetry.
//!
//! The orchestrator and the crawler emit `ProgressEvent`s through a
//! `tokio::sync::broadcast` channel. When no subscriber exists, events are
//! silently dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A progress event emitted during an acquisition run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The run this event belongs to.
    pub run_id: String,
    /// Monotonically increasing sequence number within the run.
    pub seq: u64,
    pub event: ProgressEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    /// A dataset is missing and waits for a worker.
    TaskQueued { dataset: String },
    /// A dataset was already satisfied.
    TaskSkipped { dataset: String },
    TaskStarted { dataset: String },
    TaskFinished {
        dataset: String,
        outcome: String,
        elapsed_ms: u64,
    },
    ReductionStarted { dataset: String, target: String },
    /// One directory sub-page was crawled.
    CityVisited {
        index: usize,
        total: usize,
        url: String,
        records: usize,
    },
    /// One directory sub-page was given up on.
    CityFailed {
        index: usize,
        total: usize,
        url: String,
        reason: String,
    },
    /// A non-fatal warning occurred.
    Warning { message: String },
}

pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a progress channel. 256 events covers a full run with ~40 cities.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Emitting side shared by every task of one run.
#[derive(Clone)]
pub struct ProgressHandle {
    tx: Option<ProgressSender>,
    run_id: Arc<str>,
    seq: Arc<AtomicU64>,
}

impl ProgressHandle {
    pub fn new(tx: Option<ProgressSender>, run_id: &str) -> Self {
        Self {
            tx,
            run_id: Arc::from(run_id),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A handle that drops every event.
    pub fn disabled() -> Self {
        Self::new(None, "")
    }

    /// Emit an event, ignoring send errors (no receivers listening).
    pub fn emit(&self, event: ProgressEventKind) {
        if let Some(ref sender) = self.tx {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
            let _ = sender.send(ProgressEvent {
                run_id: self.run_id.to_string(),
                seq,
                event,
            });
        }
    }
}

impl std::fmt::Display for ProgressEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TaskQueued { dataset } => write!(f, "{dataset}: queued"),
            Self::TaskSkipped { dataset } => write!(f, "{dataset}: already present"),
            Self::TaskStarted { dataset } => write!(f, "{dataset}: started"),
            Self::TaskFinished {
                dataset,
                outcome,
                elapsed_ms,
            } => write!(f, "{dataset}: {outcome} in {elapsed_ms}ms"),
            Self::ReductionStarted { dataset, target } => {
                write!(f, "{dataset}: reducing into {target}")
            }
            Self::CityVisited {
                index,
                total,
                url,
                records,
            } => write!(f, "city {}/{total}: {records} records from {url}", index + 1),
            Self::CityFailed {
                index,
                total,
                url,
                reason,
            } => write!(f, "city {}/{total}: skipped {url} ({reason})", index + 1),
            Self::Warning { message } => write!(f, "warning: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_event_serialization() {
        let event = ProgressEvent {
            run_id: "run-1".to_string(),
            seq: 1,
            event: ProgressEventKind::TaskFinished {
                dataset: "radars".to_string(),
                outcome: "fetched".to_string(),
                elapsed_ms: 420,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("TaskFinished"));
        assert!(json.contains("radars"));

        let parsed: ProgressEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.run_id, "run-1");
        assert_eq!(parsed.seq, 1);
    }

    #[tokio::test]
    async fn test_handle_numbers_events() {
        let (tx, mut rx) = channel();
        let handle = ProgressHandle::new(Some(tx), "run-7");
        let clone = handle.clone();

        handle.emit(ProgressEventKind::TaskQueued {
            dataset: "a".to_string(),
        });
        clone.emit(ProgressEventKind::TaskQueued {
            dataset: "b".to_string(),
        });

        assert_eq!(rx.recv().await.unwrap().seq, 1);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.seq, 2);
        assert_eq!(second.run_id, "run-7");
    }

    #[test]
    fn test_channel_no_receivers() {
        let (tx, rx) = channel();
        drop(rx);
        ProgressHandle::new(Some(tx), "run").emit(ProgressEventKind::Warning {
            message: "test".to_string(),
        });
        ProgressHandle::disabled().emit(ProgressEventKind::Warning {
            message: "test".to_string(),
        });
    }

    #[test]
    fn test_city_display_is_one_based() {
        let event = ProgressEventKind::CityFailed {
            index: 2,
            total: 5,
            url: "https://example.test/antony".to_string(),
            reason: "timeout".to_string(),
        };
        assert_eq!(
            event.to_string(),
            "city 3/5: skipped https://example.test/antony (timeout)"
        );
    }
}
