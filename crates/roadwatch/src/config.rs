// Copyright 2026 Roadwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration loading and resolution.
//!
//! A config file is optional; every field has a default that reproduces the
//! stock Hauts-de-Seine acquisition.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::dataset::{default_catalog, DatasetSpec};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "ROADWATCH_CONFIG";

/// Config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "roadwatch.json";

/// Default size of the worker pool.
pub const DEFAULT_WORKERS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquireConfig {
    /// Root of the artifact store.
    pub data_dir: PathBuf,
    /// Maximum number of tasks in flight.
    pub workers: usize,
    pub fetch: FetchSettings,
    pub crawl: CrawlSettings,
    pub browser: BrowserSettings,
    pub datasets: Vec<DatasetSpec>,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            workers: DEFAULT_WORKERS,
            fetch: FetchSettings::default(),
            crawl: CrawlSettings::default(),
            browser: BrowserSettings::default(),
            datasets: default_catalog(),
        }
    }
}

impl AcquireConfig {
    /// Parse a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config: {}", path.display()))?;
        Ok(config)
    }

    /// Load the config from the first location that applies.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match resolve_config_path(explicit) {
            Some(path) => {
                tracing::debug!("loading config from {}", path.display());
                Self::from_file(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Worker count, never below one.
    pub fn effective_workers(&self) -> usize {
        self.workers.max(1)
    }
}

/// Resolve the config file path.
///
/// Order: explicit path, `ROADWATCH_CONFIG`, `./roadwatch.json`, then
/// `roadwatch/roadwatch.json` under the user config directory.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        if !env_path.is_empty() {
            return Some(PathBuf::from(env_path));
        }
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.is_file() {
        return Some(cwd_config);
    }

    dirs::config_dir()
        .map(|d| d.join("roadwatch").join(CONFIG_FILE_NAME))
        .filter(|p| p.is_file())
}

/// Retry and timeout policy for bulk downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each further one.
    pub base_delay_ms: u64,
    pub connect_timeout_ms: u64,
    /// Longest silence tolerated between two reads, headers included.
    /// Unlike a whole-request timeout this does not cap a long download.
    pub read_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            connect_timeout_ms: 30_000,
            read_timeout_ms: 60_000,
            user_agent: concat!("roadwatch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FetchSettings {
    /// Backoff after the `attempt`-th failure (1-based): base, 2×base, 4×base…
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Selectors and wait policy for the driving-school crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    /// City links on the directory page.
    pub link_selector: String,
    /// Element whose presence means a city page has rendered its listings.
    pub ready_selector: String,
    /// One element per driving school.
    pub listing_selector: String,
    pub name_attr: String,
    pub position_attr: String,
    pub rating_attr: String,
    pub wait_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub launch_attempts: u32,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            link_selector: ".vv-department__link".to_string(),
            ready_selector: ".vv-search-item__content__title".to_string(),
            listing_selector: ".vv-search-item".to_string(),
            name_attr: "data-name".to_string(),
            position_attr: "data-position".to_string(),
            rating_attr: "data-note".to_string(),
            wait_timeout_ms: 120_000,
            poll_interval_ms: 500,
            launch_attempts: 2,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Chromium binary; discovered automatically when unset.
    pub executable: Option<PathBuf>,
    /// Flags appended to the stock headless set.
    pub extra_args: Vec<String>,
}
