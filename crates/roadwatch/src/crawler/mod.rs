// Copyright 2026 Roadwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scrape crawler for listings that have no bulk download.
//!
//! One browser session walks a directory page and each city page it links
//! to. The run is an explicit state machine:
//!
//! ```text
//! Idle → DirectoryLoaded → PerCity(0..N) → Aggregated → Closed
//! ```
//!
//! A directory that never renders its links closes the run with
//! `CrawlAborted`. A city page that times out or fails extraction is logged
//! and skipped. Records accumulate in memory and are persisted in a single
//! artifact write. The session is released after `Closed` on every path.

pub mod extract;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use crate::config::CrawlSettings;
use crate::error::{CrawlError, PageError};
use crate::progress::{ProgressEventKind, ProgressHandle};
use crate::renderer::{wait_for_selector, Launch, RenderContext, Renderer, WaitOutcome};
use crate::store::ArtifactStore;

pub use extract::{CityLink, Coordinate, PageExtraction, SchoolRecord};

/// Crawls a directory page into one artifact.
#[async_trait]
pub trait Scrape: Send + Sync {
    async fn scrape(
        &self,
        directory_url: &str,
        artifact: &Path,
        progress: &ProgressHandle,
    ) -> Result<CrawlSummary, CrawlError>;
}

/// Counters for a finished crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlSummary {
    pub cities: usize,
    pub cities_failed: usize,
    pub records: usize,
    pub skipped_listings: usize,
}

enum CrawlState {
    Idle,
    DirectoryLoaded {
        links: Vec<CityLink>,
    },
    PerCity {
        links: Vec<CityLink>,
        index: usize,
        records: Vec<SchoolRecord>,
    },
    Aggregated {
        records: Vec<SchoolRecord>,
    },
    Closed(Result<CrawlSummary, CrawlError>),
}

/// The browser resources one crawl owns.
struct Session {
    renderer: Box<dyn Renderer>,
    ctx: Box<dyn RenderContext>,
}

impl Session {
    async fn release(self) {
        if let Err(e) = self.ctx.close().await {
            tracing::warn!("failed to close browser context: {e}");
        }
        if let Err(e) = self.renderer.shutdown().await {
            tracing::warn!("failed to shut down browser: {e}");
        }
    }
}

/// Browser-driven [`Scrape`] implementation.
pub struct ScrapeCrawler {
    launcher: Arc<dyn Launch>,
    store: ArtifactStore,
    settings: CrawlSettings,
}

impl ScrapeCrawler {
    pub fn new(launcher: Arc<dyn Launch>, store: ArtifactStore, settings: CrawlSettings) -> Self {
        Self {
            launcher,
            store,
            settings,
        }
    }

    fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.wait_timeout_ms)
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.settings.poll_interval_ms.max(1))
    }

    /// Launch the browser and open one tab, retrying the launch.
    async fn open_session(&self) -> Result<Session, CrawlError> {
        let attempts = self.settings.launch_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let failure = match self.launcher.launch().await {
                Ok(renderer) => {
                    let opened = renderer.new_context().await;
                    match opened {
                        Ok(ctx) => return Ok(Session { renderer, ctx }),
                        Err(e) => {
                            if let Err(down) = renderer.shutdown().await {
                                tracing::warn!("failed to shut down browser: {down:#}");
                            }
                            e
                        }
                    }
                }
                Err(e) => e,
            };
            tracing::warn!("browser launch attempt {attempt}/{attempts} failed: {failure:#}");
            last_error = format!("{failure:#}");
        }

        Err(CrawlError::Launch {
            attempts,
            message: last_error,
        })
    }

    /// Navigate and wait for `ready_selector` under the configured timeout.
    async fn load(
        &self,
        ctx: &mut dyn RenderContext,
        url: &str,
        ready_selector: &str,
    ) -> Result<String, PageError> {
        let nav = ctx
            .navigate(url, self.settings.wait_timeout_ms)
            .await
            .map_err(|e| PageError::Navigation {
                url: url.to_string(),
                message: format!("{e:#}"),
            })?;

        match wait_for_selector(&*ctx, ready_selector, self.wait_timeout(), self.poll_interval())
            .await
        {
            WaitOutcome::Ready(n) => {
                tracing::debug!("{url}: {n} element(s) match `{ready_selector}`");
                Ok(nav.final_url)
            }
            WaitOutcome::TimedOut => Err(PageError::Timeout {
                url: url.to_string(),
                selector: ready_selector.to_string(),
                timeout_ms: self.settings.wait_timeout_ms,
            }),
        }
    }

    async fn load_directory(
        &self,
        ctx: &mut dyn RenderContext,
        directory_url: &str,
    ) -> Result<Vec<CityLink>, PageError> {
        let extraction_error = |message: String| PageError::Extraction {
            url: directory_url.to_string(),
            message,
        };

        let final_url = self
            .load(ctx, directory_url, &self.settings.link_selector)
            .await?;
        let base = Url::parse(&final_url)
            .or_else(|_| Url::parse(directory_url))
            .map_err(|e| extraction_error(format!("invalid directory URL: {e}")))?;
        let html = ctx
            .get_html()
            .await
            .map_err(|e| extraction_error(format!("{e:#}")))?;

        extract::extract_city_links(&html, &base, &self.settings.link_selector)
            .map_err(extraction_error)
    }

    async fn visit_city(
        &self,
        ctx: &mut dyn RenderContext,
        link: &CityLink,
    ) -> Result<PageExtraction, PageError> {
        let url = link.url.as_str();
        self.load(ctx, url, &self.settings.ready_selector).await?;

        let html = ctx.get_html().await.map_err(|e| PageError::Extraction {
            url: url.to_string(),
            message: format!("{e:#}"),
        })?;
        extract::extract_listings(&html, &self.settings).map_err(|message| {
            PageError::Extraction {
                url: url.to_string(),
                message,
            }
        })
    }

    /// Advance the state machine by one transition.
    async fn step(
        &self,
        state: CrawlState,
        session: &mut Session,
        summary: &mut CrawlSummary,
        directory_url: &str,
        artifact: &Path,
        progress: &ProgressHandle,
    ) -> CrawlState {
        match state {
            CrawlState::Idle => match self.load_directory(session.ctx.as_mut(), directory_url).await
            {
                Ok(links) => {
                    tracing::info!("directory lists {} cities", links.len());
                    CrawlState::DirectoryLoaded { links }
                }
                Err(e) => {
                    tracing::error!("directory {directory_url} unavailable: {e}");
                    CrawlState::Closed(Err(CrawlError::CrawlAborted(e)))
                }
            },

            CrawlState::DirectoryLoaded { links } => {
                summary.cities = links.len();
                CrawlState::PerCity {
                    links,
                    index: 0,
                    records: Vec::new(),
                }
            }

            CrawlState::PerCity {
                links,
                index,
                mut records,
            } => {
                let Some(link) = links.get(index) else {
                    return CrawlState::Aggregated { records };
                };
                let total = links.len();

                match self.visit_city(session.ctx.as_mut(), link).await {
                    Ok(page) => {
                        for skip in &page.skipped {
                            let message = format!(
                                "{}: listing #{} skipped: {}",
                                link.url, skip.index, skip.reason
                            );
                            tracing::warn!("{message}");
                            progress.emit(ProgressEventKind::Warning { message });
                        }
                        summary.skipped_listings += page.skipped.len();
                        progress.emit(ProgressEventKind::CityVisited {
                            index,
                            total,
                            url: link.url.to_string(),
                            records: page.records.len(),
                        });
                        records.extend(page.records);
                    }
                    Err(e) => {
                        tracing::warn!("city {}/{total} skipped: {e}", index + 1);
                        summary.cities_failed += 1;
                        progress.emit(ProgressEventKind::CityFailed {
                            index,
                            total,
                            url: link.url.to_string(),
                            reason: e.to_string(),
                        });
                    }
                }

                CrawlState::PerCity {
                    links,
                    index: index + 1,
                    records,
                }
            }

            CrawlState::Aggregated { records } => {
                summary.records = records.len();
                let persisted = write_schools(&self.store, artifact, &records)
                    .map(|()| summary.clone())
                    .map_err(CrawlError::from);
                CrawlState::Closed(persisted)
            }

            closed @ CrawlState::Closed(_) => closed,
        }
    }
}

#[async_trait]
impl Scrape for ScrapeCrawler {
    async fn scrape(
        &self,
        directory_url: &str,
        artifact: &Path,
        progress: &ProgressHandle,
    ) -> Result<CrawlSummary, CrawlError> {
        let mut session = self.open_session().await?;
        let mut summary = CrawlSummary::default();
        let mut state = CrawlState::Idle;

        let result = loop {
            state = match state {
                CrawlState::Closed(result) => break result,
                other => {
                    self.step(
                        other,
                        &mut session,
                        &mut summary,
                        directory_url,
                        artifact,
                        progress,
                    )
                    .await
                }
            };
        };

        session.release().await;

        if let Ok(summary) = &result {
            tracing::info!(
                "crawl finished: {} records from {}/{} cities",
                summary.records,
                summary.cities - summary.cities_failed,
                summary.cities
            );
        }
        result
    }
}

#[derive(Serialize)]
struct SchoolCollection<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    features: Vec<SchoolFeature<'a>>,
}

#[derive(Serialize)]
struct SchoolFeature<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    properties: SchoolProperties<'a>,
    geometry: PointGeometry,
}

#[derive(Serialize)]
struct SchoolProperties<'a> {
    name: &'a str,
    position: String,
    grade: Option<f64>,
}

#[derive(Serialize)]
struct PointGeometry {
    #[serde(rename = "type")]
    kind: &'static str,
    coordinates: [f64; 2],
}

/// Persist the aggregated records as one GeoJSON FeatureCollection.
///
/// Coordinates are written in GeoJSON order, longitude first.
pub fn write_schools(
    store: &ArtifactStore,
    artifact: &Path,
    records: &[SchoolRecord],
) -> Result<(), crate::error::StoreError> {
    let collection = SchoolCollection {
        kind: "FeatureCollection",
        features: records
            .iter()
            .map(|r| SchoolFeature {
                kind: "Feature",
                properties: SchoolProperties {
                    name: &r.name,
                    position: format!("{},{}", r.coordinate.lat, r.coordinate.lon),
                    grade: r.rating,
                },
                geometry: PointGeometry {
                    kind: "Point",
                    coordinates: [r.coordinate.lon, r.coordinate.lat],
                },
            })
            .collect(),
    };

    let mut writer = store.begin_write(artifact)?;
    serde_json::to_writer(&mut writer, &collection)
        .map_err(|e| crate::error::StoreError::io(artifact, e.into()))?;
    writer.commit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_school_artifact_is_lon_lat_geojson() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let records = vec![
            SchoolRecord {
                name: "ECF Antony".to_string(),
                coordinate: Coordinate {
                    lat: 48.754,
                    lon: 2.2975,
                },
                rating: Some(4.6),
            },
            SchoolRecord {
                name: "ECF Antony".to_string(),
                coordinate: Coordinate {
                    lat: 48.754,
                    lon: 2.2975,
                },
                rating: None,
            },
        ];

        write_schools(&store, Path::new("schools.geojson"), &records).unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&store.read(Path::new("schools.geojson")).unwrap()).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        let features = value["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(
            features[0]["geometry"],
            serde_json::json!({"type": "Point", "coordinates": [2.2975, 48.754]})
        );
        assert_eq!(features[0]["properties"]["position"], "48.754,2.2975");
        assert_eq!(features[0]["properties"]["grade"], 4.6);
        assert!(features[1]["properties"]["grade"].is_null());
    }
}
