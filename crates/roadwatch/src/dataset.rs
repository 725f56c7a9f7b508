// Copyright 2026 Roadwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Dataset descriptors and the built-in catalog.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::store::ArtifactStore;

/// How a dataset is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalKind {
    /// One HTTP GET, persisted verbatim.
    BulkDownload,
    /// Browser-driven crawl of a directory page and its sub-pages.
    Scrape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    #[default]
    Light,
    Heavy,
}

/// Column projection from a heavy artifact into a light one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reduction {
    pub artifact_path: PathBuf,
    pub projection: Vec<String>,
}

/// Static description of one thing to acquire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub id: String,
    pub retrieval: RetrievalKind,
    /// URL of the payload (bulk) or of the directory page (scrape).
    pub source: String,
    pub artifact_path: PathBuf,
    #[serde(default)]
    pub size_class: SizeClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduction: Option<Reduction>,
}

impl DatasetSpec {
    pub fn bulk(id: &str, source: &str, artifact_path: &str) -> Self {
        Self {
            id: id.to_string(),
            retrieval: RetrievalKind::BulkDownload,
            source: source.to_string(),
            artifact_path: PathBuf::from(artifact_path),
            size_class: SizeClass::Light,
            reduction: None,
        }
    }

    pub fn scrape(id: &str, source: &str, artifact_path: &str) -> Self {
        Self {
            retrieval: RetrievalKind::Scrape,
            ..Self::bulk(id, source, artifact_path)
        }
    }

    /// Mark as heavy and attach the derived light artifact.
    pub fn with_reduction(mut self, artifact_path: &str, projection: &[&str]) -> Self {
        self.size_class = SizeClass::Heavy;
        self.reduction = Some(Reduction {
            artifact_path: PathBuf::from(artifact_path),
            projection: projection.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    /// Every artifact path this spec produces.
    pub fn outputs(&self) -> Vec<&Path> {
        let mut paths = vec![self.artifact_path.as_path()];
        if let Some(reduction) = &self.reduction {
            paths.push(reduction.artifact_path.as_path());
        }
        paths
    }

    /// Satisfied when the primary artifact exists and, for a spec with a
    /// reduction, the reduced artifact exists too.
    pub fn is_satisfied(&self, store: &ArtifactStore) -> bool {
        self.outputs().into_iter().all(|p| store.exists(p))
    }
}

pub const ACCIDENTS_URL: &str =
    "https://www.data.gouv.fr/fr/datasets/r/19b9f9d1-e24b-47f5-b908-e287339173b3";
pub const COMMUNES_URL: &str = "https://opendata.hauts-de-seine.fr/api/explore/v2.1/catalog/datasets/communes/exports/geojson?lang=fr&timezone=Europe/Berlin";
pub const RADARS_URL: &str =
    "https://www.data.gouv.fr/fr/datasets/r/8a22b5a8-4b65-41be-891a-7c0aead4ba51";
pub const DRIVING_SCHOOLS_URL: &str = "https://www.vroomvroom.fr/auto-ecoles/hauts-de-seine/";

/// Accident fields kept in the light artifact.
pub const ACCIDENT_COLUMNS: &[&str] = &[
    "date",
    "heure",
    "commune",
    "geometry",
    "code_insee",
    "type_colli",
    "type_acci",
    "luminosite",
    "adresse",
];

/// The four datasets the dashboard reads.
pub fn default_catalog() -> Vec<DatasetSpec> {
    vec![
        DatasetSpec::bulk("big_accidents", ACCIDENTS_URL, "big_accidents.geojson")
            .with_reduction("light_accidents.geojson", ACCIDENT_COLUMNS),
        DatasetSpec::bulk(
            "communes-92-hauts-de-seine",
            COMMUNES_URL,
            "communes-92-hauts-de-seine.geojson",
        ),
        DatasetSpec::scrape(
            "driving_schools",
            DRIVING_SCHOOLS_URL,
            "driving_schools.geojson",
        ),
        DatasetSpec::bulk("radars", RADARS_URL, "radars.csv"),
    ]
}
