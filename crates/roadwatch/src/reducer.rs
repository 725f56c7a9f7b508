// Copyright 2026 Roadwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Column projection of a heavy GeoJSON artifact into a light one.
//!
//! The heavy file is streamed: each feature is projected as soon as serde
//! hands it over, so peak memory is one source feature plus the reduced
//! collection, never the whole heavy dataset.

use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use std::path::Path;

use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{ReduceError, StoreError};
use crate::store::ArtifactStore;

/// Name of the field that is always carried over.
pub const GEOMETRY_FIELD: &str = "geometry";

#[derive(Deserialize)]
struct SourceFeature {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
    #[serde(default)]
    geometry: Value,
}

/// Top-level members other than `features`.
#[derive(Default)]
struct CollectionHeader {
    kind: Option<String>,
    crs: Option<Value>,
}

#[derive(Serialize)]
struct ReducedCollection<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    crs: Option<&'a Value>,
    features: Vec<ReducedFeature>,
}

#[derive(Serialize)]
struct ReducedFeature {
    #[serde(rename = "type")]
    kind: &'static str,
    properties: Map<String, Value>,
    geometry: Value,
}

/// What a reduction produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceSummary {
    pub records: usize,
    pub columns: Vec<String>,
}

/// Accumulates projected features and which columns the source carries.
struct Projector {
    columns: Vec<String>,
    seen: Vec<bool>,
    features: Vec<ReducedFeature>,
}

impl Projector {
    fn new(columns: Vec<String>) -> Self {
        let seen = vec![false; columns.len()];
        Self {
            columns,
            seen,
            features: Vec::new(),
        }
    }

    fn push(&mut self, feature: SourceFeature) {
        let mut props = feature.properties.unwrap_or_default();
        let mut properties = Map::with_capacity(self.columns.len());
        for (column, seen) in self.columns.iter().zip(self.seen.iter_mut()) {
            let value = props.remove(column);
            *seen |= value.is_some();
            properties.insert(column.clone(), value.unwrap_or(Value::Null));
        }
        self.features.push(ReducedFeature {
            kind: "Feature",
            properties,
            geometry: feature.geometry,
        });
    }

    /// First projected column absent from every feature.
    fn missing_column(&self) -> Option<&String> {
        self.columns
            .iter()
            .zip(&self.seen)
            .find(|(_, seen)| !**seen)
            .map(|(column, _)| column)
    }
}

struct CollectionSeed<'p> {
    projector: &'p mut Projector,
}

impl<'de> DeserializeSeed<'de> for CollectionSeed<'_> {
    type Value = CollectionHeader;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for CollectionSeed<'_> {
    type Value = CollectionHeader;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a GeoJSON FeatureCollection object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let projector = self.projector;
        let mut header = CollectionHeader::default();
        let mut has_features = false;

        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "type" => header.kind = Some(map.next_value()?),
                "crs" => header.crs = map.next_value()?,
                "features" => {
                    map.next_value_seed(FeaturesSeed {
                        projector: &mut *projector,
                    })?;
                    has_features = true;
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        if !has_features {
            return Err(de::Error::missing_field("features"));
        }
        Ok(header)
    }
}

struct FeaturesSeed<'p> {
    projector: &'p mut Projector,
}

impl<'de> DeserializeSeed<'de> for FeaturesSeed<'_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for FeaturesSeed<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array of features")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        while let Some(feature) = seq.next_element::<SourceFeature>()? {
            self.projector.push(feature);
        }
        Ok(())
    }
}

/// Project `projection` out of `heavy` and write the result to `light`.
///
/// `geometry` may appear in `projection`; it is kept regardless.
pub fn reduce(
    store: &ArtifactStore,
    heavy: &Path,
    projection: &[String],
    light: &Path,
) -> Result<ReduceSummary, ReduceError> {
    let parse_error = |message: String| ReduceError::Parse {
        path: heavy.to_path_buf(),
        message,
    };

    let reader = store.reader(heavy)?;
    let mut projector = Projector::new(property_columns(projection));
    let mut de = serde_json::Deserializer::from_reader(reader);
    let header = CollectionSeed {
        projector: &mut projector,
    }
    .deserialize(&mut de)
    .and_then(|header| de.end().map(|()| header))
    .map_err(|e| parse_error(e.to_string()))?;

    match header.kind.as_deref() {
        Some("FeatureCollection") => {}
        Some(other) => {
            return Err(parse_error(format!(
                "expected a FeatureCollection, found `{other}`"
            )))
        }
        None => return Err(parse_error("missing `type` member".to_string())),
    }

    if let Some(missing) = projector.missing_column() {
        return Err(ReduceError::MissingColumn {
            column: missing.clone(),
            path: heavy.to_path_buf(),
        });
    }

    let Projector {
        columns, features, ..
    } = projector;
    let records = features.len();
    let reduced = ReducedCollection {
        kind: "FeatureCollection",
        crs: header.crs.as_ref(),
        features,
    };

    let mut writer = store.begin_write(light)?;
    encode(&mut writer, &reduced, light)?;
    writer.commit()?;

    tracing::info!(
        "reduced {} into {} ({records} records, {} columns)",
        heavy.display(),
        light.display(),
        columns.len()
    );
    Ok(ReduceSummary { records, columns })
}

/// Serialize the reduced collection. A failure here is a write failure.
fn encode<W: Write>(
    writer: W,
    reduced: &ReducedCollection<'_>,
    light: &Path,
) -> Result<(), ReduceError> {
    serde_json::to_writer(writer, reduced)
        .map_err(|e| ReduceError::Store(StoreError::io(light, e.into())))
}

/// Run [`reduce`] unless `light` already exists. `None` means skipped.
pub fn reduce_if_missing(
    store: &ArtifactStore,
    heavy: &Path,
    projection: &[String],
    light: &Path,
) -> Result<Option<ReduceSummary>, ReduceError> {
    if store.exists(light) {
        tracing::debug!("{} already present, skipping reduction", light.display());
        return Ok(None);
    }
    reduce(store, heavy, projection, light).map(Some)
}

/// Projection minus the geometry field, first occurrence order, no repeats.
fn property_columns(projection: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    projection
        .iter()
        .filter(|c| c.as_str() != GEOMETRY_FIELD)
        .filter(|c| seen.insert(c.as_str()))
        .cloned()
        .collect()
}
