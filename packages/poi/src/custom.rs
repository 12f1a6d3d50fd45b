//! Custom coordinate files (CSV or JSON).
//!
//! Rows need a name and a coordinate pair under any recognized alias.
//! CSV rows are converted to JSON objects first so both formats share
//! one normalization path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Value, json};
use socialmapper_geography_models::{StateFormat, normalize_state_list};
use socialmapper_poi_models::{BatchMetadata, Poi, PoiBatch, coordinates_in_range,
    normalize_coordinates};

use crate::{PoiError, PoiExtraction, PoiSource, RejectedRecord};

/// POI source reading a CSV or JSON coordinate file.
pub struct CustomFileSource {
    path: PathBuf,
    name_field: Option<String>,
    type_field: Option<String>,
}

impl CustomFileSource {
    /// Builds a source for the given file. `name_field`/`type_field`
    /// override the default `name`/`type` column names.
    #[must_use]
    pub fn new(path: PathBuf, name_field: Option<String>, type_field: Option<String>) -> Self {
        Self {
            path,
            name_field,
            type_field,
        }
    }

    fn records(&self) -> Result<Vec<Value>, PoiError> {
        let is_json = self
            .path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            read_json_records(&self.path)
        } else {
            read_csv_records(&self.path)
        }
    }
}

#[async_trait]
impl PoiSource for CustomFileSource {
    async fn produce(&self) -> Result<PoiExtraction, PoiError> {
        let records = self.records()?;
        if records.is_empty() {
            return Err(PoiError::Invalid {
                message: format!("no records found in {}", self.path.display()),
            });
        }

        let name_field = self.name_field.as_deref().unwrap_or("name");
        let type_field = self.type_field.as_deref().unwrap_or("type");

        let mut pois = Vec::new();
        let mut rejected = Vec::new();
        let mut states = Vec::new();

        for (index, record) in records.iter().enumerate() {
            match record_to_poi(record, index, name_field, type_field) {
                Ok(poi) => {
                    if let Some(state) = record.get("state").and_then(Value::as_str) {
                        states.push(state.to_string());
                    }
                    pois.push(poi);
                }
                Err(reason) => rejected.push(RejectedRecord {
                    data: record.clone(),
                    reason,
                }),
            }
        }

        log::info!(
            "loaded {} POIs from {} ({} rejected)",
            pois.len(),
            self.path.display(),
            rejected.len()
        );

        Ok(PoiExtraction {
            batch: PoiBatch {
                pois,
                metadata: BatchMetadata {
                    states: normalize_state_list(&states, StateFormat::Abbreviation),
                    original_count: None,
                    sampled: false,
                },
            },
            rejected,
        })
    }

    fn base_filename(&self) -> String {
        let stem = self
            .path
            .file_stem()
            .map_or_else(|| "coordinates".to_string(), |s| s.to_string_lossy().to_string());
        format!("custom_{stem}")
    }
}

/// Converts one raw record into a POI, or a rejection reason.
fn record_to_poi(
    record: &Value,
    index: usize,
    name_field: &str,
    type_field: &str,
) -> Result<Poi, String> {
    let (lat, lon) =
        normalize_coordinates(record).ok_or_else(|| "no recognized coordinate fields".to_string())?;

    if !coordinates_in_range(lat, lon) {
        return Err(format!("coordinates out of range: ({lat}, {lon})"));
    }

    let name = record
        .get(name_field)
        .and_then(Value::as_str)
        .map(ToString::to_string);

    let id = record
        .get("id")
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| format!("custom_{index}"));

    let mut tags = BTreeMap::new();
    if let Some(name) = &name {
        tags.insert("name".to_string(), name.clone());
    }

    Ok(Poi {
        id,
        name,
        lat,
        lon,
        poi_type: record
            .get(type_field)
            .and_then(Value::as_str)
            .map(ToString::to_string),
        tags,
    })
}

/// Reads a JSON file: a bare array, or an object with a `pois` array.
fn read_json_records(path: &Path) -> Result<Vec<Value>, PoiError> {
    let raw = std::fs::read_to_string(path)?;
    let parsed: Value = serde_json::from_str(&raw)?;
    match parsed {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("pois") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(PoiError::Invalid {
                message: "JSON object has no 'pois' array".to_string(),
            }),
        },
        _ => Err(PoiError::Invalid {
            message: "JSON file must contain an array or a {pois: [...]} object".to_string(),
        }),
    }
}

/// Reads a CSV file into JSON objects keyed by header.
fn read_csv_records(path: &Path) -> Result<Vec<Value>, PoiError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut object = serde_json::Map::new();
        for (header, cell) in headers.iter().zip(row.iter()) {
            object.insert(header.to_string(), json!(cell));
        }
        records.push(Value::Object(object));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(name: &str, contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn csv_round_trip() {
        let (_dir, path) = write_file(
            "points.csv",
            "name,latitude,longitude,state\n\
             Downtown Raleigh,35.7796,-78.6382,NC\n\
             NC State,35.7866,-78.6820,NC\n\
             RDU,35.8776,-78.7875,NC\n",
        );
        let source = CustomFileSource::new(path, None, None);
        let extraction = source.produce().await.unwrap();
        assert_eq!(extraction.batch.pois.len(), 3);
        assert!(extraction.rejected.is_empty());
        assert_eq!(extraction.batch.metadata.states, vec!["NC".to_string()]);
        assert_eq!(
            extraction.batch.pois[0].name.as_deref(),
            Some("Downtown Raleigh")
        );
    }

    #[tokio::test]
    async fn json_with_nested_properties() {
        let (_dir, path) = write_file(
            "points.json",
            r#"{"pois": [
                {"id": "a", "name": "One", "properties": {"lat": 35.1, "lon": -78.1}},
                {"id": "b", "name": "Two", "coordinates": [-78.2, 35.2]},
                {"id": "c", "name": "NoCoords"}
            ]}"#,
        );
        let source = CustomFileSource::new(path, None, None);
        let extraction = source.produce().await.unwrap();
        assert_eq!(extraction.batch.pois.len(), 2);
        assert_eq!(extraction.rejected.len(), 1);
        assert!(extraction.rejected[0].reason.contains("coordinate"));
    }

    #[tokio::test]
    async fn out_of_range_rows_are_rejected() {
        let (_dir, path) = write_file(
            "points.csv",
            "name,lat,lon\nGood,35.0,-78.0\nBad,95.0,-78.0\n",
        );
        let source = CustomFileSource::new(path, None, None);
        let extraction = source.produce().await.unwrap();
        assert_eq!(extraction.batch.pois.len(), 1);
        assert_eq!(extraction.rejected.len(), 1);
        assert!(extraction.rejected[0].reason.contains("out of range"));
    }

    #[tokio::test]
    async fn empty_file_is_an_error() {
        let (_dir, path) = write_file("points.csv", "name,lat,lon\n");
        let source = CustomFileSource::new(path, None, None);
        assert!(source.produce().await.is_err());
    }

    #[test]
    fn base_filename_uses_stem() {
        let source = CustomFileSource::new(PathBuf::from("/tmp/trail_heads.csv"), None, None);
        assert_eq!(source.base_filename(), "custom_trail_heads");
    }
}
