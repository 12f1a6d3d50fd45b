//! Final dataset and isochrone exports.

use std::collections::BTreeMap;
use std::path::Path;

use geojson::{Feature, FeatureCollection, GeoJson};
use socialmapper_distance::UnitDistance;
use socialmapper_isochrone::Isochrone;

/// One output row: the distance-enriched unit plus its census values
/// keyed by readable variable name.
#[derive(Debug, Clone)]
pub struct EnrichedRow {
    /// Distance record for the unit.
    pub distance: UnitDistance,
    /// Census values under their human-readable column names.
    pub values: BTreeMap<String, Option<f64>>,
}

/// Writes the enriched dataset as CSV.
///
/// Columns: `GEOID`, POI metadata, speeds, distances, then one column
/// per requested variable in `variable_columns` order.
///
/// # Errors
///
/// Returns [`csv::Error`] when the file cannot be written.
pub fn write_dataset_csv(
    path: &Path,
    rows: &[EnrichedRow],
    variable_columns: &[String],
) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec![
        "GEOID".to_string(),
        "poi_id".to_string(),
        "poi_name".to_string(),
        "travel_time_minutes".to_string(),
        "avg_travel_speed_kmh".to_string(),
        "avg_travel_speed_mph".to_string(),
        "travel_distance_km".to_string(),
        "travel_distance_miles".to_string(),
    ];
    header.extend(variable_columns.iter().cloned());
    writer.write_record(&header)?;

    let float = |value: Option<f64>| value.map_or(String::new(), |v| format!("{v}"));

    for row in rows {
        let distance = &row.distance;
        let mut record = vec![
            distance.geoid.clone(),
            distance.poi_id.clone().unwrap_or_default(),
            distance.poi_name.clone().unwrap_or_default(),
            distance.travel_time_minutes.to_string(),
            format!("{}", distance.avg_travel_speed_kmh),
            format!("{}", distance.avg_travel_speed_mph),
            float(distance.travel_distance_km),
            float(distance.travel_distance_miles),
        ];
        for column in variable_columns {
            record.push(float(row.values.get(column).copied().flatten()));
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Writes the isochrone layer as a `GeoJSON` feature collection.
///
/// # Errors
///
/// Returns [`std::io::Error`] when the file cannot be written.
pub fn write_isochrones_geojson(path: &Path, isochrones: &[Isochrone]) -> std::io::Result<()> {
    let features: Vec<Feature> = isochrones
        .iter()
        .filter(|iso| !iso.is_degenerate())
        .map(|iso| {
            let geometry = geojson::Geometry::new(geojson::Value::from(&iso.polygon));
            let mut properties = geojson::JsonObject::new();
            properties.insert("poi_id".to_string(), iso.poi_id.clone().into());
            properties.insert("poi_name".to_string(), iso.poi_name.clone().into());
            properties.insert(
                "travel_time_minutes".to_string(),
                iso.travel_time_minutes.into(),
            );
            properties.insert(
                "avg_travel_speed_kmh".to_string(),
                iso.avg_travel_speed_kmh.into(),
            );
            properties.insert(
                "avg_travel_speed_mph".to_string(),
                iso.avg_travel_speed_mph.into(),
            );
            Feature {
                bbox: None,
                geometry: Some(geometry),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let collection = GeoJson::FeatureCollection(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    });
    std::fs::write(path, collection.to_string())
}
