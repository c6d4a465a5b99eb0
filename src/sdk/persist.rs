//! Writes batch results as a CSV table and a GeoJSON feature collection, and merges
//! per-batch GeoJSON files into one.

use csv::WriterBuilder;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value};
use serde_json::json;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

use super::routing::polyline::LonLat;

pub const CRS_NAME: &str = "urn:ogc:def:crs:EPSG::4326";

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse GeoJSON in {path}: {source}")]
    GeoJson {
        path: PathBuf,
        source: Box<geojson::Error>,
    },

    #[error("{0} does not hold a FeatureCollection")]
    NotFeatureCollection(PathBuf),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistError + '_ {
    move |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// One fetched and accepted route, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteResult {
    pub id: Option<u64>,
    pub pickup: String,
    pub dropoff: String,
    pub date: Option<String>,
    pub time: Option<String>,
    /// `[longitude, latitude]` pairs.
    pub points: Vec<LonLat>,
}

/// Renders points like a nested list literal: `[[-73.98, 40.75], [-73.97, 40.76]]`.
pub fn format_points(points: &[LonLat]) -> String {
    let pairs: Vec<String> = points
        .iter()
        .map(|[lon, lat]| format!("[{:?}, {:?}]", lon, lat))
        .collect();
    format!("[{}]", pairs.join(", "))
}

/// Optional table columns written ahead of `Pickup`, `Dropoff` and `Polyline_Points`.
///
/// Fixed for a whole run so every batch file shares one header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputColumns {
    pub id: bool,
    pub date: bool,
    pub time: bool,
}

/// Writes one row per result, overwriting `path`.
pub fn write_table<P: AsRef<Path>>(
    results: &[RouteResult],
    columns: OutputColumns,
    path: P,
) -> Result<(), PersistError> {
    let path = path.as_ref();
    let mut wtr = WriterBuilder::new().from_path(path)?;

    let mut header = Vec::new();
    if columns.id {
        header.push("id");
    }
    if columns.date {
        header.push("Date");
    }
    if columns.time {
        header.push("Time");
    }
    header.extend(["Pickup", "Dropoff", "Polyline_Points"]);
    wtr.write_record(&header)?;

    for result in results {
        let mut row = Vec::with_capacity(header.len());
        if columns.id {
            row.push(result.id.map(|id| id.to_string()).unwrap_or_default());
        }
        if columns.date {
            row.push(result.date.clone().unwrap_or_default());
        }
        if columns.time {
            row.push(result.time.clone().unwrap_or_default());
        }
        row.push(result.pickup.clone());
        row.push(result.dropoff.clone());
        row.push(format_points(&result.points));
        wtr.write_record(&row)?;
    }

    wtr.flush().map_err(io_error(path))
}

fn crs_member() -> JsonObject {
    let mut members = JsonObject::new();
    members.insert(
        "crs".to_string(),
        json!({ "type": "name", "properties": { "name": CRS_NAME } }),
    );
    members
}

fn to_feature(result: &RouteResult) -> Feature {
    let line = result.points.iter().map(|p| p.to_vec()).collect();
    let mut feature = Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::LineString(line))),
        id: None,
        properties: None,
        foreign_members: None,
    };
    if let Some(id) = result.id {
        feature.set_property("id", id);
    }
    feature.set_property("Pickup", result.pickup.clone());
    feature.set_property("Dropoff", result.dropoff.clone());
    if let Some(date) = &result.date {
        feature.set_property("Date", date.clone());
    }
    if let Some(time) = &result.time {
        feature.set_property("Time", time.clone());
    }
    feature
}

fn write_collection(features: Vec<Feature>, path: &Path) -> Result<(), PersistError> {
    let gj = GeoJson::FeatureCollection(FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(crs_member()),
    });
    fs::write(path, serde_json::to_string_pretty(&gj)?).map_err(io_error(path))
}

/// Writes one LineString feature per result, in WGS84, overwriting `path`.
pub fn write_geometry<P: AsRef<Path>>(results: &[RouteResult], path: P) -> Result<(), PersistError> {
    write_collection(results.iter().map(to_feature).collect(), path.as_ref())
}

pub fn read_features<P: AsRef<Path>>(path: P) -> Result<Vec<Feature>, PersistError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(io_error(path))?;
    let gj: GeoJson = text.parse().map_err(|e| PersistError::GeoJson {
        path: path.to_path_buf(),
        source: Box::new(e),
    })?;
    match gj {
        GeoJson::FeatureCollection(fc) => Ok(fc.features),
        _ => Err(PersistError::NotFeatureCollection(path.to_path_buf())),
    }
}

/// Concatenates the features of `inputs`, in the given order, into `output`.
/// Returns how many features were written.
pub fn merge_geometry_files<P: AsRef<Path>>(inputs: &[PathBuf], output: P) -> Result<usize, PersistError> {
    let mut features = Vec::new();
    for input in inputs {
        let mut part = read_features(input)?;
        log::debug!("Merging {} features from {}", part.len(), input.display());
        features.append(&mut part);
    }
    let count = features.len();
    write_collection(features, output.as_ref())?;
    Ok(count)
}

/// Lists the `.geojson` files of `dir` in directory order, or by file name when
/// `sorted`. `exclude` is left out so re-merging into the same directory is stable.
pub fn list_geometry_files<P: AsRef<Path>>(
    dir: P,
    exclude: Option<&Path>,
    sorted: bool,
) -> Result<Vec<PathBuf>, PersistError> {
    let dir = dir.as_ref();
    let skip = exclude.and_then(|p| fs::canonicalize(p).ok());

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("geojson") || !path.is_file() {
            continue;
        }
        if skip.is_some() && fs::canonicalize(&path).ok() == skip {
            continue;
        }
        files.push(path);
    }
    if sorted {
        files.sort();
    }
    Ok(files)
}

pub fn merge_directory<P: AsRef<Path>, Q: AsRef<Path>>(
    dir: P,
    output: Q,
    sorted: bool,
) -> Result<usize, PersistError> {
    let output = output.as_ref();
    let inputs = list_geometry_files(dir, Some(output), sorted)?;
    log::info!("Merging {} geometry files into {}", inputs.len(), output.display());
    merge_geometry_files(&inputs, output)
}
