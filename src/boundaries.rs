//! Neighborhood boundary loading
//!
//! Boundaries come from GeoJSON feature collections, either one file or a
//! directory tree of `.geojson`/`.json` files. Every polygon is brought to
//! WGS84 (EPSG:4326) before it is handed out, so containment tests can be run
//! directly against reading latitudes and longitudes.

use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::f64::consts::PI;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{Error, Result};

const WEB_MERCATOR_RADIUS_M: f64 = 6_378_137.0;

/// A named neighborhood polygon in WGS84.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighborhood {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

/// All neighborhoods from one boundary source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeighborhoodSet {
    pub neighborhoods: Vec<Neighborhood>,
}

impl NeighborhoodSet {
    pub fn new(neighborhoods: Vec<Neighborhood>) -> Self {
        Self { neighborhoods }
    }

    pub fn len(&self) -> usize {
        self.neighborhoods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighborhoods.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.neighborhoods.iter().map(|n| n.name.as_str()).collect()
    }
}

/// Coordinate reference systems we can bring to WGS84.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    Wgs84,
    WebMercator,
}

impl Crs {
    /// Classify a GeoJSON `crs.properties.name` value.
    pub fn from_name(name: &str) -> Result<Self> {
        let upper = name.trim().to_ascii_uppercase();
        if upper.ends_with("CRS84") || upper.ends_with("4326") {
            Ok(Crs::Wgs84)
        } else if upper.ends_with("3857") || upper.ends_with("900913") || upper.ends_with("3785") {
            Ok(Crs::WebMercator)
        } else {
            Err(Error::UnsupportedCrs(name.to_string()))
        }
    }

    /// Convert one `(x, y)` position to `(longitude, latitude)` degrees.
    pub fn to_wgs84(self, x: f64, y: f64) -> Coord<f64> {
        match self {
            Crs::Wgs84 => Coord { x, y },
            Crs::WebMercator => {
                let lon = (x / WEB_MERCATOR_RADIUS_M).to_degrees();
                let lat = (2.0 * (y / WEB_MERCATOR_RADIUS_M).exp().atan() - PI / 2.0).to_degrees();
                Coord { x: lon, y: lat }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    features: Vec<Feature>,
    #[serde(default)]
    crs: Option<CrsMember>,
}

#[derive(Debug, Deserialize)]
struct CrsMember {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    geometry: Option<Geometry>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Vec<f64>>>> },
    #[serde(other)]
    Unsupported,
}

/// Load boundaries from a GeoJSON file or a directory of them.
pub fn load_boundaries(path: &Path, name_property: &str) -> Result<NeighborhoodSet> {
    let files = boundary_files(path)?;
    let mut neighborhoods = Vec::new();

    for file in &files {
        let text = std::fs::read_to_string(file).map_err(|e| Error::io(file, e))?;
        let mut parsed = parse_geojson(&text, name_property).map_err(|e| match e {
            Error::Boundary { reason, .. } => Error::boundary(file, reason),
            Error::Json { source, .. } => Error::Json { path: file.clone(), source },
            other => other,
        })?;
        debug!(file = %file.display(), features = parsed.len(), "read boundary file");
        neighborhoods.append(&mut parsed.neighborhoods);
    }

    info!(
        source = %path.display(),
        files = files.len(),
        neighborhoods = neighborhoods.len(),
        "loaded neighborhood boundaries"
    );
    Ok(NeighborhoodSet::new(neighborhoods))
}

fn boundary_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(Error::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "boundary source not found"),
        ));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path) {
        let entry = entry.map_err(|e| Error::boundary(path, e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_geojson = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("geojson") || ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_geojson {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(Error::boundary(path, "no .geojson files in directory"));
    }
    Ok(files)
}

/// Parse one GeoJSON feature collection into WGS84 neighborhoods.
pub fn parse_geojson(text: &str, name_property: &str) -> Result<NeighborhoodSet> {
    let collection: FeatureCollection = serde_json::from_str(text).map_err(|source| Error::Json {
        path: PathBuf::new(),
        source,
    })?;

    if collection.kind != "FeatureCollection" {
        return Err(Error::boundary(
            PathBuf::new(),
            format!("expected a FeatureCollection, found `{}`", collection.kind),
        ));
    }

    // RFC 7946 data without a crs member is WGS84
    let crs = match collection
        .crs
        .as_ref()
        .and_then(|c| c.properties.as_ref())
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
    {
        Some(name) => Crs::from_name(name)?,
        None => Crs::Wgs84,
    };

    let mut neighborhoods = Vec::with_capacity(collection.features.len());
    for (idx, feature) in collection.features.iter().enumerate() {
        let name = feature_name(feature, name_property, idx);
        let geometry = match &feature.geometry {
            Some(Geometry::Polygon { coordinates }) => {
                MultiPolygon::new(vec![build_polygon(coordinates, crs, &name)?])
            }
            Some(Geometry::MultiPolygon { coordinates }) => MultiPolygon::new(
                coordinates
                    .iter()
                    .map(|rings| build_polygon(rings, crs, &name))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Some(Geometry::Unsupported) | None => {
                debug!(feature = %name, "skipping feature without polygon geometry");
                continue;
            }
        };
        neighborhoods.push(Neighborhood { name, geometry });
    }

    Ok(NeighborhoodSet::new(neighborhoods))
}

fn feature_name(feature: &Feature, name_property: &str, idx: usize) -> String {
    let properties = feature.properties.as_ref();
    let value = properties
        .and_then(|p| p.get(name_property))
        .or_else(|| properties.and_then(|p| p.get("name")));

    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => format!("feature-{}", idx),
    }
}

fn build_polygon(rings: &[Vec<Vec<f64>>], crs: Crs, name: &str) -> Result<Polygon<f64>> {
    let mut converted = rings
        .iter()
        .map(|ring| build_ring(ring, crs, name))
        .collect::<Result<Vec<_>>>()?;

    if converted.is_empty() {
        return Err(Error::boundary(
            PathBuf::new(),
            format!("polygon in `{}` has no rings", name),
        ));
    }
    let exterior = converted.remove(0);
    Ok(Polygon::new(exterior, converted))
}

fn build_ring(positions: &[Vec<f64>], crs: Crs, name: &str) -> Result<LineString<f64>> {
    let coords = positions
        .iter()
        .map(|position| match position.as_slice() {
            [x, y, ..] => Ok(crs.to_wgs84(*x, *y)),
            _ => Err(Error::boundary(
                PathBuf::new(),
                format!("position with fewer than two coordinates in `{}`", name),
            )),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(LineString::new(coords))
}
