//! Runtime configuration: input file locations and tunable thresholds.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cleaning::CleaningThresholds;
use crate::error::{Error, Result};

/// Environment variable naming a TOML config file.
pub const CONFIG_ENV: &str = "RADWATCH_CONFIG";
/// Environment variable re-rooting the default data file names.
pub const DATA_DIR_ENV: &str = "RADWATCH_DATA_DIR";

const DEFAULT_DATA_DIR: &str = "../data";

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Input file locations
    pub data: DataPaths,

    /// Cleaning pipeline thresholds
    pub cleaning: CleaningThresholds,

    /// Neighborhood boundary options
    pub boundaries: BoundaryOptions,

    /// Supplemental analysis parameters
    pub analysis: AnalysisOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPaths {
    pub static_sensors: PathBuf,
    pub static_readings: PathBuf,
    pub mobile_readings: PathBuf,

    /// GeoJSON file or directory of GeoJSON files. `None` runs without coverage.
    pub boundaries: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryOptions {
    /// Feature property holding the neighborhood name
    pub name_property: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Trailing window for rolling anomaly statistics (minutes)
    pub anomaly_window_minutes: i64,

    /// Deviation, in standard deviations, that flags a reading
    pub anomaly_threshold: f64,

    /// Width of time-bucket frames (minutes)
    pub bucket_minutes: i64,

    /// Mobile readings above this cpm mark a vehicle as contaminated
    pub contamination_threshold: f64,
}

impl DataPaths {
    /// Default file layout rooted at `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            static_sensors: dir.join("StaticSensorLocations.csv"),
            static_readings: dir.join("StaticSensorReadings.csv"),
            mobile_readings: dir.join("MobileSensorReadings.csv"),
            boundaries: Some(dir.join("StHimarkNeighborhoods.geojson")),
        }
    }
}

impl Default for DataPaths {
    fn default() -> Self {
        Self::in_dir(DEFAULT_DATA_DIR)
    }
}

impl Default for BoundaryOptions {
    fn default() -> Self {
        Self {
            name_property: "Nbrhood".to_string(),
        }
    }
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            anomaly_window_minutes: 60,
            anomaly_threshold: 3.0,
            bucket_minutes: 60,
            contamination_threshold: crate::stats::CONTAMINATION_THRESHOLD,
        }
    }
}

impl AnalysisOptions {
    /// Anomaly window; at least one minute, saturating at the largest duration.
    pub fn anomaly_window(&self) -> Duration {
        saturating_minutes(self.anomaly_window_minutes)
    }

    /// Frame bucket width; at least one minute, saturating at the largest duration.
    pub fn bucket_width(&self) -> Duration {
        saturating_minutes(self.bucket_minutes)
    }
}

fn saturating_minutes(minutes: i64) -> Duration {
    Duration::try_minutes(minutes.max(1)).unwrap_or_else(Duration::max_value)
}

impl Config {
    /// Parse a TOML config file. Missing keys fall back to defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_toml_str(&text).map_err(|reason| Error::Config {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn from_toml_str(text: &str) -> std::result::Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }

    /// Resolve configuration: explicit path, then `RADWATCH_CONFIG`, then defaults.
    /// `RADWATCH_DATA_DIR` re-roots the default data paths when no file is used.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);

        if let Some(path) = explicit.map(Path::to_path_buf).or(from_env) {
            return Self::from_toml_file(&path);
        }

        let mut config = Self::default();
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
            config.data = DataPaths::in_dir(PathBuf::from(dir));
        }
        Ok(config)
    }
}
