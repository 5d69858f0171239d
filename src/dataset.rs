//! The loaded, cleaned dataset and the handle that serves it.
//!
//! A [`Dataset`] is built in one go and never changes afterwards. The
//! [`DatasetHandle`] holds the active one behind an `Arc`; reloading builds a
//! complete replacement first and only then swaps the pointer, so readers see
//! either the old dataset or the new one and never a mix.

use std::sync::{Arc, RwLock};

use chrono::NaiveDateTime;
use tracing::{error, info, warn};

use crate::analysis::{self, Anomaly, Frame, SensorPosition};
use crate::boundaries::{load_boundaries, NeighborhoodSet};
use crate::cleaning::{clean_readings, CleaningReport};
use crate::config::Config;
use crate::coverage::{coverage_statistics, CoverageStats};
use crate::error::Result;
use crate::loader::{load_mobile_readings, load_static_readings, load_static_sensors};
use crate::records::{join_static_locations, LocatedReading, MobileReading, StaticReading, StaticSensor};
use crate::stats::{
    self, HourlyAverage, HourlyPoint, LocationValue, MobileMetrics, PeriodStatistics,
    SensorAggregate, SensorOverview, ThresholdBand,
};
use crate::timerange::{filter_time_range, span, TimeRange};

/// Everything the dashboard reads, cleaned and immutable.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub static_sensors: Vec<StaticSensor>,
    pub static_readings: Vec<StaticReading>,
    pub mobile_readings: Vec<MobileReading>,
    /// `None` when the boundary source is unconfigured or failed to load
    pub neighborhoods: Option<NeighborhoodSet>,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    pub static_cleaning: CleaningReport,
    pub mobile_cleaning: CleaningReport,
    config: Config,
}

impl Dataset {
    /// Load and clean every configured source.
    ///
    /// The three CSV tables are required; any error there fails the load. The
    /// boundary source is optional and a failure there only disables coverage.
    pub fn load(config: &Config) -> Result<Self> {
        let paths = &config.data;

        // Step 1: required tables
        let static_sensors = load_static_sensors(&paths.static_sensors)?;
        let static_readings = load_static_readings(&paths.static_readings)?;
        let mobile_readings = load_mobile_readings(&paths.mobile_readings)?;

        // Step 2: optional boundaries
        let neighborhoods = match &paths.boundaries {
            Some(path) => match load_boundaries(path, &config.boundaries.name_property) {
                Ok(set) => Some(set),
                Err(e) => {
                    warn!(error = %e, "neighborhood boundaries unavailable, coverage disabled");
                    None
                }
            },
            None => {
                info!("no boundary source configured, coverage disabled");
                None
            }
        };

        Ok(Self::from_parts(
            static_sensors.rows,
            static_readings.rows,
            mobile_readings.rows,
            neighborhoods,
            config.clone(),
        ))
    }

    /// Clean raw tables and assemble a dataset.
    pub fn from_parts(
        static_sensors: Vec<StaticSensor>,
        static_readings: Vec<StaticReading>,
        mobile_readings: Vec<MobileReading>,
        neighborhoods: Option<NeighborhoodSet>,
        config: Config,
    ) -> Self {
        let (static_readings, static_cleaning) =
            clean_readings("static", static_readings, &config.cleaning);
        let (mobile_readings, mobile_cleaning) =
            clean_readings("mobile", mobile_readings, &config.cleaning);

        let bounds = span(
            static_readings
                .iter()
                .map(|r| r.timestamp)
                .chain(mobile_readings.iter().map(|r| r.timestamp)),
        );

        Self {
            static_sensors,
            static_readings,
            mobile_readings,
            neighborhoods,
            start_date: bounds.map(|(start, _)| start),
            end_date: bounds.map(|(_, end)| end),
            static_cleaning,
            mobile_cleaning,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn static_in(&self, range: TimeRange) -> Vec<StaticReading> {
        filter_time_range(&self.static_readings, range)
    }

    pub fn mobile_in(&self, range: TimeRange) -> Vec<MobileReading> {
        filter_time_range(&self.mobile_readings, range)
    }

    /// Static readings in range joined with their sensor locations.
    pub fn located_static_in(&self, range: TimeRange) -> Vec<LocatedReading> {
        join_static_locations(&self.static_in(range), &self.static_sensors)
    }

    pub fn overview(&self) -> SensorOverview {
        let date_range = self.start_date.zip(self.end_date);
        stats::sensor_overview(
            &self.static_sensors,
            &self.static_readings,
            &self.mobile_readings,
            date_range,
        )
    }

    /// Period statistics for UI date strings. Unparseable bounds mean "all data".
    pub fn period_statistics(&self, start: Option<&str>, end: Option<&str>) -> PeriodStatistics {
        let range = TimeRange::from_strs(start, end);
        stats::period_statistics(&self.static_in(range), &self.mobile_in(range))
    }

    /// Neighborhood coverage for UI date strings.
    pub fn coverage(&self, start: Option<&str>, end: Option<&str>) -> CoverageStats {
        let range = TimeRange::from_strs(start, end);
        coverage_statistics(
            &self.located_static_in(range),
            &self.mobile_in(range),
            self.neighborhoods.as_ref(),
        )
    }

    /// Mobile fleet metrics for UI date strings.
    pub fn mobile_metrics(&self, start: Option<&str>, end: Option<&str>) -> MobileMetrics {
        let range = TimeRange::from_strs(start, end);
        stats::mobile_metrics(&self.mobile_in(range), self.config.analysis.contamination_threshold)
    }

    /// Readings inside a cpm band for UI date strings.
    pub fn threshold_band(&self, min: f64, max: f64, start: Option<&str>, end: Option<&str>) -> ThresholdBand {
        let range = TimeRange::from_strs(start, end);
        stats::threshold_band(&self.static_in(range), &self.mobile_in(range), min, max)
    }

    pub fn static_aggregates(&self, range: TimeRange) -> Vec<SensorAggregate> {
        stats::static_sensor_aggregates(&self.static_in(range), &self.static_sensors)
    }

    pub fn mobile_aggregates(&self, range: TimeRange) -> Vec<SensorAggregate> {
        stats::mobile_sensor_aggregates(&self.mobile_in(range))
    }

    pub fn heat_values(&self, range: TimeRange) -> Vec<LocationValue> {
        stats::location_heat_values(&self.static_in(range), &self.static_sensors)
    }

    pub fn hourly_averages(&self, mobile: bool) -> Vec<HourlyAverage> {
        if mobile {
            stats::hourly_averages(&self.mobile_readings)
        } else {
            stats::hourly_averages(&self.static_readings)
        }
    }

    /// Hourly static and mobile series for the comparison chart.
    pub fn hourly_series(&self, range: TimeRange) -> (Vec<HourlyPoint>, Vec<HourlyPoint>) {
        (
            stats::hourly_series(&self.static_in(range)),
            stats::hourly_series(&self.mobile_in(range)),
        )
    }

    /// Animation frames for static (located via join) or mobile readings.
    pub fn frames(&self, range: TimeRange, mobile: bool) -> Vec<Frame> {
        let width = self.config.analysis.bucket_width();
        let located: Vec<LocatedReading> = if mobile {
            self.mobile_in(range).iter().map(LocatedReading::from).collect()
        } else {
            self.located_static_in(range)
        };
        analysis::time_bucket_frames(&located, width)
    }

    pub fn positions(&self, at: Option<NaiveDateTime>) -> (Vec<SensorPosition>, Vec<SensorPosition>) {
        analysis::sensor_positions(&self.static_sensors, &self.mobile_readings, at)
    }

    pub fn anomalies(&self, mobile: bool) -> Vec<Anomaly> {
        let window = self.config.analysis.anomaly_window();
        let threshold = self.config.analysis.anomaly_threshold;
        if mobile {
            analysis::detect_anomalies(&self.mobile_readings, window, threshold)
        } else {
            analysis::detect_anomalies(&self.static_readings, window, threshold)
        }
    }
}

/// Shared access to the active dataset.
#[derive(Debug, Default)]
pub struct DatasetHandle {
    active: RwLock<Option<Arc<Dataset>>>,
}

impl DatasetHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(dataset: Dataset) -> Self {
        Self {
            active: RwLock::new(Some(Arc::new(dataset))),
        }
    }

    /// Load (or reload) from `config`. Returns whether it succeeded; on
    /// failure the previously active dataset, if any, stays in place.
    pub fn load(&self, config: &Config) -> bool {
        match Dataset::load(config) {
            Ok(dataset) => {
                info!(
                    static_readings = dataset.static_readings.len(),
                    mobile_readings = dataset.mobile_readings.len(),
                    "data loaded successfully"
                );
                self.swap(dataset);
                true
            }
            Err(e) => {
                error!(error = %e, "error loading data");
                false
            }
        }
    }

    /// Replace the active dataset.
    pub fn swap(&self, dataset: Dataset) {
        let fresh = Arc::new(dataset);
        match self.active.write() {
            Ok(mut guard) => *guard = Some(fresh),
            // The slot only ever holds a complete Arc
            Err(poisoned) => *poisoned.into_inner() = Some(fresh),
        }
    }

    /// The active dataset, if one has been loaded.
    pub fn current(&self) -> Option<Arc<Dataset>> {
        match self.active.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.current().is_some()
    }

    /// Period statistics against the active dataset; zeros when nothing is loaded.
    pub fn period_statistics(&self, start: Option<&str>, end: Option<&str>) -> PeriodStatistics {
        self.current()
            .map(|d| d.period_statistics(start, end))
            .unwrap_or_default()
    }

    /// Coverage against the active dataset; zeros when nothing is loaded.
    pub fn coverage(&self, start: Option<&str>, end: Option<&str>) -> CoverageStats {
        self.current()
            .map(|d| d.coverage(start, end))
            .unwrap_or_default()
    }

    pub fn overview(&self) -> SensorOverview {
        self.current().map(|d| d.overview()).unwrap_or_default()
    }
}
