//! Aggregate statistics over reading subsets.
//!
//! Every figure handed back to callers is finite: means, deviations and
//! extremes of empty (or single-row, for the deviation) inputs come back as 0.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::cleaning::quantile_sorted;
use crate::records::{MobileReading, Reading, StaticReading, StaticSensor};

/// Mobile readings above this many cpm mark their vehicle as contaminated.
pub const CONTAMINATION_THRESHOLD: f64 = 35.0;

/// Replace NaN (and infinities) with 0.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Mean, median, extremes, sample standard deviation and count of a set of values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ValueSummary {
    pub mean: f64,
    pub median: f64,
    pub max: f64,
    pub min: f64,
    pub std: f64,
    pub count: usize,
}

impl ValueSummary {
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let mut values: Vec<f64> = values.into_iter().collect();
        let count = values.len();
        if count == 0 {
            return Self::default();
        }

        let mean = values.iter().sum::<f64>() / count as f64;
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);

        values.sort_by(f64::total_cmp);
        let median = quantile_sorted(&values, 0.5).unwrap_or(f64::NAN);

        // Sample deviation (n - 1); undefined for a single value
        let std = if count > 1 {
            let variance =
                values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            variance.sqrt()
        } else {
            f64::NAN
        };

        Self {
            mean: finite_or_zero(mean),
            median: finite_or_zero(median),
            max: finite_or_zero(max),
            min: finite_or_zero(min),
            std: finite_or_zero(std),
            count,
        }
    }

    pub fn from_readings<R: Reading>(readings: &[R]) -> Self {
        Self::from_values(readings.iter().map(|r| r.value()))
    }
}

/// Statistics for the currently selected time period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PeriodStatistics {
    pub static_readings: ValueSummary,
    pub mobile_readings: ValueSummary,
    pub unique_mobile_sensors: usize,
}

/// Compute period statistics for already time-filtered subsets.
pub fn period_statistics(
    static_data: &[StaticReading],
    mobile_data: &[MobileReading],
) -> PeriodStatistics {
    PeriodStatistics {
        static_readings: ValueSummary::from_readings(static_data),
        mobile_readings: ValueSummary::from_readings(mobile_data),
        unique_mobile_sensors: distinct_sensors(mobile_data),
    }
}

pub fn distinct_sensors<R: Reading>(readings: &[R]) -> usize {
    readings
        .iter()
        .map(|r| r.sensor_id())
        .collect::<HashSet<_>>()
        .len()
}

/// Activity of the mobile fleet within one period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MobileMetrics {
    pub sensor_count: usize,
    pub user_count: usize,
    /// Distinct (latitude, longitude) pairs visited
    pub unique_locations: usize,
    /// Vehicles with at least one reading strictly above the threshold
    pub contaminated_vehicles: usize,
}

/// Fleet metrics for already time-filtered mobile readings.
pub fn mobile_metrics(readings: &[MobileReading], contamination_threshold: f64) -> MobileMetrics {
    MobileMetrics {
        sensor_count: distinct_sensors(readings),
        user_count: readings
            .iter()
            .map(|r| r.user_id.as_str())
            .collect::<HashSet<_>>()
            .len(),
        unique_locations: readings
            .iter()
            .map(|r| (r.latitude.to_bits(), r.longitude.to_bits()))
            .collect::<HashSet<_>>()
            .len(),
        contaminated_vehicles: readings
            .iter()
            .filter(|r| r.value > contamination_threshold)
            .map(|r| r.sensor_id.as_str())
            .collect::<HashSet<_>>()
            .len(),
    }
}

/// Basic counts about what is loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SensorOverview {
    pub static_sensor_count: usize,
    pub mobile_sensor_count: usize,
    pub unique_users: usize,
    pub date_range: Option<(NaiveDateTime, NaiveDateTime)>,
    pub static_reading_count: usize,
    pub mobile_reading_count: usize,
}

pub fn sensor_overview(
    static_sensors: &[StaticSensor],
    static_readings: &[StaticReading],
    mobile_readings: &[MobileReading],
    date_range: Option<(NaiveDateTime, NaiveDateTime)>,
) -> SensorOverview {
    SensorOverview {
        static_sensor_count: static_sensors
            .iter()
            .map(|s| s.sensor_id.as_str())
            .collect::<HashSet<_>>()
            .len(),
        mobile_sensor_count: distinct_sensors(mobile_readings),
        unique_users: mobile_readings
            .iter()
            .map(|r| r.user_id.as_str())
            .collect::<HashSet<_>>()
            .len(),
        date_range,
        static_reading_count: static_readings.len(),
        mobile_reading_count: mobile_readings.len(),
    }
}

/// Per-sensor summary with the position used to plot it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorAggregate {
    pub sensor_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Value of the sensor's most recent reading
    pub latest_value: f64,
    pub summary: ValueSummary,
}

/// Group static readings by sensor and attach each sensor's fixed location.
/// Sensors without a location are left out (inner join).
pub fn static_sensor_aggregates(
    readings: &[StaticReading],
    sensors: &[StaticSensor],
) -> Vec<SensorAggregate> {
    let groups = group_with_latest(readings);

    sensors
        .iter()
        .filter_map(|s| {
            groups.get(s.sensor_id.as_str()).map(|(values, latest)| SensorAggregate {
                sensor_id: s.sensor_id.clone(),
                latitude: s.latitude,
                longitude: s.longitude,
                latest_value: latest.value,
                summary: ValueSummary::from_values(values.iter().copied()),
            })
        })
        .collect()
}

/// Group mobile readings by sensor; the position is the latest reading's.
pub fn mobile_sensor_aggregates(readings: &[MobileReading]) -> Vec<SensorAggregate> {
    group_with_latest(readings)
        .into_iter()
        .map(|(sensor_id, (values, latest))| SensorAggregate {
            sensor_id: sensor_id.to_string(),
            latitude: latest.latitude,
            longitude: latest.longitude,
            latest_value: latest.value,
            summary: ValueSummary::from_values(values),
        })
        .collect()
}

// Values per sensor plus the sensor's latest reading (last one wins on ties)
fn group_with_latest<R: Reading>(readings: &[R]) -> BTreeMap<&str, (Vec<f64>, &R)> {
    let mut groups: BTreeMap<&str, (Vec<f64>, &R)> = BTreeMap::new();
    for r in readings {
        let entry = groups.entry(r.sensor_id()).or_insert_with(|| (Vec::new(), r));
        entry.0.push(r.value());
        if r.timestamp() >= entry.1.timestamp() {
            entry.1 = r;
        }
    }
    groups
}

/// Mean static value per sensor location, for the heat layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LocationValue {
    pub latitude: f64,
    pub longitude: f64,
    pub value: f64,
}

pub fn location_heat_values(
    readings: &[StaticReading],
    sensors: &[StaticSensor],
) -> Vec<LocationValue> {
    let joined = crate::records::join_static_locations(readings, sensors);

    // f64 keys via bit patterns; identical coordinates share a bucket
    let mut groups: BTreeMap<(u64, u64), (f64, f64, f64, usize)> = BTreeMap::new();
    for r in &joined {
        let entry = groups
            .entry((r.latitude.to_bits(), r.longitude.to_bits()))
            .or_insert((r.latitude, r.longitude, 0.0, 0));
        entry.2 += r.value;
        entry.3 += 1;
    }

    let mut values: Vec<LocationValue> = groups
        .into_values()
        .map(|(latitude, longitude, sum, n)| LocationValue {
            latitude,
            longitude,
            value: sum / n as f64,
        })
        .collect();
    values.sort_by(|a, b| {
        a.latitude
            .total_cmp(&b.latitude)
            .then(a.longitude.total_cmp(&b.longitude))
    });
    values
}

/// Mean value for one sensor in one clock hour of one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyAverage {
    pub date: NaiveDate,
    pub hour: u32,
    pub sensor_id: String,
    pub value: f64,
}

/// Group by (date, hour, sensor) and average.
pub fn hourly_averages<R: Reading>(readings: &[R]) -> Vec<HourlyAverage> {
    let mut groups: BTreeMap<(NaiveDate, u32, &str), (f64, usize)> = BTreeMap::new();
    for r in readings {
        let ts = r.timestamp();
        let entry = groups
            .entry((ts.date(), ts.hour(), r.sensor_id()))
            .or_insert((0.0, 0));
        entry.0 += r.value();
        entry.1 += 1;
    }

    groups
        .into_iter()
        .map(|((date, hour, sensor_id), (sum, n))| HourlyAverage {
            date,
            hour,
            sensor_id: sensor_id.to_string(),
            value: sum / n as f64,
        })
        .collect()
}

/// Mean and deviation across all sensors for one clock hour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HourlyPoint {
    pub hour_start: NaiveDateTime,
    pub mean: f64,
    pub std: f64,
    pub count: usize,
}

/// Hourly series for the comparison chart. Hours with no readings are omitted.
pub fn hourly_series<R: Reading>(readings: &[R]) -> Vec<HourlyPoint> {
    let mut groups: BTreeMap<NaiveDateTime, Vec<f64>> = BTreeMap::new();
    for r in readings {
        let ts = r.timestamp();
        let Some(hour_start) = ts.date().and_hms_opt(ts.hour(), 0, 0) else {
            continue;
        };
        groups.entry(hour_start).or_default().push(r.value());
    }

    groups
        .into_iter()
        .map(|(hour_start, values)| {
            let summary = ValueSummary::from_values(values);
            HourlyPoint {
                hour_start,
                mean: summary.mean,
                std: summary.std,
                count: summary.count,
            }
        })
        .collect()
}

/// Readings falling inside a cpm band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ThresholdBand {
    pub min: f64,
    pub max: f64,
    pub affected_static_sensors: usize,
    pub mobile_readings_in_band: usize,
    pub mobile_mean: f64,
}

pub fn threshold_band(
    static_data: &[StaticReading],
    mobile_data: &[MobileReading],
    min: f64,
    max: f64,
) -> ThresholdBand {
    let in_band = |v: f64| v >= min && v <= max;

    let affected_static_sensors = static_data
        .iter()
        .filter(|r| in_band(r.value))
        .map(|r| r.sensor_id.as_str())
        .collect::<HashSet<_>>()
        .len();

    let mobile_values: Vec<f64> = mobile_data
        .iter()
        .map(|r| r.value)
        .filter(|v| in_band(*v))
        .collect();
    let summary = ValueSummary::from_values(mobile_values);

    ThresholdBand {
        min,
        max,
        affected_static_sensors,
        mobile_readings_in_band: summary.count,
        mobile_mean: summary.mean,
    }
}
