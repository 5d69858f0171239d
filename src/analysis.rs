//! Time-based analyses behind the map views: bucketed frames, latest sensor
//! positions and rolling-window anomaly flags.

use chrono::{DateTime, Duration, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::records::{LocatedReading, MobileReading, Reading, StaticSensor};
use crate::stats::finite_or_zero;

/// Mean and count for one location in one time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BucketCell {
    pub latitude: f64,
    pub longitude: f64,
    pub mean: f64,
    pub count: usize,
}

/// All cells for one bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub bucket_start: NaiveDateTime,
    pub cells: Vec<BucketCell>,
}

/// Floor `ts` to a multiple of `width` since the Unix epoch.
pub fn bucket_start(ts: NaiveDateTime, width: Duration) -> NaiveDateTime {
    let width_secs = width.num_seconds().max(1);
    let secs = ts.and_utc().timestamp();
    let floored = secs - secs.rem_euclid(width_secs);
    DateTime::from_timestamp(floored, 0)
        .map(|dt| dt.naive_utc())
        .unwrap_or(ts)
}

/// Group located readings by (bucket, latitude, longitude). Frames are in
/// ascending bucket order; cells within a frame are ordered by position.
pub fn time_bucket_frames(readings: &[LocatedReading], width: Duration) -> Vec<Frame> {
    let mut groups: BTreeMap<NaiveDateTime, BTreeMap<(u64, u64), (f64, f64, f64, usize)>> =
        BTreeMap::new();

    for r in readings {
        let cell = groups
            .entry(bucket_start(r.timestamp, width))
            .or_default()
            .entry((order_key(r.latitude), order_key(r.longitude)))
            .or_insert((r.latitude, r.longitude, 0.0, 0));
        cell.2 += r.value;
        cell.3 += 1;
    }

    groups
        .into_iter()
        .map(|(bucket_start, cells)| Frame {
            bucket_start,
            cells: cells
                .into_values()
                .map(|(latitude, longitude, sum, count)| BucketCell {
                    latitude,
                    longitude,
                    mean: sum / count as f64,
                    count,
                })
                .collect(),
        })
        .collect()
}

// Map an f64 to a u64 whose ordering matches numeric ordering
fn order_key(v: f64) -> u64 {
    let bits = v.to_bits();
    if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits | (1 << 63)
    }
}

/// Position of a sensor for the map markers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorPosition {
    pub sensor_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Mobile sensors only
    pub user_id: Option<String>,
}

/// Static sensor locations, and mobile positions either at exactly `at` or,
/// when `at` is `None`, each mobile sensor's latest position.
pub fn sensor_positions(
    static_sensors: &[StaticSensor],
    mobile_readings: &[MobileReading],
    at: Option<NaiveDateTime>,
) -> (Vec<SensorPosition>, Vec<SensorPosition>) {
    let static_positions = static_sensors
        .iter()
        .map(|s| SensorPosition {
            sensor_id: s.sensor_id.clone(),
            latitude: s.latitude,
            longitude: s.longitude,
            user_id: None,
        })
        .collect();

    let mobile_position = |r: &MobileReading| SensorPosition {
        sensor_id: r.sensor_id.clone(),
        latitude: r.latitude,
        longitude: r.longitude,
        user_id: Some(r.user_id.clone()),
    };

    let mobile_positions = match at {
        Some(at) => mobile_readings
            .iter()
            .filter(|r| r.timestamp == at)
            .map(mobile_position)
            .collect(),
        None => {
            let mut latest: BTreeMap<&str, &MobileReading> = BTreeMap::new();
            for r in mobile_readings {
                let entry = latest.entry(r.sensor_id.as_str()).or_insert(r);
                if r.timestamp >= entry.timestamp {
                    *entry = r;
                }
            }
            latest.into_values().map(mobile_position).collect()
        }
    };

    (static_positions, mobile_positions)
}

/// A reading flagged as far from its sensor's recent behaviour.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub sensor_id: String,
    pub timestamp: NaiveDateTime,
    pub value: f64,
    pub rolling_mean: f64,
    pub rolling_std: f64,
}

/// Flag readings where `|value - mean| > threshold * std`, with mean and
/// sample deviation over the sensor's readings in `(t - window, t]`.
/// Windows holding a single reading, or identical readings, never flag.
/// A window longer than the representable time span covers the whole series.
pub fn detect_anomalies<R: Reading>(readings: &[R], window: Duration, threshold: f64) -> Vec<Anomaly> {
    let mut by_sensor: HashMap<&str, Vec<&R>> = HashMap::new();
    for r in readings {
        by_sensor.entry(r.sensor_id()).or_default().push(r);
    }

    let mut anomalies = Vec::new();
    for (sensor_id, mut rows) in by_sensor {
        rows.sort_by_key(|r| r.timestamp());

        let mut start = 0;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for end in 0..rows.len() {
            let t = rows[end].timestamp();
            let v = rows[end].value();
            sum += v;
            sum_sq += v * v;

            // A window reaching past the earliest representable time keeps everything
            let cutoff = t.checked_sub_signed(window);
            while start < end && cutoff.is_some_and(|c| rows[start].timestamp() <= c) {
                let old = rows[start].value();
                sum -= old;
                sum_sq -= old * old;
                start += 1;
            }

            let n = (end - start + 1) as f64;
            if n < 2.0 {
                continue;
            }
            let mean = sum / n;
            let variance = ((sum_sq - n * mean * mean) / (n - 1.0)).max(0.0);
            let std = finite_or_zero(variance.sqrt());

            if std > 0.0 && (v - mean).abs() > threshold * std {
                anomalies.push(Anomaly {
                    sensor_id: sensor_id.to_string(),
                    timestamp: t,
                    value: v,
                    rolling_mean: mean,
                    rolling_std: std,
                });
            }
        }
    }

    anomalies.sort_by(|a, b| {
        a.sensor_id
            .cmp(&b.sensor_id)
            .then(a.timestamp.cmp(&b.timestamp))
    });
    anomalies
}
