//! Reading cleaning pipeline
//!
//! Three filters run in a fixed order, each on the survivors of the previous:
//!
//! 1. Range filter: drop values outside `[min_valid_value, max_valid_value]`
//! 2. Rate-of-change filter: per sensor, in time order, drop a reading that
//!    jumps more than `max_rate_of_change` from the last kept reading
//! 3. IQR filter: drop values outside `[Q1 - k*IQR, Q3 + k*IQR]`, with the
//!    quartiles taken over the whole surviving set (all sensors mixed)
//!
//! Rows are only ever dropped, never modified.
//! The range and rate stages are fixed points on their own output. The IQR
//! stage is not: its fences move once outliers are gone, so a second run can
//! drop more rows.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::records::Reading;

pub const MIN_VALID_VALUE: f64 = 0.0;
pub const MAX_VALID_VALUE: f64 = 100.0;
pub const MAX_RATE_OF_CHANGE: f64 = 50.0;
pub const IQR_MULTIPLIER: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningThresholds {
    pub min_valid_value: f64,
    pub max_valid_value: f64,
    pub max_rate_of_change: f64,
    pub iqr_multiplier: f64,
}

impl Default for CleaningThresholds {
    fn default() -> Self {
        Self {
            min_valid_value: MIN_VALID_VALUE,
            max_valid_value: MAX_VALID_VALUE,
            max_rate_of_change: MAX_RATE_OF_CHANGE,
            iqr_multiplier: IQR_MULTIPLIER,
        }
    }
}

/// Drop counts and quartile bounds for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningReport {
    pub input_rows: usize,
    pub range_dropped: usize,
    pub rate_dropped: usize,
    pub outlier_dropped: usize,
    pub output_rows: usize,
    pub iqr_bounds: Option<IqrBounds>,
}

impl CleaningReport {
    pub fn total_dropped(&self) -> usize {
        self.range_dropped + self.rate_dropped + self.outlier_dropped
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IqrBounds {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Run the full pipeline. `label` names the table in log output.
pub fn clean_readings<R>(
    label: &str,
    readings: Vec<R>,
    thresholds: &CleaningThresholds,
) -> (Vec<R>, CleaningReport)
where
    R: Reading,
{
    let input_rows = readings.len();

    // Step 1: physical range
    let readings = range_filter(readings, thresholds.min_valid_value, thresholds.max_valid_value);
    let range_dropped = input_rows - readings.len();

    // Step 2: per-sensor jumps
    let before_rate = readings.len();
    let readings = rate_of_change_filter(readings, thresholds.max_rate_of_change);
    let rate_dropped = before_rate - readings.len();

    // Step 3: global IQR
    let before_outliers = readings.len();
    let (readings, iqr_bounds) = iqr_filter(readings, thresholds.iqr_multiplier);
    let outlier_dropped = before_outliers - readings.len();

    let report = CleaningReport {
        input_rows,
        range_dropped,
        rate_dropped,
        outlier_dropped,
        output_rows: readings.len(),
        iqr_bounds,
    };

    info!(
        table = label,
        input = report.input_rows,
        range_dropped = report.range_dropped,
        rate_dropped = report.rate_dropped,
        outlier_dropped = report.outlier_dropped,
        kept = report.output_rows,
        "cleaned readings"
    );
    if let Some(bounds) = iqr_bounds {
        debug!(
            table = label,
            q1 = bounds.q1,
            q3 = bounds.q3,
            lower = bounds.lower,
            upper = bounds.upper,
            "outlier bounds"
        );
    }

    (readings, report)
}

/// Keep readings with `min <= value <= max`. NaN never survives.
pub fn range_filter<R: Reading>(readings: Vec<R>, min: f64, max: f64) -> Vec<R> {
    readings
        .into_iter()
        .filter(|r| {
            let v = r.value();
            v >= min && v <= max
        })
        .collect()
}

/// Sort by (sensor, timestamp) and drop readings that differ from the
/// previous kept reading of the same sensor by more than `max_change`.
///
/// Comparing against the last *kept* reading means every adjacent pair in the
/// output satisfies the bound, so running the filter again drops nothing.
pub fn rate_of_change_filter<R: Reading>(mut readings: Vec<R>, max_change: f64) -> Vec<R> {
    readings.sort_by(|a, b| {
        a.sensor_id()
            .cmp(b.sensor_id())
            .then_with(|| a.timestamp().cmp(&b.timestamp()))
    });

    let mut kept: Vec<R> = Vec::with_capacity(readings.len());
    for reading in readings {
        let keep = match kept.last() {
            Some(prev) if prev.sensor_id() == reading.sensor_id() => {
                (reading.value() - prev.value()).abs() <= max_change
            }
            // First reading of a sensor has no predecessor
            _ => true,
        };
        if keep {
            kept.push(reading);
        }
    }
    kept
}

/// Drop readings outside the Tukey fences computed over the whole set.
/// An empty set passes through with no bounds.
pub fn iqr_filter<R: Reading>(readings: Vec<R>, multiplier: f64) -> (Vec<R>, Option<IqrBounds>) {
    let mut values: Vec<f64> = readings.iter().map(|r| r.value()).collect();
    values.sort_by(f64::total_cmp);

    let (Some(q1), Some(q3)) = (quantile_sorted(&values, 0.25), quantile_sorted(&values, 0.75))
    else {
        return (readings, None);
    };

    let iqr = q3 - q1;
    let bounds = IqrBounds {
        q1,
        q3,
        lower: q1 - multiplier * iqr,
        upper: q3 + multiplier * iqr,
    };

    let kept = readings
        .into_iter()
        .filter(|r| {
            let v = r.value();
            v >= bounds.lower && v <= bounds.upper
        })
        .collect();

    (kept, Some(bounds))
}

/// Quantile of ascending-sorted data with linear interpolation between
/// closest ranks: position `q * (n - 1)`.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::fixtures::*;
    use crate::records::StaticReading;
    use proptest::prelude::*;

    fn values(rows: &[StaticReading]) -> Vec<f64> {
        rows.iter().map(|r| r.value).collect()
    }

    #[test]
    fn test_negative_value_dropped_by_range_stage() {
        let rows = vec![
            static_reading("1", ts(6, 0, 0), -5.0),
            static_reading("1", ts(6, 1, 0), 20.0),
            static_reading("1", ts(6, 2, 0), 21.0),
        ];

        let (cleaned, report) = clean_readings("static", rows, &CleaningThresholds::default());
        assert_eq!(report.range_dropped, 1);
        assert_eq!(report.rate_dropped, 0);
        assert_eq!(values(&cleaned), vec![20.0, 21.0]);
    }

    #[test]
    fn test_range_bounds_inclusive_and_nan_dropped() {
        let rows = vec![
            static_reading("1", ts(6, 0, 0), 0.0),
            static_reading("1", ts(6, 1, 0), 100.0),
            static_reading("1", ts(6, 2, 0), 100.5),
            static_reading("1", ts(6, 3, 0), f64::NAN),
        ];
        let kept = range_filter(rows, MIN_VALID_VALUE, MAX_VALID_VALUE);
        assert_eq!(values(&kept), vec![0.0, 100.0]);
    }

    #[test]
    fn test_rate_of_change_drops_large_jump() {
        let rows = vec![
            static_reading("S1", ts(1, 1, 0), 70.0),
            static_reading("S1", ts(1, 0, 0), 10.0),
        ];

        let kept = rate_of_change_filter(rows, MAX_RATE_OF_CHANGE);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].value, 10.0);
        assert_eq!(kept[0].timestamp, ts(1, 0, 0));
    }

    #[test]
    fn test_rate_of_change_compares_with_last_kept() {
        // 75 is only 5 away from the dropped 70, but 65 away from 10
        let rows = vec![
            static_reading("S1", ts(1, 0, 0), 10.0),
            static_reading("S1", ts(1, 1, 0), 70.0),
            static_reading("S1", ts(1, 2, 0), 75.0),
            static_reading("S1", ts(1, 3, 0), 40.0),
        ];
        let kept = rate_of_change_filter(rows, MAX_RATE_OF_CHANGE);
        assert_eq!(values(&kept), vec![10.0, 40.0]);
    }

    #[test]
    fn test_rate_of_change_first_row_per_sensor_kept() {
        let rows = vec![
            static_reading("A", ts(1, 0, 0), 5.0),
            static_reading("B", ts(1, 0, 0), 95.0),
            static_reading("A", ts(1, 1, 0), 6.0),
        ];
        let kept = rate_of_change_filter(rows, MAX_RATE_OF_CHANGE);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].sensor_id, "A");
        assert_eq!(kept[2].sensor_id, "B");
    }

    #[test]
    fn test_quantile_linear_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile_sorted(&sorted, 0.25), Some(1.75));
        assert_eq!(quantile_sorted(&sorted, 0.75), Some(3.25));
        assert_eq!(quantile_sorted(&[7.0], 0.25), Some(7.0));
        assert_eq!(quantile_sorted(&[], 0.5), None);
    }

    #[test]
    fn test_iqr_filter_drops_outlier() {
        let mut rows: Vec<StaticReading> = (0..10)
            .map(|i| static_reading(&format!("s{i}"), ts(6, 0, 0), 10.0 + i as f64 * 0.5))
            .collect();
        rows.push(static_reading("hot", ts(6, 0, 0), 60.0));

        let (kept, bounds) = iqr_filter(rows, IQR_MULTIPLIER);
        let bounds = bounds.unwrap();
        assert!(bounds.upper < 60.0);
        assert_eq!(kept.len(), 10);
        assert!(kept.iter().all(|r| r.sensor_id != "hot"));
    }

    #[test]
    fn test_iqr_is_global_not_per_sensor() {
        // A sensor with a consistently higher baseline is trimmed as a whole,
        // even though its own readings are perfectly steady.
        let mut rows = Vec::new();
        for minute in 0..20 {
            rows.push(static_reading("low", ts(6, 0, minute), 10.0));
            rows.push(static_reading("low2", ts(6, 0, minute), 11.0));
        }
        for minute in 0..4 {
            rows.push(static_reading("high", ts(6, 0, minute), 40.0));
        }

        let (kept, _) = iqr_filter(rows, IQR_MULTIPLIER);
        assert!(kept.iter().all(|r| r.sensor_id != "high"));
    }

    #[test]
    fn test_second_run_iqr_stage_can_drop_more() {
        // Dropping 40 shrinks Q3 from 13.25 to 11, pulling the upper fence
        // from 18.125 down to 12.5, so 14 only goes on the second run.
        let rows: Vec<StaticReading> = [10.0, 10.0, 10.0, 11.0, 14.0, 40.0]
            .iter()
            .enumerate()
            .map(|(i, v)| static_reading(&format!("s{i}"), ts(6, 0, 0), *v))
            .collect();
        let thresholds = CleaningThresholds::default();

        let (once, first) = clean_readings("static", rows, &thresholds);
        assert_eq!(first.outlier_dropped, 1);
        assert_eq!(first.iqr_bounds.map(|b| b.upper), Some(18.125));
        assert_eq!(values(&once), vec![10.0, 10.0, 10.0, 11.0, 14.0]);

        let (twice, second) = clean_readings("static", once, &thresholds);
        assert_eq!(second.range_dropped, 0);
        assert_eq!(second.rate_dropped, 0);
        assert_eq!(second.outlier_dropped, 1);
        assert_eq!(values(&twice), vec![10.0, 10.0, 10.0, 11.0]);
    }

    #[test]
    fn test_iqr_filter_empty_passthrough() {
        let (kept, bounds) = iqr_filter(Vec::<StaticReading>::new(), IQR_MULTIPLIER);
        assert!(kept.is_empty());
        assert!(bounds.is_none());
    }

    #[test]
    fn test_second_run_drops_nothing_in_range_or_rate_stage() {
        let rows = vec![
            static_reading("1", ts(6, 0, 0), 12.0),
            static_reading("1", ts(6, 1, 0), 90.0),
            static_reading("1", ts(6, 2, 0), 14.0),
            static_reading("2", ts(6, 0, 0), 130.0),
            static_reading("2", ts(6, 1, 0), 15.0),
            static_reading("2", ts(6, 2, 0), 16.0),
            static_reading("3", ts(6, 0, 0), 13.0),
        ];
        let thresholds = CleaningThresholds::default();

        let (first, _) = clean_readings("static", rows, &thresholds);
        let (_, report) = clean_readings("static", first, &thresholds);
        assert_eq!(report.range_dropped, 0);
        assert_eq!(report.rate_dropped, 0);
    }

    fn arb_readings() -> impl Strategy<Value = Vec<StaticReading>> {
        prop::collection::vec((0u8..4, 0u32..48, -20.0f64..140.0), 0..80).prop_map(|raw| {
            raw.into_iter()
                .map(|(sensor, slot, value)| {
                    static_reading(&format!("s{sensor}"), ts(6 + slot / 24, slot % 24, 0), value)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_cleaned_values_in_range(rows in arb_readings()) {
            let (cleaned, report) = clean_readings("prop", rows, &CleaningThresholds::default());
            prop_assert_eq!(report.output_rows, cleaned.len());
            for r in &cleaned {
                prop_assert!(r.value >= MIN_VALID_VALUE && r.value <= MAX_VALID_VALUE);
            }
        }

        #[test]
        fn prop_consecutive_same_sensor_within_rate(rows in arb_readings()) {
            let (cleaned, _) = clean_readings("prop", rows, &CleaningThresholds::default());
            for pair in cleaned.windows(2) {
                if pair[0].sensor_id == pair[1].sensor_id {
                    prop_assert!(pair[0].timestamp <= pair[1].timestamp);
                    prop_assert!((pair[1].value - pair[0].value).abs() <= MAX_RATE_OF_CHANGE);
                }
            }
        }

        #[test]
        fn prop_range_and_rate_stages_are_fixed_points(rows in arb_readings()) {
            let thresholds = CleaningThresholds::default();
            let (cleaned, _) = clean_readings("prop", rows, &thresholds);
            let (_, rerun) = clean_readings("prop", cleaned, &thresholds);
            prop_assert_eq!(rerun.range_dropped, 0);
            prop_assert_eq!(rerun.rate_dropped, 0);
        }
    }
}
