use std::collections::HashMap;
use std::fs;
use std::path::Path;

use radwatch::config::DataPaths;
use radwatch::{Config, Dataset, DatasetHandle, Error, Reading};
use tempfile::TempDir;

const SENSORS: &str = "Sensor-id,Lat,Long\nS1,0.5,0.5\nS2,0.5,5.0\n";

const STATIC_READINGS: &str = "Timestamp,Sensor-id,Value,Units\n\
2024-01-01T00:00,S1,10,cpm\n\
2024-01-01T01:00,S1,70,cpm\n\
2024-01-01T02:00,S1,12,cpm\n\
2024-01-01T00:00,S2,-5,cpm\n\
2024-01-01T01:00,S2,11,cpm\n";

const MOBILE_READINGS: &str = "Timestamp, Sensor-id,Long,Lat,Value,Units,User-id\n\
2024-01-01 00:30:00,10,1.5,0.5,20,cpm,Alice\n\
2024-01-01 01:30:00,10,1.5,0.5,21,cpm,Alice\n\
2024-01-01 02:30:00,10,1.5,0.5,22,cpm,Alice\n";

const BOUNDARIES: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "properties": {"Nbrhood": "West"},
     "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
    {"type": "Feature", "properties": {"Nbrhood": "East"},
     "geometry": {"type": "Polygon", "coordinates": [[[1,0],[2,0],[2,1],[1,1],[1,0]]]}},
    {"type": "Feature", "properties": {"Nbrhood": "North"},
     "geometry": {"type": "Polygon", "coordinates": [[[0,5],[1,5],[1,6],[0,6],[0,5]]]}}
  ]
}"#;

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).unwrap();
}

/// A data directory laid out the way the default config expects.
fn data_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "StaticSensorLocations.csv", SENSORS);
    write(dir.path(), "StaticSensorReadings.csv", STATIC_READINGS);
    write(dir.path(), "MobileSensorReadings.csv", MOBILE_READINGS);
    write(dir.path(), "StHimarkNeighborhoods.geojson", BOUNDARIES);
    dir
}

fn config_for(dir: &Path) -> Config {
    Config {
        data: DataPaths::in_dir(dir),
        ..Config::default()
    }
}

#[test]
fn test_load_cleans_and_summarizes() {
    let dir = data_dir();
    let dataset = Dataset::load(&config_for(dir.path())).unwrap();

    // -5 goes in the range filter, 70 in the rate-of-change filter
    assert_eq!(dataset.static_cleaning.input_rows, 5);
    assert_eq!(dataset.static_cleaning.range_dropped, 1);
    assert_eq!(dataset.static_cleaning.rate_dropped, 1);
    assert_eq!(dataset.static_cleaning.outlier_dropped, 0);
    assert_eq!(dataset.static_readings.len(), 3);
    assert!(dataset.static_readings.iter().all(|r| r.value != 70.0 && r.value != -5.0));

    assert_eq!(dataset.mobile_readings.len(), 3);
    assert_eq!(dataset.mobile_readings[0].user_id, "Alice");
    assert_eq!(dataset.mobile_readings[0].longitude, 1.5);

    let start = dataset.start_date.unwrap().to_string();
    let end = dataset.end_date.unwrap().to_string();
    assert_eq!(start, "2024-01-01 00:00:00");
    assert_eq!(end, "2024-01-01 02:30:00");

    let overview = dataset.overview();
    assert_eq!(overview.static_sensor_count, 2);
    assert_eq!(overview.mobile_sensor_count, 1);
    assert_eq!(overview.unique_users, 1);
}

#[test]
fn test_cleaned_series_respect_bounds_and_rate_limit() {
    let dir = data_dir();
    let dataset = Dataset::load(&config_for(dir.path())).unwrap();
    let thresholds = &dataset.config().cleaning;

    let mut series: HashMap<&str, Vec<_>> = HashMap::new();
    for r in &dataset.static_readings {
        assert!(r.value >= thresholds.min_valid_value && r.value <= thresholds.max_valid_value);
        series.entry(r.sensor_id()).or_default().push((r.timestamp, r.value));
    }
    for rows in series.values_mut() {
        rows.sort_by_key(|(ts, _)| *ts);
        for pair in rows.windows(2) {
            assert!((pair[1].1 - pair[0].1).abs() <= thresholds.max_rate_of_change);
        }
    }
}

#[test]
fn test_period_statistics_by_date_strings() {
    let dir = data_dir();
    let handle = DatasetHandle::new();
    assert!(handle.load(&config_for(dir.path())));

    let stats = handle.period_statistics(Some("2024-01-01 00:00"), Some("2024-01-01 01:00"));
    assert_eq!(stats.static_readings.count, 2);
    assert_eq!(stats.static_readings.mean, 10.5);
    assert_eq!(stats.mobile_readings.count, 1);
    assert_eq!(stats.unique_mobile_sensors, 1);

    let empty = handle.period_statistics(Some("2030-01-01"), Some("2030-01-02"));
    assert_eq!(empty.static_readings.count, 0);
    assert_eq!(empty.static_readings.mean, 0.0);
    assert_eq!(empty.static_readings.std, 0.0);
    assert_eq!(empty.mobile_readings.max, 0.0);

    // Unparseable bound behaves as absent
    let all = handle.period_statistics(Some("yesterday"), None);
    assert_eq!(all.static_readings.count, 3);
}

#[test]
fn test_coverage_counts_static_and_mobile_locations() {
    let dir = data_dir();
    let dataset = Dataset::load(&config_for(dir.path())).unwrap();

    let coverage = dataset.coverage(None, None);
    assert_eq!(coverage.total, 3);
    assert_eq!(coverage.covered, 2);
    assert_eq!(coverage.uncovered, 1);
    assert!((coverage.percentage - 200.0 / 3.0).abs() < 1e-9);
    assert_eq!(coverage.uncovered_names, vec!["North".to_string()]);

    // Before the mobile readings start only the static sensor counts
    let early = dataset.coverage(Some("2024-01-01 00:00"), Some("2024-01-01 00:10"));
    assert_eq!(early.covered, 1);
    assert_eq!(early.uncovered_names, vec!["East".to_string(), "North".to_string()]);
}

#[test]
fn test_missing_boundaries_degrade_to_zero_coverage() {
    let dir = data_dir();
    fs::remove_file(dir.path().join("StHimarkNeighborhoods.geojson")).unwrap();

    let dataset = Dataset::load(&config_for(dir.path())).unwrap();
    assert!(dataset.neighborhoods.is_none());

    let coverage = dataset.coverage(None, None);
    assert_eq!((coverage.total, coverage.covered, coverage.uncovered), (0, 0, 0));
    assert_eq!(coverage.percentage, 0.0);

    // Readings are unaffected
    assert_eq!(dataset.period_statistics(None, None).static_readings.count, 3);
}

#[test]
fn test_boundary_directory_is_scanned() {
    let dir = data_dir();
    let shapes = dir.path().join("shapes");
    fs::create_dir(&shapes).unwrap();
    write(&shapes, "town.geojson", BOUNDARIES);
    write(&shapes, "README.txt", "not a boundary file");

    let mut config = config_for(dir.path());
    config.data.boundaries = Some(shapes);
    let dataset = Dataset::load(&config).unwrap();
    assert_eq!(dataset.neighborhoods.as_ref().map(|n| n.len()), Some(3));
}

#[test]
fn test_missing_required_column_fails_load() {
    let dir = data_dir();
    write(dir.path(), "StaticSensorReadings.csv", "Timestamp,Sensor-id,Units\n2024-01-01T00:00,S1,cpm\n");

    let err = Dataset::load(&config_for(dir.path())).unwrap_err();
    assert!(matches!(err, Error::MissingColumn { column: "value", .. }));

    let handle = DatasetHandle::new();
    assert!(!handle.load(&config_for(dir.path())));
    assert!(!handle.is_loaded());
    assert_eq!(handle.coverage(None, None).total, 0);
}

#[test]
fn test_reload_replaces_dataset_and_failed_reload_keeps_it() {
    let dir = data_dir();
    let config = config_for(dir.path());
    let handle = DatasetHandle::new();
    assert!(handle.load(&config));
    assert_eq!(handle.overview().mobile_reading_count, 3);

    write(
        dir.path(),
        "MobileSensorReadings.csv",
        "Timestamp,Sensor-id,Long,Lat,Value,Units,User-id\n2024-01-02 00:00:00,11,0.5,0.5,30,cpm,Bob\n",
    );
    assert!(handle.load(&config));
    assert_eq!(handle.overview().mobile_reading_count, 1);

    write(dir.path(), "MobileSensorReadings.csv", "Timestamp,Sensor-id\n");
    assert!(!handle.load(&config));
    assert_eq!(handle.overview().mobile_reading_count, 1);
}

#[test]
fn test_config_file_overrides_paths_and_thresholds() {
    let dir = data_dir();
    let config_path = dir.path().join("radwatch.toml");
    let text = format!(
        "[data]\n\
         static_sensors = {:?}\n\
         static_readings = {:?}\n\
         mobile_readings = {:?}\n\
         \n\
         [cleaning]\n\
         max_rate_of_change = 100.0\n",
        dir.path().join("StaticSensorLocations.csv"),
        dir.path().join("StaticSensorReadings.csv"),
        dir.path().join("MobileSensorReadings.csv"),
    );
    fs::write(&config_path, text).unwrap();

    let mut config = Config::resolve(Some(&config_path)).unwrap();
    assert_eq!(config.cleaning.max_rate_of_change, 100.0);
    assert_eq!(config.cleaning.max_valid_value, 100.0);
    config.data.boundaries = None;

    let dataset = Dataset::load(&config).unwrap();
    // With a looser rate limit the 70 survives until the IQR stage
    assert_eq!(dataset.static_cleaning.rate_dropped, 0);
    assert!(dataset.neighborhoods.is_none());
}

#[test]
fn test_bad_config_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[cleaning]\nmax_valid_value = \"lots\"\n").unwrap();

    let err = Config::resolve(Some(&path)).unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}

#[test]
fn test_comparison_median_and_fleet_metrics() {
    let dir = data_dir();
    write(
        dir.path(),
        "MobileSensorReadings.csv",
        "Timestamp,Sensor-id,Long,Lat,Value,Units,User-id\n\
         2024-01-01 00:30:00,10,1.5,0.5,20,cpm,Alice\n\
         2024-01-01 00:40:00,10,1.6,0.5,36,cpm,Alice\n\
         2024-01-01 00:50:00,11,1.5,0.5,30,cpm,Bob\n",
    );
    let dataset = Dataset::load(&config_for(dir.path())).unwrap();

    let stats = dataset.period_statistics(None, None);
    assert_eq!(stats.static_readings.median, 11.0);
    assert_eq!(stats.mobile_readings.median, 30.0);

    let fleet = dataset.mobile_metrics(None, None);
    assert_eq!(fleet.sensor_count, 2);
    assert_eq!(fleet.user_count, 2);
    assert_eq!(fleet.unique_locations, 2);
    assert_eq!(fleet.contaminated_vehicles, 1);

    let latest = dataset.mobile_aggregates(radwatch::TimeRange::unbounded());
    assert_eq!(latest[0].sensor_id, "10");
    assert_eq!(latest[0].latest_value, 36.0);
    assert_eq!(latest[0].longitude, 1.6);

    let quiet = dataset.mobile_metrics(Some("2030-01-01"), Some("2030-01-02"));
    assert_eq!(quiet, radwatch::MobileMetrics::default());
}

#[test]
fn test_extreme_analysis_config_still_reports() {
    let dir = data_dir();
    let config_path = dir.path().join("radwatch.toml");
    fs::write(
        &config_path,
        "[analysis]\nanomaly_window_minutes = 100000000000000\nbucket_minutes = 9223372036854775807\n",
    )
    .unwrap();

    let mut config = Config::resolve(Some(&config_path)).unwrap();
    config.data = DataPaths::in_dir(dir.path());
    let dataset = Dataset::load(&config).unwrap();

    assert!(dataset.anomalies(false).is_empty());
    assert!(dataset.anomalies(true).is_empty());
    let frames = dataset.frames(radwatch::TimeRange::unbounded(), true);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].cells[0].count, 3);
}
