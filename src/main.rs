use std::path::PathBuf;
use std::process::ExitCode;

use radwatch::{CleaningReport, Config, Dataset, DatasetHandle};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Optional single argument: path to a TOML config file
    let explicit = std::env::args_os().nth(1).map(PathBuf::from);

    let config = match Config::resolve(explicit.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "could not read configuration");
            return ExitCode::FAILURE;
        }
    };

    let handle = DatasetHandle::new();
    if !handle.load(&config) {
        eprintln!("❌ Data could not be loaded; see the log above.");
        return ExitCode::FAILURE;
    }

    match handle.current() {
        Some(dataset) => {
            print_summary(&dataset);
            ExitCode::SUCCESS
        }
        None => ExitCode::FAILURE,
    }
}

fn print_summary(dataset: &Dataset) {
    let overview = dataset.overview();

    println!("\n📊 RADWATCH DATA SUMMARY");
    println!("========================");
    println!("Static sensors: {}", overview.static_sensor_count);
    println!("Mobile sensors: {} ({} users)", overview.mobile_sensor_count, overview.unique_users);
    println!("Static readings: {}", overview.static_reading_count);
    println!("Mobile readings: {}", overview.mobile_reading_count);
    match overview.date_range {
        Some((start, end)) => println!("Date range: {} → {}", start, end),
        None => println!("Date range: (no readings)"),
    }

    println!("\nCleaning:");
    print_cleaning("static", &dataset.static_cleaning);
    print_cleaning("mobile", &dataset.mobile_cleaning);

    let stats = dataset.period_statistics(None, None);
    println!("\nReadings (cpm):");
    println!(
        "  static: mean {:.2}, median {:.2}, min {:.2}, max {:.2}, std {:.2}",
        stats.static_readings.mean,
        stats.static_readings.median,
        stats.static_readings.min,
        stats.static_readings.max,
        stats.static_readings.std
    );
    println!(
        "  mobile: mean {:.2}, median {:.2}, min {:.2}, max {:.2}, std {:.2} across {} sensors",
        stats.mobile_readings.mean,
        stats.mobile_readings.median,
        stats.mobile_readings.min,
        stats.mobile_readings.max,
        stats.mobile_readings.std,
        stats.unique_mobile_sensors
    );

    let fleet = dataset.mobile_metrics(None, None);
    println!(
        "  fleet: {} users, {} distinct locations, {} contaminated vehicles (> {} cpm)",
        fleet.user_count,
        fleet.unique_locations,
        fleet.contaminated_vehicles,
        dataset.config().analysis.contamination_threshold
    );

    let coverage = dataset.coverage(None, None);
    println!("\nNeighborhood coverage:");
    if dataset.neighborhoods.is_none() {
        println!("  ⚠️  boundaries unavailable");
    } else {
        println!(
            "  {}/{} covered ({:.1}%)",
            coverage.covered, coverage.total, coverage.percentage
        );
        for name in &coverage.uncovered_names {
            println!("  • uncovered: {}", name);
        }
    }

    let anomalies = dataset.anomalies(false);
    println!("\nStatic anomalies (rolling window): {}", anomalies.len());
    for anomaly in anomalies.iter().take(10) {
        println!(
            "  • sensor {} at {}: {:.1} cpm (mean {:.1}, std {:.1})",
            anomaly.sensor_id, anomaly.timestamp, anomaly.value, anomaly.rolling_mean, anomaly.rolling_std
        );
    }
}

fn print_cleaning(label: &str, report: &CleaningReport) {
    println!(
        "  {}: {} rows → {} kept (range -{}, rate -{}, outliers -{})",
        label,
        report.input_rows,
        report.output_rows,
        report.range_dropped,
        report.rate_dropped,
        report.outlier_dropped
    );
    if let Some(bounds) = report.iqr_bounds {
        println!(
            "      IQR fences: [{:.2}, {:.2}] (Q1 {:.2}, Q3 {:.2})",
            bounds.lower, bounds.upper, bounds.q1, bounds.q3
        );
    }
}
