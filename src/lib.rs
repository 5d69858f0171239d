//! RadWatch data core
//!
//! Loads static and mobile radiation sensor data for a city, cleans it, and
//! answers the statistics a monitoring dashboard asks for: time-range subsets,
//! period summaries, neighborhood coverage, per-sensor aggregates, hourly
//! series, threshold bands, animation frames and anomaly flags.
//!
//! ```no_run
//! use radwatch::{Config, DatasetHandle};
//!
//! let handle = DatasetHandle::new();
//! if handle.load(&Config::default()) {
//!     let stats = handle.period_statistics(Some("2020-04-06"), Some("2020-04-07"));
//!     println!("static mean: {:.2} cpm", stats.static_readings.mean);
//! }
//! ```

pub mod analysis;
pub mod boundaries;
pub mod cleaning;
pub mod config;
pub mod coverage;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod records;
pub mod schema;
pub mod stats;
pub mod timerange;

pub use cleaning::{CleaningReport, CleaningThresholds};
pub use config::Config;
pub use coverage::CoverageStats;
pub use dataset::{Dataset, DatasetHandle};
pub use error::{Error, Result};
pub use records::{MobileReading, Reading, StaticReading, StaticSensor};
pub use stats::{MobileMetrics, PeriodStatistics, ValueSummary};
pub use timerange::{filter_time_range, TimeRange};
