//! CSV ingestion for the three sensor tables
//!
//! Each file goes through the same steps:
//! 1. Read the header row and normalise it (see [`crate::schema`])
//! 2. Check the required canonical columns are present
//! 3. Parse every row into its typed record, keeping unknown columns as text
//!
//! Any failure aborts the whole file: a table is either fully parsed or not at all.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::records::{MobileReading, StaticReading, StaticSensor};
use crate::schema::{Canonical, Header};
use crate::timerange::parse_timestamp;

/// Parsed rows plus the normalised header they came from.
#[derive(Debug, Clone)]
pub struct Table<R> {
    pub header: Header,
    /// Names of pass-through columns, aligned with each row's `extra`
    pub extra_columns: Vec<String>,
    pub rows: Vec<R>,
}

/// Resolved column positions for one file.
struct Layout<'a> {
    path: &'a Path,
    header: Header,
    passthrough: Vec<(usize, String)>,
}

impl<'a> Layout<'a> {
    fn new(path: &'a Path, raw: &StringRecord) -> Self {
        let header = Header::from_raw(raw.iter());
        let passthrough = header.passthrough();
        Self { path, header, passthrough }
    }

    fn require(&self, column: Canonical) -> Result<usize> {
        self.header.position(column).ok_or_else(|| Error::MissingColumn {
            path: self.path.to_path_buf(),
            column: column.name(),
            found: self.header.names().join(", "),
        })
    }

    fn extra(&self, record: &StringRecord) -> Vec<String> {
        self.passthrough
            .iter()
            .map(|(idx, _)| record.get(*idx).unwrap_or("").to_string())
            .collect()
    }

    fn into_table<R>(self, rows: Vec<R>) -> Table<R> {
        Table {
            extra_columns: self.passthrough.into_iter().map(|(_, name)| name).collect(),
            header: self.header,
            rows,
        }
    }
}

fn text(record: &StringRecord, idx: usize) -> String {
    record.get(idx).unwrap_or("").trim().to_string()
}

fn number(layout: &Layout<'_>, record: &StringRecord, row: usize, idx: usize, column: Canonical) -> Result<f64> {
    let raw = record.get(idx).unwrap_or("").trim();
    raw.parse::<f64>().map_err(|_| Error::InvalidNumber {
        path: layout.path.to_path_buf(),
        row,
        column: column.name(),
        value: raw.to_string(),
    })
}

fn timestamp(layout: &Layout<'_>, record: &StringRecord, row: usize, idx: usize) -> Result<chrono::NaiveDateTime> {
    let raw = record.get(idx).unwrap_or("");
    parse_timestamp(raw).ok_or_else(|| Error::InvalidTimestamp {
        path: layout.path.to_path_buf(),
        row,
        value: raw.to_string(),
    })
}

fn open(path: &Path) -> Result<csv::Reader<File>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    Ok(ReaderBuilder::new().has_headers(true).from_reader(file))
}

fn read_header<R: Read>(path: &Path, reader: &mut csv::Reader<R>) -> Result<StringRecord> {
    let raw = reader.headers().map_err(|e| Error::csv(path, e))?.clone();
    debug!(file = %path.display(), columns = ?raw.iter().collect::<Vec<_>>(), "source columns");
    Ok(raw)
}

/// Load static sensor locations.
pub fn load_static_sensors(path: &Path) -> Result<Table<StaticSensor>> {
    parse_static_sensors(path, open(path)?)
}

/// Load static sensor readings.
pub fn load_static_readings(path: &Path) -> Result<Table<StaticReading>> {
    parse_static_readings(path, open(path)?)
}

/// Load mobile sensor readings.
pub fn load_mobile_readings(path: &Path) -> Result<Table<MobileReading>> {
    parse_mobile_readings(path, open(path)?)
}

pub fn parse_static_sensors<R: Read>(path: &Path, mut reader: csv::Reader<R>) -> Result<Table<StaticSensor>> {
    let raw = read_header(path, &mut reader)?;
    let layout = Layout::new(path, &raw);

    let sensor_col = layout.require(Canonical::SensorId)?;
    let lat_col = layout.require(Canonical::Latitude)?;
    let lon_col = layout.require(Canonical::Longitude)?;

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| Error::csv(path, e))?;
        // 1-based data rows; the header is not counted
        let row = idx + 1;
        rows.push(StaticSensor {
            sensor_id: text(&record, sensor_col),
            latitude: number(&layout, &record, row, lat_col, Canonical::Latitude)?,
            longitude: number(&layout, &record, row, lon_col, Canonical::Longitude)?,
            extra: layout.extra(&record),
        });
    }

    info!(file = %path.display(), rows = rows.len(), columns = ?layout.header.names(), "loaded static sensors");
    Ok(layout.into_table(rows))
}

pub fn parse_static_readings<R: Read>(path: &Path, mut reader: csv::Reader<R>) -> Result<Table<StaticReading>> {
    let raw = read_header(path, &mut reader)?;
    let layout = Layout::new(path, &raw);

    let sensor_col = layout.require(Canonical::SensorId)?;
    let ts_col = layout.require(Canonical::Timestamp)?;
    let value_col = layout.require(Canonical::Value)?;
    // Units are informational; absent means empty
    let units_col = layout.header.position(Canonical::Units);

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| Error::csv(path, e))?;
        let row = idx + 1;
        rows.push(StaticReading {
            sensor_id: text(&record, sensor_col),
            timestamp: timestamp(&layout, &record, row, ts_col)?,
            value: number(&layout, &record, row, value_col, Canonical::Value)?,
            units: units_col.map(|c| text(&record, c)).unwrap_or_default(),
            extra: layout.extra(&record),
        });
    }

    info!(file = %path.display(), rows = rows.len(), columns = ?layout.header.names(), "loaded static readings");
    Ok(layout.into_table(rows))
}

pub fn parse_mobile_readings<R: Read>(path: &Path, mut reader: csv::Reader<R>) -> Result<Table<MobileReading>> {
    let raw = read_header(path, &mut reader)?;
    let layout = Layout::new(path, &raw);

    let sensor_col = layout.require(Canonical::SensorId)?;
    let ts_col = layout.require(Canonical::Timestamp)?;
    let value_col = layout.require(Canonical::Value)?;
    let user_col = layout.require(Canonical::UserId)?;
    let lat_col = layout.require(Canonical::Latitude)?;
    let lon_col = layout.require(Canonical::Longitude)?;
    let units_col = layout.header.position(Canonical::Units);

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| Error::csv(path, e))?;
        let row = idx + 1;
        rows.push(MobileReading {
            sensor_id: text(&record, sensor_col),
            timestamp: timestamp(&layout, &record, row, ts_col)?,
            value: number(&layout, &record, row, value_col, Canonical::Value)?,
            units: units_col.map(|c| text(&record, c)).unwrap_or_default(),
            user_id: text(&record, user_col),
            latitude: number(&layout, &record, row, lat_col, Canonical::Latitude)?,
            longitude: number(&layout, &record, row, lon_col, Canonical::Longitude)?,
            extra: layout.extra(&record),
        });
    }

    info!(file = %path.display(), rows = rows.len(), columns = ?layout.header.names(), "loaded mobile readings");
    Ok(layout.into_table(rows))
}
