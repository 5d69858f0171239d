//! Timestamp parsing and inclusive time-range filtering.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Parse a timestamp string. Offsets are converted to UTC and dropped; a bare
/// date means midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for format in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Inclusive `[start, end]` window. A missing bound disables filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl TimeRange {
    pub fn new(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        Self { start, end }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Build from UI date strings. Unparseable bounds are treated as absent.
    pub fn from_strs(start: Option<&str>, end: Option<&str>) -> Self {
        let parse = |raw: Option<&str>| {
            raw.and_then(|s| {
                let parsed = parse_timestamp(s);
                if parsed.is_none() {
                    tracing::warn!(bound = s, "ignoring unparseable time bound");
                }
                parsed
            })
        };
        Self::new(parse(start), parse(end))
    }

    /// Both bounds present; anything else leaves data untouched.
    pub fn bounds(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        match self.bounds() {
            Some((start, end)) => start <= ts && ts <= end,
            None => true,
        }
    }

    /// Rows whose timestamp falls in range. Returns the input unchanged when
    /// either bound is missing, and nothing when `start > end`.
    pub fn filter<R, F>(&self, rows: &[R], timestamp: F) -> Vec<R>
    where
        R: Clone,
        F: Fn(&R) -> NaiveDateTime,
    {
        match self.bounds() {
            None => rows.to_vec(),
            Some(_) => rows
                .iter()
                .filter(|r| self.contains(timestamp(r)))
                .cloned()
                .collect(),
        }
    }
}

/// Filter any [`Reading`](crate::records::Reading) table by time range.
pub fn filter_time_range<R>(rows: &[R], range: TimeRange) -> Vec<R>
where
    R: crate::records::Reading + Clone,
{
    range.filter(rows, |r| r.timestamp())
}

/// Overall `[min, max]` timestamp over several tables.
pub fn span<I>(timestamps: I) -> Option<(NaiveDateTime, NaiveDateTime)>
where
    I: IntoIterator<Item = NaiveDateTime>,
{
    timestamps.into_iter().fold(None, |acc, ts| match acc {
        None => Some((ts, ts)),
        Some((lo, hi)) => Some((lo.min(ts), hi.max(ts))),
    })
}
