//! Column-name normalisation for the sensor CSV sources.
//!
//! The source files disagree on header spelling (`Sensor-id`, ` User-id`,
//! `Lat` vs `Latitude`, ...). Every header is trimmed and resolved through a
//! fixed alias table to one canonical vocabulary before anything reads a
//! column. Unknown headers are kept as-is so they can be passed through.

use std::fmt;

/// The canonical column vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Canonical {
    SensorId,
    Timestamp,
    UserId,
    Value,
    Units,
    Latitude,
    Longitude,
}

impl Canonical {
    pub const ALL: [Canonical; 7] = [
        Canonical::SensorId,
        Canonical::Timestamp,
        Canonical::UserId,
        Canonical::Value,
        Canonical::Units,
        Canonical::Latitude,
        Canonical::Longitude,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Canonical::SensorId => "sensor_id",
            Canonical::Timestamp => "timestamp",
            Canonical::UserId => "user_id",
            Canonical::Value => "value",
            Canonical::Units => "units",
            Canonical::Latitude => "latitude",
            Canonical::Longitude => "longitude",
        }
    }
}

impl fmt::Display for Canonical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Known header variants, matched after trimming.
const ALIASES: &[(&str, Canonical)] = &[
    ("Sensor-id", Canonical::SensorId),
    ("Timestamp", Canonical::Timestamp),
    ("User-id", Canonical::UserId),
    ("Value", Canonical::Value),
    ("Units", Canonical::Units),
    ("Lat", Canonical::Latitude),
    ("Long", Canonical::Longitude),
    ("Latitude", Canonical::Latitude),
    ("Longitude", Canonical::Longitude),
];

/// A header after normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    Canonical(Canonical),
    /// Unrecognised header, trimmed but otherwise unchanged
    Other(String),
}

impl Column {
    pub fn name(&self) -> &str {
        match self {
            Column::Canonical(c) => c.name(),
            Column::Other(name) => name,
        }
    }
}

/// Resolve one raw header.
pub fn normalize_column(raw: &str) -> Column {
    let trimmed = raw.trim();

    if let Some(&(_, canonical)) = ALIASES.iter().find(|(alias, _)| *alias == trimmed) {
        return Column::Canonical(canonical);
    }
    if let Some(&canonical) = Canonical::ALL.iter().find(|c| c.name() == trimmed) {
        return Column::Canonical(canonical);
    }

    Column::Other(trimmed.to_string())
}

/// Normalised header row with index lookups.
#[derive(Debug, Clone)]
pub struct Header {
    columns: Vec<Column>,
}

impl Header {
    pub fn from_raw<'a, I>(raw: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self {
            columns: raw.into_iter().map(normalize_column).collect(),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Index of a canonical column. The first occurrence wins when two raw
    /// headers resolve to the same name.
    pub fn position(&self, canonical: Canonical) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| *c == Column::Canonical(canonical))
    }

    /// Indices and names of the pass-through columns.
    pub fn passthrough(&self) -> Vec<(usize, String)> {
        self.columns
            .iter()
            .enumerate()
            .filter_map(|(idx, c)| match c {
                Column::Other(name) => Some((idx, name.clone())),
                Column::Canonical(_) => None,
            })
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }
}
