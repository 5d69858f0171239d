//! Error types for loading and querying radiation data.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path}: required column `{column}` not found (columns: {found})")]
    MissingColumn {
        path: PathBuf,
        column: &'static str,
        found: String,
    },

    #[error("{path}, row {row}: `{value}` is not a number in column `{column}`")]
    InvalidNumber {
        path: PathBuf,
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("{path}, row {row}: unparseable timestamp `{value}`")]
    InvalidTimestamp {
        path: PathBuf,
        row: usize,
        value: String,
    },

    #[error("invalid boundary data in {path}: {reason}")]
    Boundary { path: PathBuf, reason: String },

    #[error("unsupported coordinate reference system `{0}` (expected EPSG:4326 or EPSG:3857)")]
    UnsupportedCrs(String),

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration error in {path}: {reason}")]
    Config { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Error::Csv { path: path.into(), source }
    }

    pub(crate) fn boundary(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Boundary { path: path.into(), reason: reason.into() }
    }
}
