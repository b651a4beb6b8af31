//! Error types shared by every converter
//!
//! Converters never recover from their own failures. Each failure is a
//! [`ConvertError`] variant, grouped into an [`ErrorKind`] so callers can map
//! whole families of failures at once. The orchestrator is the only place a
//! `ConvertError` is caught; it is translated there into a
//! [`ConverterParseError`] that remembers the file and the original failure.

use std::fmt;
use thiserror::Error;

use crate::insertion_device::Pol;
use crate::value::ColumnType;

/// Broad category of a converter failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed literal, number or document syntax
    Syntax,
    /// Row had the wrong number of tokens, or a named column was absent
    Index,
    /// Duplicate keys, set mismatches, row/column length mismatches
    Invariant,
    /// Requested energy outside calibration bounds or inside a gap
    Range,
    /// Lookup value or polarisation not present in a table
    Lookup,
    /// Nothing left to build a model from
    Aggregation,
    /// Model could not be turned into a plain structured value
    Serialization,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Syntax => "syntax error",
            Self::Index => "index error",
            Self::Invariant => "invariant violation",
            Self::Range => "range error",
            Self::Lookup => "lookup error",
            Self::Aggregation => "aggregation error",
            Self::Serialization => "serialization error",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("malformed literal: {0:?}")]
    InvalidLiteral(String),
    #[error("cannot convert {value:?} to {target}")]
    Coercion { value: String, target: ColumnType },
    #[error("expected `key = value`, got {0:?}")]
    InvalidLine(String),

    #[error("Repeated key in parameters: {0}")]
    RepeatedKey(String),

    #[error("File must start with a zoom level")]
    MissingZoomLevel,
    #[error("invalid zoomLevel value {0:?}")]
    InvalidZoomLevel(String),
    #[error("Multiple instances of zoomLevel {0}")]
    DuplicateZoomLevel(String),
    #[error("repeated key {field} for zoomLevel {zoom_level}")]
    RepeatedField { zoom_level: String, field: String },
    #[error("unknown field {field} for zoomLevel {zoom_level}")]
    UnknownField { zoom_level: String, field: String },
    #[error("missing field {field} for zoomLevel {zoom_level}")]
    MissingField { zoom_level: String, field: String },
    #[error("field {field} for zoomLevel {zoom_level} must be an integer, got {value}")]
    NonIntegerField {
        zoom_level: String,
        field: String,
        value: String,
    },
    #[error("Zoom levels {found} do not match required zoom levels: {required}")]
    ZoomLevelMismatch { found: String, required: String },

    #[error("Length of row {row} does not match number of columns: {columns}")]
    RowLength { row: String, columns: String },
    #[error("line {line} has {found} values but {expected} columns were declared")]
    TokenCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("lookup table values must be numeric, got {0}")]
    NonNumeric(String),
    #[error("no column named {0:?}")]
    UnknownColumn(String),
    #[error("'{value}' doesn't exist in column '{column}': {values}")]
    ValueNotFound {
        value: String,
        column: String,
        values: String,
    },

    #[error("failed to read calibration table: {0}")]
    Csv(#[from] csv::Error),
    #[error("calibration row {row} has no value for column {column:?}")]
    MissingColumn { row: usize, column: String },
    #[error("column {column:?} holds {value:?}, which is not a number")]
    InvalidNumber { column: String, value: String },
    #[error("{0:?} is not a valid polarisation mode")]
    UnknownPolarisation(String),
    #[error("no energy coverage for polarisation {0}")]
    PolarisationNotCovered(Pol),
    #[error("Demanding energy must lie between {min} and {max}!")]
    EnergyOutOfRange { energy: f64, min: f64, max: f64 },
    #[error(
        "Cannot find polynomial coefficients for your requested energy {energy}. \
         There might be gap in the calibration lookup table."
    )]
    CalibrationGap { energy: f64 },
    #[error("energy coverage needs at least one entry")]
    EmptyCoverage,
    #[error(
        "LookupTable content is empty, failed to convert the file contents to a LookupTable!"
    )]
    EmptyTable,
    #[error("{what}: expected {expected} items, got {found}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Failed to parse XML: {0}")]
    Xml(String),
    #[error("Failed to serialize model: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ConvertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidLiteral(_)
            | Self::Coercion { .. }
            | Self::InvalidLine(_)
            | Self::MissingZoomLevel
            | Self::InvalidZoomLevel(_)
            | Self::NonIntegerField { .. }
            | Self::NonNumeric(_)
            | Self::Csv(_)
            | Self::InvalidNumber { .. }
            | Self::UnknownPolarisation(_)
            | Self::Xml(_) => ErrorKind::Syntax,
            Self::TokenCount { .. } | Self::MissingColumn { .. } => ErrorKind::Index,
            Self::RepeatedKey(_)
            | Self::DuplicateZoomLevel(_)
            | Self::RepeatedField { .. }
            | Self::UnknownField { .. }
            | Self::MissingField { .. }
            | Self::ZoomLevelMismatch { .. }
            | Self::RowLength { .. }
            | Self::LengthMismatch { .. } => ErrorKind::Invariant,
            Self::EnergyOutOfRange { .. } | Self::CalibrationGap { .. } => ErrorKind::Range,
            Self::UnknownColumn(_)
            | Self::ValueNotFound { .. }
            | Self::PolarisationNotCovered(_) => ErrorKind::Lookup,
            Self::EmptyCoverage | Self::EmptyTable => ErrorKind::Aggregation,
            Self::Serialize(_) => ErrorKind::Serialization,
        }
    }

    /// Name of the failure, carried across the orchestrator boundary
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::InvalidLiteral(_) => "InvalidLiteral",
            Self::Coercion { .. } => "Coercion",
            Self::InvalidLine(_) => "InvalidLine",
            Self::RepeatedKey(_) => "RepeatedKey",
            Self::MissingZoomLevel => "MissingZoomLevel",
            Self::InvalidZoomLevel(_) => "InvalidZoomLevel",
            Self::DuplicateZoomLevel(_) => "DuplicateZoomLevel",
            Self::RepeatedField { .. } => "RepeatedField",
            Self::UnknownField { .. } => "UnknownField",
            Self::MissingField { .. } => "MissingField",
            Self::NonIntegerField { .. } => "NonIntegerField",
            Self::ZoomLevelMismatch { .. } => "ZoomLevelMismatch",
            Self::RowLength { .. } => "RowLength",
            Self::TokenCount { .. } => "TokenCount",
            Self::NonNumeric(_) => "NonNumeric",
            Self::UnknownColumn(_) => "UnknownColumn",
            Self::ValueNotFound { .. } => "ValueNotFound",
            Self::Csv(_) => "Csv",
            Self::MissingColumn { .. } => "MissingColumn",
            Self::InvalidNumber { .. } => "InvalidNumber",
            Self::UnknownPolarisation(_) => "UnknownPolarisation",
            Self::PolarisationNotCovered(_) => "PolarisationNotCovered",
            Self::EnergyOutOfRange { .. } => "EnergyOutOfRange",
            Self::CalibrationGap { .. } => "CalibrationGap",
            Self::EmptyCoverage => "EmptyCoverage",
            Self::EmptyTable => "EmptyTable",
            Self::LengthMismatch { .. } => "LengthMismatch",
            Self::Xml(_) => "Xml",
            Self::Serialize(_) => "Serialize",
        }
    }
}

/// A converter failure translated at the orchestrator boundary
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Unable to parse {path} due to the following exception: {error_type}: {message}")]
pub struct ConverterParseError {
    /// File whose contents failed to convert
    pub path: String,
    /// Name of the original failure
    pub error_type: &'static str,
    /// Category of the original failure
    pub kind: ErrorKind,
    /// Message of the original failure
    pub message: String,
}

impl ConverterParseError {
    pub fn new(path: impl Into<String>, source: &ConvertError) -> Self {
        Self {
            path: path.into(),
            error_type: source.type_name(),
            kind: source.kind(),
            message: source.to_string(),
        }
    }
}
