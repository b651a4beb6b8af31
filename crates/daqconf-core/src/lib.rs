//! Daqconf Core - Beamline configuration file converters
//!
//! This crate turns the text configuration files used on the beamlines into
//! typed, validated models:
//! - `key = value` beamline parameter files
//! - zoom-level display configurations
//! - whitespace separated lookup tables, with nearest/exact value lookup
//! - insertion-device calibration CSVs, with per-energy polynomial lookup
//! - arbitrary XML documents
//!
//! A [`DispatchMap`] routes each absolute file path to its converter and the
//! [`Orchestrator`] reads, converts and flattens files into plain JSON values.

pub mod config;
pub mod convert;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod insertion_device;
pub mod lut;
pub mod parameters;
pub mod value;
pub mod xml;

pub use config::{ConfigError, ConverterEntry, DispatchConfig};
pub use convert::{ConversionError, Orchestrator};
pub use dispatch::{ConfigModel, Converter, ConverterKind, DispatchMap};
pub use display::{display_config_to_model, DisplayConfig, DisplayConfigData, ZoomLevel};
pub use error::{ConvertError, ConverterParseError, ErrorKind};
pub use insertion_device::{
    convert_csv_to_lookup, EnergyCoverage, EnergyCoverageEntry, InsertionDeviceColumnConfig,
    InsertionDeviceLookupTable, InsertionDevicePreset, Pol, Polynomial,
};
pub use lut::{parse_lut, GenericLookupTable, LutColumn, LutValue};
pub use parameters::{beamline_parameters_to_dict, KeyValueParameterSet};
pub use value::{parse_value, remove_comments, ColumnType, ParsedValue};
pub use xml::xml_to_value;
