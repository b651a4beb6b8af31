//! Conversion of a file into plain structured values
//!
//! The [`Orchestrator`] reads a file, looks its path up in the
//! [`DispatchMap`] and runs the matching converter. Files with no converter
//! are expected to already hold JSON.
//!
//! This is the only place converter failures are caught. Each one is turned
//! into a [`ConverterParseError`] naming the file and the original failure;
//! no partial result is ever returned.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dispatch::{ConfigModel, DispatchMap};
use crate::error::{ConvertError, ConverterParseError};

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ConverterParseError),
    /// Unmapped file that is not valid JSON
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reads files and converts them through an injected dispatch map
#[derive(Debug, Clone)]
pub struct Orchestrator {
    dispatch: Arc<DispatchMap>,
}

impl Orchestrator {
    pub fn new(dispatch: Arc<DispatchMap>) -> Self {
        Self { dispatch }
    }

    pub fn dispatch(&self) -> &DispatchMap {
        &self.dispatch
    }

    /// Read `path` and convert it to nested maps, arrays and scalars
    pub fn get_converted_file_contents(&self, path: &Path) -> Result<Value, ConversionError> {
        let raw = read_file(path)?;
        self.convert_contents(&path.to_string_lossy(), &raw)
    }

    /// Read `path` and convert it, keeping the typed model
    pub fn convert_model(&self, path: &Path) -> Result<ConfigModel, ConversionError> {
        let raw = read_file(path)?;
        self.convert_contents_model(&path.to_string_lossy(), &raw)
    }

    /// Convert text already read from `path`
    pub fn convert_contents(&self, path: &str, raw: &str) -> Result<Value, ConversionError> {
        match self.convert_contents_model(path, raw)? {
            ConfigModel::Document(value) => Ok(value),
            model => model
                .to_value()
                .map_err(|e| ConversionError::Parse(wrap_failure(path, &e))),
        }
    }

    /// Convert text already read from `path`, keeping the typed model
    pub fn convert_contents_model(
        &self,
        path: &str,
        raw: &str,
    ) -> Result<ConfigModel, ConversionError> {
        let Some(converter) = self.dispatch.get(path) else {
            debug!(path, "No converter registered, parsing as JSON");
            return Ok(ConfigModel::Document(serde_json::from_str(raw)?));
        };

        match converter.parse(raw) {
            Ok(model) => {
                info!(path, converter = converter.name(), "Converted file");
                Ok(model)
            }
            Err(e) => Err(ConversionError::Parse(wrap_failure(path, &e))),
        }
    }
}

fn read_file(path: &Path) -> Result<String, ConversionError> {
    std::fs::read_to_string(path).map_err(|source| ConversionError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn wrap_failure(path: &str, error: &ConvertError) -> ConverterParseError {
    let wrapped = ConverterParseError::new(path, error);
    warn!(
        path,
        error_type = wrapped.error_type,
        kind = %wrapped.kind,
        "{}",
        wrapped.message
    );
    wrapped
}
