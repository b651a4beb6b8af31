//! Beamline parameter files
//!
//! A beamline parameters file is a flat list of `key = value` lines. Values
//! are literals, except for a handful of keywords that are kept as strings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::ConvertError;
use crate::value::{parse_value, remove_comments, ParsedValue};

/// Values left untouched instead of being parsed as literals
pub const BEAMLINE_PARAMETER_KEYWORDS: [&str; 3] = ["FB", "FULL", "deadtime"];

/// Parameter name to value, with unique names
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyValueParameterSet {
    params: BTreeMap<String, ParsedValue>,
}

impl KeyValueParameterSet {
    pub fn get(&self, key: &str) -> Option<&ParsedValue> {
        self.params.get(key)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParsedValue)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Extract the key/value pairs from a beamline parameters file
///
/// Keywords in [`BEAMLINE_PARAMETER_KEYWORDS`] stay strings; every other value
/// must be a literal. Repeated keys are rejected before any value is parsed.
pub fn beamline_parameters_to_dict(contents: &str) -> Result<KeyValueParameterSet, ConvertError> {
    let mut raw_pairs: BTreeMap<String, &str> = BTreeMap::new();

    for line in remove_comments(contents.lines()) {
        let Some((key, value)) = line.split_once('=') else {
            debug!(line, "Skipping parameter line without '='");
            continue;
        };
        let key = key.trim();
        if raw_pairs.contains_key(key) {
            return Err(ConvertError::RepeatedKey(key.to_string()));
        }
        raw_pairs.insert(key.to_string(), value.trim());
    }

    let mut params = BTreeMap::new();
    for (key, raw) in raw_pairs {
        let value = if BEAMLINE_PARAMETER_KEYWORDS.contains(&raw) {
            ParsedValue::Str(raw.to_string())
        } else {
            parse_value(raw, None)?
        };
        params.insert(key, value);
    }

    debug!(params = params.len(), "Parsed beamline parameters");
    Ok(KeyValueParameterSet { params })
}
