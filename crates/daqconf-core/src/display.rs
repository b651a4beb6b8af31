//! Camera display configuration (`display.configuration`)
//!
//! The file is split into sections, each opened by a `zoomLevel = <float>`
//! line and followed by the six crosshair/region fields for that zoom level:
//!
//! ```text
//! zoomLevel = 1.0
//! crosshairX = 541
//! crosshairY = 409
//! topLeftX = 383
//! topLeftY = 253
//! bottomRightX = 410
//! bottomRightY = 278
//! ```

use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::ConvertError;
use crate::value::{camel_to_snake_case, format_float, parse_value, remove_comments, ParsedValue};

const ZOOM_LEVEL_KEY: &str = "zoomLevel";

/// Field names of a zoom level section, in snake case
const DISPLAY_FIELDS: [&str; 6] = [
    "crosshair_x",
    "crosshair_y",
    "top_left_x",
    "top_left_y",
    "bottom_right_x",
    "bottom_right_y",
];

/// A zoom level, usable as an ordered map key
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoomLevel(pub f64);

impl PartialEq for ZoomLevel {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ZoomLevel {}

impl PartialOrd for ZoomLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ZoomLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for ZoomLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_float(self.0))
    }
}

impl From<f64> for ZoomLevel {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

/// Crosshair position and region of interest for one zoom level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfigData {
    pub crosshair_x: i64,
    pub crosshair_y: i64,
    pub top_left_x: i64,
    pub top_left_y: i64,
    pub bottom_right_x: i64,
    pub bottom_right_y: i64,
}

impl DisplayConfigData {
    /// Build a section from its raw fields
    ///
    /// Field names may be camel case (`crosshairX`) or snake case
    /// (`crosshair_x`). Every field must be present exactly once, hold an
    /// integral value, and no other field is allowed.
    pub fn from_fields(
        zoom_level: ZoomLevel,
        fields: &BTreeMap<String, ParsedValue>,
    ) -> Result<Self, ConvertError> {
        let mut values = [0i64; 6];
        let mut seen = [false; 6];

        for (name, value) in fields {
            let snake = camel_to_snake_case(name);
            let Some(index) = DISPLAY_FIELDS.iter().position(|f| *f == snake) else {
                return Err(ConvertError::UnknownField {
                    zoom_level: zoom_level.to_string(),
                    field: name.clone(),
                });
            };
            if seen[index] {
                return Err(ConvertError::RepeatedField {
                    zoom_level: zoom_level.to_string(),
                    field: name.clone(),
                });
            }
            values[index] = integral(value).ok_or_else(|| ConvertError::NonIntegerField {
                zoom_level: zoom_level.to_string(),
                field: name.clone(),
                value: value.to_string(),
            })?;
            seen[index] = true;
        }

        if let Some(missing) = seen.iter().position(|s| !s) {
            return Err(ConvertError::MissingField {
                zoom_level: zoom_level.to_string(),
                field: DISPLAY_FIELDS[missing].to_string(),
            });
        }

        let [crosshair_x, crosshair_y, top_left_x, top_left_y, bottom_right_x, bottom_right_y] =
            values;
        Ok(Self {
            crosshair_x,
            crosshair_y,
            top_left_x,
            top_left_y,
            bottom_right_x,
            bottom_right_y,
        })
    }
}

fn integral(value: &ParsedValue) -> Option<i64> {
    match value {
        ParsedValue::Int(i) => Some(*i),
        ParsedValue::Float(x) if x.is_finite() && x.fract() == 0.0 => Some(*x as i64),
        _ => None,
    }
}

/// All zoom levels of a display configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayConfig {
    #[serde(serialize_with = "serialize_zoom_levels")]
    zoom_levels: BTreeMap<ZoomLevel, DisplayConfigData>,
    required_zoom_levels: Option<BTreeSet<ZoomLevel>>,
}

impl DisplayConfig {
    /// Create a display config, checking the zoom levels against an optional
    /// required set
    pub fn new(
        zoom_levels: BTreeMap<ZoomLevel, DisplayConfigData>,
        required_zoom_levels: Option<BTreeSet<ZoomLevel>>,
    ) -> Result<Self, ConvertError> {
        if let Some(required) = &required_zoom_levels {
            let found: BTreeSet<ZoomLevel> = zoom_levels.keys().copied().collect();
            if *required != found {
                return Err(ConvertError::ZoomLevelMismatch {
                    found: format_set(&found),
                    required: format_set(required),
                });
            }
        }
        Ok(Self {
            zoom_levels,
            required_zoom_levels,
        })
    }

    pub fn zoom_levels(&self) -> &BTreeMap<ZoomLevel, DisplayConfigData> {
        &self.zoom_levels
    }

    pub fn required_zoom_levels(&self) -> Option<&BTreeSet<ZoomLevel>> {
        self.required_zoom_levels.as_ref()
    }

    pub fn get(&self, zoom_level: f64) -> Option<&DisplayConfigData> {
        self.zoom_levels.get(&ZoomLevel(zoom_level))
    }
}

fn format_set(levels: &BTreeSet<ZoomLevel>) -> String {
    let items: Vec<String> = levels.iter().map(ZoomLevel::to_string).collect();
    format!("{{{}}}", items.join(", "))
}

/// JSON object keys must be strings, so zoom levels are written as `"1.0"`
fn serialize_zoom_levels<S>(
    levels: &BTreeMap<ZoomLevel, DisplayConfigData>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(levels.iter().map(|(k, v)| (k.to_string(), v)))
}

/// Parse a display configuration file
pub fn display_config_to_model(contents: &str) -> Result<DisplayConfig, ConvertError> {
    display_config_with_required(contents, None)
}

/// Parse a display configuration file whose zoom levels must be exactly
/// `required_zoom_levels`
pub fn display_config_with_required(
    contents: &str,
    required_zoom_levels: Option<BTreeSet<ZoomLevel>>,
) -> Result<DisplayConfig, ConvertError> {
    let mut sections: BTreeMap<ZoomLevel, BTreeMap<String, ParsedValue>> = BTreeMap::new();
    let mut current: Option<ZoomLevel> = None;

    for line in remove_comments(contents.lines()) {
        let (key, value) = line
            .split_once('=')
            .map(|(k, v)| (k.trim(), v.trim()))
            .ok_or_else(|| ConvertError::InvalidLine(line.to_string()))?;

        if key == ZOOM_LEVEL_KEY {
            let level = value
                .parse::<f64>()
                .map(ZoomLevel)
                .map_err(|_| ConvertError::InvalidZoomLevel(value.to_string()))?;
            if sections.contains_key(&level) {
                return Err(ConvertError::DuplicateZoomLevel(level.to_string()));
            }
            sections.insert(level, BTreeMap::new());
            current = Some(level);
            continue;
        }

        let level = current.ok_or(ConvertError::MissingZoomLevel)?;
        let fields = sections.entry(level).or_default();
        if fields.contains_key(key) {
            return Err(ConvertError::RepeatedField {
                zoom_level: level.to_string(),
                field: key.to_string(),
            });
        }
        fields.insert(key.to_string(), parse_value(value, None)?);
    }

    let zoom_levels = sections
        .iter()
        .map(|(level, fields)| -> Result<_, ConvertError> {
            Ok((*level, DisplayConfigData::from_fields(*level, fields)?))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    DisplayConfig::new(zoom_levels, required_zoom_levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DISPLAY_CONFIG: &str = "\
# Camera display settings
zoomLevel = 1.0
crosshairX = 541
crosshairY = 409
topLeftX = 383
topLeftY = 253
bottomRightX = 410
bottomRightY = 278

zoomLevel = 2.5
crosshairX = 551
crosshairY = 410
topLeftX = 340
topLeftY = 283
bottomRightX = 388
bottomRightY = 322
";

    fn levels(values: &[f64]) -> BTreeSet<ZoomLevel> {
        values.iter().copied().map(ZoomLevel).collect()
    }

    #[test]
    fn test_display_config_to_model() {
        let config = display_config_to_model(DISPLAY_CONFIG).unwrap();
        assert_eq!(config.zoom_levels().len(), 2);
        assert_eq!(
            config.get(1.0),
            Some(&DisplayConfigData {
                crosshair_x: 541,
                crosshair_y: 409,
                top_left_x: 383,
                top_left_y: 253,
                bottom_right_x: 410,
                bottom_right_y: 278,
            })
        );
        assert_eq!(config.get(2.5).unwrap().bottom_right_y, 322);
    }

    #[test]
    fn test_display_config_serializes_with_string_keys() {
        let config = display_config_to_model(DISPLAY_CONFIG).unwrap();
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["zoom_levels"]["1.0"]["crosshair_x"], json!(541));
        assert_eq!(value["zoom_levels"]["2.5"]["top_left_y"], json!(283));
        assert_eq!(value["required_zoom_levels"], json!(null));
    }

    #[test]
    fn test_required_zoom_levels_must_match() {
        let err = display_config_with_required(DISPLAY_CONFIG, Some(levels(&[1.0, 3.0])))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Zoom levels {1.0, 2.5} do not match required zoom levels: {1.0, 3.0}"
        );

        let config =
            display_config_with_required(DISPLAY_CONFIG, Some(levels(&[2.5, 1.0]))).unwrap();
        assert_eq!(config.required_zoom_levels(), Some(&levels(&[1.0, 2.5])));
    }

    #[test]
    fn test_data_before_first_zoom_level() {
        let err = display_config_to_model("crosshairX = 1\nzoomLevel = 1.0").unwrap_err();
        assert!(matches!(err, ConvertError::MissingZoomLevel));
    }

    #[test]
    fn test_repeated_zoom_level() {
        let contents = DISPLAY_CONFIG.replace("zoomLevel = 2.5", "zoomLevel = 1");
        let err = display_config_to_model(&contents).unwrap_err();
        assert!(matches!(err, ConvertError::DuplicateZoomLevel(ref l) if l == "1.0"));
    }

    #[test]
    fn test_repeated_field_in_section() {
        let contents = "zoomLevel = 1.0\ncrosshairX = 1\ncrosshairX = 2";
        let err = display_config_to_model(contents).unwrap_err();
        assert!(matches!(err, ConvertError::RepeatedField { ref field, .. } if field == "crosshairX"));
    }

    #[test]
    fn test_missing_and_unknown_fields() {
        let missing = DISPLAY_CONFIG.replace("bottomRightY = 322\n", "");
        assert!(matches!(
            display_config_to_model(&missing),
            Err(ConvertError::MissingField { ref field, .. }) if field == "bottom_right_y"
        ));

        let unknown = DISPLAY_CONFIG.replace("bottomRightY = 322", "bottomRightZ = 322");
        assert!(matches!(
            display_config_to_model(&unknown),
            Err(ConvertError::UnknownField { ref field, .. }) if field == "bottomRightZ"
        ));
    }

    #[test]
    fn test_non_integer_field() {
        let contents = DISPLAY_CONFIG.replace("crosshairX = 541", "crosshairX = 541.5");
        assert!(matches!(
            display_config_to_model(&contents),
            Err(ConvertError::NonIntegerField { .. })
        ));
    }
}
