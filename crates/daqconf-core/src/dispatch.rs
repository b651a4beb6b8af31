//! Routing of file paths to converters
//!
//! A [`DispatchMap`] pairs absolute file paths with the converter for their
//! format. It is built once, either from the built-in table, from a
//! [`DispatchConfig`](crate::config::DispatchConfig), or by hand in tests,
//! and is read-only afterwards.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::config::DispatchConfig;
use crate::display::{display_config_with_required, DisplayConfig, ZoomLevel};
use crate::error::ConvertError;
use crate::insertion_device::{
    convert_csv_to_lookup, InsertionDeviceColumnConfig, InsertionDeviceLookupTable,
    InsertionDevicePreset,
};
use crate::lut::{
    beamline_pitch_lut, beamline_roll_lut, detector_xy_lut, i09_hu_undulator_energy_gap_lut,
    parse_lut_columns, undulator_energy_gap_lut, GenericLookupTable, LutColumn,
};
use crate::parameters::{beamline_parameters_to_dict, KeyValueParameterSet};
use crate::xml::xml_to_value;

/// Result of a conversion, before it is flattened to plain values
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigModel {
    Parameters(KeyValueParameterSet),
    Display(DisplayConfig),
    LookupTable(GenericLookupTable),
    InsertionDevice(InsertionDeviceLookupTable),
    /// Untyped nested document (XML or JSON)
    Document(serde_json::Value),
}

impl ConfigModel {
    /// Flatten the model into nested maps, arrays and scalars
    pub fn to_value(&self) -> Result<serde_json::Value, ConvertError> {
        match self {
            Self::Document(value) => Ok(value.clone()),
            other => Ok(serde_json::to_value(other)?),
        }
    }
}

/// Parses the raw text of one file format
pub trait Converter: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    fn parse(&self, contents: &str) -> Result<ConfigModel, ConvertError>;
}

/// The converters this crate provides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConverterKind {
    BeamlineParameters,
    DisplayConfig {
        #[serde(default)]
        required_zoom_levels: Option<Vec<f64>>,
    },
    Xml,
    DetectorXyLut,
    BeamlinePitchLut,
    BeamlineRollLut,
    UndulatorEnergyGapLut,
    I09HuUndulatorEnergyGapLut,
    GenericLut {
        columns: Vec<LutColumn>,
    },
    InsertionDevice(InsertionDeviceColumnConfig),
    InsertionDevicePreset {
        preset: InsertionDevicePreset,
    },
}

impl ConverterKind {
    pub fn display_config() -> Self {
        Self::DisplayConfig {
            required_zoom_levels: None,
        }
    }
}

impl Converter for ConverterKind {
    fn name(&self) -> &str {
        match self {
            Self::BeamlineParameters => "beamline_parameters",
            Self::DisplayConfig { .. } => "display_config",
            Self::Xml => "xml",
            Self::DetectorXyLut => "detector_xy_lut",
            Self::BeamlinePitchLut => "beamline_pitch_lut",
            Self::BeamlineRollLut => "beamline_roll_lut",
            Self::UndulatorEnergyGapLut => "undulator_energy_gap_lut",
            Self::I09HuUndulatorEnergyGapLut => "i09_hu_undulator_energy_gap_lut",
            Self::GenericLut { .. } => "generic_lut",
            Self::InsertionDevice(_) => "insertion_device",
            Self::InsertionDevicePreset { .. } => "insertion_device_preset",
        }
    }

    fn parse(&self, contents: &str) -> Result<ConfigModel, ConvertError> {
        let model = match self {
            Self::BeamlineParameters => ConfigModel::Parameters(beamline_parameters_to_dict(contents)?),
            Self::DisplayConfig {
                required_zoom_levels,
            } => {
                let required = required_zoom_levels
                    .as_ref()
                    .map(|levels| levels.iter().copied().map(ZoomLevel).collect::<BTreeSet<_>>());
                ConfigModel::Display(display_config_with_required(contents, required)?)
            }
            Self::Xml => ConfigModel::Document(xml_to_value(contents)?),
            Self::DetectorXyLut => ConfigModel::LookupTable(detector_xy_lut(contents)?),
            Self::BeamlinePitchLut => ConfigModel::LookupTable(beamline_pitch_lut(contents)?),
            Self::BeamlineRollLut => ConfigModel::LookupTable(beamline_roll_lut(contents)?),
            Self::UndulatorEnergyGapLut => {
                ConfigModel::LookupTable(undulator_energy_gap_lut(contents)?)
            }
            Self::I09HuUndulatorEnergyGapLut => {
                ConfigModel::LookupTable(i09_hu_undulator_energy_gap_lut(contents)?)
            }
            Self::GenericLut { columns } => ConfigModel::LookupTable(parse_lut_columns(contents, columns)?),
            Self::InsertionDevice(config) => {
                ConfigModel::InsertionDevice(convert_csv_to_lookup(contents, config)?)
            }
            Self::InsertionDevicePreset { preset } => ConfigModel::InsertionDevice(preset.parse(contents)?),
        };
        Ok(model)
    }
}

/// Production files and their formats
const BUILTIN_PATHS: &[(&str, BuiltinKind)] = &[
    ("/tests/test_data/test_good_lut.txt", BuiltinKind::UndulatorEnergyGapLut),
    ("/dls_sw/i23/software/aithre/aithre_display.configuration", BuiltinKind::DisplayConfig),
    ("/dls_sw/i03/software/gda_versions/var/display.configuration", BuiltinKind::DisplayConfig),
    ("/dls_sw/i04/software/bluesky/scratch/display.configuration", BuiltinKind::DisplayConfig),
    ("/dls_sw/i19-1/software/daq_configuration/domain/display.configuration", BuiltinKind::DisplayConfig),
    ("/dls_sw/i24/software/gda_versions/var/display.configuration", BuiltinKind::DisplayConfig),
    ("/dls_sw/i03/software/gda/configurations/i03-config/xml/jCameraManZoomLevels.xml", BuiltinKind::Xml),
    ("/dls_sw/i04/software/bluesky/scratch/jCameraManZoomLevels.xml", BuiltinKind::Xml),
    ("/dls_sw/i19-1/software/gda_versions/gda/config/xml/jCameraManZoomLevels.xml", BuiltinKind::Xml),
    ("/dls_sw/i24/software/gda_versions/gda/config/xml/jCameraManZoomLevels.xml", BuiltinKind::Xml),
    ("/dls_sw/i03/software/daq_configuration/domain/beamlineParameters", BuiltinKind::BeamlineParameters),
    ("/dls_sw/i04/software/daq_configuration/domain/beamlineParameters", BuiltinKind::BeamlineParameters),
    ("/dls_sw/i03/software/daq_configuration/lookup/DetDistToBeamXYConverter.txt", BuiltinKind::DetectorXyLut),
    ("/dls_sw/i04/software/daq_configuration/lookup/DetDistToBeamXYConverter.txt", BuiltinKind::DetectorXyLut),
    ("/dls_sw/i04-1/software/daq_configuration/lookup/DetDistToBeamXYConverter.txt", BuiltinKind::DetectorXyLut),
    ("/dls_sw/i19-1/software/daq_configuration/lookup/DetDistToBeamXYConverter.txt", BuiltinKind::DetectorXyLut),
    ("/dls_sw/i23/software/daq_configuration/lookup/DetDistToBeamXYConverter.txt", BuiltinKind::DetectorXyLut),
    ("/dls_sw/i24/software/daq_configuration/lookup/DetDistToBeamXYConverter.txt", BuiltinKind::DetectorXyLut),
    ("/dls_sw/i03/software/daq_configuration/lookup/BeamLineEnergy_DCM_Pitch_converter.txt", BuiltinKind::BeamlinePitchLut),
    ("/dls_sw/i03/software/daq_configuration/lookup/BeamLineEnergy_DCM_Roll_converter.txt", BuiltinKind::BeamlineRollLut),
    ("/dls_sw/i03/software/daq_configuration/lookup/BeamLine_Undulator_toGap.txt", BuiltinKind::UndulatorEnergyGapLut),
    (
        "/dls_sw/i09-1/software/gda/workspace_git/gda-diamond.git/configurations/i09-1-shared/lookupTables/IIDCalibrationTable.txt",
        BuiltinKind::I09HuUndulatorEnergyGapLut,
    ),
];

/// Converters referenced by the built-in table; all of them are stateless
#[derive(Clone, Copy)]
enum BuiltinKind {
    BeamlineParameters,
    DisplayConfig,
    Xml,
    DetectorXyLut,
    BeamlinePitchLut,
    BeamlineRollLut,
    UndulatorEnergyGapLut,
    I09HuUndulatorEnergyGapLut,
}

impl From<BuiltinKind> for ConverterKind {
    fn from(kind: BuiltinKind) -> Self {
        match kind {
            BuiltinKind::BeamlineParameters => Self::BeamlineParameters,
            BuiltinKind::DisplayConfig => Self::display_config(),
            BuiltinKind::Xml => Self::Xml,
            BuiltinKind::DetectorXyLut => Self::DetectorXyLut,
            BuiltinKind::BeamlinePitchLut => Self::BeamlinePitchLut,
            BuiltinKind::BeamlineRollLut => Self::BeamlineRollLut,
            BuiltinKind::UndulatorEnergyGapLut => Self::UndulatorEnergyGapLut,
            BuiltinKind::I09HuUndulatorEnergyGapLut => Self::I09HuUndulatorEnergyGapLut,
        }
    }
}

/// Immutable table of file path to converter
#[derive(Clone, Default)]
pub struct DispatchMap {
    converters: HashMap<String, Arc<dyn Converter>>,
}

impl DispatchMap {
    /// An empty map; every path falls through to plain JSON
    pub fn new() -> Self {
        Self::default()
    }

    /// The production path table
    pub fn builtin() -> Self {
        BUILTIN_PATHS
            .iter()
            .fold(Self::new(), |map, (path, kind)| {
                map.with_converter(*path, ConverterKind::from(*kind))
            })
    }

    /// Build a map from configuration, on top of the built-in table if asked
    ///
    /// Configured entries replace built-in entries for the same path.
    pub fn from_config(config: &DispatchConfig) -> Self {
        let base = if config.include_builtin {
            Self::builtin()
        } else {
            Self::new()
        };
        let map = config.converter.iter().fold(base, |map, entry| {
            map.with_converter(entry.path.clone(), entry.converter.clone())
        });
        debug!(paths = map.len(), "Built dispatch map");
        map
    }

    /// Add a converter for `path`, replacing any previous one
    pub fn with_converter<C>(mut self, path: impl Into<String>, converter: C) -> Self
    where
        C: Converter + 'static,
    {
        self.converters.insert(path.into(), Arc::new(converter));
        self
    }

    /// Converter registered for exactly `path`
    pub fn get(&self, path: &str) -> Option<&dyn Converter> {
        self.converters.get(path).map(|c| c.as_ref())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.converters.contains_key(path)
    }

    /// Registered paths, sorted
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.converters.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}

impl fmt::Debug for DispatchMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for path in self.paths() {
            if let Some(converter) = self.get(path) {
                map.entry(&path, &converter.name());
            }
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lut::LutValue;
    use crate::value::ColumnType;
    use serde_json::json;

    #[test]
    fn test_builtin_map() {
        let map = DispatchMap::builtin();
        assert_eq!(map.len(), BUILTIN_PATHS.len());

        let converter = map
            .get("/dls_sw/i03/software/daq_configuration/domain/beamlineParameters")
            .unwrap();
        assert_eq!(converter.name(), "beamline_parameters");

        assert!(map.get("/dls_sw/i03/software/daq_configuration/domain/").is_none());
        assert!(!map.contains("/dls_sw/i03/software/daq_configuration/domain/beamlineparameters"));
    }

    #[test]
    fn test_paths_are_sorted() {
        let map = DispatchMap::new()
            .with_converter("/b", ConverterKind::Xml)
            .with_converter("/a", ConverterKind::BeamlineParameters);
        assert_eq!(map.paths(), vec!["/a", "/b"]);
        assert_eq!(format!("{:?}", map), r#"{"/a": "beamline_parameters", "/b": "xml"}"#);
    }

    #[test]
    fn test_generic_lut_converter() {
        let converter = ConverterKind::GenericLut {
            columns: vec![
                LutColumn::new("energy_eV", Some(ColumnType::Int)),
                LutColumn::new("gap_mm", Some(ColumnType::Float)),
            ],
        };
        let ConfigModel::LookupTable(table) = converter.parse("5700 5.4606\n5760 5.5").unwrap() else {
            panic!("expected a lookup table");
        };
        assert_eq!(table.rows()[1], vec![LutValue::Int(5760), LutValue::Float(5.5)]);
    }

    #[test]
    fn test_display_config_converter_checks_required_levels() {
        let converter = ConverterKind::DisplayConfig {
            required_zoom_levels: Some(vec![1.0, 3.0]),
        };
        let contents = "zoomLevel = 1.0\ncrosshairX = 1\ncrosshairY = 2\ntopLeftX = 3\n\
                        topLeftY = 4\nbottomRightX = 5\nbottomRightY = 6\n";
        assert!(matches!(
            converter.parse(contents),
            Err(ConvertError::ZoomLevelMismatch { .. })
        ));
    }

    #[test]
    fn test_model_to_value() {
        let model = ConverterKind::UndulatorEnergyGapLut
            .parse("Units eV mm\n5700 5.4606")
            .unwrap();
        assert_eq!(
            model.to_value().unwrap(),
            json!({"column_names": ["energy_eV", "gap_mm"], "rows": [[5700, 5.4606]]})
        );

        let model = ConverterKind::Xml.parse("<a><b>1</b></a>").unwrap();
        assert_eq!(model.to_value().unwrap(), json!({"a": {"b": "1"}}));
    }

    #[test]
    fn test_converter_kind_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            converter: Vec<ConverterKind>,
        }
        let parsed: Wrapper = toml::from_str(
            r#"
[[converter]]
kind = "detector_xy_lut"

[[converter]]
kind = "insertion_device"
mode = "Pol"
poly_deg = ["b"]

[[converter]]
kind = "insertion_device_preset"
preset = "i09_2_gap"

[[converter]]
kind = "display_config"
required_zoom_levels = [1.0, 2.5]
"#,
        )
        .unwrap();

        assert_eq!(parsed.converter[0], ConverterKind::DetectorXyLut);
        let ConverterKind::InsertionDevice(config) = &parsed.converter[1] else {
            panic!("expected an insertion device converter");
        };
        assert_eq!(config.mode, "Pol");
        assert_eq!(config.poly_deg, vec!["b".to_string()]);
        assert_eq!(config.min_energy, "MinEnergy");
        assert_eq!(
            parsed.converter[2],
            ConverterKind::InsertionDevicePreset {
                preset: InsertionDevicePreset::I09Branch2Gap
            }
        );
        assert_eq!(
            parsed.converter[3],
            ConverterKind::DisplayConfig {
                required_zoom_levels: Some(vec![1.0, 2.5])
            }
        );
    }
}
