//! TOML description of a dispatch map

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::dispatch::ConverterKind;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read dispatch config: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse dispatch config: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Which converter handles which file
///
/// ```toml
/// include_builtin = true
///
/// [[converter]]
/// path = "/dls_sw/i10/software/gda/config/lookupTables/IDEnergy2GapCalibrations.csv"
/// kind = "insertion_device_preset"
/// preset = "i10_gap_idd"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Start from the built-in production paths
    #[serde(default = "default_true")]
    pub include_builtin: bool,
    #[serde(default)]
    pub converter: Vec<ConverterEntry>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            include_builtin: true,
            converter: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// A single path and the converter for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverterEntry {
    /// Absolute path, matched exactly
    pub path: String,
    #[serde(flatten)]
    pub converter: ConverterKind,
}

impl DispatchConfig {
    /// Load dispatch config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load dispatch config from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: DispatchConfig = toml::from_str(content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{ConfigModel, DispatchMap};
    use crate::insertion_device::{InsertionDevicePreset, Pol, Source};
    use crate::lut::LutColumn;
    use crate::value::ColumnType;
    use std::io::Write;

    const CONFIG: &str = r#"
[[converter]]
path = "/dls_sw/i10/lookup/gap.csv"
kind = "insertion_device_preset"
preset = "i10_gap_idd"

[[converter]]
path = "/dls_sw/i03/software/daq_configuration/lookup/BeamLine_Undulator_toGap.txt"
kind = "generic_lut"
columns = [{ name = "energy_eV", type = "int" }, { name = "gap_mm" }]
"#;

    #[test]
    fn test_parse_dispatch_config() {
        let config = DispatchConfig::from_toml(CONFIG).unwrap();
        assert!(config.include_builtin);
        assert_eq!(config.converter.len(), 2);
        assert_eq!(
            config.converter[0].converter,
            ConverterKind::InsertionDevicePreset {
                preset: InsertionDevicePreset::I10GapIdd
            }
        );
        assert_eq!(
            config.converter[1].converter,
            ConverterKind::GenericLut {
                columns: vec![
                    LutColumn::new("energy_eV", Some(ColumnType::Int)),
                    LutColumn::new("gap_mm", None),
                ]
            }
        );
    }

    #[test]
    fn test_config_entries_override_builtin() {
        let config = DispatchConfig::from_toml(CONFIG).unwrap();
        let map = DispatchMap::from_config(&config);

        assert_eq!(map.len(), DispatchMap::builtin().len() + 1);
        let converter = map
            .get("/dls_sw/i03/software/daq_configuration/lookup/BeamLine_Undulator_toGap.txt")
            .unwrap();
        assert_eq!(converter.name(), "generic_lut");
        assert_eq!(
            map.get("/dls_sw/i10/lookup/gap.csv").unwrap().name(),
            "insertion_device_preset"
        );
    }

    #[test]
    fn test_entries_carry_converter_fields() {
        let config = DispatchConfig::from_toml(
            r#"
include_builtin = false

[[converter]]
path = "/dls_sw/i10/lookup/phase.csv"
kind = "insertion_device"
comment = "%"
poly_deg = ["b"]
source = { column = "Source", value = "idu" }
mode_name_convert = { circ = "pc" }

[[converter]]
path = "/dls_sw/i03/software/gda_versions/var/display.configuration"
kind = "display_config"
required_zoom_levels = [1.0, 2.5]
"#,
        )
        .unwrap();

        let ConverterKind::InsertionDevice(columns) = &config.converter[0].converter else {
            panic!("expected an insertion device converter");
        };
        assert_eq!(columns.comment, Some('%'));
        assert_eq!(columns.poly_deg, vec!["b".to_string()]);
        assert_eq!(columns.source, Some(Source::new("Source", "idu")));
        assert_eq!(columns.mode_name_convert.get("circ").map(String::as_str), Some("pc"));
        assert_eq!(columns.mode, "Mode");

        assert_eq!(
            config.converter[1].converter,
            ConverterKind::DisplayConfig {
                required_zoom_levels: Some(vec![1.0, 2.5])
            }
        );

        let map = DispatchMap::from_config(&config);
        let contents = "% phase table\n\
                        Mode,MinEnergy,MaxEnergy,b,Source\n\
                        circ,100,200,4.5,idu\n\
                        lh,100,200,1,idd\n";
        let model = map
            .get("/dls_sw/i10/lookup/phase.csv")
            .unwrap()
            .parse(contents)
            .unwrap();
        let ConfigModel::InsertionDevice(table) = model else {
            panic!("expected an insertion device table");
        };
        assert_eq!(table.polarisations().collect::<Vec<_>>(), vec![Pol::Pc]);
        assert_eq!(table.get_poly(150.0, Pol::Pc).unwrap().coefficients(), &[4.5]);
    }

    #[test]
    fn test_without_builtin() {
        let config = DispatchConfig::from_toml(&format!("include_builtin = false\n{}", CONFIG)).unwrap();
        let map = DispatchMap::from_config(&config);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let result = DispatchConfig::from_toml("[[converter]]\npath = \"/a\"\nkind = \"yaml\"\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        let config = DispatchConfig::from_file(file.path()).unwrap();
        assert_eq!(config.converter[0].path, "/dls_sw/i10/lookup/gap.csv");

        assert!(matches!(
            DispatchConfig::from_file(Path::new("/nonexistent/daqconf.toml")),
            Err(ConfigError::IoError(_))
        ));
    }
}
