//! Insertion device (Apple2 undulator) calibration tables
//!
//! Calibration files are CSV tables with one row per energy range. Each row
//! names a polarisation mode, an energy range and the coefficients of the
//! polynomial that maps energy to a gap or phase motor position in that
//! range. The rows are grouped per polarisation and sorted by their minimum
//! energy, so the polynomial for an energy can be found by binary search.
//!
//! ```text
//! # Apple2 gap calibration
//! Mode,MinEnergy,MaxEnergy,7th-order,...,1st-order,b
//! lh,250,600,0,...,0.0533,11.3
//! cr,300,650,0,...,0.0612,12.7
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::ConvertError;

/// Coefficient columns of a standard calibration table, highest degree first
pub const DEFAULT_POLY_DEG: [&str; 8] = [
    "7th-order",
    "6th-order",
    "5th-order",
    "4th-order",
    "3rd-order",
    "2nd-order",
    "1st-order",
    "b",
];

/// Circular polarisation aliases used in calibration files
pub const MODE_NAME_CONVERT: [(&str, &str); 2] = [("cr", "pc"), ("cl", "nc")];

/// Polarisation mode of an insertion device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Pol {
    #[serde(rename = "None")]
    None,
    #[serde(rename = "lh")]
    Lh,
    #[serde(rename = "lv")]
    Lv,
    #[serde(rename = "pc")]
    Pc,
    #[serde(rename = "nc")]
    Nc,
    #[serde(rename = "la")]
    La,
    #[serde(rename = "lh3")]
    Lh3,
    #[serde(rename = "lv3")]
    Lv3,
}

impl Pol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Lh => "lh",
            Self::Lv => "lv",
            Self::Pc => "pc",
            Self::Nc => "nc",
            Self::La => "la",
            Self::Lh3 => "lh3",
            Self::Lv3 => "lv3",
        }
    }
}

impl fmt::Display for Pol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pol {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(Self::None),
            "lh" => Ok(Self::Lh),
            "lv" => Ok(Self::Lv),
            "pc" => Ok(Self::Pc),
            "nc" => Ok(Self::Nc),
            "la" => Ok(Self::La),
            "lh3" => Ok(Self::Lh3),
            "lv3" => Ok(Self::Lv3),
            other => Err(ConvertError::UnknownPolarisation(other.to_string())),
        }
    }
}

/// Polynomial with coefficients ordered from the highest degree down
///
/// Leading zero coefficients are dropped, leaving at least the constant term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<f64>", into = "Vec<f64>")]
pub struct Polynomial {
    coefficients: Vec<f64>,
}

impl Polynomial {
    pub fn new(coefficients: Vec<f64>) -> Self {
        let first_nonzero = coefficients
            .iter()
            .position(|c| *c != 0.0)
            .unwrap_or(coefficients.len().saturating_sub(1));
        let mut coefficients = coefficients.into_iter().skip(first_nonzero).collect::<Vec<_>>();
        if coefficients.is_empty() {
            coefficients.push(0.0);
        }
        Self { coefficients }
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    /// Evaluate at `x` by Horner's rule
    pub fn evaluate(&self, x: f64) -> f64 {
        self.coefficients.iter().fold(0.0, |acc, c| acc * x + c)
    }
}

impl From<Vec<f64>> for Polynomial {
    fn from(coefficients: Vec<f64>) -> Self {
        Self::new(coefficients)
    }
}

impl From<Polynomial> for Vec<f64> {
    fn from(poly: Polynomial) -> Self {
        poly.coefficients
    }
}

/// A calibrated energy range and its polynomial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyCoverageEntry {
    pub min_energy: f64,
    pub max_energy: f64,
    pub poly: Polynomial,
    #[serde(default)]
    pub grating: Option<f64>,
}

impl EnergyCoverageEntry {
    pub fn covers(&self, energy: f64) -> bool {
        self.min_energy <= energy && energy <= self.max_energy
    }
}

/// All calibrated ranges of one polarisation, sorted by minimum energy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEnergyCoverage")]
pub struct EnergyCoverage {
    energy_entries: Vec<EnergyCoverageEntry>,
}

#[derive(Deserialize)]
struct RawEnergyCoverage {
    energy_entries: Vec<EnergyCoverageEntry>,
}

impl TryFrom<RawEnergyCoverage> for EnergyCoverage {
    type Error = ConvertError;

    fn try_from(raw: RawEnergyCoverage) -> Result<Self, Self::Error> {
        Self::new(raw.energy_entries)
    }
}

impl EnergyCoverage {
    /// Sort `entries` by minimum energy; at least one entry is required
    pub fn new(mut entries: Vec<EnergyCoverageEntry>) -> Result<Self, ConvertError> {
        if entries.is_empty() {
            return Err(ConvertError::EmptyCoverage);
        }
        entries.sort_by(|a, b| a.min_energy.total_cmp(&b.min_energy));
        Ok(Self {
            energy_entries: entries,
        })
    }

    /// Build a coverage from parallel lists of ranges and coefficients
    pub fn generate(
        min_energies: &[f64],
        max_energies: &[f64],
        poly_params: &[Vec<f64>],
    ) -> Result<Self, ConvertError> {
        for (what, found) in [
            ("max_energies", max_energies.len()),
            ("poly_params", poly_params.len()),
        ] {
            if found != min_energies.len() {
                return Err(ConvertError::LengthMismatch {
                    what,
                    expected: min_energies.len(),
                    found,
                });
            }
        }
        let entries = min_energies
            .iter()
            .zip(max_energies)
            .zip(poly_params)
            .map(|((min, max), params)| EnergyCoverageEntry {
                min_energy: *min,
                max_energy: *max,
                poly: Polynomial::new(params.clone()),
                grating: None,
            })
            .collect();
        Self::new(entries)
    }

    pub fn entries(&self) -> &[EnergyCoverageEntry] {
        &self.energy_entries
    }

    /// Minimum energy of the first range
    pub fn min_energy(&self) -> f64 {
        self.energy_entries[0].min_energy
    }

    /// Maximum energy of the last range
    pub fn max_energy(&self) -> f64 {
        self.energy_entries[self.energy_entries.len() - 1].max_energy
    }

    /// Polynomial for `energy`
    ///
    /// Fails if the energy lies outside the whole coverage, or falls in a gap
    /// between two calibrated ranges.
    pub fn get_poly(&self, energy: f64) -> Result<&Polynomial, ConvertError> {
        let (min, max) = (self.min_energy(), self.max_energy());
        if !(min <= energy && energy <= max) {
            return Err(ConvertError::EnergyOutOfRange { energy, min, max });
        }
        self.energy_index(energy)
            .map(|i| &self.energy_entries[i].poly)
            .ok_or(ConvertError::CalibrationGap { energy })
    }

    /// Binary search over the sorted entries
    ///
    /// The probe is the lower middle of the remaining range, so when an energy
    /// sits on the shared edge of two neighbouring ranges the lower range
    /// wins if it is probed first.
    pub fn energy_index(&self, energy: f64) -> Option<usize> {
        let mut low = 0;
        let mut high = self.energy_entries.len();
        while low < high {
            let mid = low + (high - low - 1) / 2;
            let entry = &self.energy_entries[mid];
            if entry.covers(energy) {
                return Some(mid);
            } else if energy < entry.min_energy {
                high = mid;
            } else {
                low = mid + 1;
            }
        }
        None
    }
}

/// Energy coverage for every calibrated polarisation of an insertion device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InsertionDeviceLookupTable {
    root: BTreeMap<Pol, EnergyCoverage>,
}

impl InsertionDeviceLookupTable {
    pub fn new(root: BTreeMap<Pol, EnergyCoverage>) -> Self {
        Self { root }
    }

    /// Pair each polarisation with its coverage
    pub fn generate(pols: &[Pol], coverages: Vec<EnergyCoverage>) -> Result<Self, ConvertError> {
        if pols.len() != coverages.len() {
            return Err(ConvertError::LengthMismatch {
                what: "energy_coverage",
                expected: pols.len(),
                found: coverages.len(),
            });
        }
        Ok(Self::new(pols.iter().copied().zip(coverages).collect()))
    }

    pub fn get(&self, pol: Pol) -> Option<&EnergyCoverage> {
        self.root.get(&pol)
    }

    pub fn polarisations(&self) -> impl Iterator<Item = Pol> + '_ {
        self.root.keys().copied()
    }

    /// Polynomial for `energy` in polarisation `pol`
    pub fn get_poly(&self, energy: f64, pol: Pol) -> Result<&Polynomial, ConvertError> {
        self.root
            .get(&pol)
            .ok_or(ConvertError::PolarisationNotCovered(pol))?
            .get_poly(energy)
    }
}

/// Only rows whose `column` equals `value` are read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub column: String,
    pub value: String,
}

impl Source {
    pub fn new(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// How the columns of a calibration CSV map onto a lookup table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsertionDeviceColumnConfig {
    /// Optional row filter
    pub source: Option<Source>,
    /// Polarisation mode column
    pub mode: String,
    pub min_energy: String,
    pub max_energy: String,
    /// Coefficient columns, highest degree first
    pub poly_deg: Vec<String>,
    /// Alias for raw (lowercased) mode values
    pub mode_name_convert: BTreeMap<String, String>,
    /// Optional grating column
    pub grating: Option<String>,
    /// Lines starting with this character are skipped
    pub comment: Option<char>,
}

impl Default for InsertionDeviceColumnConfig {
    fn default() -> Self {
        Self {
            source: None,
            mode: "Mode".to_string(),
            min_energy: "MinEnergy".to_string(),
            max_energy: "MaxEnergy".to_string(),
            poly_deg: DEFAULT_POLY_DEG.iter().map(|c| c.to_string()).collect(),
            mode_name_convert: MODE_NAME_CONVERT
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            grating: None,
            comment: Some('#'),
        }
    }
}

impl InsertionDeviceColumnConfig {
    pub fn with_source(mut self, column: &str, value: &str) -> Self {
        self.source = Some(Source::new(column, value));
        self
    }

    pub fn with_poly_deg(mut self, columns: &[&str]) -> Self {
        self.poly_deg = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_grating(mut self, column: &str) -> Self {
        self.grating = Some(column.to_string());
        self
    }

    fn polarisation(&self, raw: &str) -> Result<Pol, ConvertError> {
        let raw = raw.to_lowercase();
        let mode = self.mode_name_convert.get(&raw).unwrap_or(&raw);
        mode.parse()
    }
}

/// Header-indexed view of one CSV record
struct Row<'a> {
    number: usize,
    headers: &'a csv::StringRecord,
    record: &'a csv::StringRecord,
}

impl Row<'_> {
    fn get(&self, column: &str) -> Result<&str, ConvertError> {
        self.headers
            .iter()
            .position(|h| h == column)
            .and_then(|i| self.record.get(i))
            .ok_or_else(|| ConvertError::MissingColumn {
                row: self.number,
                column: column.to_string(),
            })
    }

    fn number(&self, column: &str) -> Result<f64, ConvertError> {
        let raw = self.get(column)?;
        raw.parse().map_err(|_| ConvertError::InvalidNumber {
            column: column.to_string(),
            value: raw.to_string(),
        })
    }
}

/// Convert calibration CSV content into an insertion device lookup table
///
/// Rows failing the optional source filter are ignored. The table must end up
/// with at least one entry.
pub fn convert_csv_to_lookup(
    contents: &str,
    config: &InsertionDeviceColumnConfig,
) -> Result<InsertionDeviceLookupTable, ConvertError> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(config.comment.filter(char::is_ascii).map(|c| c as u8))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(contents.as_bytes());
    let headers = reader.headers()?.clone();

    let mut mode_entries: BTreeMap<Pol, Vec<EnergyCoverageEntry>> = BTreeMap::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let row = Row {
            number: index + 1,
            headers: &headers,
            record: &record,
        };

        if let Some(source) = &config.source {
            if row.get(&source.column)? != source.value {
                continue;
            }
        }

        let pol = config.polarisation(row.get(&config.mode)?)?;
        let coefficients = config
            .poly_deg
            .iter()
            .map(|column| row.number(column))
            .collect::<Result<Vec<_>, _>>()?;
        let grating = config
            .grating
            .as_deref()
            .map(|column| row.number(column))
            .transpose()?;

        mode_entries.entry(pol).or_default().push(EnergyCoverageEntry {
            min_energy: row.number(&config.min_energy)?,
            max_energy: row.number(&config.max_energy)?,
            poly: Polynomial::new(coefficients),
            grating,
        });
    }

    if mode_entries.is_empty() {
        return Err(ConvertError::EmptyTable);
    }

    let root = mode_entries
        .into_iter()
        .map(|(pol, entries)| {
            debug!(pol = %pol, entries = entries.len(), "Built energy coverage");
            EnergyCoverage::new(entries).map(|coverage| (pol, coverage))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(InsertionDeviceLookupTable::new(root))
}

const I09_2_GAP_POLY_DEG: [&str; 10] = [
    "9th-order",
    "8th-order",
    "7th-order",
    "6th-order",
    "5th-order",
    "4th-order",
    "3rd-order",
    "2nd-order",
    "1st-order",
    "0th-order",
];

/// Calibration table layouts used on the beamlines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertionDevicePreset {
    I10GapIdd,
    I10GapIdu,
    I10PhaseIdd,
    I10PhaseIdu,
    #[serde(rename = "i09_2_gap")]
    I09Branch2Gap,
    #[serde(rename = "i09_2_phase")]
    I09Branch2Phase,
    I21Gap,
    I21Phase,
}

impl InsertionDevicePreset {
    pub fn column_config(self) -> InsertionDeviceColumnConfig {
        let config = InsertionDeviceColumnConfig::default();
        match self {
            Self::I10GapIdd | Self::I10PhaseIdd => config.with_source("Source", "idd"),
            Self::I10GapIdu | Self::I10PhaseIdu => config.with_source("Source", "idu"),
            Self::I09Branch2Gap => config.with_poly_deg(&I09_2_GAP_POLY_DEG),
            Self::I09Branch2Phase => config.with_poly_deg(&["0th-order"]),
            Self::I21Gap => config.with_grating("Grating"),
            Self::I21Phase => config.with_grating("Grating").with_poly_deg(&["b"]),
        }
    }

    pub fn parse(self, contents: &str) -> Result<InsertionDeviceLookupTable, ConvertError> {
        convert_csv_to_lookup(contents, &self.column_config())
    }
}
