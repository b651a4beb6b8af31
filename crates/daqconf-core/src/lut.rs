//! Whitespace separated lookup tables
//!
//! Lookup tables are plain columns of numbers, optionally preceded by comment
//! lines and `Units ...` header lines:
//!
//! ```text
//! # 5.5mm CPMU 20/11/22
//! Units eV mm
//! 5700    5.4606
//! 5760    5.5
//! ```
//!
//! Column names are not part of the file; each converter declares them.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::ConvertError;
use crate::value::{format_float, parse_value, strip_comment, ColumnType, ParsedValue};

/// Header lines skipped while reading rows
pub const IGNORE_LINES_STARTING_WITH: [&str; 3] = ["Units", "ScannableUnits", "ScannableNames"];

/// A single numeric cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LutValue {
    Int(i64),
    Float(f64),
}

impl LutValue {
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(x) => x,
        }
    }
}

impl fmt::Display for LutValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => f.write_str(&format_float(*x)),
        }
    }
}

impl TryFrom<ParsedValue> for LutValue {
    type Error = ConvertError;

    fn try_from(value: ParsedValue) -> Result<Self, Self::Error> {
        match value {
            ParsedValue::Int(i) => Ok(Self::Int(i)),
            ParsedValue::Float(x) => Ok(Self::Float(x)),
            ParsedValue::Bool(b) => Ok(Self::Int(i64::from(b))),
            ParsedValue::Str(s) => Err(ConvertError::NonNumeric(s)),
        }
    }
}

/// Column declaration: a name and an optional conversion for its values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LutColumn {
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: Option<ColumnType>,
}

impl LutColumn {
    pub fn new(name: impl Into<String>, column_type: Option<ColumnType>) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Named columns over rows of numbers
///
/// Every row has exactly one value per column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLookupTable")]
pub struct GenericLookupTable {
    column_names: Vec<String>,
    rows: Vec<Vec<LutValue>>,
}

#[derive(Deserialize)]
struct RawLookupTable {
    column_names: Vec<String>,
    rows: Vec<Vec<LutValue>>,
}

impl TryFrom<RawLookupTable> for GenericLookupTable {
    type Error = ConvertError;

    fn try_from(raw: RawLookupTable) -> Result<Self, Self::Error> {
        Self::new(raw.column_names, raw.rows)
    }
}

impl GenericLookupTable {
    pub fn new(column_names: Vec<String>, rows: Vec<Vec<LutValue>>) -> Result<Self, ConvertError> {
        let mut table = Self {
            column_names,
            rows: Vec::with_capacity(rows.len()),
        };
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Append a row, rejecting it if its length differs from the column count
    pub fn push_row(&mut self, row: Vec<LutValue>) -> Result<(), ConvertError> {
        if row.len() != self.column_names.len() {
            return Err(ConvertError::RowLength {
                row: format_list(&row),
                columns: format_list(&self.column_names),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn rows(&self) -> &[Vec<LutValue>] {
        &self.rows
    }

    /// The table transposed: one vector per column, in row order
    pub fn columns(&self) -> Vec<Vec<LutValue>> {
        (0..self.column_names.len())
            .map(|i| self.rows.iter().map(|row| row[i]).collect())
            .collect()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, ConvertError> {
        self.column_names
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| ConvertError::UnknownColumn(name.to_string()))
    }

    /// Find `value` in `search_column` and return the entry of
    /// `target_column` from the same row
    ///
    /// With `exact` set the value must be present. Otherwise the row whose
    /// search value is nearest to `value` is used; on a tie the earliest row
    /// wins.
    pub fn get_value(
        &self,
        search_column: &str,
        value: f64,
        target_column: &str,
        exact: bool,
    ) -> Result<LutValue, ConvertError> {
        let search_index = self.column_index(search_column)?;
        let target_index = self.column_index(target_column)?;

        let row = if exact {
            self.rows.iter().find(|row| row[search_index].as_f64() == value)
        } else {
            self.rows.iter().fold(None, |best: Option<&Vec<LutValue>>, row| {
                let distance = (row[search_index].as_f64() - value).abs();
                match best {
                    Some(b) if (b[search_index].as_f64() - value).abs() <= distance => Some(b),
                    _ => Some(row),
                }
            })
        };

        row.map(|row| row[target_index]).ok_or_else(|| {
            let column: Vec<LutValue> = self.rows.iter().map(|row| row[search_index]).collect();
            ConvertError::ValueNotFound {
                value: format_float(value),
                column: search_column.to_string(),
                values: format_list(&column),
            }
        })
    }
}

fn format_list<T: fmt::Display>(items: &[T]) -> String {
    let items: Vec<String> = items.iter().map(T::to_string).collect();
    format!("[{}]", items.join(", "))
}

/// Parse the data rows of a lookup table
///
/// Each line must hold exactly one token per column. A column with a declared
/// type has its values converted to that type. Errors report the line number
/// within `contents`.
pub fn parse_lut_rows(
    contents: &str,
    types: &[Option<ColumnType>],
) -> Result<Vec<Vec<LutValue>>, ConvertError> {
    let mut rows = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        let Some(line) = strip_comment(line) else {
            continue;
        };
        if IGNORE_LINES_STARTING_WITH.iter().any(|p| line.starts_with(p)) {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != types.len() {
            return Err(ConvertError::TokenCount {
                line: line_no + 1,
                expected: types.len(),
                found: tokens.len(),
            });
        }
        let row = tokens
            .iter()
            .zip(types)
            .map(|(token, ty)| LutValue::try_from(parse_value(token, *ty)?))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
    }
    Ok(rows)
}

/// Parse a lookup table with the given `(name, type)` columns
pub fn parse_lut(
    contents: &str,
    columns: &[(&str, Option<ColumnType>)],
) -> Result<GenericLookupTable, ConvertError> {
    let types: Vec<Option<ColumnType>> = columns.iter().map(|(_, ty)| *ty).collect();
    let rows = parse_lut_rows(contents, &types)?;
    debug!(rows = rows.len(), columns = columns.len(), "Parsed lookup table");
    let names = columns.iter().map(|(name, _)| name.to_string()).collect();
    GenericLookupTable::new(names, rows)
}

/// Parse a lookup table from owned column declarations
pub fn parse_lut_columns(
    contents: &str,
    columns: &[LutColumn],
) -> Result<GenericLookupTable, ConvertError> {
    let columns: Vec<(&str, Option<ColumnType>)> = columns
        .iter()
        .map(|c| (c.name.as_str(), c.column_type))
        .collect();
    parse_lut(contents, &columns)
}

const FLOAT: Option<ColumnType> = Some(ColumnType::Float);
const INT: Option<ColumnType> = Some(ColumnType::Int);

/// Detector distance to beam centre
pub fn detector_xy_lut(contents: &str) -> Result<GenericLookupTable, ConvertError> {
    parse_lut(
        contents,
        &[
            ("detector_distances_mm", FLOAT),
            ("beam_centre_x_mm", FLOAT),
            ("beam_centre_y_mm", FLOAT),
        ],
    )
}

/// DCM Bragg angle to pitch
pub fn beamline_pitch_lut(contents: &str) -> Result<GenericLookupTable, ConvertError> {
    parse_lut(contents, &[("bragg_angle_deg", FLOAT), ("pitch_mrad", FLOAT)])
}

/// DCM Bragg angle to roll
pub fn beamline_roll_lut(contents: &str) -> Result<GenericLookupTable, ConvertError> {
    parse_lut(contents, &[("bragg_angle_deg", FLOAT), ("roll_mrad", FLOAT)])
}

/// Beam energy to undulator gap
pub fn undulator_energy_gap_lut(contents: &str) -> Result<GenericLookupTable, ConvertError> {
    parse_lut(contents, &[("energy_eV", INT), ("gap_mm", FLOAT)])
}

/// i09 hard undulator harmonic calibration
pub fn i09_hu_undulator_energy_gap_lut(contents: &str) -> Result<GenericLookupTable, ConvertError> {
    parse_lut(
        contents,
        &[
            ("order", INT),
            ("ring_energy_gev", FLOAT),
            ("magnetic_field_t", FLOAT),
            ("energy_min_ev", FLOAT),
            ("energy_max_ev", FLOAT),
            ("gap_min_mm", FLOAT),
            ("gap_max_mm", FLOAT),
            ("gap_offset_mm", FLOAT),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const UNDULATOR_GAP: &str = "\
#######################
#                     #
# 5.5mm CPMU 20/11/22 #
#                     #
Units eV mm
5700\t\t5.4606
5760\t\t5.5
6000\t\t5.681
6500\t\t6.045
";

    fn detector_table() -> GenericLookupTable {
        detector_xy_lut(
            "# distance beamY beamX (values from mosflm)\n\
             Units mm mm mm\n\
             150 152.2 166.26\n\
             800 152.08 160.96\n",
        )
        .unwrap()
    }

    #[test]
    fn test_parse_lut_with_types() {
        let table = parse_lut("1 2.0\n3 4.5", &[("e", INT), ("g", FLOAT)]).unwrap();
        assert_eq!(table.column_names(), ["e", "g"]);
        assert_eq!(
            table.rows(),
            [
                vec![LutValue::Int(1), LutValue::Float(2.0)],
                vec![LutValue::Int(3), LutValue::Float(4.5)],
            ]
        );
    }

    #[test]
    fn test_wrong_token_count_is_an_index_error() {
        let err = parse_lut("1 2.0\n3 4.5 6", &[("e", INT), ("g", FLOAT)]).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::TokenCount {
                line: 2,
                expected: 2,
                found: 3
            }
        ));
        assert!(parse_lut("1", &[("e", INT), ("g", FLOAT)]).is_err());
    }

    #[test]
    fn test_token_count_reports_file_line() {
        let contents = "# energy gap

Units eV mm
5700 5.4606
5760 5.5 1.0
";
        let err = undulator_energy_gap_lut(contents).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::TokenCount {
                line: 5,
                expected: 2,
                found: 3
            }
        ));
        assert_eq!(err.to_string(), "line 5 has 3 values but 2 columns were declared");
    }

    #[test]
    fn test_row_length_must_match_columns() {
        let err = GenericLookupTable::new(
            vec!["column1".to_string(), "column2".to_string()],
            vec![
                vec![LutValue::Int(1), LutValue::Int(2)],
                vec![LutValue::Int(1), LutValue::Int(2), LutValue::Int(3)],
            ],
        )
        .unwrap_err();
        assert!(err.to_string().contains(" does not match number of columns:"));
    }

    #[test]
    fn test_undulator_gap_lut() {
        let table = undulator_energy_gap_lut(UNDULATOR_GAP).unwrap();
        assert_eq!(
            serde_json::to_value(&table).unwrap(),
            json!({
                "column_names": ["energy_eV", "gap_mm"],
                "rows": [[5700, 5.4606], [5760, 5.5], [6000, 5.681], [6500, 6.045]],
            })
        );
    }

    #[test]
    fn test_pitch_lut_skips_repeated_units() {
        let contents = "#       Bragg\tpitch\n\
                        Units Deg mrad\n\
                        Units Deg Deg\n\
                        16.40956 -0.62681\n\
                        14.31123 -0.61833\n";
        let table = beamline_pitch_lut(contents).unwrap();
        assert_eq!(table.column_names(), ["bragg_angle_deg", "pitch_mrad"]);
        assert_eq!(table.rows()[1], vec![LutValue::Float(14.31123), LutValue::Float(-0.61833)]);
    }

    #[test]
    fn test_scannable_headers_are_skipped() {
        let contents = "ScannableNames bragg roll\nScannableUnits deg mrad\n26.4095 2.6154\n6.3075  2.6154\n";
        let table = beamline_roll_lut(contents).unwrap();
        assert_eq!(table.rows().len(), 2);
    }

    #[test]
    fn test_get_value_exact() {
        let table = detector_table();
        let value = table
            .get_value("detector_distances_mm", 800.0, "beam_centre_y_mm", true)
            .unwrap();
        assert_eq!(value, LutValue::Float(160.96));

        let err = table
            .get_value("detector_distances_mm", 500.0, "beam_centre_y_mm", true)
            .unwrap_err();
        assert!(matches!(err, ConvertError::ValueNotFound { .. }));
        assert_eq!(
            err.to_string(),
            "'500.0' doesn't exist in column 'detector_distances_mm': [150.0, 800.0]"
        );
    }

    #[test]
    fn test_get_value_nearest() {
        let table = detector_table();
        let value = table
            .get_value("beam_centre_x_mm", 153.0, "beam_centre_y_mm", false)
            .unwrap();
        assert_eq!(value, LutValue::Float(166.26));
    }

    #[test]
    fn test_get_value_nearest_tie_takes_first_row() {
        let table = parse_lut("10 1\n20 2\n30 3", &[("x", INT), ("y", INT)]).unwrap();
        assert_eq!(table.get_value("x", 15.0, "y", false).unwrap(), LutValue::Int(1));
        assert_eq!(table.get_value("x", 25.0, "y", false).unwrap(), LutValue::Int(2));
    }

    #[test]
    fn test_get_value_unknown_column() {
        let table = detector_table();
        assert!(matches!(
            table.get_value("energy", 1.0, "beam_centre_y_mm", true),
            Err(ConvertError::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_columns_transposes() {
        let table = parse_lut("1 2\n3 4\n5 6", &[("a", None), ("b", None)]).unwrap();
        assert_eq!(
            table.columns(),
            vec![
                vec![LutValue::Int(1), LutValue::Int(3), LutValue::Int(5)],
                vec![LutValue::Int(2), LutValue::Int(4), LutValue::Int(6)],
            ]
        );
    }

    #[test]
    fn test_i09_hu_table() {
        let contents = "# order ring field emin emax gmin gmax offset\n\
                        1 3.0 1.0 2000 3500 6.0 12.0 0.1\n\
                        3 3.0 1.0 5000 10500 6.0 12.0 0.1\n";
        let table = i09_hu_undulator_energy_gap_lut(contents).unwrap();
        assert_eq!(table.column_names().len(), 8);
        assert_eq!(table.rows()[1][0], LutValue::Int(3));
        assert_eq!(table.rows()[1][4], LutValue::Float(10500.0));
    }

    #[test]
    fn test_table_deserializes_with_validation() {
        let table: GenericLookupTable = serde_json::from_value(json!({
            "column_names": ["a", "b"],
            "rows": [[1, 2.5]],
        }))
        .unwrap();
        assert_eq!(table.rows()[0], vec![LutValue::Int(1), LutValue::Float(2.5)]);

        let bad = serde_json::from_value::<GenericLookupTable>(json!({
            "column_names": ["a", "b"],
            "rows": [[1]],
        }));
        assert!(bad.is_err());
    }
}
