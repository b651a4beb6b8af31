//! Scalar value parsing and line cleanup shared by the text converters
//!
//! Values in the configuration files are written as literals: integers,
//! floats, `True`/`False` (or the aliases `Yes`/`No`) and quoted strings.
//! Anything else, such as a bare word, is rejected.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConvertError;

/// A scalar inferred from a text token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParsedValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Explicit conversion target for a parsed value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Int,
    Float,
    Bool,
    Str,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Str => "str",
        };
        f.write_str(name)
    }
}

impl ParsedValue {
    /// Convert this value into `target`, the way an explicit cast would
    pub fn coerce(self, target: ColumnType) -> Result<Self, ConvertError> {
        let coerced = match (target, self) {
            (ColumnType::Int, Self::Int(i)) => Self::Int(i),
            (ColumnType::Int, Self::Float(x)) => {
                if !x.is_finite() {
                    return Err(coercion_error(&Self::Float(x), target));
                }
                Self::Int(x.trunc() as i64)
            }
            (ColumnType::Int, Self::Bool(b)) => Self::Int(i64::from(b)),
            (ColumnType::Int, Self::Str(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Self::Int(i),
                Err(_) => return Err(coercion_error(&Self::Str(s), target)),
            },
            (ColumnType::Float, Self::Int(i)) => Self::Float(i as f64),
            (ColumnType::Float, Self::Float(x)) => Self::Float(x),
            (ColumnType::Float, Self::Bool(b)) => Self::Float(if b { 1.0 } else { 0.0 }),
            (ColumnType::Float, Self::Str(s)) => match s.trim().parse::<f64>() {
                Ok(x) => Self::Float(x),
                Err(_) => return Err(coercion_error(&Self::Str(s), target)),
            },
            (ColumnType::Bool, v) => Self::Bool(v.is_truthy()),
            (ColumnType::Str, Self::Str(s)) => Self::Str(s),
            (ColumnType::Str, v) => Self::Str(v.to_string()),
        };
        Ok(coerced)
    }

    fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(x) => *x != 0.0,
            Self::Str(s) => !s.is_empty(),
        }
    }
}

impl fmt::Display for ParsedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => f.write_str(&format_float(*x)),
            Self::Str(s) => f.write_str(s),
        }
    }
}

fn coercion_error(value: &ParsedValue, target: ColumnType) -> ConvertError {
    ConvertError::Coercion {
        value: value.to_string(),
        target,
    }
}

/// Format a float so integral values keep a trailing `.0` (`1.0`, `2.5`)
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Parse a token into a scalar, optionally converting it to `target`
///
/// `Yes` and `No` are read as `True` and `False` only when they make up the
/// whole token, so `'Yes sir'` stays the string `Yes sir` rather than becoming
/// `True sir`. The token must otherwise be an integer, a float, a boolean or a
/// quoted string.
pub fn parse_value(token: &str, target: Option<ColumnType>) -> Result<ParsedValue, ConvertError> {
    let token = match token.trim() {
        "Yes" => "True",
        "No" => "False",
        other => other,
    };
    let value = parse_literal(token)?;
    match target {
        Some(target) => value.coerce(target),
        None => Ok(value),
    }
}

fn parse_literal(token: &str) -> Result<ParsedValue, ConvertError> {
    match token {
        "True" => return Ok(ParsedValue::Bool(true)),
        "False" => return Ok(ParsedValue::Bool(false)),
        _ => {}
    }

    if let Some(s) = parse_quoted(token) {
        return Ok(ParsedValue::Str(s));
    }

    let invalid = || ConvertError::InvalidLiteral(token.to_string());
    match classify_number(token) {
        Some(NumberShape::Integer) => token.parse::<i64>().map(ParsedValue::Int).map_err(|_| invalid()),
        Some(NumberShape::Float) => token.parse::<f64>().map(ParsedValue::Float).map_err(|_| invalid()),
        None => Err(invalid()),
    }
}

enum NumberShape {
    Integer,
    Float,
}

/// Match `[+-]? (digits ('.' digits*)? | '.' digits) ([eE] [+-]? digits)?`
fn classify_number(token: &str) -> Option<NumberShape> {
    let bytes = token.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }

    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let int_digits = i - int_start;

    let mut is_float = false;
    let mut frac_digits = 0;
    if i < bytes.len() && bytes[i] == b'.' {
        is_float = true;
        i += 1;
        let frac_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        frac_digits = i - frac_start;
    }
    if int_digits == 0 && frac_digits == 0 {
        return None;
    }

    if i < bytes.len() && matches!(bytes[i], b'e' | b'E') {
        is_float = true;
        i += 1;
        if matches!(bytes.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        let exp_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return None;
        }
    }

    if i != bytes.len() {
        return None;
    }
    Some(if is_float {
        NumberShape::Float
    } else {
        NumberShape::Integer
    })
}

fn parse_quoted(token: &str) -> Option<String> {
    let quote = token.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    if token.len() < 2 || !token.ends_with(quote) {
        return None;
    }
    let inner = &token[1..token.len() - 1];

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next()? {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                other => out.push(other),
            },
            c if c == quote => return None,
            c => out.push(c),
        }
    }
    Some(out)
}

/// Drop comments and blank lines, trimming what remains
///
/// Everything from the first `#` on a line is a comment.
pub fn remove_comments<'a, I>(lines: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    lines.into_iter().filter_map(strip_comment).collect()
}

/// The trimmed part of `line` before any `#`, or `None` if nothing is left
pub fn strip_comment(line: &str) -> Option<&str> {
    let code = line.split_once('#').map_or(line, |(code, _)| code).trim();
    (!code.is_empty()).then_some(code)
}

/// `crosshairX` -> `crosshair_x`
pub fn camel_to_snake_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    let mut prev_lower = false;
    for c in value.chars() {
        if prev_lower && c.is_ascii_uppercase() {
            out.push('_');
        }
        prev_lower = c.is_ascii_lowercase();
        out.push(c.to_ascii_lowercase());
    }
    out
}
