//! Value types carried by change events.
//!
//! Parameters hold primitive values; tables hold rows keyed by primary key
//! whose cells are primitive values indexed by column id.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::MatchError;

/// A primitive parameter value.
///
/// # Examples
///
/// ```
/// use monitorkit::ParamValue;
///
/// let v = ParamValue::Float(3.5);
/// assert_eq!(v.as_float(), Some(3.5));
/// assert!(ParamValue::Null.is_null());
/// ```
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Null,
}

#[allow(missing_docs)]
impl ParamValue {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Short type name used in conversion errors.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Null => "null",
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// Conversion from a raw parameter value into the type a monitor delivers.
pub trait FromParamValue: Sized {
    /// Converts the raw value, failing when the types are incompatible.
    fn from_param_value(value: &ParamValue) -> Result<Self, MatchError>;
}

fn mismatch(expected: &'static str, value: &ParamValue) -> MatchError {
    MatchError::Conversion {
        expected,
        actual: value.type_name().to_string(),
    }
}

impl FromParamValue for ParamValue {
    fn from_param_value(value: &ParamValue) -> Result<Self, MatchError> {
        Ok(value.clone())
    }
}

impl FromParamValue for f64 {
    fn from_param_value(value: &ParamValue) -> Result<Self, MatchError> {
        match value {
            ParamValue::String(s) => s.trim().parse().map_err(|_| mismatch("f64", value)),
            other => other.as_float().ok_or_else(|| mismatch("f64", value)),
        }
    }
}

impl FromParamValue for i64 {
    fn from_param_value(value: &ParamValue) -> Result<Self, MatchError> {
        match value {
            ParamValue::Int(v) => Ok(*v),
            ParamValue::Float(v) if is_exact_i64(*v) => Ok(*v as i64),
            ParamValue::String(s) => s.trim().parse().map_err(|_| mismatch("i64", value)),
            _ => Err(mismatch("i64", value)),
        }
    }
}

/// True if `v` is integral and inside `i64`'s range, so the cast is exact.
#[allow(clippy::cast_precision_loss)]
fn is_exact_i64(v: f64) -> bool {
    v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64
}

impl FromParamValue for i32 {
    fn from_param_value(value: &ParamValue) -> Result<Self, MatchError> {
        let wide = i64::from_param_value(value).map_err(|_| mismatch("i32", value))?;
        i32::try_from(wide).map_err(|_| mismatch("i32", value))
    }
}

impl FromParamValue for bool {
    fn from_param_value(value: &ParamValue) -> Result<Self, MatchError> {
        match value {
            ParamValue::Bool(v) => Ok(*v),
            ParamValue::Int(v) => Ok(*v != 0),
            _ => Err(mismatch("bool", value)),
        }
    }
}

impl FromParamValue for String {
    fn from_param_value(value: &ParamValue) -> Result<Self, MatchError> {
        match value {
            ParamValue::String(s) => Ok(s.clone()),
            ParamValue::Int(v) => Ok(v.to_string()),
            ParamValue::Float(v) => Ok(v.to_string()),
            ParamValue::Bool(v) => Ok(v.to_string()),
            ParamValue::Null => Err(mismatch("String", value)),
        }
    }
}

/// Ordinal alarm severity of a parameter or cell.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmLevel {
    Undefined = 0,
    Normal = 1,
    Minor = 2,
    Major = 3,
    Critical = 4,
    Warning = 5,
    Timeout = 6,
    Initial = 7,
    Masked = 8,
    Error = 9,
    Notice = 10,
    Suggestion = 11,
}

impl AlarmLevel {
    /// Numeric severity ordinal.
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        self as u8
    }
}

/// One table row: primary key plus cell values by column id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    /// Primary key.
    pub key: String,
    /// Cell values by column parameter id.
    pub cells: BTreeMap<i32, ParamValue>,
}

impl TableRow {
    /// Creates an empty row.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            cells: BTreeMap::new(),
        }
    }

    /// Adds a cell value.
    #[must_use]
    pub fn with_cell(mut self, column_id: i32, value: impl Into<ParamValue>) -> Self {
        self.cells.insert(column_id, value.into());
        self
    }

    /// Returns the value of a cell, if present.
    #[must_use]
    pub fn cell(&self, column_id: i32) -> Option<&ParamValue> {
        self.cells.get(&column_id)
    }
}
