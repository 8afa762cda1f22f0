use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ValueTypeMismatch;

/// Error code stored in place of NaN or infinite floating point input.
pub const NUM_ERROR: &str = "#NUM!";

/// The typed content of one cell.
///
/// Uses an explicit `{type, value}` tagged layout when serialized.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    /// No value node.
    #[default]
    Empty,
    Boolean(bool),
    Integer(i64),
    /// Always finite; see [`CellValue::from`] for `f64`.
    Float(f64),
    String(String),
    /// Error code such as `#DIV/0!`.
    Error(String),
}

/// Discriminant of a [`CellValue`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Empty,
    Boolean,
    Integer,
    Float,
    String,
    Error,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueType::Empty => "empty",
            ValueType::Boolean => "boolean",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::String => "string",
            ValueType::Error => "error",
        })
    }
}

impl CellValue {
    pub fn error(code: impl Into<String>) -> Self {
        CellValue::Error(code.into())
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            CellValue::Empty => ValueType::Empty,
            CellValue::Boolean(_) => ValueType::Boolean,
            CellValue::Integer(_) => ValueType::Integer,
            CellValue::Float(_) => ValueType::Float,
            CellValue::String(_) => ValueType::String,
            CellValue::Error(_) => ValueType::Error,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Typed read without numeric coercion: an `Integer` cell does not read as `f64`.
    pub fn get<T: FromCellValue>(&self) -> Result<T, ValueTypeMismatch> {
        T::from_cell_value(self).ok_or(ValueTypeMismatch {
            expected: T::VALUE_TYPE,
            actual: self.value_type(),
        })
    }

    /// Borrow the text of a `String` or `Error` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) | CellValue::Error(s) => Some(s),
            _ => None,
        }
    }

    /// Set from a float, mapping NaN and infinities to `#NUM!`.
    pub fn from_float(value: f64) -> Self {
        if value.is_finite() {
            CellValue::Float(value)
        } else {
            CellValue::Error(NUM_ERROR.to_string())
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Boolean(true) => f.write_str("TRUE"),
            CellValue::Boolean(false) => f.write_str("FALSE"),
            CellValue::Integer(v) => write!(f, "{v}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::String(s) | CellValue::Error(s) => f.write_str(s),
        }
    }
}

/// Types that can be read out of a [`CellValue`] with [`CellValue::get`].
pub trait FromCellValue: Sized {
    const VALUE_TYPE: ValueType;

    fn from_cell_value(value: &CellValue) -> Option<Self>;
}

impl FromCellValue for bool {
    const VALUE_TYPE: ValueType = ValueType::Boolean;

    fn from_cell_value(value: &CellValue) -> Option<Self> {
        match value {
            CellValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromCellValue for i64 {
    const VALUE_TYPE: ValueType = ValueType::Integer;

    fn from_cell_value(value: &CellValue) -> Option<Self> {
        match value {
            CellValue::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromCellValue for f64 {
    const VALUE_TYPE: ValueType = ValueType::Float;

    fn from_cell_value(value: &CellValue) -> Option<Self> {
        match value {
            CellValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromCellValue for String {
    const VALUE_TYPE: ValueType = ValueType::String;

    fn from_cell_value(value: &CellValue) -> Option<Self> {
        match value {
            CellValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Boolean(value)
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for CellValue {
                fn from(value: $ty) -> Self {
                    CellValue::Integer(i64::from(value))
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::from_float(value)
    }
}

impl From<f32> for CellValue {
    fn from(value: f32) -> Self {
        CellValue::from_float(f64::from(value))
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::String(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::String(value.to_string())
    }
}

impl From<&String> for CellValue {
    fn from(value: &String) -> Self {
        CellValue::String(value.clone())
    }
}
