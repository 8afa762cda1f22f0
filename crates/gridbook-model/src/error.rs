use thiserror::Error;

use crate::ValueType;

/// A cell address or coordinate pair that does not name a cell on the sheet.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("invalid cell address: {0:?}")]
    InvalidAddress(String),
    #[error("invalid column name: {0:?}")]
    InvalidColumnName(String),
    #[error("row {0} is outside 1..=1048576")]
    RowOutOfBounds(u32),
    #[error("column {0} is outside 1..=16384")]
    ColumnOutOfBounds(u32),
    #[error("empty cell reference")]
    EmptyReference,
}

/// A typed read asked for a different type than the one stored.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[error("value type mismatch: expected {expected}, found {actual}")]
pub struct ValueTypeMismatch {
    pub expected: ValueType,
    pub actual: ValueType,
}

/// A date or serial number outside what a cell can hold as a date.
#[derive(Copy, Clone, Debug, PartialEq, Error)]
pub enum DateTimeError {
    #[error("date serial {0} is outside 1..2958466")]
    SerialOutOfRange(f64),
    #[error("{0} is outside 1900-01-01..=9999-12-31")]
    DateOutOfRange(chrono::NaiveDateTime),
    #[error("serial 60 is 1900-02-29, which has no calendar date")]
    PhantomLeapDay,
}
