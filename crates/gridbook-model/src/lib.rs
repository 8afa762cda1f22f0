//! `gridbook-model` holds the format-independent pieces of a spreadsheet cell:
//! - A1 addressing (`B12` <-> `(12, 2)`) and rectangular ranges
//! - the tagged [`CellValue`] type with checked typed reads
//! - text tokenization used when stored values carry no type marker
//! - date serial numbers ([`DateTime`])

mod address;
mod datetime;
mod error;
pub mod tokenize;
mod value;

pub use address::{
    column_name_to_number, column_number_to_name, coordinates_from_address, to_address,
    CellRange, CellReference, MAX_COLS, MAX_ROWS,
};
pub use datetime::DateTime;
pub use error::{DateTimeError, ReferenceError, ValueTypeMismatch};
pub use tokenize::{classify, infer};
pub use value::{CellValue, FromCellValue, ValueType, NUM_ERROR};
