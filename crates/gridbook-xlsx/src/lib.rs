//! Read/write engine for XLSX workbooks.
//!
//! The crate is layered:
//!
//! - [`Package`]: the archive as a map of part name -> markup tree, parsed on first access and
//!   written back byte-for-byte unless modified. Relationship parts and `[Content_Types].xml`
//!   are edited through [`Package::relationships_mut`] and [`Package::content_types_mut`].
//! - [`SharedStrings`]: the append-only interned string table.
//! - [`Worksheet`], [`Row`], [`Range`] and [`Cell`]: borrowing façades over one worksheet's
//!   `<sheetData>`. Methods named `cell`/`row` create nodes on demand; `find_*` never do.
//!   [`Column`] and the worksheet's merge methods cover `<cols>` and `<mergeCells>`.
//! - [`Workbook`]: the sheet registry. Every registry edit runs as one command that either
//!   updates all affected parts or none of them.
//! - [`Document`]: open/create/save/close and document properties.
//!
//! ```no_run
//! use gridbook_xlsx::{CellValue, Document};
//!
//! let mut doc = Document::create("report.xlsx")?;
//! doc.worksheet("Sheet1")?.cell("B2")?.set_value(42);
//! doc.workbook()?.rename_sheet("Sheet1", "Data")?;
//! doc.save()?;
//!
//! let doc = Document::open("report.xlsx")?;
//! assert_eq!(doc.sheet_names()?, ["Data"]);
//! # let _ = CellValue::Empty;
//! # Ok::<(), gridbook_xlsx::XlsxError>(())
//! ```

mod cell;
mod column;
mod content_types;
mod document;
mod error;
mod merge;
mod options;
mod package;
pub mod path;
mod properties;
mod range;
mod relationships;
mod row;
mod shared_strings;
pub mod sheet_data;
mod template;
mod workbook;
mod worksheet;
pub mod xml;

pub use cell::{Cell, CellView};
pub use column::Column;
pub use content_types::{ContentType, ContentTypes, ContentTypesMut};
pub use document::Document;
pub use error::{ArchiveError, XlsxError};
pub use options::{
    Compression, OpenOptions, SaveOptions, DEFAULT_MAX_PART_BYTES, DEFAULT_MAX_TOTAL_BYTES,
};
pub use package::{Package, Snapshot};
pub use properties::Property;
pub use range::{Range, RangeCursor, RangeValues};
pub use relationships::{
    next_relationship_id, parse_relationships, Relationship, RelationshipType, Relationships,
    RelationshipsMut,
};
pub use row::Row;
pub use shared_strings::SharedStrings;
pub use workbook::{
    quote_sheet_name, rename_sheet_in_formula, validate_sheet_name, DefinedName, SheetInfo,
    SheetKind, SheetVisibility, Workbook, MAX_SHEET_NAME_LEN,
};
pub use worksheet::Worksheet;

pub use gridbook_model::{
    CellRange, CellReference, CellValue, DateTime, DateTimeError, FromCellValue, ReferenceError,
    ValueType, ValueTypeMismatch, MAX_COLS, MAX_ROWS,
};
