use gridbook_model::{ReferenceError, ValueTypeMismatch};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XlsxError {
    #[error("invalid cell reference: {0}")]
    InvalidReference(#[from] ReferenceError),
    #[error(transparent)]
    ValueTypeMismatch(#[from] ValueTypeMismatch),
    #[error("unsupported formula encoding at {cell}: t=\"{kind}\"")]
    UnsupportedFormula { cell: String, kind: String },
    #[error("a sheet named {0:?} already exists")]
    DuplicateSheetName(String),
    #[error("no sheet named {0:?}")]
    SheetNotFound(String),
    #[error("cannot delete {0:?}: it is the only worksheet")]
    LastWorksheet(String),
    #[error("sheet index {index} is outside 1..={count}")]
    InvalidIndex { index: usize, count: usize },
    #[error("range shape mismatch: {target_rows}x{target_columns} target, {source_rows}x{source_columns} source")]
    RangeShapeMismatch {
        target_rows: u32,
        target_columns: u32,
        source_rows: u32,
        source_columns: u32,
    },
    #[error("cannot merge {range}: {reason}")]
    InvalidMerge { range: String, reason: &'static str },
    #[error("cannot merge {range}: it overlaps the merged range {existing}")]
    MergeOverlap { range: String, existing: String },
    #[error("archive error: {0}")]
    ArchiveIo(#[from] ArchiveError),
    #[error("document is not open")]
    InvalidDocumentState,
    #[error("invalid sheet name {name:?}: {reason}")]
    InvalidSheetName { name: String, reason: &'static str },
    #[error("invalid value {value:?} for property {property}")]
    InvalidPropertyValue { property: &'static str, value: String },
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("missing xlsx part: {0}")]
    MissingPart(String),
    #[error("invalid xlsx: {0}")]
    Invalid(String),
    #[error("xlsx package part is too large to load safely: {part} is {size} bytes (max {max} bytes)")]
    PartTooLarge { part: String, size: u64, max: u64 },
    #[error("xlsx package is too large to load safely: {total} bytes uncompressed (max {max})")]
    PackageTooLarge { total: u64, max: u64 },
}

/// Failures of the archive layer (zip container or filesystem).
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<zip::result::ZipError> for XlsxError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::ArchiveIo(ArchiveError::Zip(err))
    }
}

impl From<std::io::Error> for XlsxError {
    fn from(err: std::io::Error) -> Self {
        Self::ArchiveIo(ArchiveError::Io(err))
    }
}

impl From<std::string::FromUtf8Error> for XlsxError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Self::Utf8(err.utf8_error())
    }
}
