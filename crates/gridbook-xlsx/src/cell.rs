use chrono::{NaiveDate, NaiveDateTime};
use gridbook_model::{infer, CellReference, CellValue, DateTime, FromCellValue, ValueType};

use crate::shared_strings::SharedStrings;
use crate::xml::XmlElement;
use crate::XlsxError;

/// `t="d"` cells carry an ISO 8601 timestamp; they read as the equivalent date serial.
fn iso_date_value(text: String) -> CellValue {
    let trimmed = text.trim().trim_end_matches('Z');
    let parsed = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        });
    match parsed.map(DateTime::from_naive) {
        Some(Ok(dt)) => dt.into(),
        _ => {
            log::warn!("unreadable ISO 8601 cell value {text:?}; keeping it as text");
            CellValue::String(text)
        }
    }
}

/// Decode the value stored in a `<c>` node.
pub(crate) fn read_value(cell: &XmlElement, shared: &SharedStrings) -> Result<CellValue, XlsxError> {
    let kind = cell.attr("t");
    if kind == Some("inlineStr") {
        return Ok(match cell.child("is") {
            Some(is) => CellValue::String(inline_text(is)),
            None => CellValue::Empty,
        });
    }

    let Some(v) = cell.child("v") else {
        return Ok(CellValue::Empty);
    };
    let text = v.text();
    let address = || cell.attr("r").unwrap_or("?").to_string();

    Ok(match kind {
        None | Some("n") => parse_number(&text),
        Some("s") => {
            let index: u32 = text.trim().parse().map_err(|_| {
                XlsxError::Invalid(format!("{}: bad shared string index {text:?}", address()))
            })?;
            let s = shared.get(index).ok_or_else(|| {
                XlsxError::Invalid(format!(
                    "{}: shared string index {index} out of range ({} entries)",
                    address(),
                    shared.len()
                ))
            })?;
            CellValue::String(s.to_string())
        }
        Some("str") => CellValue::String(text),
        Some("d") => iso_date_value(text),
        Some("b") => match text.trim() {
            "1" | "true" => CellValue::Boolean(true),
            "0" | "false" => CellValue::Boolean(false),
            other => {
                return Err(XlsxError::Invalid(format!(
                    "{}: bad boolean value {other:?}",
                    address()
                )))
            }
        },
        Some("e") => CellValue::Error(text),
        Some(other) => {
            log::warn!("{}: unknown cell type {other:?}; inferring from text", address());
            infer(&text)
        }
    })
}

fn inline_text(is: &XmlElement) -> String {
    if let Some(t) = is.child("t") {
        return t.text();
    }
    is.children_named("r")
        .filter_map(|run| run.child("t"))
        .map(XmlElement::text)
        .collect()
}

/// Numbers without a type marker. Anything that does not parse goes through the tokenizer.
fn parse_number(text: &str) -> CellValue {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return CellValue::Empty;
    }
    if !trimmed.contains(['.', 'e', 'E']) {
        if let Ok(n) = trimmed.parse::<i64>() {
            return CellValue::Integer(n);
        }
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() => CellValue::Float(f),
        _ => infer(trimmed),
    }
}

/// Shortest text that reads back as the same `f64` and still looks like a float (`2.0`, `1e-7`).
fn format_float(value: f64) -> String {
    format!("{value:?}")
}

fn set_value_text(cell: &mut XmlElement, text: String) {
    if let Some(v) = cell.child_mut("v") {
        v.set_text(text);
        return;
    }
    let v = cell.make_child("v").with_text(text);
    // `<f>` precedes `<v>`.
    let idx = cell.position("f").map(|idx| idx + 1).unwrap_or(0);
    cell.insert_child(idx, v);
}

/// Encode `value` into a `<c>` node. Strings are interned in `shared`.
pub(crate) fn write_value(cell: &mut XmlElement, value: &CellValue, shared: &mut SharedStrings) {
    cell.remove_children("is");
    match value {
        CellValue::Empty => {
            cell.remove_attr("t");
            cell.remove_children("v");
        }
        CellValue::Boolean(b) => {
            cell.set_attr("t", "b");
            set_value_text(cell, if *b { "1" } else { "0" }.to_string());
        }
        CellValue::Integer(n) => {
            cell.remove_attr("t");
            set_value_text(cell, n.to_string());
        }
        CellValue::Float(f) if f.is_finite() => {
            cell.remove_attr("t");
            set_value_text(cell, format_float(*f));
        }
        CellValue::Float(_) => {
            cell.set_attr("t", "e");
            set_value_text(cell, gridbook_model::NUM_ERROR.to_string());
        }
        CellValue::String(s) => {
            let index = shared.intern(s);
            cell.set_attr("t", "s");
            set_value_text(cell, index.to_string());
        }
        CellValue::Error(code) => {
            cell.set_attr("t", "e");
            set_value_text(cell, code.clone());
        }
    }
}

fn check_formula_kind(cell: &XmlElement, f: &XmlElement) -> Result<(), XlsxError> {
    match f.attr("t") {
        None | Some("normal") => Ok(()),
        Some(kind) => Err(XlsxError::UnsupportedFormula {
            cell: cell.attr("r").unwrap_or("?").to_string(),
            kind: kind.to_string(),
        }),
    }
}

pub(crate) fn read_formula(cell: &XmlElement) -> Result<Option<String>, XlsxError> {
    match cell.child("f") {
        Some(f) => {
            check_formula_kind(cell, f)?;
            Ok(Some(f.text()))
        }
        None => Ok(None),
    }
}

pub(crate) fn write_formula(cell: &mut XmlElement, formula: &str) -> Result<(), XlsxError> {
    if let Some(f) = cell.child("f") {
        check_formula_kind(cell, f)?;
    }
    let formula = formula.strip_prefix('=').unwrap_or(formula);
    if let Some(f) = cell.child_mut("f") {
        f.set_text(formula);
        return Ok(());
    }
    cell.remove_children("is");
    if cell.attr("t") == Some("inlineStr") {
        cell.remove_attr("t");
    }
    let f = cell.make_child("f").with_text(formula);
    cell.insert_child(0, f);
    Ok(())
}

pub(crate) fn remove_formula(cell: &mut XmlElement) -> Result<bool, XlsxError> {
    if let Some(f) = cell.child("f") {
        check_formula_kind(cell, f)?;
    }
    Ok(cell.remove_children("f") > 0)
}

/// A cell that exists in the sheet, with write access.
///
/// Holds the worksheet borrowed; it cannot outlive or coexist with other edits to the same sheet.
pub struct Cell<'a> {
    node: &'a mut XmlElement,
    shared_strings: &'a mut SharedStrings,
    reference: CellReference,
}

/// Read-only view of a cell node.
#[derive(Clone, Copy)]
pub struct CellView<'a> {
    node: &'a XmlElement,
    shared_strings: &'a SharedStrings,
    reference: CellReference,
}

impl<'a> Cell<'a> {
    pub(crate) fn new(
        node: &'a mut XmlElement,
        shared_strings: &'a mut SharedStrings,
        reference: CellReference,
    ) -> Self {
        Self {
            node,
            shared_strings,
            reference,
        }
    }

    pub fn reference(&self) -> CellReference {
        self.reference
    }

    pub fn value(&self) -> Result<CellValue, XlsxError> {
        read_value(self.node, self.shared_strings)
    }

    pub fn value_type(&self) -> Result<ValueType, XlsxError> {
        Ok(self.value()?.value_type())
    }

    /// Typed read; fails with `ValueTypeMismatch` rather than coercing.
    pub fn get<T: FromCellValue>(&self) -> Result<T, XlsxError> {
        Ok(self.value()?.get::<T>()?)
    }

    pub fn set_value(&mut self, value: impl Into<CellValue>) {
        write_value(self.node, &value.into(), self.shared_strings);
    }

    /// Make the value empty. The node itself stays.
    pub fn clear(&mut self) {
        write_value(self.node, &CellValue::Empty, self.shared_strings);
    }

    pub fn has_formula(&self) -> bool {
        self.node.child("f").is_some()
    }

    /// Formula text without a leading `=`.
    pub fn formula(&self) -> Result<Option<String>, XlsxError> {
        read_formula(self.node)
    }

    /// Store a formula (a leading `=` is dropped). Formulas are kept as text, never evaluated.
    pub fn set_formula(&mut self, formula: &str) -> Result<(), XlsxError> {
        write_formula(self.node, formula)
    }

    pub fn clear_formula(&mut self) -> Result<bool, XlsxError> {
        remove_formula(self.node)
    }

    pub fn as_view(&self) -> CellView<'_> {
        CellView {
            node: self.node,
            shared_strings: self.shared_strings,
            reference: self.reference,
        }
    }
}

impl<'a> CellView<'a> {
    pub(crate) fn new(
        node: &'a XmlElement,
        shared_strings: &'a SharedStrings,
        reference: CellReference,
    ) -> Self {
        Self {
            node,
            shared_strings,
            reference,
        }
    }

    pub fn reference(&self) -> CellReference {
        self.reference
    }

    pub fn value(&self) -> Result<CellValue, XlsxError> {
        read_value(self.node, self.shared_strings)
    }

    pub fn value_type(&self) -> Result<ValueType, XlsxError> {
        Ok(self.value()?.value_type())
    }

    pub fn get<T: FromCellValue>(&self) -> Result<T, XlsxError> {
        Ok(self.value()?.get::<T>()?)
    }

    pub fn has_formula(&self) -> bool {
        self.node.child("f").is_some()
    }

    pub fn formula(&self) -> Result<Option<String>, XlsxError> {
        read_formula(self.node)
    }
}

impl std::fmt::Debug for Cell<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("reference", &self.reference)
            .field("node", &self.node)
            .finish()
    }
}

impl std::fmt::Debug for CellView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellView")
            .field("reference", &self.reference)
            .field("node", &self.node)
            .finish()
    }
}
