//! Column properties kept in a worksheet's `<cols>` element.
//!
//! Each `<col>` covers the span `min..=max`. Asking for one column of a wider span splits the
//! span so the returned node covers that column alone; the neighbours keep their properties.

use gridbook_model::MAX_COLS;

use crate::sheet_data::{found_or_insert, Slot};
use crate::xml::{XmlDocument, XmlElement, XmlNode};
use crate::XlsxError;

/// Width given to a column node created only to carry other properties.
const DEFAULT_COLUMN_WIDTH: f64 = 9.140625;
const MAX_COLUMN_WIDTH: f64 = 255.0;

/// Elements that precede `<cols>` in a worksheet.
const BEFORE_COLS: &[&str] = &["sheetPr", "dimension", "sheetViews", "sheetFormatPr"];

fn span(col: &XmlElement) -> Option<(u32, u32)> {
    let min: u32 = col.attr("min")?.parse().ok()?;
    let max = col
        .attr("max")
        .and_then(|max| max.parse().ok())
        .unwrap_or(min);
    Some((min, max.max(min)))
}

fn col_spans(cols: &XmlElement) -> impl Iterator<Item = (usize, u32, u32)> + '_ {
    cols.children.iter().enumerate().filter_map(|(idx, node)| {
        let el = node.as_element().filter(|el| el.is("col"))?;
        let (min, max) = span(el)?;
        Some((idx, min, max))
    })
}

fn with_span(col: &XmlElement, min: u32, max: u32) -> XmlElement {
    let mut el = col.clone();
    el.set_attr("min", min.to_string());
    el.set_attr("max", max.to_string());
    el
}

/// The `<cols>` element, inserted ahead of `<sheetData>` if the sheet has none.
pub(crate) fn cols_mut(doc: &mut XmlDocument) -> &mut XmlElement {
    let root = &mut doc.root;
    if root.position("cols").is_none() {
        let idx = root
            .children
            .iter()
            .rposition(|node| {
                node.as_element()
                    .is_some_and(|el| BEFORE_COLS.contains(&el.local_name()))
            })
            .map(|idx| idx + 1)
            .unwrap_or(0);
        let el = root.make_child("cols");
        root.insert_child(idx, el);
    }
    root.child_or_insert("cols")
}

/// The `<col>` covering `number`, if any.
pub(crate) fn find_column(cols: &XmlElement, number: u32) -> Option<&XmlElement> {
    let (idx, _, _) = col_spans(cols).find(|&(_, min, max)| (min..=max).contains(&number))?;
    cols.children.get(idx).and_then(XmlNode::as_element)
}

/// The `<col>` covering exactly `number`, splitting a wider span or inserting a new node.
pub(crate) fn column_node(cols: &mut XmlElement, number: u32) -> &mut XmlElement {
    let covering = col_spans(cols).find(|&(_, _, max)| max >= number);
    let slot = match covering {
        Some((idx, min, max)) if min == number && max == number => Slot::Found(idx),
        Some((idx, min, max)) if min <= number => {
            let original = match cols.children.remove(idx) {
                XmlNode::Element(el) => el,
                XmlNode::Text(_) => unreachable!("col_spans only reports elements"),
            };
            let mut at = idx;
            if min < number {
                cols.insert_child(at, with_span(&original, min, number - 1));
                at += 1;
            }
            if max > number {
                cols.insert_child(at, with_span(&original, number + 1, max));
            }
            return cols.insert_child(at, with_span(&original, number, number));
        }
        Some((idx, _, _)) => Slot::Vacant(idx),
        None => Slot::Vacant(cols.children.len()),
    };
    found_or_insert(cols, slot, |parent| {
        parent
            .make_child("col")
            .with_attr("min", number.to_string())
            .with_attr("max", number.to_string())
            .with_attr("width", format!("{DEFAULT_COLUMN_WIDTH:?}"))
    })
}

pub(crate) fn check_column(number: u32) -> Result<u32, XlsxError> {
    if number == 0 || number > MAX_COLS {
        return Err(gridbook_model::ReferenceError::ColumnOutOfBounds(number).into());
    }
    Ok(number)
}

fn flag(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true"))
}

/// Width of a `<col>` when it carries one.
pub(crate) fn column_width(col: &XmlElement) -> Option<f64> {
    col.attr("width").and_then(|width| width.parse().ok())
}

pub(crate) fn column_hidden(col: &XmlElement) -> bool {
    flag(col.attr("hidden"))
}

/// One column of a worksheet.
pub struct Column<'a> {
    node: &'a mut XmlElement,
    number: u32,
}

impl<'a> Column<'a> {
    pub(crate) fn new(node: &'a mut XmlElement, number: u32) -> Self {
        Self { node, number }
    }

    /// 1-based column number.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Width in characters of the default font.
    pub fn width(&self) -> Option<f64> {
        column_width(self.node)
    }

    pub fn set_width(&mut self, width: f64) -> Result<(), XlsxError> {
        if !(0.0..=MAX_COLUMN_WIDTH).contains(&width) {
            return Err(XlsxError::Invalid(format!(
                "column {}: width {width} outside 0..={MAX_COLUMN_WIDTH}",
                self.number
            )));
        }
        self.node.set_attr("width", format!("{width:?}"));
        self.node.set_attr("customWidth", "1");
        Ok(())
    }

    pub fn is_hidden(&self) -> bool {
        column_hidden(self.node)
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        if hidden {
            self.node.set_attr("hidden", "1");
        } else {
            self.node.remove_attr("hidden");
        }
    }
}

impl std::fmt::Debug for Column<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column").field("number", &self.number).finish_non_exhaustive()
    }
}
