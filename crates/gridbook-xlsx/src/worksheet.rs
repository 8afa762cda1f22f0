use gridbook_model::{CellRange, CellReference, CellValue, ReferenceError, MAX_ROWS};

use crate::cell::{read_value, Cell, CellView};
use crate::column::{
    check_column, cols_mut, column_hidden, column_node, column_width, find_column, Column,
};
use crate::merge::{add_merge, merge_containing, merged_ranges, remove_merge};
use crate::range::{Range, RangeValues};
use crate::package::TrackedPart;
use crate::row::Row;
use crate::shared_strings::SharedStrings;
use crate::sheet_data::{
    assign_implicit_positions, cell_node_in_sheet, find_cell_in_sheet, find_row_mut,
    has_implicit_positions, last_column, last_row, row_node, used_range,
};
use crate::xml::{XmlDocument, XmlElement};
use crate::XlsxError;

/// Elements that precede `<sheetData>` in a worksheet.
const BEFORE_SHEET_DATA: &[&str] = &["sheetPr", "dimension", "sheetViews", "sheetFormatPr", "cols"];

/// The `<sheetData>` container, inserted at its schema position if the part lacks one.
pub(crate) fn sheet_data_mut(doc: &mut XmlDocument) -> &mut XmlElement {
    let root = &mut doc.root;
    if root.position("sheetData").is_none() {
        let idx = root
            .children
            .iter()
            .rposition(|node| {
                node.as_element()
                    .is_some_and(|el| BEFORE_SHEET_DATA.contains(&el.local_name()))
            })
            .map(|idx| idx + 1)
            .unwrap_or(0);
        let el = root.make_child("sheetData");
        root.insert_child(idx, el);
    }
    root.child_or_insert("sheetData")
}

/// Point `<dimension ref>` at the used range (`A1` for an empty sheet).
pub(crate) fn refresh_dimension(doc: &mut XmlDocument) {
    let reference = doc
        .root
        .child("sheetData")
        .and_then(used_range)
        .map(|range| {
            if range.num_rows() == 1 && range.num_columns() == 1 {
                range.top_left().address()
            } else {
                range.to_string()
            }
        })
        .unwrap_or_else(|| "A1".to_string());
    let root = &mut doc.root;
    if let Some(dimension) = root.child_mut("dimension") {
        dimension.set_attr("ref", reference);
        return;
    }
    let idx = root.position("sheetPr").map(|idx| idx + 1).unwrap_or(0);
    let el = root.make_child("dimension").with_attr("ref", reference);
    root.insert_child(idx, el);
}

fn checked(reference: CellReference) -> Result<CellReference, XlsxError> {
    if reference.is_empty() {
        return Err(ReferenceError::EmptyReference.into());
    }
    Ok(reference)
}

/// A worksheet borrowed from its [`Document`](crate::Document).
///
/// Only the creating and mutating accessors mark the part as edited; a sheet that is merely
/// read is written back unchanged.
pub struct Worksheet<'a> {
    part: TrackedPart<'a>,
    shared_strings: &'a mut SharedStrings,
    name: String,
}

impl<'a> Worksheet<'a> {
    pub(crate) fn new(
        mut part: TrackedPart<'a>,
        shared_strings: &'a mut SharedStrings,
        name: impl Into<String>,
    ) -> Self {
        let implicit = part
            .doc()
            .root
            .child("sheetData")
            .is_some_and(has_implicit_positions);
        if implicit {
            assign_implicit_positions(sheet_data_mut(part.edit()));
        }
        Self {
            part,
            shared_strings,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn sheet_data(&self) -> Option<&XmlElement> {
        self.part.doc().root.child("sheetData")
    }

    /// The cell at `address`, created if absent.
    pub fn cell(&mut self, address: &str) -> Result<Cell<'_>, XlsxError> {
        self.cell_ref(CellReference::from_address(address)?)
    }

    /// The cell at 1-based `(row, column)`, created if absent.
    pub fn cell_at(&mut self, row: u32, column: u32) -> Result<Cell<'_>, XlsxError> {
        self.cell_ref(CellReference::try_new(row, column)?)
    }

    pub fn cell_ref(&mut self, reference: CellReference) -> Result<Cell<'_>, XlsxError> {
        let reference = checked(reference)?;
        let node = cell_node_in_sheet(sheet_data_mut(self.part.edit()), reference);
        Ok(Cell::new(node, self.shared_strings, reference))
    }

    /// Non-creating lookup; `None` when no node exists at `address`.
    pub fn find_cell(&self, address: &str) -> Result<Option<CellView<'_>>, XlsxError> {
        let reference = CellReference::from_address(address)?;
        Ok(self.find_cell_ref(reference))
    }

    pub fn find_cell_ref(&self, reference: CellReference) -> Option<CellView<'_>> {
        let node = find_cell_in_sheet(self.sheet_data()?, reference)?;
        Some(CellView::new(node, self.shared_strings, reference))
    }

    /// Value at `address` without creating a node; absent cells read as `Empty`.
    pub fn value(&self, address: &str) -> Result<CellValue, XlsxError> {
        match self.find_cell(address)? {
            Some(cell) => cell.value(),
            None => Ok(CellValue::Empty),
        }
    }

    /// The row numbered `number`, created if absent.
    pub fn row(&mut self, number: u32) -> Result<Row<'_>, XlsxError> {
        if number == 0 || number > MAX_ROWS {
            return Err(ReferenceError::RowOutOfBounds(number).into());
        }
        let node = row_node(sheet_data_mut(self.part.edit()), number);
        Ok(Row::new(node, self.shared_strings, number))
    }

    pub fn find_row(&mut self, number: u32) -> Option<Row<'_>> {
        let node = find_row_mut(sheet_data_mut(self.part.edit()), number)?;
        Some(Row::new(node, self.shared_strings, number))
    }

    pub fn range(
        &mut self,
        top_left: CellReference,
        bottom_right: CellReference,
    ) -> Result<Range<'_>, XlsxError> {
        let bounds = CellRange::new(top_left, bottom_right)?;
        Ok(Range::new(
            sheet_data_mut(self.part.edit()),
            self.shared_strings,
            bounds,
        ))
    }

    /// A range from `"A1:C3"` notation (a single address is a 1x1 range).
    pub fn range_a1(&mut self, a1: &str) -> Result<Range<'_>, XlsxError> {
        let bounds = CellRange::from_a1(a1)?;
        self.range(bounds.top_left(), bounds.bottom_right())
    }

    /// Values of `bounds` without creating nodes.
    pub fn range_values(&self, bounds: CellRange) -> Result<RangeValues, XlsxError> {
        let mut rows = Vec::with_capacity(bounds.num_rows() as usize);
        let mut current = Vec::with_capacity(bounds.num_columns() as usize);
        for reference in bounds.iter() {
            let value = match self.sheet_data().and_then(|data| find_cell_in_sheet(data, reference)) {
                Some(node) => read_value(node, self.shared_strings)?,
                None => CellValue::Empty,
            };
            current.push(value);
            if current.len() == bounds.num_columns() as usize {
                rows.push(std::mem::take(&mut current));
            }
        }
        Ok(RangeValues::from_rows(rows))
    }

    /// Value-only copy between two equally shaped ranges of this sheet. Overlap is allowed.
    pub fn copy_range(&mut self, source: CellRange, target: CellRange) -> Result<(), XlsxError> {
        let values = self.range_values(source)?;
        self.range(target.top_left(), target.bottom_right())?.assign(&values)
    }

    pub fn last_row(&self) -> Option<u32> {
        self.sheet_data().and_then(last_row)
    }

    pub fn last_column(&self) -> Option<u32> {
        self.sheet_data().and_then(last_column)
    }

    /// Smallest range covering every cell node, empty ones included.
    pub fn used_range(&self) -> Option<CellRange> {
        self.sheet_data().and_then(used_range)
    }

    pub fn update_dimension(&mut self) {
        refresh_dimension(self.part.edit());
    }

    /// Properties of column `number` (1-based), given their own `<col>` node if needed.
    pub fn column(&mut self, number: u32) -> Result<Column<'_>, XlsxError> {
        let number = check_column(number)?;
        let node = column_node(cols_mut(self.part.edit()), number);
        Ok(Column::new(node, number))
    }

    /// Width of column `number` when the sheet records one.
    pub fn column_width(&self, number: u32) -> Option<f64> {
        let cols = self.part.doc().root.child("cols")?;
        find_column(cols, number).and_then(column_width)
    }

    pub fn is_column_hidden(&self, number: u32) -> bool {
        self.part
            .doc()
            .root
            .child("cols")
            .and_then(|cols| find_column(cols, number))
            .is_some_and(column_hidden)
    }

    /// Merged ranges in document order.
    pub fn merges(&self) -> Vec<CellRange> {
        merged_ranges(&self.part.doc().root)
    }

    /// Merge `range`. Cell contents are left as they are.
    pub fn merge(&mut self, range: CellRange) -> Result<(), XlsxError> {
        add_merge(&mut self.part.edit().root, range)
    }

    /// Remove the merge equal to `range`; `false` if there is none.
    pub fn unmerge(&mut self, range: CellRange) -> bool {
        if !self.merges().contains(&range) {
            return false;
        }
        remove_merge(&mut self.part.edit().root, range)
    }

    pub fn merge_containing(&self, reference: CellReference) -> Option<CellRange> {
        merge_containing(&self.part.doc().root, reference)
    }
}

impl std::fmt::Debug for Worksheet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worksheet").field("name", &self.name).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sheet(xml: &str) -> XmlDocument {
        XmlDocument::parse(xml.as_bytes()).unwrap()
    }

    #[test]
    fn missing_sheet_data_is_inserted_after_sheet_views() {
        let mut doc = sheet(
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1"/><sheetViews/><pageMargins/></worksheet>"#,
        );
        let mut shared = SharedStrings::new("xl/sharedStrings.xml");
        let mut dirty = false;
        let mut ws = Worksheet::new(TrackedPart::new(&mut doc, &mut dirty), &mut shared, "S");
        ws.cell("B3").unwrap().set_value(7);
        let names: Vec<&str> = doc.root.elements().map(XmlElement::local_name).collect();
        assert_eq!(names, ["dimension", "sheetViews", "sheetData", "pageMargins"]);
    }

    #[test]
    fn find_cell_does_not_allocate() {
        let mut doc = sheet(r#"<worksheet><sheetData/></worksheet>"#);
        let mut shared = SharedStrings::new("xl/sharedStrings.xml");
        let mut dirty = false;
        let ws = Worksheet::new(TrackedPart::new(&mut doc, &mut dirty), &mut shared, "S");
        assert!(ws.find_cell("E5").unwrap().is_none());
        assert_eq!(ws.value("E5").unwrap(), CellValue::Empty);
        assert_eq!(ws.last_row(), None);
        assert!(doc.root.child("sheetData").unwrap().children.is_empty());
    }

    #[test]
    fn invalid_addresses_are_rejected() {
        let mut doc = sheet(r#"<worksheet><sheetData/></worksheet>"#);
        let mut shared = SharedStrings::new("xl/sharedStrings.xml");
        let mut dirty = false;
        let mut ws = Worksheet::new(TrackedPart::new(&mut doc, &mut dirty), &mut shared, "S");
        assert!(matches!(ws.cell("A0"), Err(XlsxError::InvalidReference(_))));
        assert!(matches!(ws.cell_at(1, 16_385), Err(XlsxError::InvalidReference(_))));
        assert!(matches!(ws.cell_ref(CellReference::EMPTY), Err(XlsxError::InvalidReference(_))));
        assert!(ws.row(0).is_err());
    }

    #[test]
    fn implicit_positions_are_numbered_on_access() {
        let mut doc = sheet(
            r#"<worksheet><sheetData><row><c><v>1</v></c><c><v>2</v></c></row><row><c><v>3</v></c></row></sheetData></worksheet>"#,
        );
        let mut shared = SharedStrings::new("xl/sharedStrings.xml");
        let mut dirty = false;
        let ws = Worksheet::new(TrackedPart::new(&mut doc, &mut dirty), &mut shared, "S");
        assert_eq!(ws.value("B1").unwrap(), CellValue::Integer(2));
        assert_eq!(ws.value("A2").unwrap(), CellValue::Integer(3));
        assert_eq!(ws.used_range(), Some(CellRange::from_a1("A1:B2").unwrap()));
    }

    #[test]
    fn only_mutating_access_marks_the_part_edited() {
        let mut doc = sheet(r#"<worksheet><sheetData><row r="1"><c r="A1"><v>1</v></c></row></sheetData></worksheet>"#);
        let mut shared = SharedStrings::new("xl/sharedStrings.xml");
        let mut dirty = false;
        {
            let ws = Worksheet::new(TrackedPart::new(&mut doc, &mut dirty), &mut shared, "S");
            assert_eq!(ws.value("A1").unwrap(), CellValue::Integer(1));
            assert_eq!(ws.range_values(CellRange::from_a1("A1:B2").unwrap()).unwrap().shape(), (2, 2));
            assert_eq!(ws.used_range(), Some(CellRange::from_a1("A1").unwrap()));
            assert!(ws.merges().is_empty());
            assert_eq!(ws.column_width(1), None);
            assert!(!ws.is_column_hidden(1));
        }
        assert!(!dirty);

        let mut ws = Worksheet::new(TrackedPart::new(&mut doc, &mut dirty), &mut shared, "S");
        ws.cell("A1").unwrap();
        drop(ws);
        assert!(dirty);
    }

    #[test]
    fn implicit_positions_mark_the_part_edited() {
        let mut doc = sheet(r#"<worksheet><sheetData><row><c><v>1</v></c></row></sheetData></worksheet>"#);
        let mut shared = SharedStrings::new("xl/sharedStrings.xml");
        let mut dirty = false;
        Worksheet::new(TrackedPart::new(&mut doc, &mut dirty), &mut shared, "S");
        assert!(dirty);
        let row = doc.root.child("sheetData").unwrap().child("row").unwrap();
        assert_eq!(row.attr("r"), Some("1"));
    }

    #[test]
    fn copy_range_copies_values_only() {
        let mut doc = sheet(r#"<worksheet><sheetData/></worksheet>"#);
        let mut shared = SharedStrings::new("xl/sharedStrings.xml");
        let mut dirty = false;
        let mut ws = Worksheet::new(TrackedPart::new(&mut doc, &mut dirty), &mut shared, "S");
        ws.cell("A1").unwrap().set_value("a");
        ws.cell("B2").unwrap().set_value(2);
        ws.cell("D1").unwrap().set_formula("A1").unwrap();

        let source = CellRange::from_a1("A1:B2").unwrap();
        ws.copy_range(source, CellRange::from_a1("C1:D2").unwrap()).unwrap();
        assert_eq!(ws.value("C1").unwrap(), CellValue::from("a"));
        assert_eq!(ws.value("D2").unwrap(), CellValue::Integer(2));
        assert_eq!(
            ws.find_cell("D1").unwrap().unwrap().formula().unwrap().as_deref(),
            Some("A1")
        );

        let err = ws
            .copy_range(source, CellRange::from_a1("A5:C7").unwrap())
            .unwrap_err();
        assert!(matches!(err, XlsxError::RangeShapeMismatch { .. }));
    }

    #[test]
    fn dimension_tracks_used_range() {
        let mut doc = sheet(r#"<worksheet><dimension ref="A1"/><sheetData/></worksheet>"#);
        let mut shared = SharedStrings::new("xl/sharedStrings.xml");
        let mut dirty = false;
        let mut ws = Worksheet::new(TrackedPart::new(&mut doc, &mut dirty), &mut shared, "S");
        ws.update_dimension();
        ws.cell("C4").unwrap().set_value(true);
        ws.cell("B2").unwrap().set_value(1);
        ws.update_dimension();
        assert_eq!(doc.root.child("dimension").unwrap().attr("ref"), Some("B2:C4"));
    }

    #[test]
    fn rows_expose_attributes_and_values() {
        let mut doc = sheet(r#"<worksheet><sheetData/></worksheet>"#);
        let mut shared = SharedStrings::new("xl/sharedStrings.xml");
        let mut dirty = false;
        let mut ws = Worksheet::new(TrackedPart::new(&mut doc, &mut dirty), &mut shared, "S");
        ws.row(3).unwrap().set_values([1, 2, 3]).unwrap();
        assert!(ws.find_row(2).is_none());
        let row = ws.find_row(3).unwrap();
        assert_eq!(row.cell_count(), 3);
        assert_eq!(ws.last_column(), Some(3));
        assert_eq!(ws.last_row(), Some(3));
    }
}
