//! Rectangular views over a worksheet's cells.
//!
//! A [`Range`] does not own cells. Iteration re-runs the row/cell lookups for every position,
//! so a cursor can be restarted at any time but must not be held across structural edits of
//! the same sheet (the borrow checker enforces this for edits made through the same document).

use gridbook_model::{CellRange, CellReference, CellValue};

use crate::cell::{read_value, write_value, Cell};
use crate::shared_strings::SharedStrings;
use crate::sheet_data::{cell_node_in_sheet, find_cell_in_sheet};
use crate::xml::XmlElement;
use crate::XlsxError;

/// Upper bound on the up-front allocation in [`Range::values`]; larger ranges grow as they fill.
const MAX_PREALLOCATED_CELLS: usize = 1 << 16;

pub struct Range<'a> {
    sheet_data: &'a mut XmlElement,
    shared_strings: &'a mut SharedStrings,
    bounds: CellRange,
}

/// Values copied out of a range, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct RangeValues {
    num_rows: u32,
    num_columns: u32,
    values: Vec<CellValue>,
}

impl RangeValues {
    /// Build from rows; short rows are padded with `Empty` to the widest row.
    pub fn from_rows(rows: Vec<Vec<CellValue>>) -> Self {
        let num_columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        let num_rows = rows.len();
        let mut values = Vec::with_capacity(num_rows * num_columns);
        for mut row in rows {
            row.resize(num_columns, CellValue::Empty);
            values.extend(row);
        }
        Self {
            num_rows: num_rows as u32,
            num_columns: num_columns as u32,
            values,
        }
    }

    pub fn num_rows(&self) -> u32 {
        self.num_rows
    }

    pub fn num_columns(&self) -> u32 {
        self.num_columns
    }

    pub fn shape(&self) -> (u32, u32) {
        (self.num_rows, self.num_columns)
    }

    /// Zero-based offsets into the block.
    pub fn get(&self, row: u32, column: u32) -> Option<&CellValue> {
        if row >= self.num_rows || column >= self.num_columns {
            return None;
        }
        self.values
            .get(row as usize * self.num_columns as usize + column as usize)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[CellValue]> {
        self.values.chunks(self.num_columns.max(1) as usize)
    }

    pub fn into_rows(self) -> Vec<Vec<CellValue>> {
        let width = self.num_columns.max(1) as usize;
        self.values.chunks(width).map(<[CellValue]>::to_vec).collect()
    }
}

/// Lending cursor over a range, row-major. Each yielded [`Cell`] borrows the cursor.
pub struct RangeCursor<'r> {
    sheet_data: &'r mut XmlElement,
    shared_strings: &'r mut SharedStrings,
    bounds: CellRange,
    next: Option<CellReference>,
}

impl RangeCursor<'_> {
    pub fn next_cell(&mut self) -> Option<Cell<'_>> {
        let reference = self.next?;
        self.next = self.advance(reference);
        let node = cell_node_in_sheet(self.sheet_data, reference);
        Some(Cell::new(node, self.shared_strings, reference))
    }

    /// Start again from the top-left corner.
    pub fn restart(&mut self) {
        self.next = Some(self.bounds.top_left());
    }

    fn advance(&self, current: CellReference) -> Option<CellReference> {
        let top_left = self.bounds.top_left();
        let bottom_right = self.bounds.bottom_right();
        if current.column() < bottom_right.column() {
            Some(current.with_column(current.column() + 1))
        } else if current.row() < bottom_right.row() {
            Some(CellReference::new(current.row() + 1, top_left.column()))
        } else {
            None
        }
    }
}

impl<'a> Range<'a> {
    /// Materializes the bottom-right cell so the sheet's extent covers the range.
    pub(crate) fn new(
        sheet_data: &'a mut XmlElement,
        shared_strings: &'a mut SharedStrings,
        bounds: CellRange,
    ) -> Self {
        cell_node_in_sheet(sheet_data, bounds.bottom_right());
        Self {
            sheet_data,
            shared_strings,
            bounds,
        }
    }

    pub fn bounds(&self) -> CellRange {
        self.bounds
    }

    pub fn num_rows(&self) -> u32 {
        self.bounds.num_rows()
    }

    pub fn num_columns(&self) -> u32 {
        self.bounds.num_columns()
    }

    pub fn cells(&mut self) -> RangeCursor<'_> {
        RangeCursor {
            sheet_data: &mut *self.sheet_data,
            shared_strings: &mut *self.shared_strings,
            bounds: self.bounds,
            next: Some(self.bounds.top_left()),
        }
    }

    /// Copy the values out without creating nodes for absent cells.
    pub fn values(&self) -> Result<RangeValues, XlsxError> {
        let capacity = usize::try_from(self.bounds.cell_count()).unwrap_or(usize::MAX);
        let mut values = Vec::with_capacity(capacity.min(MAX_PREALLOCATED_CELLS));
        for reference in self.bounds.iter() {
            values.push(match find_cell_in_sheet(self.sheet_data, reference) {
                Some(node) => read_value(node, self.shared_strings)?,
                None => CellValue::Empty,
            });
        }
        Ok(RangeValues {
            num_rows: self.num_rows(),
            num_columns: self.num_columns(),
            values,
        })
    }

    /// Value-only copy of `source` into this range. Styles and formulas of the targets stay.
    pub fn assign(&mut self, source: &RangeValues) -> Result<(), XlsxError> {
        if source.shape() != self.bounds.shape() {
            return Err(XlsxError::RangeShapeMismatch {
                target_rows: self.num_rows(),
                target_columns: self.num_columns(),
                source_rows: source.num_rows,
                source_columns: source.num_columns,
            });
        }
        for (reference, value) in self.bounds.iter().zip(&source.values) {
            let node = cell_node_in_sheet(self.sheet_data, reference);
            write_value(node, value, self.shared_strings);
        }
        Ok(())
    }

    /// Write the same value to every cell.
    pub fn fill(&mut self, value: impl Into<CellValue>) {
        let value = value.into();
        let mut cursor = self.cells();
        while let Some(mut cell) = cursor.next_cell() {
            cell.set_value(value.clone());
        }
    }

    /// Set every cell to `Empty`. Nodes stay in place.
    pub fn clear(&mut self) {
        self.fill(CellValue::Empty);
    }
}
