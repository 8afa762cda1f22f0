use gridbook_model::{CellReference, CellValue};

use crate::cell::{read_value, write_value, Cell, CellView};
use crate::shared_strings::SharedStrings;
use crate::sheet_data::{cell_column, cell_node, find_cell};
use crate::xml::XmlElement;
use crate::XlsxError;

const MAX_OUTLINE_LEVEL: u8 = 7;

/// One `<row>` of a worksheet.
pub struct Row<'a> {
    node: &'a mut XmlElement,
    shared_strings: &'a mut SharedStrings,
    number: u32,
}

fn flag(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true"))
}

impl<'a> Row<'a> {
    pub(crate) fn new(
        node: &'a mut XmlElement,
        shared_strings: &'a mut SharedStrings,
        number: u32,
    ) -> Self {
        Self {
            node,
            shared_strings,
            number,
        }
    }

    /// 1-based row number.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Custom height in points, if one is set.
    pub fn height(&self) -> Option<f64> {
        self.node.attr("ht").and_then(|ht| ht.parse().ok())
    }

    pub fn set_height(&mut self, points: f64) -> Result<(), XlsxError> {
        if !(0.0..=409.0).contains(&points) {
            return Err(XlsxError::Invalid(format!(
                "row {}: height {points} outside 0..=409",
                self.number
            )));
        }
        self.node.set_attr("ht", format!("{points:?}"));
        self.node.set_attr("customHeight", "1");
        Ok(())
    }

    /// Back to the default height.
    pub fn clear_height(&mut self) {
        self.node.remove_attr("ht");
        self.node.remove_attr("customHeight");
    }

    pub fn is_hidden(&self) -> bool {
        flag(self.node.attr("hidden"))
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        if hidden {
            self.node.set_attr("hidden", "1");
        } else {
            self.node.remove_attr("hidden");
        }
    }

    pub fn outline_level(&self) -> u8 {
        self.node
            .attr("outlineLevel")
            .and_then(|level| level.parse().ok())
            .unwrap_or(0)
    }

    pub fn set_outline_level(&mut self, level: u8) -> Result<(), XlsxError> {
        match level {
            0 => {
                self.node.remove_attr("outlineLevel");
            }
            1..=MAX_OUTLINE_LEVEL => self.node.set_attr("outlineLevel", level.to_string()),
            _ => {
                return Err(XlsxError::Invalid(format!(
                    "row {}: outline level {level} above {MAX_OUTLINE_LEVEL}",
                    self.number
                )))
            }
        }
        Ok(())
    }

    /// Number of `<c>` nodes in the row, empty ones included.
    pub fn cell_count(&self) -> usize {
        self.node.children_named("c").count()
    }

    /// The cell in `column`, created if absent.
    pub fn cell(&mut self, column: u32) -> Result<Cell<'_>, XlsxError> {
        let reference = CellReference::try_new(self.number, column)?;
        let node = cell_node(self.node, reference);
        Ok(Cell::new(node, self.shared_strings, reference))
    }

    pub fn find_cell(&self, column: u32) -> Option<CellView<'_>> {
        let reference = CellReference::try_new(self.number, column).ok()?;
        find_cell(self.node, column).map(|node| CellView::new(node, self.shared_strings, reference))
    }

    /// Values from column 1 through the last populated column; gaps read as `Empty`.
    pub fn values(&self) -> Result<Vec<CellValue>, XlsxError> {
        let mut values = Vec::new();
        for c in self.node.children_named("c") {
            let Some(column) = cell_column(c) else { continue };
            let idx = column as usize - 1;
            if values.len() <= idx {
                values.resize(idx + 1, CellValue::Empty);
            }
            values[idx] = read_value(c, self.shared_strings)?;
        }
        Ok(values)
    }

    /// Write `values` into columns 1, 2, ...; cells past the last value are left alone.
    pub fn set_values<I, V>(&mut self, values: I) -> Result<(), XlsxError>
    where
        I: IntoIterator<Item = V>,
        V: Into<CellValue>,
    {
        for (idx, value) in values.into_iter().enumerate() {
            let column = u32::try_from(idx + 1).unwrap_or(u32::MAX);
            let reference = CellReference::try_new(self.number, column)?;
            let node = cell_node(self.node, reference);
            write_value(node, &value.into(), self.shared_strings);
        }
        Ok(())
    }
}
