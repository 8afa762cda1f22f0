//! The sparse row/cell node model of a worksheet's `<sheetData>`.
//!
//! Rows are kept in ascending `r` order under `<sheetData>`, and cells in ascending column order
//! under their row. Lookups that may create a node ([`row_node`], [`cell_node`]) decide where to
//! search from by comparing the target against both ends of the sequence:
//!
//! - past the last node: append without scanning
//! - nearer the end than the start: scan backward from the last node
//! - otherwise: scan forward from the first node
//!
//! This keeps sequential writes O(1) and random writes at worst half a scan, without an index.
//! The result is always the position a plain linear scan would find.
//!
//! [`find_row`] and [`find_cell`] use the same search but never create nodes.

use gridbook_model::{coordinates_from_address, CellRange, CellReference};

use crate::xml::{XmlElement, XmlNode};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Slot {
    Found(usize),
    Vacant(usize),
}

pub(crate) fn row_number(row: &XmlElement) -> Option<u32> {
    row.attr("r")?.parse().ok()
}

pub(crate) fn cell_column(cell: &XmlElement) -> Option<u32> {
    coordinates_from_address(cell.attr("r")?)
        .ok()
        .map(|(_, column)| column)
}

fn locate(children: &[XmlNode], target: u32, key_of: fn(&XmlElement) -> Option<u32>) -> Slot {
    let keyed = |idx: usize| children[idx].as_element().and_then(key_of);

    let Some((last_idx, last_key)) = (0..children.len())
        .rev()
        .find_map(|idx| keyed(idx).map(|k| (idx, k)))
    else {
        return Slot::Vacant(children.len());
    };
    if target > last_key {
        return Slot::Vacant(last_idx + 1);
    }
    if target == last_key {
        return Slot::Found(last_idx);
    }

    let Some((first_idx, first_key)) =
        (0..=last_idx).find_map(|idx| keyed(idx).map(|k| (idx, k)))
    else {
        return Slot::Vacant(last_idx);
    };
    if target < first_key {
        return Slot::Vacant(first_idx);
    }
    if target == first_key {
        return Slot::Found(first_idx);
    }

    if last_key - target < target - first_key {
        for idx in (first_idx..last_idx).rev() {
            match keyed(idx) {
                Some(k) if k == target => return Slot::Found(idx),
                Some(k) if k < target => return Slot::Vacant(idx + 1),
                _ => {}
            }
        }
    } else {
        for idx in first_idx + 1..=last_idx {
            match keyed(idx) {
                Some(k) if k == target => return Slot::Found(idx),
                Some(k) if k > target => return Slot::Vacant(idx),
                _ => {}
            }
        }
    }
    // Only reachable when siblings are out of order.
    Slot::Vacant(last_idx + 1)
}

fn element_at(parent: &XmlElement, idx: usize) -> Option<&XmlElement> {
    parent.children.get(idx).and_then(XmlNode::as_element)
}

pub(crate) fn found_or_insert(
    parent: &mut XmlElement,
    slot: Slot,
    make: impl FnOnce(&XmlElement) -> XmlElement,
) -> &mut XmlElement {
    match slot {
        Slot::Found(idx) => match &mut parent.children[idx] {
            XmlNode::Element(el) => el,
            XmlNode::Text(_) => unreachable!("locate only reports element positions"),
        },
        Slot::Vacant(idx) => {
            let el = make(parent);
            parent.insert_child(idx, el)
        }
    }
}

/// The `<row>` numbered `row`, creating it at its sorted position if absent.
pub fn row_node(sheet_data: &mut XmlElement, row: u32) -> &mut XmlElement {
    let slot = locate(&sheet_data.children, row, row_number);
    found_or_insert(sheet_data, slot, |parent| {
        parent.make_child("row").with_attr("r", row.to_string())
    })
}

pub fn find_row(sheet_data: &XmlElement, row: u32) -> Option<&XmlElement> {
    match locate(&sheet_data.children, row, row_number) {
        Slot::Found(idx) => element_at(sheet_data, idx),
        Slot::Vacant(_) => None,
    }
}

pub fn find_row_mut(sheet_data: &mut XmlElement, row: u32) -> Option<&mut XmlElement> {
    match locate(&sheet_data.children, row, row_number) {
        Slot::Found(idx) => sheet_data.element_at_mut(idx),
        Slot::Vacant(_) => None,
    }
}

/// The `<c>` for `reference` within its `<row>`, creating it at its sorted position if absent.
pub fn cell_node(row: &mut XmlElement, reference: CellReference) -> &mut XmlElement {
    let slot = locate(&row.children, reference.column(), cell_column);
    if matches!(slot, Slot::Vacant(_)) {
        widen_spans(row, reference.column());
    }
    found_or_insert(row, slot, |parent| {
        parent.make_child("c").with_attr("r", reference.address())
    })
}

pub fn find_cell(row: &XmlElement, column: u32) -> Option<&XmlElement> {
    match locate(&row.children, column, cell_column) {
        Slot::Found(idx) => element_at(row, idx),
        Slot::Vacant(_) => None,
    }
}

/// Non-creating lookup from the sheet data container.
pub fn find_cell_in_sheet(sheet_data: &XmlElement, reference: CellReference) -> Option<&XmlElement> {
    find_row(sheet_data, reference.row()).and_then(|row| find_cell(row, reference.column()))
}

/// Creating lookup from the sheet data container.
pub fn cell_node_in_sheet(sheet_data: &mut XmlElement, reference: CellReference) -> &mut XmlElement {
    cell_node(row_node(sheet_data, reference.row()), reference)
}

// `spans="min:max"` is an optional hint; keep it covering every cell in the row.
fn widen_spans(row: &mut XmlElement, column: u32) {
    let Some(spans) = row.attr("spans") else {
        return;
    };
    let Some((lo, hi)) = spans.split_once(':') else {
        return;
    };
    let (Ok(lo), Ok(hi)) = (lo.parse::<u32>(), hi.parse::<u32>()) else {
        return;
    };
    if column < lo || column > hi {
        row.set_attr("spans", format!("{}:{}", lo.min(column), hi.max(column)));
    }
}

/// Largest row number present.
pub fn last_row(sheet_data: &XmlElement) -> Option<u32> {
    sheet_data.elements().rev().find_map(row_number)
}

/// Largest column number present in any row.
pub fn last_column(sheet_data: &XmlElement) -> Option<u32> {
    sheet_data
        .children_named("row")
        .filter_map(|row| row.elements().rev().find_map(cell_column))
        .max()
}

/// The smallest range covering every `<c>` node.
pub fn used_range(sheet_data: &XmlElement) -> Option<CellRange> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for row in sheet_data.children_named("row") {
        let Some(r) = row_number(row) else { continue };
        for column in row.children_named("c").filter_map(cell_column) {
            bounds = Some(match bounds {
                None => (r, column, r, column),
                Some((r0, c0, r1, c1)) => (r0.min(r), c0.min(column), r1.max(r), c1.max(column)),
            });
        }
    }
    let (r0, c0, r1, c1) = bounds?;
    CellRange::new(CellReference::new(r0, c0), CellReference::new(r1, c1)).ok()
}

/// Whether any row or cell lacks a usable `r` attribute.
pub fn has_implicit_positions(sheet_data: &XmlElement) -> bool {
    sheet_data.elements().filter(|el| el.is("row")).any(|row| {
        row_number(row).is_none()
            || row
                .elements()
                .filter(|el| el.is("c"))
                .any(|cell| cell_column(cell).is_none())
    })
}

/// Give implicit positions to rows and cells written without an `r` attribute.
///
/// A row without `r` follows the previous row; a cell without `r` follows the previous cell.
/// Returns whether anything was renumbered.
pub fn assign_implicit_positions(sheet_data: &mut XmlElement) -> bool {
    let mut changed = false;
    let mut prev_row = 0u32;
    for row in sheet_data.elements_mut().filter(|el| el.is("row")) {
        let r = match row_number(row) {
            Some(r) => r,
            None => {
                let r = prev_row + 1;
                row.set_attr("r", r.to_string());
                changed = true;
                r
            }
        };
        prev_row = r;

        let mut prev_column = 0u32;
        for cell in row.elements_mut().filter(|el| el.is("c")) {
            prev_column = match cell_column(cell) {
                Some(c) => c,
                None => {
                    let c = prev_column + 1;
                    cell.set_attr("r", CellReference::new(r, c).address());
                    changed = true;
                    c
                }
            };
        }
    }
    if changed {
        log::warn!("sheetData contained rows or cells without positions; numbered implicitly");
    }
    changed
}
