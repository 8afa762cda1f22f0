//! Merged cell ranges kept in a worksheet's `<mergeCells>` element.

use gridbook_model::{CellRange, CellReference};

use crate::xml::XmlElement;
use crate::XlsxError;

/// Elements that follow `<mergeCells>` in a worksheet.
const AFTER_MERGE_CELLS: &[&str] = &[
    "phoneticPr",
    "conditionalFormatting",
    "dataValidations",
    "hyperlinks",
    "printOptions",
    "pageMargins",
    "pageSetup",
    "headerFooter",
    "rowBreaks",
    "colBreaks",
    "customProperties",
    "cellWatches",
    "ignoredErrors",
    "smartTags",
    "drawing",
    "legacyDrawing",
    "legacyDrawingHF",
    "drawingHF",
    "picture",
    "oleObjects",
    "controls",
    "webPublishItems",
    "tableParts",
    "extLst",
];

/// Every valid `<mergeCell ref>` of the worksheet root, in document order.
pub(crate) fn merged_ranges(root: &XmlElement) -> Vec<CellRange> {
    let Some(merge_cells) = root.child("mergeCells") else {
        return Vec::new();
    };
    merge_cells
        .children_named("mergeCell")
        .filter_map(|merge| {
            let reference = merge.attr("ref")?;
            match CellRange::from_a1(reference) {
                Ok(range) => Some(range),
                Err(err) => {
                    log::warn!("skipping merged range {reference:?}: {err}");
                    None
                }
            }
        })
        .collect()
}

fn merge_cells_mut(root: &mut XmlElement) -> &mut XmlElement {
    if root.position("mergeCells").is_none() {
        let idx = root
            .children
            .iter()
            .position(|node| {
                node.as_element()
                    .is_some_and(|el| AFTER_MERGE_CELLS.contains(&el.local_name()))
            })
            .unwrap_or(root.children.len());
        let el = root.make_child("mergeCells");
        root.insert_child(idx, el);
    }
    root.child_or_insert("mergeCells")
}

fn refresh_count(merge_cells: &mut XmlElement) {
    let count = merge_cells.children_named("mergeCell").count();
    merge_cells.set_attr("count", count.to_string());
}

/// Record `range` as merged. Single cells and ranges overlapping an existing merge are rejected.
pub(crate) fn add_merge(root: &mut XmlElement, range: CellRange) -> Result<(), XlsxError> {
    if range.cell_count() < 2 {
        return Err(XlsxError::InvalidMerge {
            range: range.to_string(),
            reason: "a merge must span more than one cell",
        });
    }
    if let Some(existing) = merged_ranges(root)
        .into_iter()
        .find(|existing| existing.intersects(&range))
    {
        return Err(XlsxError::MergeOverlap {
            range: range.to_string(),
            existing: existing.to_string(),
        });
    }
    let merge_cells = merge_cells_mut(root);
    let merge = merge_cells
        .make_child("mergeCell")
        .with_attr("ref", range.to_string());
    merge_cells.push_child(merge);
    refresh_count(merge_cells);
    Ok(())
}

/// Drop the merge equal to `range`; `<mergeCells>` goes away with its last entry.
pub(crate) fn remove_merge(root: &mut XmlElement, range: CellRange) -> bool {
    let Some(merge_cells) = root.child_mut("mergeCells") else {
        return false;
    };
    let mut removed = false;
    merge_cells.retain_elements(|merge| {
        let matches = !removed
            && merge.is("mergeCell")
            && merge
                .attr("ref")
                .and_then(|reference| CellRange::from_a1(reference).ok())
                == Some(range);
        removed |= matches;
        !matches
    });
    if !removed {
        return false;
    }
    if merge_cells.children_named("mergeCell").next().is_none() {
        root.remove_children("mergeCells");
    } else {
        refresh_count(merge_cells);
    }
    true
}

/// The merge covering `reference`, if any.
pub(crate) fn merge_containing(root: &XmlElement, reference: CellReference) -> Option<CellRange> {
    merged_ranges(root)
        .into_iter()
        .find(|range| range.contains(reference))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlDocument;
    use pretty_assertions::assert_eq;

    fn range(a1: &str) -> CellRange {
        CellRange::from_a1(a1).unwrap()
    }

    fn worksheet(xml: &str) -> XmlElement {
        XmlDocument::parse(xml.as_bytes()).unwrap().root
    }

    #[test]
    fn merge_cells_are_placed_before_trailing_elements() {
        let mut root = worksheet(
            r#"<worksheet><sheetData/><conditionalFormatting/><pageMargins/></worksheet>"#,
        );
        add_merge(&mut root, range("A1:B2")).unwrap();
        add_merge(&mut root, range("D1:D4")).unwrap();
        let names: Vec<&str> = root.elements().map(XmlElement::local_name).collect();
        assert_eq!(names, ["sheetData", "mergeCells", "conditionalFormatting", "pageMargins"]);
        let merge_cells = root.child("mergeCells").unwrap();
        assert_eq!(merge_cells.attr("count"), Some("2"));
        assert_eq!(merged_ranges(&root), [range("A1:B2"), range("D1:D4")]);
    }

    #[test]
    fn single_cells_and_overlaps_are_rejected() {
        let mut root = worksheet("<worksheet><sheetData/></worksheet>");
        assert!(matches!(
            add_merge(&mut root, range("C3")),
            Err(XlsxError::InvalidMerge { .. })
        ));
        add_merge(&mut root, range("B2:C3")).unwrap();
        assert!(matches!(
            add_merge(&mut root, range("C3:E5")),
            Err(XlsxError::MergeOverlap { .. })
        ));
        add_merge(&mut root, range("D4:E5")).unwrap();
        assert_eq!(merged_ranges(&root).len(), 2);
    }

    #[test]
    fn removing_the_last_merge_drops_the_container() {
        let mut root = worksheet("<worksheet><sheetData/></worksheet>");
        add_merge(&mut root, range("A1:A2")).unwrap();
        add_merge(&mut root, range("B1:C1")).unwrap();
        assert!(!remove_merge(&mut root, range("A1:A3")));
        assert!(remove_merge(&mut root, range("A1:A2")));
        assert_eq!(root.child("mergeCells").unwrap().attr("count"), Some("1"));
        assert!(remove_merge(&mut root, range("B1:C1")));
        assert!(root.child("mergeCells").is_none());
    }

    #[test]
    fn invalid_references_are_skipped_when_reading() {
        let root = worksheet(
            r#"<worksheet><mergeCells count="2"><mergeCell ref="A1:B1"/><mergeCell ref="nope"/></mergeCells></worksheet>"#,
        );
        assert_eq!(merged_ranges(&root), [range("A1:B1")]);
        assert_eq!(
            merge_containing(&root, CellReference::from_address("B1").unwrap()),
            Some(range("A1:B1"))
        );
        assert_eq!(merge_containing(&root, CellReference::from_address("C1").unwrap()), None);
    }
}
