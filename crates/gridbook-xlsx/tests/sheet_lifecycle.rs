use gridbook_xlsx::{CellValue, Document, SheetVisibility, XlsxError};
use pretty_assertions::assert_eq;

fn reopen(doc: &mut Document) -> Document {
    let bytes = doc.to_bytes().expect("to_bytes");
    Document::from_bytes(&bytes).expect("reopen")
}

fn titles(doc: &Document) -> Vec<String> {
    let app = doc
        .package()
        .unwrap()
        .raw_part("docProps/app.xml")
        .unwrap()
        .into_owned();
    let xml = String::from_utf8(app).unwrap();
    let parsed = roxmltree::Document::parse(&xml).unwrap();
    parsed
        .descendants()
        .find(|n| n.has_tag_name("TitlesOfParts"))
        .map(|titles| {
            titles
                .descendants()
                .filter(|n| n.tag_name().name() == "lpstr")
                .filter_map(|n| n.text())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn rename_rewrites_sheet_qualified_formulas_but_not_external_ones() {
    let mut doc = Document::new();
    doc.workbook().unwrap().add_worksheet("Summary").unwrap();
    {
        let mut summary = doc.worksheet("Summary").unwrap();
        summary.cell("A1").unwrap().set_formula("=Sheet1!A1").unwrap();
        summary
            .cell("A2")
            .unwrap()
            .set_formula("[External.xlsx]Sheet1!A1")
            .unwrap();
        summary
            .cell("A3")
            .unwrap()
            .set_formula("SUM(Sheet1!B1:B9)*2")
            .unwrap();
    }
    doc.workbook()
        .unwrap()
        .set_defined_name("Inputs", "Sheet1!$A$1:$A$4", None)
        .unwrap();

    doc.workbook().unwrap().rename_sheet("Sheet1", "Data").unwrap();

    let mut doc = reopen(&mut doc);
    assert_eq!(doc.sheet_names().unwrap(), ["Data", "Summary"]);
    let summary = doc.worksheet("Summary").unwrap();
    let formula = |address: &str| {
        summary
            .find_cell(address)
            .unwrap()
            .and_then(|cell| cell.formula().unwrap())
    };
    assert_eq!(formula("A1").as_deref(), Some("Data!A1"));
    assert_eq!(formula("A2").as_deref(), Some("[External.xlsx]Sheet1!A1"));
    assert_eq!(formula("A3").as_deref(), Some("SUM(Data!B1:B9)*2"));

    let names = doc.workbook().unwrap().defined_names().unwrap();
    assert_eq!(names[0].formula, "Data!$A$1:$A$4");
    assert_eq!(titles(&doc), ["Data", "Summary"]);
}

#[test]
fn rename_quotes_names_that_need_it() {
    let mut doc = Document::new();
    doc.workbook().unwrap().add_worksheet("Other").unwrap();
    doc.worksheet("Other")
        .unwrap()
        .cell("B2")
        .unwrap()
        .set_formula("Sheet1!C3+1")
        .unwrap();
    doc.workbook().unwrap().rename_sheet("Sheet1", "Q1 Data").unwrap();

    let sheet = doc.worksheet("Other").unwrap();
    let formula = sheet.find_cell("B2").unwrap().unwrap().formula().unwrap();
    assert_eq!(formula.as_deref(), Some("'Q1 Data'!C3+1"));
}

#[test]
fn rename_rejects_clashing_and_invalid_names() {
    let mut doc = Document::new();
    let mut wb = doc.workbook().unwrap();
    wb.add_worksheet("Two").unwrap();
    assert!(matches!(
        wb.rename_sheet("Sheet1", "TWO"),
        Err(XlsxError::DuplicateSheetName(_))
    ));
    assert!(matches!(
        wb.rename_sheet("Sheet1", "a:b"),
        Err(XlsxError::InvalidSheetName { .. })
    ));
    assert!(matches!(
        wb.rename_sheet("Missing", "X"),
        Err(XlsxError::SheetNotFound(_))
    ));
    assert_eq!(wb.sheet_names().unwrap(), ["Sheet1", "Two"]);
}

#[test]
fn deleting_the_only_worksheet_fails_and_changes_nothing() {
    let mut doc = Document::new();
    let before = doc.sheets().unwrap();
    let err = doc.workbook().unwrap().delete_sheet("Sheet1").unwrap_err();
    assert!(matches!(err, XlsxError::LastWorksheet(ref name) if name == "Sheet1"));
    assert_eq!(doc.sheets().unwrap(), before);
    assert!(doc.package().unwrap().has_part("xl/worksheets/sheet1.xml"));
}

#[test]
fn delete_removes_part_relationship_content_type_and_title() {
    let mut doc = Document::new();
    doc.workbook().unwrap().add_worksheet("Scratch").unwrap();
    doc.worksheet("Scratch").unwrap().cell("A1").unwrap().set_value(1);
    doc.workbook().unwrap().delete_sheet("Scratch").unwrap();

    let doc = reopen(&mut doc);
    assert_eq!(doc.sheet_names().unwrap(), ["Sheet1"]);
    let package = doc.package().unwrap();
    assert!(!package.has_part("xl/worksheets/sheet2.xml"));
    let overrides = package.content_types().unwrap().overrides();
    assert!(overrides.iter().all(|(part, _)| part != "xl/worksheets/sheet2.xml"));
    assert!(package
        .relationships("xl/workbook.xml")
        .unwrap()
        .by_target("xl/worksheets/sheet2.xml")
        .is_none());
    assert_eq!(titles(&doc), ["Sheet1"]);
}

#[test]
fn new_sheets_get_increasing_ids_and_fresh_parts() {
    let mut doc = Document::new();
    let mut wb = doc.workbook().unwrap();
    let two = wb.add_worksheet("Two").unwrap();
    let three = wb.add_worksheet("Three").unwrap();
    wb.delete_sheet("Two").unwrap();
    let four = wb.add_worksheet("Four").unwrap();

    assert_eq!((two.sheet_id, three.sheet_id, four.sheet_id), (2, 3, 4));
    assert_eq!(four.part.as_deref(), Some("xl/worksheets/sheet2.xml"));
    assert_eq!(wb.index_of("Four").unwrap(), 3);
}

#[test]
fn reindex_reorders_tabs_and_checks_bounds() {
    let mut doc = Document::new();
    {
        let mut wb = doc.workbook().unwrap();
        wb.add_worksheet("B").unwrap();
        wb.add_worksheet("C").unwrap();
        wb.set_defined_name("Local", "C!$A$1", Some("C")).unwrap();
        assert!(matches!(
            wb.reindex_sheet("B", 0),
            Err(XlsxError::InvalidIndex { index: 0, count: 3 })
        ));
        wb.reindex_sheet("C", 2).unwrap();
    }

    let mut doc = reopen(&mut doc);
    assert_eq!(doc.sheet_names().unwrap(), ["Sheet1", "C", "B"]);
    assert_eq!(titles(&doc), ["Sheet1", "C", "B"]);
    let names = doc.workbook().unwrap().defined_names().unwrap();
    assert_eq!(names[0].local_sheet_id, Some(1));
}

#[test]
fn cloned_sheet_has_independent_cells() {
    let mut doc = Document::new();
    doc.worksheet("Sheet1").unwrap().cell("A1").unwrap().set_value("original");
    doc.workbook().unwrap().clone_sheet("Sheet1", "Copy").unwrap();
    doc.worksheet("Copy").unwrap().cell("A1").unwrap().set_value("changed");

    let mut doc = reopen(&mut doc);
    assert_eq!(
        doc.worksheet("Sheet1").unwrap().value("A1").unwrap(),
        CellValue::from("original")
    );
    assert_eq!(
        doc.worksheet("Copy").unwrap().value("A1").unwrap(),
        CellValue::from("changed")
    );
    assert_eq!(titles(&doc), ["Sheet1", "Copy"]);
}

#[test]
fn hidden_sheets_round_trip_and_one_stays_visible() {
    let mut doc = Document::new();
    {
        let mut wb = doc.workbook().unwrap();
        wb.add_worksheet("Secret").unwrap();
        wb.set_sheet_visibility("Secret", SheetVisibility::Hidden).unwrap();
        assert!(wb
            .set_sheet_visibility("Sheet1", SheetVisibility::Hidden)
            .is_err());
    }
    let doc = reopen(&mut doc);
    let visibility: Vec<_> = doc
        .sheets()
        .unwrap()
        .into_iter()
        .map(|sheet| sheet.visibility)
        .collect();
    assert_eq!(visibility, [SheetVisibility::Visible, SheetVisibility::Hidden]);
}

#[test]
fn rename_between_quoted_names_rewrites_quoted_references() {
    let mut doc = Document::new();
    {
        let mut wb = doc.workbook().unwrap();
        wb.rename_sheet("Sheet1", "My Sheet").unwrap();
        wb.add_worksheet("Report").unwrap();
    }
    doc.worksheet("Report")
        .unwrap()
        .cell("A1")
        .unwrap()
        .set_formula("'My Sheet'!A1+'my sheet'!B2")
        .unwrap();
    doc.workbook()
        .unwrap()
        .rename_sheet("My Sheet", "Other Sheet")
        .unwrap();

    let mut doc = reopen(&mut doc);
    assert_eq!(doc.sheet_names().unwrap(), ["Other Sheet", "Report"]);
    let report = doc.worksheet("Report").unwrap();
    let formula = report.find_cell("A1").unwrap().unwrap().formula().unwrap();
    assert_eq!(formula.as_deref(), Some("'Other Sheet'!A1+'Other Sheet'!B2"));
}
