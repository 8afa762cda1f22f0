use std::fs;

use gridbook_xlsx::{CellValue, Document, Property, SharedStrings, ValueType, XlsxError};
use pretty_assertions::assert_eq;

#[test]
fn typed_values_survive_save_and_reopen() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("values.xlsx");

    let mut doc = Document::create(&path).expect("create");
    {
        let mut sheet = doc.worksheet("Sheet1").expect("Sheet1");
        sheet.cell("B2").expect("B2").set_value(42);
        sheet.cell("C3").expect("C3").set_value(3.14159);
        sheet.cell("D4").expect("D4").set_value(true);
        sheet.cell("A1").expect("A1").set_value("hi");
    }
    doc.save().expect("save");
    doc.close();

    let mut doc = Document::open(&path).expect("reopen");
    let mut sheet = doc.worksheet("Sheet1").expect("Sheet1");
    assert_eq!(sheet.value("B2").unwrap(), CellValue::Integer(42));
    assert_eq!(sheet.value("C3").unwrap(), CellValue::Float(3.14159));
    assert_eq!(sheet.value("D4").unwrap(), CellValue::Boolean(true));
    assert_eq!(sheet.value("A1").unwrap(), CellValue::String("hi".to_string()));

    assert_eq!(sheet.cell("B2").unwrap().get::<i64>().unwrap(), 42);
    assert!(matches!(
        sheet.cell("B2").unwrap().get::<f64>(),
        Err(XlsxError::ValueTypeMismatch(_))
    ));
    assert_eq!(sheet.cell("E5").unwrap().value_type().unwrap(), ValueType::Empty);
}

#[test]
fn non_finite_floats_are_stored_as_num_errors() {
    let mut doc = Document::new();
    doc.worksheet("Sheet1")
        .unwrap()
        .cell("A1")
        .unwrap()
        .set_value(f64::NAN);
    let bytes = doc.to_bytes().expect("to_bytes");

    let mut doc = Document::from_bytes(&bytes).expect("reopen");
    let sheet = doc.worksheet("Sheet1").unwrap();
    assert_eq!(sheet.value("A1").unwrap(), CellValue::error("#NUM!"));
}

#[test]
fn properties_persist_and_can_be_deleted() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("props.xlsx");

    let mut doc = Document::create(&path).expect("create");
    doc.set_property(Property::Title, "Quarterly numbers").unwrap();
    doc.set_property(Property::Company, "Acme").unwrap();
    doc.set_property(Property::AppVersion, "16.0300").unwrap();
    assert!(matches!(
        doc.set_property(Property::DocSecurity, "3"),
        Err(XlsxError::InvalidPropertyValue { .. })
    ));
    doc.save().expect("save");
    doc.close();

    let mut doc = Document::open(&path).expect("reopen");
    assert_eq!(doc.property(Property::Title).unwrap(), "Quarterly numbers");
    assert_eq!(doc.property(Property::Company).unwrap(), "Acme");
    assert_eq!(doc.property(Property::Keywords).unwrap(), "");

    assert!(doc.delete_property(Property::Title).unwrap());
    assert!(!doc.delete_property(Property::Title).unwrap());
    doc.save().expect("save");
    doc.close();

    let doc = Document::open(&path).expect("reopen");
    assert_eq!(doc.property(Property::Title).unwrap(), "");
    assert_eq!(doc.property(Property::Company).unwrap(), "Acme");
}

#[test]
fn untouched_parts_are_written_back_verbatim() {
    let mut doc = Document::new();
    let original = doc.to_bytes().expect("to_bytes");

    let mut reopened = Document::from_bytes(&original).expect("reopen");
    let styles_before = reopened
        .package()
        .unwrap()
        .raw_part("xl/styles.xml")
        .unwrap()
        .into_owned();
    reopened
        .worksheet("Sheet1")
        .unwrap()
        .cell("A1")
        .unwrap()
        .set_value(1);
    let saved = reopened.to_bytes().expect("to_bytes");

    let again = Document::from_bytes(&saved).expect("reopen");
    let styles_after = again
        .package()
        .unwrap()
        .raw_part("xl/styles.xml")
        .unwrap()
        .into_owned();
    assert_eq!(styles_after, styles_before);
}

#[test]
fn open_rejects_archives_without_a_workbook() {
    let err = Document::from_bytes(b"not a zip").expect_err("garbage should not open");
    assert!(matches!(err, XlsxError::ArchiveIo(_)), "{err:?}");
}

#[cfg(unix)]
#[test]
fn failed_save_leaves_destination_and_directory_clean() {
    let dir = tempfile::tempdir().expect("temp dir");
    let target = dir.path().join("book.xlsx");
    // A non-empty directory cannot be replaced by a file rename.
    fs::create_dir(&target).expect("create blocking dir");
    fs::write(target.join("sentinel"), b"sentinel").expect("seed sentinel");

    let mut doc = Document::new();
    let err = doc.save_as(&target).expect_err("save over a directory should fail");
    assert!(matches!(err, XlsxError::ArchiveIo(_)), "{err:?}");

    assert_eq!(fs::read(target.join("sentinel")).unwrap(), b"sentinel");
    let entries: Vec<_> = fs::read_dir(dir.path())
        .expect("read_dir")
        .map(|e| e.expect("dir entry").path())
        .collect();
    assert_eq!(entries, vec![target], "staged temp file should be cleaned up");
    assert!(doc.path().is_none());
    assert!(doc.is_open());
}

#[test]
fn shared_strings_keep_indices_when_appending_after_clear() {
    let mut table = SharedStrings::new("xl/sharedStrings.xml");
    for text in ["alpha", "beta", "gamma"] {
        table.append(text);
    }
    assert!(table.clear(1));
    assert!(!table.clear(9));
    assert_eq!(table.append("delta"), 3);
    assert_eq!(table.intern("gamma"), 2);

    let bytes = table.to_bytes().expect("serialize");
    let reparsed = SharedStrings::parse("xl/sharedStrings.xml", &bytes).expect("parse");
    assert_eq!(
        reparsed.iter().collect::<Vec<_>>(),
        ["alpha", "", "gamma", "delta"]
    );
    assert_eq!(reparsed.index("beta"), None);
    assert_eq!(reparsed.index("delta"), Some(3));
}
