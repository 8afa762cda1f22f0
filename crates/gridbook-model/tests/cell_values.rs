use gridbook_model::{
    column_name_to_number, column_number_to_name, infer, CellRange, CellReference, CellValue,
    ValueType, MAX_COLS, MAX_ROWS,
};
use pretty_assertions::assert_eq;

#[test]
fn corner_references_round_trip_through_text() {
    let corner = CellReference::new(MAX_ROWS, MAX_COLS);
    assert_eq!(corner.address(), "XFD1048576");
    assert_eq!(CellReference::from_address("xfd1048576").unwrap(), corner);
    assert_eq!(column_name_to_number(&column_number_to_name(MAX_COLS)).unwrap(), MAX_COLS);
    assert!(CellReference::new(MAX_ROWS + 1, 1).is_empty());
}

#[test]
fn untyped_text_is_inferred_and_serializes_with_its_tag() {
    let cells: Vec<CellValue> = ["42", "-7", "2.5", "TRUE", "n/a"].into_iter().map(infer).collect();
    let types: Vec<ValueType> = cells.iter().map(CellValue::value_type).collect();
    assert_eq!(
        types,
        [
            ValueType::Integer,
            ValueType::Integer,
            ValueType::Float,
            ValueType::Boolean,
            ValueType::String
        ]
    );

    let json = serde_json::to_string(&cells).unwrap();
    let back: Vec<CellValue> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, cells);
}

#[test]
fn ranges_parse_in_either_corner_order() {
    let a = CellRange::from_a1("C3:A1").unwrap();
    let b = CellRange::from_a1("A1:C3").unwrap();
    assert_eq!(a, b);
    assert_eq!(a.shape(), (3, 3));
    assert!(a.contains(CellReference::new(2, 2)));
    assert!(!a.contains(CellReference::new(4, 1)));
    assert_eq!(a.cell_count(), 9);
    assert!(a.intersects(&CellRange::from_a1("C3:D9").unwrap()));
    assert!(!a.intersects(&CellRange::from_a1("D1:E2").unwrap()));

    let sheet = CellRange::from_a1("A1:XFD1048576").unwrap();
    assert_eq!(sheet.cell_count(), u64::from(MAX_ROWS) * u64::from(MAX_COLS));
}
