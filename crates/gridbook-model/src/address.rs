use core::fmt;

use serde::{Deserialize, Serialize};

use crate::ReferenceError;

/// Number of rows in a worksheet.
pub const MAX_ROWS: u32 = 1_048_576;
/// Number of columns in a worksheet (`XFD`).
pub const MAX_COLS: u32 = 16_384;

const MAX_COLUMN_LETTERS: usize = 3;
const MAX_ROW_DIGITS: usize = 7;

/// A reference to a single cell within a worksheet.
///
/// Rows and columns are **1-based**:
/// - `row = 1` is the first row
/// - `column = 1` is column `A`
///
/// Coordinates outside `[1, MAX_ROWS] x [1, MAX_COLS]` passed to [`CellReference::new`] collapse
/// to the empty reference (row 0, column 0, address `""`). Use [`CellReference::try_new`] when an
/// error is preferable.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellReference {
    row: u32,
    column: u32,
}

impl CellReference {
    /// The sentinel produced for out-of-bounds coordinates.
    pub const EMPTY: CellReference = CellReference { row: 0, column: 0 };

    /// Construct a reference, collapsing invalid coordinates to [`CellReference::EMPTY`].
    pub const fn new(row: u32, column: u32) -> Self {
        if is_valid_row(row) && is_valid_column(column) {
            Self { row, column }
        } else {
            Self::EMPTY
        }
    }

    /// Construct a reference, failing on coordinates outside the worksheet bounds.
    pub fn try_new(row: u32, column: u32) -> Result<Self, ReferenceError> {
        if !is_valid_row(row) {
            return Err(ReferenceError::RowOutOfBounds(row));
        }
        if !is_valid_column(column) {
            return Err(ReferenceError::ColumnOutOfBounds(column));
        }
        Ok(Self { row, column })
    }

    /// Parse an A1-style address such as `B12` or `$xfd$1048576`.
    pub fn from_address(address: &str) -> Result<Self, ReferenceError> {
        let (row, column) = coordinates_from_address(address)?;
        Ok(Self { row, column })
    }

    #[inline]
    pub const fn row(&self) -> u32 {
        self.row
    }

    #[inline]
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// True for the sentinel produced by out-of-bounds construction.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.row == 0 && self.column == 0
    }

    /// Canonical upper-case address, or `""` for the empty reference.
    pub fn address(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        to_address(self.row, self.column)
    }

    /// Move to another row, collapsing to the empty reference when out of bounds.
    pub const fn with_row(self, row: u32) -> Self {
        Self::new(row, self.column)
    }

    /// Move to another column, collapsing to the empty reference when out of bounds.
    pub const fn with_column(self, column: u32) -> Self {
        Self::new(self.row, column)
    }
}

impl fmt::Display for CellReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address())
    }
}

impl core::str::FromStr for CellReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_address(s)
    }
}

impl TryFrom<&str> for CellReference {
    type Error = ReferenceError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_address(value)
    }
}

impl TryFrom<(u32, u32)> for CellReference {
    type Error = ReferenceError;

    fn try_from((row, column): (u32, u32)) -> Result<Self, Self::Error> {
        Self::try_new(row, column)
    }
}

/// An inclusive rectangular block of cells.
///
/// Always normalized so the top-left corner is above and left of the bottom-right corner.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRange {
    top_left: CellReference,
    bottom_right: CellReference,
}

impl CellRange {
    /// Construct a range from any two corners.
    pub fn new(a: CellReference, b: CellReference) -> Result<Self, ReferenceError> {
        if a.is_empty() || b.is_empty() {
            return Err(ReferenceError::EmptyReference);
        }
        let top_left = CellReference::new(a.row.min(b.row), a.column.min(b.column));
        let bottom_right = CellReference::new(a.row.max(b.row), a.column.max(b.column));
        Ok(Self {
            top_left,
            bottom_right,
        })
    }

    /// Parse `A1:C3`, or a single address such as `B2`.
    pub fn from_a1(a1: &str) -> Result<Self, ReferenceError> {
        let s = a1.trim();
        match s.split_once(':') {
            None => {
                let cell = CellReference::from_address(s)?;
                Self::new(cell, cell)
            }
            Some((a, b)) => Self::new(
                CellReference::from_address(a)?,
                CellReference::from_address(b)?,
            ),
        }
    }

    #[inline]
    pub const fn top_left(&self) -> CellReference {
        self.top_left
    }

    #[inline]
    pub const fn bottom_right(&self) -> CellReference {
        self.bottom_right
    }

    #[inline]
    pub const fn num_rows(&self) -> u32 {
        self.bottom_right.row - self.top_left.row + 1
    }

    #[inline]
    pub const fn num_columns(&self) -> u32 {
        self.bottom_right.column - self.top_left.column + 1
    }

    /// Number of cells covered. A full sheet holds 2^34 cells, so this does not fit in `u32`.
    pub const fn cell_count(&self) -> u64 {
        self.num_rows() as u64 * self.num_columns() as u64
    }

    /// `(rows, columns)`.
    #[inline]
    pub const fn shape(&self) -> (u32, u32) {
        (self.num_rows(), self.num_columns())
    }

    pub const fn contains(&self, cell: CellReference) -> bool {
        cell.row >= self.top_left.row
            && cell.row <= self.bottom_right.row
            && cell.column >= self.top_left.column
            && cell.column <= self.bottom_right.column
    }

    /// Whether the two ranges share at least one cell.
    pub const fn intersects(&self, other: &CellRange) -> bool {
        self.top_left.row <= other.bottom_right.row
            && other.top_left.row <= self.bottom_right.row
            && self.top_left.column <= other.bottom_right.column
            && other.top_left.column <= self.bottom_right.column
    }

    /// Row-major iteration over every address in the range.
    pub fn iter(&self) -> impl Iterator<Item = CellReference> {
        let range = *self;
        (range.top_left.row..=range.bottom_right.row).flat_map(move |row| {
            (range.top_left.column..=range.bottom_right.column)
                .map(move |column| CellReference::new(row, column))
        })
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.top_left == self.bottom_right {
            write!(f, "{}", self.top_left)
        } else {
            write!(f, "{}:{}", self.top_left, self.bottom_right)
        }
    }
}

/// Render `(row, column)` as an A1 address. Both coordinates are 1-based.
pub fn to_address(row: u32, column: u32) -> String {
    let mut out = column_number_to_name(column);
    out.push_str(&row.to_string());
    out
}

/// Split an A1 address into its 1-based `(row, column)` pair.
pub fn coordinates_from_address(address: &str) -> Result<(u32, u32), ReferenceError> {
    let invalid = || ReferenceError::InvalidAddress(address.to_string());
    let bytes = address.as_bytes();

    let mut idx = 0usize;
    if bytes.get(idx) == Some(&b'$') {
        idx += 1;
    }
    let letters_start = idx;
    while idx < bytes.len() && bytes[idx].is_ascii_alphabetic() {
        idx += 1;
    }
    let letters = &address[letters_start..idx];

    if bytes.get(idx) == Some(&b'$') {
        idx += 1;
    }
    let digits_start = idx;
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        idx += 1;
    }
    let digits = &address[digits_start..idx];

    if idx != bytes.len()
        || !(1..=MAX_COLUMN_LETTERS).contains(&letters.len())
        || !(1..=MAX_ROW_DIGITS).contains(&digits.len())
    {
        return Err(invalid());
    }

    let column = column_name_to_number(letters)?;
    let row: u32 = digits.parse().map_err(|_| invalid())?;
    if !is_valid_row(row) {
        return Err(ReferenceError::RowOutOfBounds(row));
    }
    Ok((row, column))
}

/// Bijective base-26 column name (`1 -> A`, `26 -> Z`, `27 -> AA`, `16384 -> XFD`).
///
/// Returns an empty string for `0`.
pub fn column_number_to_name(column: u32) -> String {
    let mut letters = [0u8; 8];
    let mut len = 0usize;
    let mut n = column;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters[len] = b'A' + rem as u8;
        len += 1;
        n = (n - 1) / 26;
    }
    letters[..len].iter().rev().map(|b| *b as char).collect()
}

/// Inverse of [`column_number_to_name`]; case-insensitive.
pub fn column_name_to_number(name: &str) -> Result<u32, ReferenceError> {
    let invalid = || ReferenceError::InvalidColumnName(name.to_string());
    if name.is_empty() || name.len() > MAX_COLUMN_LETTERS {
        return Err(invalid());
    }

    let mut column: u32 = 0;
    for b in name.bytes() {
        if !b.is_ascii_alphabetic() {
            return Err(invalid());
        }
        column = column * 26 + u32::from(b.to_ascii_uppercase() - b'A') + 1;
    }
    if !is_valid_column(column) {
        return Err(ReferenceError::ColumnOutOfBounds(column));
    }
    Ok(column)
}

#[inline]
const fn is_valid_row(row: u32) -> bool {
    row >= 1 && row <= MAX_ROWS
}

#[inline]
const fn is_valid_column(column: u32) -> bool {
    column >= 1 && column <= MAX_COLS
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn column_names_at_letter_count_boundaries() {
        for (n, name) in [
            (1, "A"),
            (26, "Z"),
            (27, "AA"),
            (52, "AZ"),
            (53, "BA"),
            (702, "ZZ"),
            (703, "AAA"),
            (16_384, "XFD"),
        ] {
            assert_eq!(column_number_to_name(n), name, "column {n}");
            assert_eq!(column_name_to_number(name).unwrap(), n, "name {name}");
        }
    }

    #[test]
    fn address_roundtrip_is_canonical_upper_case() {
        let cell = CellReference::from_address("b12").unwrap();
        assert_eq!((cell.row(), cell.column()), (12, 2));
        assert_eq!(cell.address(), "B12");

        let absolute = CellReference::from_address("$xfd$1048576").unwrap();
        assert_eq!(absolute, CellReference::new(MAX_ROWS, MAX_COLS));
        assert_eq!(absolute.to_string(), "XFD1048576");
    }

    #[test]
    fn malformed_addresses_are_rejected() {
        for bad in ["", "A", "12", "1A", "ABCD1", "A12345678", "A0", "XFE1", "A1048577", "A1B", "A-1"]
        {
            assert!(
                CellReference::from_address(bad).is_err(),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn out_of_bounds_construction_collapses_to_empty() {
        assert!(CellReference::new(0, 1).is_empty());
        assert!(CellReference::new(1, MAX_COLS + 1).is_empty());
        assert!(CellReference::new(MAX_ROWS + 1, 1).is_empty());
        assert_eq!(CellReference::new(0, 0).address(), "");
        assert!(!CellReference::new(1, 1).is_empty());

        assert_eq!(
            CellReference::try_new(MAX_ROWS + 1, 1),
            Err(ReferenceError::RowOutOfBounds(MAX_ROWS + 1))
        );
    }

    #[test]
    fn ranges_normalize_and_iterate_row_major() {
        let range = CellRange::from_a1("B3:A1").unwrap();
        assert_eq!(range.to_string(), "A1:B3");
        assert_eq!(range.shape(), (3, 2));

        let addresses: Vec<String> = range.iter().map(|c| c.address()).collect();
        assert_eq!(addresses, ["A1", "B1", "A2", "B2", "A3", "B3"]);

        assert!(range.contains(CellReference::new(2, 2)));
        assert!(!range.contains(CellReference::new(4, 1)));
        assert_eq!(CellRange::from_a1("C7").unwrap().to_string(), "C7");
    }

    proptest! {
        #[test]
        fn column_codec_is_a_bijection(n in 1u32..=MAX_COLS) {
            let name = column_number_to_name(n);
            prop_assert_eq!(column_name_to_number(&name).unwrap(), n);
            let expected_len = match n {
                1..=26 => 1,
                27..=702 => 2,
                _ => 3,
            };
            prop_assert_eq!(name.len(), expected_len);
        }

        #[test]
        fn address_codec_roundtrips(row in 1u32..=MAX_ROWS, column in 1u32..=MAX_COLS) {
            let address = to_address(row, column);
            prop_assert_eq!(coordinates_from_address(&address).unwrap(), (row, column));
            prop_assert_eq!(coordinates_from_address(&address.to_lowercase()).unwrap(), (row, column));
        }
    }
}
