//! Type inference for raw cell text that carries no type marker.

use crate::{CellValue, ValueType};

/// Classify a raw token.
///
/// - `TRUE`/`FALSE` (any case) are booleans
/// - `-?[0-9]+` is an integer
/// - digits with exactly one `.` or `,` separator are floats
/// - anything else is a string
pub fn classify(token: &str) -> ValueType {
    if token.eq_ignore_ascii_case("true") || token.eq_ignore_ascii_case("false") {
        return ValueType::Boolean;
    }

    let bytes = token.as_bytes();
    let unsigned = bytes.strip_prefix(b"-").unwrap_or(bytes);
    if !unsigned.is_empty() && unsigned.iter().all(u8::is_ascii_digit) {
        return ValueType::Integer;
    }

    let mut separators = 0usize;
    let mut digits = 0usize;
    for b in bytes {
        match b {
            b'0'..=b'9' => digits += 1,
            b'.' | b',' => separators += 1,
            _ => return ValueType::String,
        }
    }
    if separators == 1 && digits > 0 {
        ValueType::Float
    } else {
        ValueType::String
    }
}

/// Classify `token` and convert it to the matching [`CellValue`].
///
/// Integers too large for `i64` are read as floats.
pub fn infer(token: &str) -> CellValue {
    match classify(token) {
        ValueType::Boolean => CellValue::Boolean(token.eq_ignore_ascii_case("true")),
        ValueType::Integer => match token.parse::<i64>() {
            Ok(v) => CellValue::Integer(v),
            Err(_) => token
                .parse::<f64>()
                .map(CellValue::from_float)
                .unwrap_or_else(|_| CellValue::String(token.to_string())),
        },
        ValueType::Float => token
            .replace(',', ".")
            .parse::<f64>()
            .map(CellValue::from_float)
            .unwrap_or_else(|_| CellValue::String(token.to_string())),
        _ => CellValue::String(token.to_string()),
    }
}
