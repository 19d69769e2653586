use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar cell value as stored in a ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum CellValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Empty,
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::String(s) => s.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::String(s) => f.write_str(s),
            // whole numbers print without the trailing ".0"
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Boolean(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            CellValue::Empty => Ok(()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::String(value.to_owned())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::String(value)
    }
}

impl From<&String> for CellValue {
    fn from(value: &String) -> Self {
        CellValue::String(value.clone())
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Boolean(value)
    }
}

/// 0 -> "A", 25 -> "Z", 26 -> "AA".
pub(crate) fn col_idx_to_letters(mut idx: usize) -> String {
    let mut s = String::new();
    loop {
        let rem = idx % 26;
        s.insert(0, (b'A' + rem as u8) as char);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    s
}

/// Last column of a worksheet, `XFD`.
pub(crate) const MAX_COL: usize = 16_383;
/// Last row of a worksheet.
pub(crate) const MAX_ROW: u32 = 1_048_576;

/// "A" -> 0, "AA" -> 26. `None` when `s` carries no column letters or
/// names a column past [`MAX_COL`].
pub(crate) fn letters_to_col_idx(s: &str) -> Option<usize> {
    let letters: Vec<u8> = s
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .collect();
    if letters.is_empty() {
        return None;
    }
    let n = letters.iter().try_fold(0usize, |acc, b| {
        acc.checked_mul(26)?
            .checked_add((b.to_ascii_uppercase() - b'A' + 1) as usize)
    })?;
    Some(n - 1).filter(|&idx| idx <= MAX_COL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters_roundtrip_edges() {
        assert_eq!(col_idx_to_letters(0), "A");
        assert_eq!(col_idx_to_letters(3), "D");
        assert_eq!(col_idx_to_letters(25), "Z");
        assert_eq!(col_idx_to_letters(26), "AA");
        assert_eq!(col_idx_to_letters(701), "ZZ");
        assert_eq!(letters_to_col_idx("D12"), Some(3));
        assert_eq!(letters_to_col_idx("aa1"), Some(26));
        assert_eq!(letters_to_col_idx("12"), None);
        assert_eq!(letters_to_col_idx("XFD1"), Some(MAX_COL));
        assert_eq!(letters_to_col_idx("XFE1"), None);
        assert_eq!(letters_to_col_idx("ZZZZZZZZZZZZZZZZ2"), None);
    }

    #[test]
    fn numbers_display_without_trailing_zero() {
        assert_eq!(CellValue::Number(10.0).to_string(), "10");
        assert_eq!(CellValue::Number(10.5).to_string(), "10.5");
        assert_eq!(CellValue::from("R$ 10.00").to_string(), "R$ 10.00");
        assert_eq!(CellValue::Empty.to_string(), "");
        assert!(CellValue::from("").is_empty());
    }
}
