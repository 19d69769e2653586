//! Typed manifest records and their positional row layout.

use crate::cell::CellValue;
use chrono::NaiveDate;

/// `dd_mm_yyyy`, the sheet name of a manifest date.
pub const SHEET_KEY_FORMAT: &str = "%d_%m_%Y";
/// `dd/mm/yyyy`, the date as written in the metadata row.
pub const DATE_FORMAT: &str = "%d/%m/%Y";

pub fn sheet_key(date: NaiveDate) -> String {
    date.format(SHEET_KEY_FORMAT).to_string()
}

/// Date encoded in a sheet name. Accepts a `_N` disambiguation suffix.
pub fn parse_sheet_key(name: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(name, SHEET_KEY_FORMAT) {
        return Some(date);
    }
    let (base, suffix) = name.rsplit_once('_')?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(base, SHEET_KEY_FORMAT).ok()
}

/// Metadata row: who the manifest is for and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestHeader {
    pub city: String,
    pub date: NaiveDate,
}

impl ManifestHeader {
    pub fn new(city: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            city: city.into(),
            date,
        }
    }

    pub fn sheet_key(&self) -> String {
        sheet_key(self.date)
    }

    pub fn cells(&self) -> Vec<CellValue> {
        vec![
            CellValue::from(self.city.as_str()),
            CellValue::from(self.date.format(DATE_FORMAT).to_string()),
        ]
    }

    /// Rebuilds a header from a stored metadata row. The date falls back to
    /// the one encoded in `sheet_name` when the second cell does not parse.
    pub fn from_cells(cells: &[String], sheet_name: &str) -> Option<Self> {
        let city = cells.first().filter(|c| !c.is_empty())?.clone();
        let date = cells
            .get(1)
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), DATE_FORMAT).ok())
            .or_else(|| parse_sheet_key(sheet_name))?;
        Some(Self { city, date })
    }
}

/// Detail row: one delivered order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub order_number: String,
    pub reseller: String,
    pub payment: String,
    pub amount_cents: u64,
}

impl LineItem {
    pub fn cells(&self) -> Vec<CellValue> {
        vec![
            CellValue::from(self.order_number.as_str()),
            CellValue::from(self.reseller.as_str()),
            CellValue::from(self.payment.as_str()),
            CellValue::from(format_brl(self.amount_cents)),
        ]
    }
}

/// 1000 -> `R$ 10.00`
pub fn format_brl(cents: u64) -> String {
    format!("R$ {}.{:02}", cents / 100, cents % 100)
}
