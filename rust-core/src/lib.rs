//! Delivery-manifest ledger stored in an XLSX workbook.
//!
//! Each sheet is one manifest: physical row 1 holds the metadata record
//! (city, date) and every row below it is one line item. Rows are shown to
//! users by a zero-based display index, mapped back to physical rows through
//! [`LedgerConfig::row_offset`].
//!
//! ```no_run
//! use romaneio_core::{CellValue, Ledger, ReadMode};
//!
//! let ledger = Ledger::default();
//! let meta = [CellValue::from("Paulínia"), CellValue::from("01/01/2025")];
//! let item = [CellValue::from("123456789"), CellValue::from("ACME")];
//! ledger.append_record("romaneio.xlsx", "01_01_2025", &meta, &item)?;
//! let view = ledger.read_sheet("romaneio.xlsx", "01_01_2025", ReadMode::RawRows);
//! assert_eq!(view.map(|v| v.len()), Some(1));
//! # Ok::<(), romaneio_core::LedgerError>(())
//! ```

mod cell;
mod config;
mod error;
mod files_part;
mod ledger;
pub mod record;
mod sheet_part;

use std::path::Path;

pub use cell::CellValue;
pub use config::{DEFAULT_ROW_OFFSET, LedgerConfig, ReadMode, WriteMode};
pub use error::{LedgerError, Result};
pub use files_part::Workbook;
pub use ledger::{Ledger, SheetView, resolve_sheet};
pub use record::{LineItem, ManifestHeader};

/// Sheet names of the workbook at `src`, in tab order.
pub fn scan<P: AsRef<Path>>(src: P) -> Result<Vec<String>> {
    Workbook::load(src).map(|wb| wb.sheet_names())
}
