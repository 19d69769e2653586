//! The four ledger operations over a workbook file: open-or-create, append,
//! delete and read. Every mutating call loads the file, changes one sheet and
//! saves the package back before returning.

use crate::cell::CellValue;
use crate::config::{LedgerConfig, ReadMode, WriteMode};
use crate::error::{LedgerError, Result};
use crate::files_part::Workbook;
use crate::record::ManifestHeader;
use serde::Serialize;
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

/// Rows of one sheet as displayed to a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetView {
    pub sheet: String,
    /// Physical row 1 rendered as labels; `None` under [`ReadMode::RawRows`].
    pub headers: Option<Vec<String>>,
    /// Physical rows 2.. in order; index 0 is display index 0.
    pub rows: Vec<Vec<String>>,
}

impl SheetView {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    config: LedgerConfig,
}

impl Ledger {
    pub fn new(config: LedgerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Loads `path`, or writes a fresh blank workbook there when it is
    /// missing or cannot be parsed. Only a failed write is reported.
    ///
    /// A blank workbook has no sheets until the first record is written.
    /// Excel refuses to open such a file, so export only after an append.
    pub fn open_or_create<P: AsRef<Path>>(&self, path: P) -> Result<Workbook> {
        let path = path.as_ref();
        match Workbook::load(path) {
            Ok(workbook) => return Ok(workbook),
            Err(LedgerError::StorageUnavailable { source, .. })
                if source.kind() == io::ErrorKind::NotFound =>
            {
                debug!(path = %path.display(), "no workbook yet");
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable workbook replaced");
            }
        }
        let mut workbook = Workbook::blank();
        workbook.save(path, self.config.compression_level)?;
        info!(path = %path.display(), "workbook created");
        Ok(workbook)
    }

    /// Ensures a sheet exists for `desired` under `mode` and returns its name.
    pub fn create_sheet<P: AsRef<Path>>(&self, path: P, desired: &str, mode: WriteMode) -> Result<String> {
        let path = path.as_ref();
        let mut workbook = self.open_or_create(path)?;
        let existed = workbook.sheet_names();
        let name = resolve_sheet(&mut workbook, desired, mode)?;
        if !existed.contains(&name) {
            workbook.save(path, self.config.compression_level)?;
            info!(path = %path.display(), sheet = %name, "sheet created");
        }
        Ok(name)
    }

    /// Appends `detail` to `sheet_name`, writing `metadata` first when the
    /// sheet has nothing but (at most) a metadata row.
    pub fn append_record<P: AsRef<Path>>(
        &self,
        path: P,
        sheet_name: &str,
        metadata: &[CellValue],
        detail: &[CellValue],
    ) -> Result<String> {
        self.write_record(path, sheet_name, metadata, detail, WriteMode::Append)
    }

    /// Like [`Ledger::append_record`], with explicit sheet selection. Returns
    /// the name of the sheet that received the row.
    pub fn write_record<P: AsRef<Path>>(
        &self,
        path: P,
        sheet_name: &str,
        metadata: &[CellValue],
        detail: &[CellValue],
        mode: WriteMode,
    ) -> Result<String> {
        let path = path.as_ref();
        let mut workbook = self.open_or_create(path)?;
        let mut name = resolve_sheet(&mut workbook, sheet_name, mode)?;
        let sheet = match workbook.sheet(&name) {
            Err(LedgerError::MalformedWorkbook(reason)) => {
                warn!(path = %path.display(), sheet = %name, %reason, "unreadable sheet, workbook replaced");
                workbook = Workbook::blank();
                name = resolve_sheet(&mut workbook, sheet_name, mode)?;
                workbook.sheet(&name)?
            }
            other => other?,
        };
        let mut sheet =
            sheet.ok_or_else(|| LedgerError::malformed(format!("sheet `{name}` vanished")))?;

        let row = if sheet.last_row() <= 1 {
            sheet.write_row(1, metadata)?;
            sheet.write_row(2, detail)?;
            2
        } else {
            sheet.append_row(detail)?
        };

        workbook.put_sheet(&name, &sheet)?;
        workbook.save(path, self.config.compression_level)?;
        info!(path = %path.display(), sheet = %name, row, "record appended");
        Ok(name)
    }

    /// Removes the row shown at `display_index`; rows below move up by one.
    ///
    /// The physical row is `display_index + row_offset`. A missing file,
    /// sheet or row is [`LedgerError::RowNotFound`] and leaves the file as is.
    pub fn delete_row<P: AsRef<Path>>(&self, path: P, sheet_name: &str, display_index: usize) -> Result<()> {
        let path = path.as_ref();
        let not_found = || LedgerError::RowNotFound {
            sheet: sheet_name.to_owned(),
            index: display_index,
        };

        let mut workbook = match Workbook::load(path) {
            Ok(workbook) => workbook,
            Err(LedgerError::StorageUnavailable { source, .. })
                if source.kind() == io::ErrorKind::NotFound =>
            {
                return Err(not_found());
            }
            Err(LedgerError::MalformedWorkbook(_)) => return Err(not_found()),
            Err(err) => return Err(err),
        };
        let mut sheet = match workbook.sheet(sheet_name) {
            Ok(Some(sheet)) => sheet,
            Ok(None) | Err(LedgerError::MalformedWorkbook(_)) => return Err(not_found()),
            Err(err) => return Err(err),
        };
        let physical = u32::try_from(display_index)
            .ok()
            .and_then(|i| i.checked_add(self.config.row_offset()))
            .ok_or_else(not_found)?;
        if !sheet.delete_row(physical) {
            return Err(not_found());
        }

        workbook.put_sheet(sheet_name, &sheet)?;
        workbook.save(path, self.config.compression_level)?;
        info!(path = %path.display(), sheet = sheet_name, row = physical, "row deleted");
        Ok(())
    }

    /// Data rows of `sheet_name`, or `None` when the file or sheet is missing,
    /// unreadable, or holds no rows past the metadata row.
    pub fn read_sheet<P: AsRef<Path>>(&self, path: P, sheet_name: &str, mode: ReadMode) -> Option<SheetView> {
        let path = path.as_ref();
        let workbook = Workbook::load(path)
            .inspect_err(|err| debug!(path = %path.display(), error = %err, "read skipped"))
            .ok()?;
        let sheet = workbook
            .sheet(sheet_name)
            .inspect_err(|err| debug!(sheet = sheet_name, error = %err, "read skipped"))
            .ok()??;

        let shared = workbook.shared_strings();
        let rows: Vec<Vec<String>> = sheet
            .rows_from(2, shared)
            .iter()
            .map(|row| display(row))
            .collect();
        if rows.is_empty() {
            return None;
        }
        let headers = match mode {
            ReadMode::MetadataAsHeader => Some(display(&sheet.row_values(1, shared))),
            ReadMode::RawRows => None,
        };
        Some(SheetView {
            sheet: sheet_name.to_owned(),
            headers,
            rows,
        })
    }

    /// City and date of a manifest sheet, from its metadata row.
    pub fn manifest_header<P: AsRef<Path>>(&self, path: P, sheet_name: &str) -> Option<ManifestHeader> {
        let workbook = Workbook::load(path).ok()?;
        let sheet = workbook.sheet(sheet_name).ok()??;
        let metadata = display(&sheet.row_values(1, workbook.shared_strings()));
        ManifestHeader::from_cells(&metadata, sheet_name)
    }
}

/// Picks the sheet a write goes to, adding it to `workbook` when needed.
///
/// `Append` reuses `desired` if present. `Fresh` always adds a sheet, trying
/// `desired`, then `desired_1`, `desired_2`, … until a name is free.
pub fn resolve_sheet(workbook: &mut Workbook, desired: &str, mode: WriteMode) -> Result<String> {
    let mut candidate = desired.to_owned();
    if mode == WriteMode::Append && workbook.contains_sheet(&candidate) {
        return Ok(candidate);
    }
    let mut counter = 1u32;
    while workbook.contains_sheet(&candidate) {
        candidate = format!("{desired}_{counter}");
        counter += 1;
    }
    workbook.add_sheet(&candidate)?;
    Ok(candidate)
}

fn display(row: &[CellValue]) -> Vec<String> {
    row.iter().map(ToString::to_string).collect()
}
