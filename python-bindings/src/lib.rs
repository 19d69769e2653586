use pyo3::exceptions::{PyIndexError, PyOSError, PyRuntimeError};
use pyo3::prelude::*;

use romaneio_core::{CellValue, Ledger, LedgerConfig, LedgerError, ReadMode, SheetView, WriteMode};
use std::path::PathBuf;

fn to_py_err(e: LedgerError) -> PyErr {
    match e {
        LedgerError::StorageUnavailable { .. } => PyOSError::new_err(e.to_string()),
        LedgerError::RowNotFound { .. } => PyIndexError::new_err(e.to_string()),
        LedgerError::MalformedWorkbook(_) => PyRuntimeError::new_err(e.to_string()),
    }
}

/// `None`, `bool`, `str`, `int` and `float` map onto cell values; anything
/// else is stored as its `str()`.
fn to_cells(items: Vec<Bound<'_, PyAny>>) -> PyResult<Vec<CellValue>> {
    items
        .into_iter()
        .map(|item| {
            if item.is_none() {
                return Ok(CellValue::Empty);
            }
            if let Ok(b) = item.extract::<bool>() {
                return Ok(CellValue::Boolean(b));
            }
            if let Ok(s) = item.extract::<String>() {
                return Ok(CellValue::String(s));
            }
            if let Ok(n) = item.extract::<f64>() {
                return Ok(CellValue::Number(n));
            }
            Ok(CellValue::String(item.str()?.to_string()))
        })
        .collect()
}

#[pyclass(name = "SheetView", frozen)]
struct PySheetView {
    #[pyo3(get)]
    sheet: String,
    #[pyo3(get)]
    headers: Option<Vec<String>>,
    #[pyo3(get)]
    rows: Vec<Vec<String>>,
}

#[pymethods]
impl PySheetView {
    fn __len__(&self) -> usize {
        self.rows.len()
    }
}

impl From<SheetView> for PySheetView {
    fn from(v: SheetView) -> Self {
        PySheetView {
            sheet: v.sheet,
            headers: v.headers,
            rows: v.rows,
        }
    }
}

/// Opens or creates the workbook and returns its sheet names.
#[pyfunction]
fn open_or_create(path: PathBuf) -> PyResult<Vec<String>> {
    Ledger::default()
        .open_or_create(&path)
        .map(|wb| wb.sheet_names())
        .map_err(to_py_err)
}

#[pyfunction]
fn append_record(
    path: PathBuf,
    sheet_name: &str,
    metadata: Vec<Bound<'_, PyAny>>,
    detail: Vec<Bound<'_, PyAny>>,
) -> PyResult<String> {
    Ledger::default()
        .append_record(&path, sheet_name, &to_cells(metadata)?, &to_cells(detail)?)
        .map_err(to_py_err)
}

#[pyfunction]
#[pyo3(signature = (path, sheet_name, metadata, detail, append_mode = true))]
fn write_record(
    path: PathBuf,
    sheet_name: &str,
    metadata: Vec<Bound<'_, PyAny>>,
    detail: Vec<Bound<'_, PyAny>>,
    append_mode: bool,
) -> PyResult<String> {
    let mode = if append_mode { WriteMode::Append } else { WriteMode::Fresh };
    Ledger::default()
        .write_record(&path, sheet_name, &to_cells(metadata)?, &to_cells(detail)?, mode)
        .map_err(to_py_err)
}

#[pyfunction]
#[pyo3(signature = (path, sheet_name, display_index, row_offset = None))]
fn delete_row(path: PathBuf, sheet_name: &str, display_index: usize, row_offset: Option<u32>) -> PyResult<()> {
    let config = LedgerConfig { row_offset, ..LedgerConfig::default() };
    Ledger::new(config)
        .delete_row(&path, sheet_name, display_index)
        .map_err(to_py_err)
}

#[pyfunction]
#[pyo3(signature = (path, sheet_name, raw_rows = false))]
fn read_sheet(path: PathBuf, sheet_name: &str, raw_rows: bool) -> Option<PySheetView> {
    let mode = if raw_rows { ReadMode::RawRows } else { ReadMode::MetadataAsHeader };
    Ledger::default()
        .read_sheet(&path, sheet_name, mode)
        .map(PySheetView::from)
}

#[pyfunction]
fn scan(path: PathBuf) -> PyResult<Vec<String>> {
    romaneio_core::scan(&path).map_err(to_py_err)
}

#[pymodule]
fn romaneio_py(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PySheetView>()?;
    m.add_function(wrap_pyfunction!(open_or_create, m)?)?;
    m.add_function(wrap_pyfunction!(append_record, m)?)?;
    m.add_function(wrap_pyfunction!(write_record, m)?)?;
    m.add_function(wrap_pyfunction!(delete_row, m)?)?;
    m.add_function(wrap_pyfunction!(read_sheet, m)?)?;
    m.add_function(wrap_pyfunction!(scan, m)?)?;
    Ok(())
}
