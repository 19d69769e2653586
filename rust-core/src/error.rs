use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The filesystem refused to read, create or replace the workbook.
    #[error("storage unavailable at {}: {source}", path.display())]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("row {index} not found in sheet `{sheet}`")]
    RowNotFound { sheet: String, index: usize },
    /// The file exists but is not a workbook we can parse.
    #[error("malformed workbook: {0}")]
    MalformedWorkbook(String),
}

impl LedgerError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StorageUnavailable {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(msg: impl std::fmt::Display) -> Self {
        Self::MalformedWorkbook(msg.to_string())
    }
}

impl From<quick_xml::Error> for LedgerError {
    fn from(value: quick_xml::Error) -> Self {
        Self::malformed(value)
    }
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;
