use serde::{Deserialize, Serialize};

/// Physical row of display index 0. Row 1 holds the metadata record in every
/// read mode, so items start at row 2.
pub const DEFAULT_ROW_OFFSET: u32 = 2;

/// How physical row 1 is treated when a sheet is read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// Row 1 becomes the column labels, rows 2.. are data.
    #[default]
    MetadataAsHeader,
    /// Row 1 is skipped, rows 2.. are returned without labels.
    RawRows,
}

/// Target sheet selection for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Reuse the sheet with the requested name, creating it if missing.
    #[default]
    Append,
    /// Always create a new sheet; `name_1`, `name_2`, … on collision.
    Fresh,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Overrides [`DEFAULT_ROW_OFFSET`] for [`crate::Ledger::delete_row`].
    pub row_offset: Option<u32>,
    /// Deflate level for saved packages; `None` is the zip default.
    pub compression_level: Option<i64>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            row_offset: None,
            compression_level: Some(1),
        }
    }
}

impl LedgerConfig {
    pub fn with_row_offset(mut self, row_offset: u32) -> Self {
        self.row_offset = Some(row_offset);
        self
    }

    pub fn with_compression_level(mut self, level: Option<i64>) -> Self {
        self.compression_level = level;
        self
    }

    /// Effective display-index → physical-row offset.
    pub fn row_offset(&self) -> u32 {
        self.row_offset.unwrap_or(DEFAULT_ROW_OFFSET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_offset_defaults_past_the_metadata_row() {
        assert_eq!(LedgerConfig::default().row_offset(), DEFAULT_ROW_OFFSET);
        assert_eq!(LedgerConfig::default().with_row_offset(1).row_offset(), 1);
    }
}
