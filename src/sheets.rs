use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Cell grid as the backend returns it: rows of text cells, top to bottom.
pub type Grid = Vec<Vec<String>>;

#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    #[error("sheet `{0}` not found")]
    SheetNotFound(String),
    #[error("backend misconfigured: {0}")]
    Config(String),
    #[error("backend request failed: {0}")]
    Backend(String),
}

/// A1-style range over columns `A..Z` of one sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellRange {
    /// `A:Z`, every row.
    All,
    /// `1:1`, the header row.
    HeaderRow,
    /// `A{n}:Z{n}`, one 1-based row.
    Row(u32),
}

impl CellRange {
    pub const fn first_row(self) -> u32 {
        match self {
            Self::All | Self::HeaderRow => 1,
            Self::Row(n) => n,
        }
    }

    /// Fully qualified A1 notation, e.g. `'Khách hàng'!A2:Z2`.
    pub fn a1(self, sheet: &str) -> String {
        format!("{}!{self}", quote_sheet(sheet))
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "A:Z"),
            Self::HeaderRow => write!(f, "1:1"),
            Self::Row(n) => write!(f, "A{n}:Z{n}"),
        }
    }
}

fn quote_sheet(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

/// The four request shapes the row store issues against a tabular backend.
///
/// Row 1 is the header row and column A starts the data. Implementations do
/// no retries; any failure is returned as-is.
#[async_trait]
pub trait SheetBackend: Send + Sync {
    async fn read_range(&self, sheet: &str, range: CellRange) -> Result<Grid, SheetError>;

    /// Overwrite cells starting at the range's first row, column A.
    async fn write_range(&self, sheet: &str, range: CellRange, values: Grid)
        -> Result<(), SheetError>;

    /// Insert a new row after the last row of the sheet.
    async fn append_row(&self, sheet: &str, row: Vec<String>) -> Result<(), SheetError>;

    /// Remove rows `[start, end)` (0-based, header row is 0) and shift the
    /// rest up.
    async fn delete_rows(&self, sheet: &str, start: u32, end: u32) -> Result<(), SheetError>;
}

/// In-process sheet store. Backs tests and `SHEET_BACKEND=memory`.
#[derive(Default)]
pub struct MemorySheets {
    sheets: Mutex<HashMap<String, Grid>>,
    unreachable: AtomicBool,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following request fail like a dead connection.
    #[cfg(test)]
    pub fn set_unreachable(&self, down: bool) {
        self.unreachable.store(down, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub async fn snapshot(&self, sheet: &str) -> Grid {
        self.sheets.lock().await.get(sheet).cloned().unwrap_or_default()
    }

    #[cfg(test)]
    pub async fn seed(&self, sheet: &str, grid: Grid) {
        self.sheets.lock().await.insert(sheet.to_string(), grid);
    }

    fn check(&self) -> Result<(), SheetError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SheetError::Backend("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SheetBackend for MemorySheets {
    async fn read_range(&self, sheet: &str, range: CellRange) -> Result<Grid, SheetError> {
        self.check()?;
        let sheets = self.sheets.lock().await;
        let Some(grid) = sheets.get(sheet) else {
            return Ok(Vec::new());
        };
        let out = match range {
            CellRange::All => grid.clone(),
            CellRange::HeaderRow => grid.iter().take(1).cloned().collect(),
            CellRange::Row(n) => grid
                .get(n.saturating_sub(1) as usize)
                .cloned()
                .into_iter()
                .collect(),
        };
        Ok(out)
    }

    async fn write_range(
        &self,
        sheet: &str,
        range: CellRange,
        values: Grid,
    ) -> Result<(), SheetError> {
        self.check()?;
        let mut sheets = self.sheets.lock().await;
        let grid = sheets.entry(sheet.to_string()).or_default();
        let start = range.first_row().saturating_sub(1) as usize;
        for (offset, row) in values.into_iter().enumerate() {
            let idx = start + offset;
            if grid.len() <= idx {
                grid.resize(idx + 1, Vec::new());
            }
            grid[idx] = row;
        }
        Ok(())
    }

    async fn append_row(&self, sheet: &str, row: Vec<String>) -> Result<(), SheetError> {
        self.check()?;
        let mut sheets = self.sheets.lock().await;
        sheets.entry(sheet.to_string()).or_default().push(row);
        Ok(())
    }

    async fn delete_rows(&self, sheet: &str, start: u32, end: u32) -> Result<(), SheetError> {
        self.check()?;
        let mut sheets = self.sheets.lock().await;
        let grid = sheets
            .get_mut(sheet)
            .ok_or_else(|| SheetError::SheetNotFound(sheet.to_string()))?;
        let start = (start as usize).min(grid.len());
        let end = (end as usize).clamp(start, grid.len());
        grid.drain(start..end);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| (*c).to_string()).collect()
    }

    #[test]
    fn ranges_render_as_a1() {
        assert_eq!(CellRange::All.a1("Khách hàng"), "'Khách hàng'!A:Z");
        assert_eq!(CellRange::HeaderRow.a1("Giao dịch"), "'Giao dịch'!1:1");
        assert_eq!(CellRange::Row(7).a1("Don't"), "'Don''t'!A7:Z7");
    }

    #[tokio::test]
    async fn missing_sheet_reads_as_empty() {
        let mem = MemorySheets::new();
        assert!(mem.read_range("x", CellRange::All).await.unwrap().is_empty());
        assert!(mem.read_range("x", CellRange::HeaderRow).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_overwrites_one_row_in_place() {
        let mem = MemorySheets::new();
        mem.seed("s", vec![row(&["h"]), row(&["a"]), row(&["b"])]).await;
        mem.write_range("s", CellRange::Row(2), vec![row(&["z"])])
            .await
            .unwrap();
        assert_eq!(mem.snapshot("s").await, vec![row(&["h"]), row(&["z"]), row(&["b"])]);
    }

    #[tokio::test]
    async fn delete_shifts_following_rows_up() {
        let mem = MemorySheets::new();
        mem.seed("s", vec![row(&["h"]), row(&["a"]), row(&["b"])]).await;
        mem.delete_rows("s", 1, 2).await.unwrap();
        assert_eq!(mem.snapshot("s").await, vec![row(&["h"]), row(&["b"])]);
    }

    #[tokio::test]
    async fn unreachable_backend_fails_every_call() {
        let mem = MemorySheets::new();
        mem.set_unreachable(true);
        assert!(matches!(
            mem.append_row("s", row(&["a"])).await,
            Err(SheetError::Backend(_))
        ));
        assert!(mem.read_range("s", CellRange::All).await.is_err());
    }
}
