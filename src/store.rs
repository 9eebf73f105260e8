use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::mapping::{FieldMapping, Record};
use crate::sheets::{CellRange, Grid, SheetBackend, SheetError};

/// Generic CRUD over a sheet whose header row is the schema.
///
/// Lookups are linear scans with exact string equality; the first matching
/// row wins. Identity uniqueness is not checked here.
#[derive(Clone)]
pub struct RowStore {
    backend: Arc<dyn SheetBackend>,
    write_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

/// Position of a located row inside a full-sheet read.
struct Located {
    headers: Vec<String>,
    /// 0-based index among data rows (header excluded).
    index: usize,
}

impl RowStore {
    pub fn new(backend: Arc<dyn SheetBackend>) -> Self {
        Self {
            backend,
            write_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Serializes read-merge-write sequences on one sheet within this process.
    async fn lock_sheet(&self, sheet: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.write_locks.lock().await;
            locks.entry(sheet.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    async fn has_header(&self, sheet: &str) -> Result<bool, SheetError> {
        let header = self.backend.read_range(sheet, CellRange::HeaderRow).await?;
        Ok(header.first().is_some_and(|h| !h.is_empty()))
    }

    /// Write the header row unless another writer got there first.
    async fn ensure_header(&self, sheet: &str, mapping: &FieldMapping) -> Result<(), SheetError> {
        let _guard = self.lock_sheet(sheet).await;
        if self.has_header(sheet).await? {
            return Ok(());
        }
        tracing::info!(target: "store", "[{sheet}] writing header row");
        self.backend
            .write_range(sheet, CellRange::Row(1), vec![mapping.headers()])
            .await
    }

    async fn read_all(&self, sheet: &str) -> Result<Grid, SheetError> {
        self.backend
            .read_range(sheet, CellRange::All)
            .await
            .inspect_err(|e| tracing::error!(target: "store", "[{sheet}] read failed: {e}"))
    }

    pub async fn list_all(
        &self,
        sheet: &str,
        mapping: &FieldMapping,
    ) -> Result<Vec<Record>, SheetError> {
        let values = self.read_all(sheet).await?;
        let Some((headers, rows)) = values.split_first() else {
            return Ok(Vec::new());
        };
        Ok(rows
            .iter()
            .map(|row| mapping.row_to_record(headers, row))
            .collect())
    }

    pub async fn get_by_id(
        &self,
        sheet: &str,
        mapping: &FieldMapping,
        id_field: &str,
        id_value: &str,
    ) -> Result<Option<Record>, SheetError> {
        let rows = self.list_all(sheet, mapping).await?;
        Ok(rows
            .into_iter()
            .find(|r| r.get(id_field).map(String::as_str) == Some(id_value)))
    }

    /// Append one record, writing the header row first if the sheet has none.
    pub async fn append(
        &self,
        sheet: &str,
        mapping: &FieldMapping,
        record: &Record,
    ) -> Result<(), SheetError> {
        if !self.has_header(sheet).await? {
            self.ensure_header(sheet, mapping).await?;
        }

        self.backend
            .append_row(sheet, mapping.record_to_row(record))
            .await
            .inspect_err(|e| tracing::error!(target: "store", "[{sheet}] append failed: {e}"))
    }

    /// Merge `partial` onto the row with the given identity and rewrite it in
    /// place. Returns `false` without writing when no row matches.
    pub async fn update(
        &self,
        sheet: &str,
        mapping: &FieldMapping,
        id_field: &str,
        id_value: &str,
        partial: &Record,
    ) -> Result<bool, SheetError> {
        let _guard = self.lock_sheet(sheet).await;
        let values = self.read_all(sheet).await?;
        let Some(found) = locate(&values, mapping, id_field, id_value) else {
            return Ok(false);
        };

        let mut current = mapping.row_to_record(&found.headers, &values[found.index + 1]);
        for (k, v) in partial {
            current.insert(k.clone(), v.clone());
        }

        // +1 for the header, +1 because sheet rows are 1-based.
        let row_number = u32::try_from(found.index + 2)
            .map_err(|_| SheetError::Backend(format!("row index out of range in {sheet}")))?;
        self.backend
            .write_range(
                sheet,
                CellRange::Row(row_number),
                vec![mapping.record_to_row(&current)],
            )
            .await
            .inspect_err(|e| tracing::error!(target: "store", "[{sheet}] update failed: {e}"))?;

        tracing::debug!(target: "store", "[{sheet}] updated {id_field}={id_value} at row {row_number}");
        Ok(true)
    }

    /// Physically remove the row with the given identity.
    pub async fn delete(
        &self,
        sheet: &str,
        mapping: &FieldMapping,
        id_field: &str,
        id_value: &str,
    ) -> Result<bool, SheetError> {
        let _guard = self.lock_sheet(sheet).await;
        let values = self.read_all(sheet).await?;
        let Some(found) = locate(&values, mapping, id_field, id_value) else {
            return Ok(false);
        };

        let start = u32::try_from(found.index + 1)
            .map_err(|_| SheetError::Backend(format!("row index out of range in {sheet}")))?;
        self.backend
            .delete_rows(sheet, start, start + 1)
            .await
            .inspect_err(|e| tracing::error!(target: "store", "[{sheet}] delete failed: {e}"))?;

        tracing::info!(target: "store", "[{sheet}] deleted {id_field}={id_value}");
        Ok(true)
    }
}

fn locate(values: &Grid, mapping: &FieldMapping, id_field: &str, id_value: &str) -> Option<Located> {
    let (headers, rows) = values.split_first()?;
    let column = mapping.column_of(headers, id_field)?;
    let index = rows
        .iter()
        .position(|row| row.get(column).map(String::as_str) == Some(id_value))?;
    Some(Located {
        headers: headers.clone(),
        index,
    })
}
