use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument, UpdateOptions},
    Client, Collection, Database, IndexModel,
};
use once_cell::sync::OnceCell;

use crate::entities;
use crate::sheets::{CellRange, Grid, SheetBackend, SheetError};

/// Process-wide database handle, set once at startup.
static MONGO_DB: OnceCell<Database> = OnceCell::new();

const COUNTERS: &str = "sheet_counters";

pub fn db() -> Result<&'static Database, String> {
    MONGO_DB
        .get()
        .ok_or_else(|| "MongoDB not initialized".to_string())
}

/// Firestore's Mongo API refuses custom index creation.
fn is_firestore_uri(uri: &str) -> bool {
    uri.contains(".firestore.goog")
}

pub async fn init_mongo(uri: &str, dbname: &str) -> Result<()> {
    let client = Client::with_uri_str(uri)
        .await
        .map_err(|e| anyhow!("Mongo connect error: {}", e))?;
    let database = client.database(dbname);

    ensure_indexes(&database, is_firestore_uri(uri))
        .await
        .map_err(|e| anyhow!(e))?;

    MONGO_DB
        .set(database)
        .map_err(|_| anyhow!("MongoDB already initialized"))?;

    tracing::info!(target: "store", "[mongo] connected to database `{dbname}`");
    Ok(())
}

/// Rows sort by insertion sequence; the header row always has `seq` 0.
pub fn sort_by_seq() -> FindOptions {
    FindOptions::builder().sort(doc! { "seq": 1 }).build()
}

async fn ensure_indexes(db: &Database, on_firestore: bool) -> Result<(), String> {
    if on_firestore {
        return Ok(());
    }

    for spec in entities::ALL {
        let rows = db.collection::<Document>(spec.sheet);
        let idx_seq = IndexModel::builder()
            .keys(doc! { "seq": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name(Some("uniq_row_seq".into()))
                    .build(),
            )
            .build();
        let _ = rows.create_index(idx_seq, None).await;
    }

    Ok(())
}

/// Sheets emulated on MongoDB: one collection per sheet, one document per row
/// (`{ seq, cells }`).
///
/// Row position is the rank by `seq`, so deleting a document shifts every
/// later row up without rewriting them. Appends draw `seq` from an atomic
/// per-sheet counter and never contend with each other.
pub struct MongoSheets {
    db: Database,
}

impl MongoSheets {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn from_global() -> Result<Self, SheetError> {
        db().map(|d| Self::new(d.clone())).map_err(SheetError::Config)
    }

    fn rows(&self, sheet: &str) -> Collection<Document> {
        self.db.collection(sheet)
    }

    async fn next_seq(&self, sheet: &str) -> Result<i64, SheetError> {
        let counters = self.db.collection::<Document>(COUNTERS);
        let opts = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let counter = counters
            .find_one_and_update(doc! { "_id": sheet }, doc! { "$inc": { "seq": 1_i64 } }, opts)
            .await
            .map_err(|e| SheetError::Backend(format!("Mongo counter error: {e}")))?
            .ok_or_else(|| SheetError::Backend("Mongo counter missing after upsert".into()))?;
        counter
            .get_i64("seq")
            .map_err(|e| SheetError::Backend(e.to_string()))
    }

    /// The header is the single document with `seq` 0; concurrent first
    /// writers converge on it instead of inserting twice.
    async fn upsert_header(&self, sheet: &str, row: Vec<String>) -> Result<(), SheetError> {
        let opts = UpdateOptions::builder().upsert(true).build();
        self.rows(sheet)
            .update_one(doc! { "seq": 0_i64 }, doc! { "$set": { "cells": row } }, opts)
            .await
            .map_err(|e| SheetError::Backend(format!("Mongo header upsert error: {e}")))?;
        Ok(())
    }

    /// Documents at positions `[skip, skip + limit)`.
    async fn window(&self, sheet: &str, skip: u64, limit: i64) -> Result<Vec<Document>, SheetError> {
        let opts = FindOptions::builder()
            .sort(doc! { "seq": 1 })
            .skip(skip)
            .limit(limit)
            .build();
        let cur = self
            .rows(sheet)
            .find(doc! {}, opts)
            .await
            .map_err(|e| SheetError::Backend(format!("Mongo find error: {e}")))?;
        cur.try_collect::<Vec<Document>>()
            .await
            .map_err(|e| SheetError::Backend(e.to_string()))
    }
}

fn cells_of(d: &Document) -> Vec<String> {
    d.get_array("cells")
        .map(|cells| {
            cells
                .iter()
                .map(|c| match c {
                    Bson::String(s) => s.clone(),
                    Bson::Null => String::new(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl SheetBackend for MongoSheets {
    async fn read_range(&self, sheet: &str, range: CellRange) -> Result<Grid, SheetError> {
        let docs = match range {
            CellRange::All => {
                let cur = self
                    .rows(sheet)
                    .find(doc! {}, sort_by_seq())
                    .await
                    .map_err(|e| SheetError::Backend(format!("Mongo find error: {e}")))?;
                cur.try_collect::<Vec<Document>>()
                    .await
                    .map_err(|e| SheetError::Backend(e.to_string()))?
            }
            CellRange::HeaderRow => self.window(sheet, 0, 1).await?,
            CellRange::Row(n) => self.window(sheet, u64::from(n.saturating_sub(1)), 1).await?,
        };
        Ok(docs.iter().map(cells_of).collect())
    }

    async fn write_range(
        &self,
        sheet: &str,
        range: CellRange,
        values: Grid,
    ) -> Result<(), SheetError> {
        let coll = self.rows(sheet);
        let start = u64::from(range.first_row().saturating_sub(1));

        for (offset, row) in values.into_iter().enumerate() {
            let position = start + offset as u64;
            if position == 0 {
                self.upsert_header(sheet, row).await?;
                continue;
            }
            let existing = self.window(sheet, position, 1).await?;

            match existing.first().and_then(|d| d.get_object_id("_id").ok()) {
                Some(id) => {
                    coll.update_one(doc! { "_id": id }, doc! { "$set": { "cells": row } }, None)
                        .await
                        .map_err(|e| SheetError::Backend(format!("Mongo update row error: {e}")))?;
                }
                None => {
                    let seq = self.next_seq(sheet).await?;
                    coll.insert_one(doc! { "seq": seq, "cells": row }, None)
                        .await
                        .map_err(|e| SheetError::Backend(format!("Mongo insert row error: {e}")))?;
                }
            }
        }
        Ok(())
    }

    async fn append_row(&self, sheet: &str, row: Vec<String>) -> Result<(), SheetError> {
        let seq = self.next_seq(sheet).await?;
        self.rows(sheet)
            .insert_one(doc! { "seq": seq, "cells": row }, None)
            .await
            .map_err(|e| SheetError::Backend(format!("Mongo insert row error: {e}")))?;
        Ok(())
    }

    async fn delete_rows(&self, sheet: &str, start: u32, end: u32) -> Result<(), SheetError> {
        let count = i64::from(end.saturating_sub(start));
        if count == 0 {
            return Ok(());
        }
        let ids: Vec<Bson> = self
            .window(sheet, u64::from(start), count)
            .await?
            .iter()
            .filter_map(|d| d.get("_id").cloned())
            .collect();
        self.rows(sheet)
            .delete_many(doc! { "_id": { "$in": ids } }, None)
            .await
            .map_err(|e| SheetError::Backend(format!("Mongo delete rows error: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn firestore_uris_are_detected() {
        assert!(is_firestore_uri("mongodb://x.firestore.goog:443/db"));
        assert!(!is_firestore_uri("mongodb://localhost:27017"));
    }

    #[test]
    fn cells_read_back_as_text() {
        let d = doc! { "seq": 3_i64, "cells": ["a", Bson::Null, 5_i32] };
        assert_eq!(cells_of(&d), vec!["a", "", "5"]);
        assert!(cells_of(&doc! { "seq": 1_i64 }).is_empty());
    }

    #[test]
    fn db_is_unset_before_init() {
        assert!(MongoSheets::from_global().is_err());
    }
}
