//! LanceDB connection helpers and typed column access.

use anyhow::{anyhow, Result};
use arrow_array::{Array, Float32Array, RecordBatch, StringArray};
use lancedb::{connect, Connection};

use localrag_core::types::Meta;

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    Ok(conn.table_names().execute().await?.iter().any(|n| n == name))
}

pub(crate) fn str_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("{name} column missing or not utf8"))
}

pub(crate) fn f32_col<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a Float32Array> {
    batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<Float32Array>())
}

pub(crate) fn meta_at(col: &StringArray, row: usize) -> Result<Meta> {
    if col.is_null(row) || col.value(row).is_empty() {
        return Ok(Meta::new());
    }
    Ok(serde_json::from_str(col.value(row))?)
}

/// SQL string literal with embedded quotes doubled.
pub(crate) fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
