use anyhow::{ensure, Result};
use arrow_array::{FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray};
use lancedb::table::AddDataMode;
use lancedb::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use localrag_core::types::{ChildChunk, ParentChunk, PARENT_ID_KEY};

use crate::schema::{child_schema, parent_schema};
use crate::table::{open_db, table_exists};

/// How a write treats rows already in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
	Append,
	/// Swap the whole table content in one new version.
	Replace,
}

/// Writes child chunks (with embeddings) and parent chunks into LanceDB tables.
pub struct LanceChunkWriter { db: Connection }

impl LanceChunkWriter {
	pub async fn new(db_path: &Path) -> Result<Self> {
		let db = open_db(db_path.to_string_lossy().as_ref()).await?;
		Ok(Self { db })
	}

	pub async fn write_children(&self, table: &str, chunks: &[ChildChunk], embeddings: &[Vec<f32>], mode: WriteMode) -> Result<()> {
		ensure!(chunks.len() == embeddings.len(), "chunks ({}) and embeddings ({}) length must match", chunks.len(), embeddings.len());
		let Some(dim) = embeddings.first().map(Vec::len) else { return Ok(()); };
		ensure!(embeddings.iter().all(|e| e.len() == dim), "embeddings have mixed dimensions");
		let batch = children_to_record_batch(chunks, embeddings, dim as i32)?;
		self.write(table, batch, mode).await?;
		info!(table, rows = chunks.len(), dim, ?mode, "wrote child chunks");
		Ok(())
	}

	pub async fn write_parents(&self, table: &str, parents: &[ParentChunk], mode: WriteMode) -> Result<()> {
		if parents.is_empty() { return Ok(()); }
		let batch = parents_to_record_batch(parents)?;
		self.write(table, batch, mode).await?;
		info!(table, rows = parents.len(), ?mode, "wrote parent chunks");
		Ok(())
	}

	async fn write(&self, table: &str, batch: RecordBatch, mode: WriteMode) -> Result<()> {
		let schema = batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
		if table_exists(&self.db, table).await? {
			let add_mode = match mode { WriteMode::Append => AddDataMode::Append, WriteMode::Replace => AddDataMode::Overwrite };
			self.db.open_table(table).execute().await?.add(reader).mode(add_mode).execute().await?;
		} else {
			self.db.create_table(table, reader).execute().await?;
		}
		Ok(())
	}
}

fn children_to_record_batch(chunks: &[ChildChunk], embeddings: &[Vec<f32>], dim: i32) -> Result<RecordBatch> {
	let mut ids = Vec::new(); let mut parent_ids = Vec::new(); let mut sources = Vec::new(); let mut texts = Vec::new(); let mut metas = Vec::new();
	let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
	for (c, e) in chunks.iter().zip(embeddings) {
		let mut metadata = c.metadata.clone();
		metadata.entry(PARENT_ID_KEY.to_string()).or_insert_with(|| c.parent_id.clone());
		ids.push(c.id.clone()); parent_ids.push(c.parent_id.clone()); sources.push(c.source().to_string()); texts.push(c.text.clone());
		metas.push(serde_json::to_string(&metadata)?);
		vectors.push(Some(e.iter().map(|&x| Some(x)).collect()));
	}
	Ok(RecordBatch::try_new(child_schema(dim), vec![
		Arc::new(StringArray::from(ids)),
		Arc::new(StringArray::from(parent_ids)),
		Arc::new(StringArray::from(sources)),
		Arc::new(StringArray::from(texts)),
		Arc::new(StringArray::from(metas)),
		Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim)),
	])?)
}

fn parents_to_record_batch(parents: &[ParentChunk]) -> Result<RecordBatch> {
	let ids: Vec<String> = parents.iter().map(|p| p.id.clone()).collect();
	let texts: Vec<String> = parents.iter().map(|p| p.text.clone()).collect();
	let metas = parents.iter().map(|p| serde_json::to_string(&p.metadata)).collect::<Result<Vec<_>, _>>()?;
	Ok(RecordBatch::try_new(parent_schema(), vec![
		Arc::new(StringArray::from(ids)),
		Arc::new(StringArray::from(texts)),
		Arc::new(StringArray::from(metas)),
	])?)
}
