use anyhow::Result;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use localrag_core::traits::{ParentStore, SemanticChannel};
use localrag_core::types::{MetadataFilter, ParentChunk, SearchHit, PARENT_ID_KEY, SOURCE_KEY};

use crate::table::{f32_col, meta_at, open_db, sql_literal, str_col};

/// Cosine nearest-neighbour search over the child table.
///
/// Scores are `max(0, 1 - cosine distance)`. Filters on `source` and
/// `parent_id` are pushed into the scan; other keys are matched against the
/// decoded metadata afterwards.
pub struct LanceSemanticChannel { table: Table }

impl LanceSemanticChannel {
	pub async fn open(db_path: &Path, table_name: &str) -> Result<Self> {
		let db = open_db(db_path.to_string_lossy().as_ref()).await?;
		let table = db.open_table(table_name).execute().await?;
		Ok(Self { table })
	}

	pub fn from_table(table: Table) -> Self { Self { table } }
}

fn split_filter(filter: Option<&MetadataFilter>) -> (Option<String>, MetadataFilter) {
	let mut clauses = Vec::new();
	let mut residual = MetadataFilter::new();
	for (key, value) in filter.into_iter().flat_map(MetadataFilter::iter) {
		match key.as_str() {
			SOURCE_KEY | PARENT_ID_KEY => clauses.push(format!("{key} = {}", sql_literal(value))),
			_ => residual = residual.with(key.clone(), value.clone()),
		}
	}
	let predicate = if clauses.is_empty() { None } else { Some(clauses.join(" AND ")) };
	(predicate, residual)
}

#[async_trait]
impl SemanticChannel for LanceSemanticChannel {
	async fn query(&self, vector: &[f32], k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<SearchHit>> {
		if k == 0 { return Ok(Vec::new()); }
		let (predicate, residual) = split_filter(filter);
		// Residual keys can reject any row, so rank the whole table before cutting to k.
		let limit = if residual.is_empty() { k } else { self.table.count_rows(None).await?.max(k) };
		let mut query = self.table.vector_search(vector.to_vec())?.distance_type(DistanceType::Cosine).limit(limit);
		if let Some(p) = predicate { query = query.only_if(p); }
		let mut stream = query.execute().await?;
		let mut hits = Vec::new();
		'batches: while let Some(batch) = stream.try_next().await? {
			let ids = str_col(&batch, "id")?;
			let texts = str_col(&batch, "text")?;
			let metas = str_col(&batch, "metadata")?;
			let parents = str_col(&batch, "parent_id")?;
			let distances = f32_col(&batch, "_distance");
			for i in 0..batch.num_rows() {
				let mut metadata = meta_at(metas, i)?;
				metadata.entry(PARENT_ID_KEY.to_string()).or_insert_with(|| parents.value(i).to_string());
				if !residual.matches(&metadata) { continue; }
				let score = distances.map_or(0.0, |d| (1.0 - d.value(i)).max(0.0));
				hits.push(SearchHit::semantic(ids.value(i), texts.value(i), metadata, score));
				if hits.len() == k { break 'batches; }
			}
		}
		debug!(hits = hits.len(), k, "semantic channel");
		Ok(hits)
	}
}

/// Parent chunk lookup by id over the parent table.
pub struct LanceParentStore { table: Table }

impl LanceParentStore {
	pub async fn open(db_path: &Path, table_name: &str) -> Result<Self> {
		let db = open_db(db_path.to_string_lossy().as_ref()).await?;
		let table = db.open_table(table_name).execute().await?;
		Ok(Self { table })
	}

	pub fn from_table(table: Table) -> Self { Self { table } }
}

#[async_trait]
impl ParentStore for LanceParentStore {
	async fn fetch(&self, ids: &[String]) -> Result<HashMap<String, ParentChunk>> {
		let mut out = HashMap::new();
		if ids.is_empty() { return Ok(out); }
		let list = ids.iter().map(|id| sql_literal(id)).collect::<Vec<_>>().join(", ");
		let mut stream = self.table.query().only_if(format!("id IN ({list})")).limit(ids.len()).execute().await?;
		while let Some(batch) = stream.try_next().await? {
			let id_col = str_col(&batch, "id")?;
			let texts = str_col(&batch, "text")?;
			let metas = str_col(&batch, "metadata")?;
			for i in 0..batch.num_rows() {
				let id = id_col.value(i).to_string();
				out.insert(id.clone(), ParentChunk { id, text: texts.value(i).to_string(), metadata: meta_at(metas, i)? });
			}
		}
		debug!(requested = ids.len(), found = out.len(), "parent lookup");
		Ok(out)
	}
}
