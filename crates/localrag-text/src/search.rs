use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, ConstScoreQuery, Occur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{Index, IndexReader, ReloadPolicy, Searcher, TantivyDocument, Term};
use tracing::debug;

use localrag_core::traits::KeywordChannel;
use localrag_core::types::{Meta, MetadataFilter, SearchHit, PARENT_ID_KEY, SOURCE_KEY};

use crate::tantivy_utils::{register_tokenizer, ChildFields};

/// BM25 channel over a tantivy child index.
///
/// Each query term becomes an optional clause, so a document's score is the
/// sum of its per-term BM25 contributions. Filters on `source` and `parent_id`
/// run inside the index; any other keys are checked against stored metadata.
pub struct TantivyKeywordChannel {
	reader: IndexReader,
	fields: ChildFields,
}

impl TantivyKeywordChannel {
	pub fn open(index_dir: &Path) -> Result<Self> {
		let index = Index::open_in_dir(index_dir)?;
		Self::from_index(&index)
	}

	pub fn from_index(index: &Index) -> Result<Self> {
		register_tokenizer(index)?;
		let fields = ChildFields::from_schema(&index.schema())?;
		let reader = index.reader_builder().reload_policy(ReloadPolicy::OnCommitWithDelay).try_into()?;
		Ok(Self { reader, fields })
	}

	/// Pick up the latest commit now instead of waiting for the reload policy.
	pub fn reload(&self) -> Result<()> {
		self.reader.reload()?;
		Ok(())
	}

	pub fn num_docs(&self) -> u64 { self.reader.searcher().num_docs() }
}

fn build_query(fields: ChildFields, tokens: &[String], filter: Option<&MetadataFilter>) -> (Box<dyn Query>, MetadataFilter) {
	let mut clauses: Vec<(Occur, Box<dyn Query>)> = tokens
		.iter()
		.map(|t| {
			let q: Box<dyn Query> = Box::new(TermQuery::new(Term::from_field_text(fields.text, t), IndexRecordOption::WithFreqs));
			(Occur::Should, q)
		})
		.collect();
	let mut residual = MetadataFilter::new();
	for (key, value) in filter.into_iter().flat_map(MetadataFilter::iter) {
		let field = match key.as_str() {
			SOURCE_KEY => fields.source,
			PARENT_ID_KEY => fields.parent_id,
			_ => { residual = residual.with(key.clone(), value.clone()); continue; }
		};
		let term = TermQuery::new(Term::from_field_text(field, value), IndexRecordOption::Basic);
		clauses.push((Occur::Must, Box::new(ConstScoreQuery::new(Box::new(term), 0.0))));
	}
	(Box::new(BooleanQuery::new(clauses)), residual)
}

fn stored_str(doc: &TantivyDocument, field: tantivy::schema::Field) -> String {
	doc.get_first(field).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

fn run(searcher: &Searcher, fields: ChildFields, tokens: &[String], k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<SearchHit>> {
	let (query, residual) = build_query(fields, tokens, filter);
	// Post-filtered keys can reject any hit, so rank the whole match set.
	let limit = if residual.is_empty() { k } else { (searcher.num_docs() as usize).max(k) };
	if limit == 0 { return Ok(Vec::new()); }
	let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;
	let mut hits = Vec::with_capacity(k.min(top_docs.len()));
	for (score, addr) in top_docs {
		if score <= 0.0 { continue; }
		let doc: TantivyDocument = searcher.doc(addr)?;
		let mut metadata: Meta = match doc.get_first(fields.metadata).and_then(|v| v.as_str()) {
			Some(raw) => serde_json::from_str(raw)?,
			None => Meta::new(),
		};
		metadata.entry(PARENT_ID_KEY.to_string()).or_insert_with(|| stored_str(&doc, fields.parent_id));
		if !residual.matches(&metadata) { continue; }
		hits.push(SearchHit::keyword(stored_str(&doc, fields.id), stored_str(&doc, fields.text), metadata, score));
		if hits.len() == k { break; }
	}
	Ok(hits)
}

#[async_trait]
impl KeywordChannel for TantivyKeywordChannel {
	async fn score(&self, tokens: &[String], k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<SearchHit>> {
		if tokens.is_empty() || k == 0 { return Ok(Vec::new()); }
		let searcher = self.reader.searcher();
		let fields = self.fields;
		let tokens = tokens.to_vec();
		let filter = filter.cloned();
		let hits = tokio::task::spawn_blocking(move || run(&searcher, fields, &tokens, k, filter.as_ref())).await??;
		debug!(hits = hits.len(), k, "keyword channel");
		Ok(hits)
	}
}
