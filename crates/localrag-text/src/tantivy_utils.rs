use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, RegexTokenizer, TextAnalyzer};
use tantivy::Index;

use localrag_core::tokenize::BM25_TOKEN_PATTERN;

pub const TOKENIZER_NAME: &str = "bm25_technical";

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field("id", STRING | STORED);
	schema_builder.add_text_field("parent_id", STRING | STORED);
	schema_builder.add_text_field("source", STRING | STORED);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER_NAME).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing).set_stored();
	schema_builder.add_text_field("text", text_options);
	schema_builder.add_text_field("metadata", STORED);
	schema_builder.build()
}

/// Same token rules as `tokenize_for_bm25`, so query terms hit indexed terms verbatim.
pub fn register_tokenizer(index: &Index) -> tantivy::Result<()> {
	let tokenizer = TextAnalyzer::builder(RegexTokenizer::new(BM25_TOKEN_PATTERN)?)
		.filter(LowerCaser)
		.build();
	index.tokenizers().register(TOKENIZER_NAME, tokenizer);
	Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct ChildFields {
	pub id: Field,
	pub parent_id: Field,
	pub source: Field,
	pub text: Field,
	pub metadata: Field,
}

impl ChildFields {
	pub fn from_schema(schema: &Schema) -> tantivy::Result<Self> {
		Ok(Self {
			id: schema.get_field("id")?,
			parent_id: schema.get_field("parent_id")?,
			source: schema.get_field("source")?,
			text: schema.get_field("text")?,
			metadata: schema.get_field("metadata")?,
		})
	}
}
