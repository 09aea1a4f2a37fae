use anyhow::Result;
use std::path::{Path, PathBuf};
use tantivy::{doc, Index, IndexWriter, Term};
use tracing::info;

use localrag_core::types::{ChildChunk, PARENT_ID_KEY};

use crate::tantivy_utils::{build_schema, register_tokenizer, ChildFields};

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Writes child chunks into the keyword index.
///
/// `replace_all` commits a full rebuild in one transaction; readers keep the
/// previous segments until they reload, so queries never see a partial index.
pub struct TantivyIndexer {
	index: Index,
	fields: ChildFields,
	dir: PathBuf,
}

impl TantivyIndexer {
	/// Create a fresh index at `index_dir`, removing anything already there.
	pub fn create(index_dir: &Path) -> Result<Self> {
		if index_dir.exists() { std::fs::remove_dir_all(index_dir)?; }
		std::fs::create_dir_all(index_dir)?;
		let index = Index::create_in_dir(index_dir, build_schema())?;
		Self::from_index(index, index_dir)
	}

	pub fn open(index_dir: &Path) -> Result<Self> {
		let index = Index::open_in_dir(index_dir)?;
		Self::from_index(index, index_dir)
	}

	fn from_index(index: Index, dir: &Path) -> Result<Self> {
		register_tokenizer(&index)?;
		let fields = ChildFields::from_schema(&index.schema())?;
		Ok(Self { index, fields, dir: dir.to_path_buf() })
	}

	pub fn dir(&self) -> &Path { &self.dir }

	/// Append (or overwrite by id) the given child chunks.
	pub fn index(&self, chunks: &[ChildChunk]) -> Result<()> {
		let mut writer: IndexWriter = self.index.writer(WRITER_HEAP_BYTES)?;
		for c in chunks {
			writer.delete_term(Term::from_field_text(self.fields.id, &c.id));
			self.add(&writer, c)?;
		}
		writer.commit()?;
		info!(chunks = chunks.len(), dir = %self.dir.display(), "indexed child chunks");
		Ok(())
	}

	/// Replace the whole index content with `chunks` in a single commit.
	pub fn replace_all(&self, chunks: &[ChildChunk]) -> Result<()> {
		let mut writer: IndexWriter = self.index.writer(WRITER_HEAP_BYTES)?;
		writer.delete_all_documents()?;
		for c in chunks { self.add(&writer, c)?; }
		writer.commit()?;
		info!(chunks = chunks.len(), dir = %self.dir.display(), "rebuilt keyword index");
		Ok(())
	}

	fn add(&self, writer: &IndexWriter, c: &ChildChunk) -> Result<()> {
		let mut metadata = c.metadata.clone();
		metadata.entry(PARENT_ID_KEY.to_string()).or_insert_with(|| c.parent_id.clone());
		let source = c.source().to_string();
		writer.add_document(doc!(
			self.fields.id => c.id.clone(),
			self.fields.parent_id => c.parent_id.clone(),
			self.fields.source => source,
			self.fields.text => c.text.clone(),
			self.fields.metadata => serde_json::to_string(&metadata)?,
		))?;
		Ok(())
	}
}
