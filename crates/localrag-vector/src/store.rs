use anyhow::Result;
use lancedb::Connection;
use std::path::Path;

use crate::search::{LanceParentStore, LanceSemanticChannel};
use crate::table::{open_db, table_exists};

/// One LanceDB database holding any number of child and parent tables.
pub struct LanceStore { db: Connection }

impl LanceStore {
	pub async fn open(db_path: &Path) -> Result<Self> {
		let db = open_db(db_path.to_string_lossy().as_ref()).await?;
		Ok(Self { db })
	}

	pub async fn has_table(&self, name: &str) -> Result<bool> { table_exists(&self.db, name).await }

	pub async fn semantic(&self, table: &str) -> Result<LanceSemanticChannel> {
		Ok(LanceSemanticChannel::from_table(self.db.open_table(table).execute().await?))
	}

	pub async fn parents(&self, table: &str) -> Result<LanceParentStore> {
		Ok(LanceParentStore::from_table(self.db.open_table(table).execute().await?))
	}
}
