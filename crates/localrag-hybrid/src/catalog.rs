//! Local catalog: LanceDB tables and tantivy indexes addressed by name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use localrag_core::config::{resolve_with_base, DataSettings};
use localrag_core::error::{Error, Result};
use localrag_core::traits::{Backends, ChannelResolver, KeywordChannel, ParentStore, SemanticChannel};
use localrag_core::types::{CollectionRefs, MetadataFilter, ParentChunk, SearchHit};
use localrag_text::TantivyKeywordChannel;
use localrag_vector::LanceStore;

/// Opens each table or index once per name and hands out shared handles.
///
/// Explicitly referenced names must exist. The configured defaults may be
/// missing (not yet built); queries against them then degrade instead of failing.
pub struct LocalCatalog {
    store: LanceStore,
    tantivy_dir: PathBuf,
    child_collection: String,
    parent_collection: String,
    semantic: Mutex<HashMap<String, Arc<dyn SemanticChannel>>>,
    parents: Mutex<HashMap<String, Arc<dyn ParentStore>>>,
    keyword: Mutex<HashMap<PathBuf, Arc<dyn KeywordChannel>>>,
}

impl LocalCatalog {
    pub async fn open(data: &DataSettings) -> anyhow::Result<Self> {
        let lancedb = data.lancedb_path();
        let store = LanceStore::open(&lancedb).await?;
        info!(lancedb = %lancedb.display(), tantivy = %data.tantivy_path().display(), "opened local catalog");
        Ok(Self {
            store,
            tantivy_dir: data.tantivy_path(),
            child_collection: data.child_collection.clone(),
            parent_collection: data.parent_collection.clone(),
            semantic: Mutex::new(HashMap::new()),
            parents: Mutex::new(HashMap::new()),
            keyword: Mutex::new(HashMap::new()),
        })
    }

    /// Drop cached handles so the next query reopens rebuilt tables and indexes.
    pub async fn refresh(&self) {
        self.semantic.lock().await.clear();
        self.parents.lock().await.clear();
        self.keyword.lock().await.clear();
        debug!("catalog handles cleared");
    }

    /// Keyword index names resolve next to the default index directory.
    fn keyword_path(&self, name: &str) -> PathBuf {
        let base = self.tantivy_dir.parent().unwrap_or_else(|| Path::new("."));
        resolve_with_base(base, name)
    }

    async fn semantic(&self, name: &str, explicit: bool) -> Result<Arc<dyn SemanticChannel>> {
        let mut cache = self.semantic.lock().await;
        if let Some(handle) = cache.get(name) {
            return Ok(Arc::clone(handle));
        }
        match self.store.has_table(name).await {
            Ok(true) => match self.store.semantic(name).await {
                Ok(channel) => {
                    let handle: Arc<dyn SemanticChannel> = Arc::new(channel);
                    cache.insert(name.to_string(), Arc::clone(&handle));
                    debug!(table = name, "opened semantic table");
                    Ok(handle)
                }
                Err(e) => Ok(unavailable(format!("open table {name}: {e}"))),
            },
            Ok(false) if explicit => Err(Error::MissingReference { kind: "child collection", name: name.to_string() }),
            Ok(false) => Ok(unavailable(format!("table {name} does not exist"))),
            Err(e) => Ok(unavailable(format!("list tables: {e}"))),
        }
    }

    async fn parents(&self, name: &str, explicit: bool) -> Result<Arc<dyn ParentStore>> {
        let mut cache = self.parents.lock().await;
        if let Some(handle) = cache.get(name) {
            return Ok(Arc::clone(handle));
        }
        match self.store.has_table(name).await {
            Ok(true) => match self.store.parents(name).await {
                Ok(store) => {
                    let handle: Arc<dyn ParentStore> = Arc::new(store);
                    cache.insert(name.to_string(), Arc::clone(&handle));
                    debug!(table = name, "opened parent table");
                    Ok(handle)
                }
                Err(e) => Ok(unavailable(format!("open table {name}: {e}"))),
            },
            Ok(false) if explicit => Err(Error::MissingReference { kind: "parent collection", name: name.to_string() }),
            Ok(false) => Ok(unavailable(format!("table {name} does not exist"))),
            Err(e) => Ok(unavailable(format!("list tables: {e}"))),
        }
    }

    async fn keyword(&self, reference: Option<&str>) -> Result<Arc<dyn KeywordChannel>> {
        let path = reference.map_or_else(|| self.tantivy_dir.clone(), |name| self.keyword_path(name));
        let mut cache = self.keyword.lock().await;
        if let Some(handle) = cache.get(&path) {
            return Ok(Arc::clone(handle));
        }
        if !path.join("meta.json").exists() {
            return match reference {
                Some(name) => Err(Error::MissingReference { kind: "keyword index", name: name.to_string() }),
                None => Ok(unavailable(format!("no index at {}", path.display()))),
            };
        }
        match TantivyKeywordChannel::open(&path) {
            Ok(channel) => {
                let handle: Arc<dyn KeywordChannel> = Arc::new(channel);
                cache.insert(path.clone(), Arc::clone(&handle));
                debug!(index = %path.display(), "opened keyword index");
                Ok(handle)
            }
            Err(e) => Ok(unavailable(format!("open index {}: {e}", path.display()))),
        }
    }
}

#[async_trait]
impl ChannelResolver for LocalCatalog {
    async fn resolve(&self, refs: &CollectionRefs) -> Result<Backends> {
        let child = refs.child_collection.as_deref().unwrap_or(&self.child_collection);
        let parent = refs.parent_collection.as_deref().unwrap_or(&self.parent_collection);
        Ok(Backends {
            semantic: self.semantic(child, refs.child_collection.is_some()).await?,
            keyword: self.keyword(refs.keyword_index.as_deref()).await?,
            parents: self.parents(parent, refs.parent_collection.is_some()).await?,
        })
    }
}

/// Stand-in for a default backend that is not built yet. Every call fails,
/// which the engine records as a degradation of that channel.
struct Unavailable {
    reason: String,
}

fn unavailable(reason: String) -> Arc<Unavailable> {
    warn!(%reason, "backend unavailable");
    Arc::new(Unavailable { reason })
}

#[async_trait]
impl SemanticChannel for Unavailable {
    async fn query(&self, _vector: &[f32], _k: usize, _filter: Option<&MetadataFilter>) -> anyhow::Result<Vec<SearchHit>> {
        Err(anyhow!(self.reason.clone()))
    }
}

#[async_trait]
impl KeywordChannel for Unavailable {
    async fn score(&self, _tokens: &[String], _k: usize, _filter: Option<&MetadataFilter>) -> anyhow::Result<Vec<SearchHit>> {
        Err(anyhow!(self.reason.clone()))
    }
}

#[async_trait]
impl ParentStore for Unavailable {
    async fn fetch(&self, _ids: &[String]) -> anyhow::Result<HashMap<String, ParentChunk>> {
        Err(anyhow!(self.reason.clone()))
    }
}
