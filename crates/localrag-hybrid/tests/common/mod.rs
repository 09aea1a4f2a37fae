#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;

use localrag_core::backends::SwappableBackends;
use localrag_core::config::RetrievalSettings;
use localrag_core::lazy::Lazy;
use localrag_core::traits::{
    Backends, ChannelResolver, CrossEncoder, Embedder, GapSink, KeywordChannel, ParentStore, SemanticChannel,
};
use localrag_core::types::{CollectionRefs, GapRecord, Meta, MetadataFilter, ParentChunk, SearchHit};
use localrag_embed::FakeEmbedder;
use localrag_hybrid::{MemoryGapSink, RetrievalEngine};

pub fn meta(parent: &str, source: &str) -> Meta {
    let mut m = Meta::new();
    m.insert("parent_id".into(), parent.into());
    m.insert("source".into(), source.into());
    m
}

pub fn sem(child: &str, parent: &str, source: &str, score: f32) -> SearchHit {
    SearchHit::semantic(child, format!("child {child}"), meta(parent, source), score)
}

pub fn kw(child: &str, parent: &str, source: &str, score: f32) -> SearchHit {
    SearchHit::keyword(child, format!("child {child}"), meta(parent, source), score)
}

pub fn parent(id: &str, text: &str) -> ParentChunk {
    ParentChunk { id: id.into(), text: text.into(), metadata: Meta::new() }
}

/// A channel with canned hits, or a canned failure, and an optional delay.
#[derive(Default)]
pub struct Fixture {
    pub hits: Vec<SearchHit>,
    pub fail: Option<String>,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl Fixture {
    pub fn hits(hits: Vec<SearchHit>) -> Arc<Self> {
        Arc::new(Self { hits, ..Self::default() })
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self { fail: Some(reason.to_string()), ..Self::default() })
    }

    pub fn slow(hits: Vec<SearchHit>, delay: Duration) -> Arc<Self> {
        Arc::new(Self { hits, delay: Some(delay), ..Self::default() })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn run(&self, k: usize, filter: Option<&MetadataFilter>) -> anyhow::Result<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.fail {
            return Err(anyhow!(reason.clone()));
        }
        Ok(self.hits.iter().filter(|h| filter.map_or(true, |f| f.matches(&h.metadata))).take(k).cloned().collect())
    }
}

#[async_trait]
impl SemanticChannel for Fixture {
    async fn query(&self, _vector: &[f32], k: usize, filter: Option<&MetadataFilter>) -> anyhow::Result<Vec<SearchHit>> {
        self.run(k, filter).await
    }
}

#[async_trait]
impl KeywordChannel for Fixture {
    async fn score(&self, _tokens: &[String], k: usize, filter: Option<&MetadataFilter>) -> anyhow::Result<Vec<SearchHit>> {
        self.run(k, filter).await
    }
}

#[derive(Default)]
pub struct Parents {
    pub parents: HashMap<String, ParentChunk>,
    pub fail: bool,
}

impl Parents {
    pub fn of(parents: Vec<ParentChunk>) -> Arc<Self> {
        Arc::new(Self { parents: parents.into_iter().map(|p| (p.id.clone(), p)).collect(), fail: false })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self { parents: HashMap::new(), fail: true })
    }
}

#[async_trait]
impl ParentStore for Parents {
    async fn fetch(&self, ids: &[String]) -> anyhow::Result<HashMap<String, ParentChunk>> {
        if self.fail {
            anyhow::bail!("parent store offline");
        }
        Ok(ids.iter().filter_map(|id| self.parents.get(id).map(|p| (id.clone(), p.clone()))).collect())
    }
}

/// Scores a passage with the logit whose sigmoid is the configured probability.
/// Passages not listed get a probability of 0.01.
pub struct Probabilities(pub HashMap<String, f32>);

impl Probabilities {
    pub fn of(entries: &[(&str, f32)]) -> Arc<dyn CrossEncoder> {
        Arc::new(Self(entries.iter().map(|(t, p)| ((*t).to_string(), *p)).collect()))
    }
}

impl CrossEncoder for Probabilities {
    fn predict(&self, pairs: &[(String, String)]) -> anyhow::Result<Vec<f32>> {
        Ok(pairs
            .iter()
            .map(|(_, passage)| {
                let p = self.0.get(passage).copied().unwrap_or(0.01);
                (p / (1.0 - p)).ln()
            })
            .collect())
    }
}

pub struct SlowEncoder(pub Duration);

impl CrossEncoder for SlowEncoder {
    fn predict(&self, pairs: &[(String, String)]) -> anyhow::Result<Vec<f32>> {
        std::thread::sleep(self.0);
        Ok(vec![0.0; pairs.len()])
    }
}

/// Records gaps only after sleeping on the calling thread.
pub struct SlowSink {
    pub delay: Duration,
    pub inner: MemoryGapSink,
}

impl GapSink for SlowSink {
    fn append(&self, record: &GapRecord) -> anyhow::Result<()> {
        std::thread::sleep(self.delay);
        self.inner.append(record)
    }
}

/// Never finishes resolving collections.
pub struct HangingResolver;

#[async_trait]
impl ChannelResolver for HangingResolver {
    async fn resolve(&self, _refs: &CollectionRefs) -> localrag_core::error::Result<Backends> {
        std::future::pending().await
    }
}

/// Gap records land from a background task; poll until `expected` arrive.
pub async fn logged_gaps(sink: &MemoryGapSink, expected: usize) -> Vec<GapRecord> {
    for _ in 0..200 {
        let records = sink.records();
        if records.len() >= expected {
            return records;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    sink.records()
}

pub fn backends(semantic: Arc<Fixture>, keyword: Arc<Fixture>, parents: Arc<Parents>) -> Backends {
    Backends { semantic, keyword, parents }
}

pub fn fake_embedder() -> Lazy<dyn Embedder> {
    Lazy::ready(Arc::new(FakeEmbedder::new(32)) as Arc<dyn Embedder>)
}

pub struct Harness {
    pub engine: RetrievalEngine,
    pub gaps: Arc<MemoryGapSink>,
    pub backends: Arc<SwappableBackends>,
}

pub fn harness_with(settings: RetrievalSettings, backends: Backends, reranker: Lazy<dyn CrossEncoder>) -> Harness {
    let swappable = Arc::new(SwappableBackends::new(backends));
    let gaps = Arc::new(MemoryGapSink::new());
    let engine = RetrievalEngine::new(settings, Arc::clone(&swappable) as _, fake_embedder(), reranker)
        .expect("engine")
        .with_gap_sink(Arc::clone(&gaps) as _);
    Harness { engine, gaps, backends: swappable }
}

pub fn harness(backends: Backends, reranker: Lazy<dyn CrossEncoder>) -> Harness {
    harness_with(RetrievalSettings::default(), backends, reranker)
}
