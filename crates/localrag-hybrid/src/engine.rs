//! The retrieval pipeline: classify, fan out to both channels, fuse, resolve
//! parents, rerank, and (for verified queries) assess confidence.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use localrag_core::config::{Config, RetrievalSettings};
use localrag_core::error::{Channel, Degradation, Error, Result};
use localrag_core::lazy::Lazy;
use localrag_core::registry::VendorRegistry;
use localrag_core::tokenize::tokenize_for_bm25;
use localrag_core::traits::{Backends, ChannelResolver, CrossEncoder, Embedder, GapSink};
use localrag_core::types::{
    CollectionRefs, ConfidenceAssessment, ConfidenceLevel, GapRecord, MetadataFilter, RankedResult, SearchHit, Weights,
};

use crate::catalog::LocalCatalog;
use crate::citations::{citations, warnings};
use crate::classifier::QueryClassifier;
use crate::confidence::ConfidenceAssessor;
use crate::fusion::reciprocal_rank_fusion;
use crate::gap::{gap_record, JsonlGapSink};
use crate::parents::resolve_parents;
use crate::rerank::{fallback, fused_order, rerank};

/// Per-query knobs. `Default` reranks, classifies weights automatically and
/// returns `final_top_k` results.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub top_k: Option<usize>,
    pub use_reranker: bool,
    pub semantic_weight: Option<f32>,
    pub bm25_weight: Option<f32>,
    pub filter: Option<MetadataFilter>,
    pub collections: CollectionRefs,
    pub cancel: Option<CancellationToken>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: None,
            use_reranker: true,
            semantic_weight: None,
            bm25_weight: None,
            filter: None,
            collections: CollectionRefs::default(),
            cancel: None,
        }
    }
}

impl SearchOptions {
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn top_k(mut self, k: usize) -> Self { self.top_k = Some(k); self }

    #[must_use]
    pub fn rerank(mut self, enabled: bool) -> Self { self.use_reranker = enabled; self }

    #[must_use]
    pub fn weights(mut self, semantic: Option<f32>, bm25: Option<f32>) -> Self {
        self.semantic_weight = semantic;
        self.bm25_weight = bm25;
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: MetadataFilter) -> Self { self.filter = Some(filter); self }

    #[must_use]
    pub fn collections(mut self, refs: CollectionRefs) -> Self { self.collections = refs; self }

    #[must_use]
    pub fn cancel_on(mut self, token: CancellationToken) -> Self { self.cancel = Some(token); self }
}

/// Results plus what happened on the way.
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub results: Vec<RankedResult>,
    pub weights: Weights,
    pub reranked: bool,
    pub num_semantic: usize,
    pub num_keyword: usize,
    pub num_candidates: usize,
    #[serde(serialize_with = "display_all")]
    pub degradations: Vec<Degradation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifiedAnswer {
    pub query: String,
    pub results: Vec<RankedResult>,
    pub confidence: ConfidenceAssessment,
    pub citations: Vec<String>,
    pub warnings: Vec<String>,
    pub gap_logged: bool,
    #[serde(serialize_with = "display_all")]
    pub degradations: Vec<Degradation>,
}

fn display_all<S: serde::Serializer>(items: &[Degradation], s: S) -> std::result::Result<S::Ok, S::Error> {
    s.collect_seq(items.iter().map(ToString::to_string))
}

pub struct RetrievalEngine {
    settings: RetrievalSettings,
    classifier: QueryClassifier,
    assessor: ConfidenceAssessor,
    resolver: Arc<dyn ChannelResolver>,
    embedder: Lazy<dyn Embedder>,
    reranker: Lazy<dyn CrossEncoder>,
    gap_sink: Option<Arc<dyn GapSink>>,
}

impl RetrievalEngine {
    /// Engine with no vendor registry and no gap sink.
    pub fn new(
        settings: RetrievalSettings,
        resolver: Arc<dyn ChannelResolver>,
        embedder: Lazy<dyn Embedder>,
        reranker: Lazy<dyn CrossEncoder>,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            classifier: QueryClassifier::from_settings(&settings)?,
            assessor: ConfidenceAssessor::new(&settings, Arc::new(VendorRegistry::empty())),
            settings,
            resolver,
            embedder,
            reranker,
            gap_sink: None,
        })
    }

    #[must_use]
    pub fn with_registry(mut self, registry: Arc<VendorRegistry>) -> Self {
        self.assessor = ConfidenceAssessor::new(&self.settings, registry);
        self
    }

    #[must_use]
    pub fn with_gap_sink(mut self, sink: Arc<dyn GapSink>) -> Self {
        self.gap_sink = Some(sink);
        self
    }

    /// Wire the local catalog, lazily loaded models, the vendor registry and
    /// the JSONL gap tracker from configuration.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let data = config.data();
        let catalog = LocalCatalog::open(data).await.map_err(|e| Error::Operation(format!("open catalog: {e}")))?;

        let embed_dir = data.embedding_model_dir.as_deref().map(localrag_core::config::expand_path);
        let embedder: Lazy<dyn Embedder> = Lazy::new(move || localrag_embed::get_default_embedder(embed_dir.as_deref()));
        let rerank_dir = data.reranker_model_dir.as_deref().map(localrag_core::config::expand_path);
        let reranker: Lazy<dyn CrossEncoder> =
            Lazy::new(move || localrag_embed::get_default_cross_encoder(rerank_dir.as_deref()));

        let registry = match data.vendor_registry() {
            Some(path) => VendorRegistry::load(&path)?,
            None => VendorRegistry::empty(),
        };
        Ok(Self::new(config.retrieval().clone(), Arc::new(catalog), embedder, reranker)?
            .with_registry(Arc::new(registry))
            .with_gap_sink(Arc::new(JsonlGapSink::new(data.gap_tracker()))))
    }

    pub fn settings(&self) -> &RetrievalSettings { &self.settings }
    pub fn vendors(&self) -> &VendorRegistry { self.assessor.vendors() }

    pub async fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<RankedResult>> {
        Ok(self.search_with_report(query, opts).await?.results)
    }

    pub async fn search_with_report(&self, query: &str, opts: &SearchOptions) -> Result<SearchReport> {
        let started = Instant::now();
        let cancel = opts.cancel.as_ref();
        let top_k = opts.top_k.unwrap_or(self.settings.final_top_k);
        if top_k == 0 {
            return Err(Error::InvalidConfig("top_k must be greater than zero".to_string()));
        }
        check(cancel)?;

        let timeout = self.settings.channel_timeout();
        let backends = cancellable(cancel, tokio::time::timeout(timeout, self.resolver.resolve(&opts.collections)))
            .await?
            .map_err(|_| Error::Operation(format!("resolving collections timed out after {timeout:?}")))??;
        let weights = self.classifier.resolve(query, opts.semantic_weight, opts.bm25_weight)?;
        if weights != self.classifier.default_weights() {
            info!(semantic = weights.semantic, bm25 = weights.bm25, "adaptive weights");
        }

        let filter = opts.filter.as_ref().filter(|f| !f.is_empty());
        let (semantic, keyword) = cancellable(cancel, async {
            tokio::join!(self.semantic_leg(&backends, query, filter), self.keyword_leg(&backends, query, filter))
        })
        .await?;

        let mut degradations = Vec::new();
        let semantic = absorb(semantic, &mut degradations);
        let keyword = absorb(keyword, &mut degradations);
        debug!(semantic = semantic.len(), keyword = keyword.len(), "channel hits");
        check(cancel)?;

        let fused = reciprocal_rank_fusion(&semantic, &keyword, weights, self.settings.rrf_k, self.settings.rerank_candidates);
        let num_candidates = fused.len();
        debug!(candidates = num_candidates, "fused");

        let (resolved, parents_degradation) =
            cancellable(cancel, resolve_parents(backends.parents.as_ref(), fused, self.settings.channel_timeout())).await?;
        degradations.extend(parents_degradation);
        check(cancel)?;

        let (results, reranked) = if opts.use_reranker && self.reranker.is_enabled() && !resolved.is_empty() {
            let outcome = cancellable(
                cancel,
                rerank(&self.reranker, query, resolved.clone(), top_k, self.settings.rerank_timeout()),
            )
            .await?;
            match outcome {
                Ok(results) => (results, true),
                Err(d) => {
                    let results = fallback(&d, resolved, top_k);
                    degradations.push(d);
                    (results, false)
                }
            }
        } else {
            (fused_order(resolved, top_k), false)
        };
        check(cancel)?;

        info!(
            results = results.len(),
            reranked,
            degraded = degradations.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search complete"
        );
        Ok(SearchReport {
            results,
            weights,
            reranked,
            num_semantic: semantic.len(),
            num_keyword: keyword.len(),
            num_candidates,
            degradations,
        })
    }

    /// Search, then assess confidence, build citations and warnings, and log a
    /// gap when confidence is LOW.
    ///
    /// The gap record is handed to a detached blocking task; the answer never
    /// waits on the sink, and sink failures are only logged.
    pub async fn verified_query(&self, query: &str, opts: &SearchOptions) -> Result<VerifiedAnswer> {
        let report = self.search_with_report(query, opts).await?;
        let confidence = self.assessor.assess_with_degradations(&report.results, &report.degradations);

        let gap_logged = match &self.gap_sink {
            Some(sink) if confidence.level == ConfidenceLevel::Low => {
                emit_gap(Arc::clone(sink), gap_record(query, &confidence));
                true
            }
            _ => false,
        };

        Ok(VerifiedAnswer {
            query: query.to_string(),
            citations: citations(&report.results, self.assessor.vendors()),
            warnings: warnings(&confidence, &report.degradations),
            results: report.results,
            confidence,
            gap_logged,
            degradations: report.degradations,
        })
    }

    async fn semantic_leg(
        &self,
        backends: &Backends,
        query: &str,
        filter: Option<&MetadataFilter>,
    ) -> std::result::Result<Vec<SearchHit>, Degradation> {
        if query.trim().is_empty() {
            return Err(Degradation::MalformedInput { channel: Channel::Semantic, reason: "empty query".to_string() });
        }
        let embedder = self.embedder.get().await.map_err(|e| Degradation::unavailable(Channel::Embedding, e))?;
        let texts = vec![query.to_string()];
        let timeout = self.settings.embed_timeout();
        let task = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts));
        let vector = match tokio::time::timeout(timeout, task).await {
            Err(_) => return Err(Degradation::TimedOut { channel: Channel::Embedding, after: timeout }),
            Ok(Err(join)) => return Err(Degradation::unavailable(Channel::Embedding, join)),
            Ok(Ok(Err(e))) => return Err(Degradation::unavailable(Channel::Embedding, e)),
            Ok(Ok(Ok(mut rows))) => rows.pop().ok_or_else(|| Degradation::unavailable(Channel::Embedding, "no vector returned"))?,
        };

        let timeout = self.settings.channel_timeout();
        match tokio::time::timeout(timeout, backends.semantic.query(&vector, self.settings.semantic_top_k, filter)).await {
            Ok(Ok(hits)) => Ok(hits),
            Ok(Err(e)) => Err(Degradation::unavailable(Channel::Semantic, e)),
            Err(_) => Err(Degradation::TimedOut { channel: Channel::Semantic, after: timeout }),
        }
    }

    async fn keyword_leg(
        &self,
        backends: &Backends,
        query: &str,
        filter: Option<&MetadataFilter>,
    ) -> std::result::Result<Vec<SearchHit>, Degradation> {
        let tokens = tokenize_for_bm25(query);
        if tokens.is_empty() {
            return Err(Degradation::MalformedInput { channel: Channel::Keyword, reason: "no query tokens".to_string() });
        }
        let timeout = self.settings.channel_timeout();
        match tokio::time::timeout(timeout, backends.keyword.score(&tokens, self.settings.bm25_top_k, filter)).await {
            Ok(Ok(hits)) => Ok(hits),
            Ok(Err(e)) => Err(Degradation::unavailable(Channel::Keyword, e)),
            Err(_) => Err(Degradation::TimedOut { channel: Channel::Keyword, after: timeout }),
        }
    }
}

fn absorb(outcome: std::result::Result<Vec<SearchHit>, Degradation>, degradations: &mut Vec<Degradation>) -> Vec<SearchHit> {
    match outcome {
        Ok(hits) => hits,
        Err(d) => {
            if d.is_fault() {
                warn!(channel = %d.channel(), reason = %d, "channel degraded; continuing without it");
            } else {
                debug!(channel = %d.channel(), reason = %d, "channel skipped");
            }
            degradations.push(d);
            Vec::new()
        }
    }
}

fn emit_gap(sink: Arc<dyn GapSink>, record: GapRecord) {
    tokio::task::spawn_blocking(move || {
        if let Err(e) = sink.append(&record) {
            warn!(error = %e, query = %record.query, "failed to record knowledge gap");
        }
    });
}

fn check(cancel: Option<&CancellationToken>) -> Result<()> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(Error::Cancelled),
        _ => Ok(()),
    }
}

/// Run `fut` unless the token fires first.
async fn cancellable<F: Future>(cancel: Option<&CancellationToken>, fut: F) -> Result<F::Output> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::Cancelled),
            out = fut => Ok(out),
        },
        None => Ok(fut.await),
    }
}
