//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_RETRIEVAL__FINAL_TOP_K=5`), then
//! extracts the typed `[retrieval]` and `[data]` sections.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::Weights;

pub struct Config {
    figment: Figment,
    settings: Settings,
}

/// Everything the engine and its binaries read from configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub data: DataSettings,
}

/// Fusion weights, candidate sizes, confidence thresholds and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalSettings {
    pub semantic_weight: f32,
    pub bm25_weight: f32,
    pub spec_semantic_weight: f32,
    pub spec_bm25_weight: f32,
    pub semantic_top_k: usize,
    pub bm25_top_k: usize,
    pub rerank_candidates: usize,
    pub final_top_k: usize,
    pub rrf_k: f32,
    pub high_confidence_threshold: f32,
    pub medium_confidence_threshold: f32,
    pub contradiction_overlap: f32,
    pub embed_timeout_ms: u64,
    pub channel_timeout_ms: u64,
    pub rerank_timeout_ms: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            semantic_weight: 0.60,
            bm25_weight: 0.40,
            spec_semantic_weight: 0.25,
            spec_bm25_weight: 0.75,
            semantic_top_k: 30,
            bm25_top_k: 30,
            rerank_candidates: 20,
            final_top_k: 10,
            rrf_k: 60.0,
            high_confidence_threshold: 0.75,
            medium_confidence_threshold: 0.40,
            contradiction_overlap: 0.15,
            embed_timeout_ms: 10_000,
            channel_timeout_ms: 10_000,
            rerank_timeout_ms: 30_000,
        }
    }
}

impl RetrievalSettings {
    pub fn default_weights(&self) -> Weights {
        Weights::new(self.semantic_weight, self.bm25_weight)
    }

    pub fn spec_weights(&self) -> Weights {
        Weights::new(self.spec_semantic_weight, self.spec_bm25_weight)
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    pub fn channel_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_timeout_ms)
    }

    pub fn rerank_timeout(&self) -> Duration {
        Duration::from_millis(self.rerank_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, w) in [("default", self.default_weights()), ("spec", self.spec_weights())] {
            let valid = w.semantic.is_finite()
                && w.bm25.is_finite()
                && w.semantic >= 0.0
                && w.bm25 >= 0.0
                && ((w.semantic + w.bm25) - 1.0).abs() <= 1e-6;
            if !valid {
                return Err(Error::InvalidConfig(format!(
                    "{name} weights must be non-negative and sum to 1.0 (got {} + {})",
                    w.semantic, w.bm25
                )));
            }
        }
        let (high, medium) = (self.high_confidence_threshold, self.medium_confidence_threshold);
        if !(0.0..=1.0).contains(&high) || !(0.0..=1.0).contains(&medium) || medium >= high {
            return Err(Error::InvalidConfig(format!(
                "confidence thresholds must satisfy 0 <= medium < high <= 1 (got medium={medium}, high={high})"
            )));
        }
        if !(0.0..=1.0).contains(&self.contradiction_overlap) {
            return Err(Error::InvalidConfig(format!(
                "contradiction_overlap must be within [0, 1] (got {})",
                self.contradiction_overlap
            )));
        }
        if !(self.rrf_k.is_finite() && self.rrf_k > 0.0) {
            return Err(Error::InvalidConfig(format!("rrf_k must be positive (got {})", self.rrf_k)));
        }
        if self.semantic_top_k == 0 || self.bm25_top_k == 0 || self.rerank_candidates == 0 || self.final_top_k == 0 {
            return Err(Error::InvalidConfig("top-k and candidate sizes must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Index locations, collection names and model/registry paths.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataSettings {
    pub lancedb_dir: String,
    pub tantivy_dir: String,
    pub child_collection: String,
    pub parent_collection: String,
    pub gap_tracker_path: String,
    pub vendor_registry_path: Option<String>,
    pub embedding_model_dir: Option<String>,
    pub reranker_model_dir: Option<String>,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            lancedb_dir: "../dev_data/indexes/lancedb".to_string(),
            tantivy_dir: "../dev_data/indexes/tantivy".to_string(),
            child_collection: "children".to_string(),
            parent_collection: "parents".to_string(),
            gap_tracker_path: "gap-tracker.jsonl".to_string(),
            vendor_registry_path: None,
            embedding_model_dir: None,
            reranker_model_dir: None,
        }
    }
}

impl DataSettings {
    pub fn lancedb_path(&self) -> PathBuf { expand_path(&self.lancedb_dir) }
    pub fn tantivy_path(&self) -> PathBuf { expand_path(&self.tantivy_dir) }
    pub fn gap_tracker(&self) -> PathBuf { expand_path(&self.gap_tracker_path) }
    pub fn vendor_registry(&self) -> Option<PathBuf> { self.vendor_registry_path.as_deref().map(expand_path) }
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        Self::from_figment(figment)
    }

    /// Load a single TOML file with no environment layering.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_figment(Figment::new().merge(Toml::file(path)))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let settings: Settings = figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.retrieval.validate()?;
        Ok(Self { figment, settings })
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    pub fn settings(&self) -> &Settings { &self.settings }
    pub fn retrieval(&self) -> &RetrievalSettings { &self.settings.retrieval }
    pub fn data(&self) -> &DataSettings { &self.settings.data }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
