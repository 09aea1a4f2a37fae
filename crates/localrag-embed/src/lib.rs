use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use localrag_core::traits::Embedder;

pub mod cross_encoder;
pub mod device;
pub mod pool;
pub mod tokenize;

pub use cross_encoder::{get_default_cross_encoder, sigmoid, BertCrossEncoder, FakeCrossEncoder};
pub use pool::masked_mean_l2;

pub const EMBEDDING_DIM: usize = 1024;
const MAX_LEN: usize = 256;
const XLM_PAD_ID: u32 = 1;

/// BGE-M3 dense embedder (XLM-RoBERTa encoder, masked mean pooling, L2 norm).
pub struct EmbeddingModel { model: XLMRobertaModel, tokenizer: Tokenizer, device: Device }

impl EmbeddingModel {
    pub fn new(model_dir: &Path) -> Result<Self> {
        let device = device::select_device();
        info!(dir = %model_dir.display(), "loading BGE-M3 model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let vb = load_weights(model_dir, &device)?;
        let model = XLMRobertaModel::new(&config, vb)?;
        info!("BGE-M3 model loaded");
        Ok(Self { model, tokenizer, device })
    }
}

impl Embedder for EmbeddingModel {
    fn dim(&self) -> usize { EMBEDDING_DIM }
    fn max_len(&self) -> usize { MAX_LEN }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(Vec::new()); }
        let start = Instant::now();
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let batch = tokenize::tokenize_batch_on_device(&self.tokenizer, inputs, MAX_LEN, XLM_PAD_ID, &self.device)?;
        let token_type_ids = batch.input_ids.zeros_like()?;
        let hidden = self.model.forward(&batch.input_ids, &batch.attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &batch.attention_mask)?;
        let rows: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?;
        if let Some(row) = rows.first() {
            anyhow::ensure!(row.len() == EMBEDDING_DIM, "embedding dim {} != {}", row.len(), EMBEDDING_DIM);
        }
        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 { warn!(batch = texts.len(), ms = elapsed.as_millis() as u64, "slow embedding"); }
        Ok(rows)
    }
}

/// `model.safetensors` when present, otherwise `pytorch_model.bin`.
pub(crate) fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    let weights_map: std::collections::HashMap<String, Tensor> = if safetensors.exists() {
        candle_core::safetensors::load(&safetensors, device)?
    } else {
        candle_core::pickle::read_all(model_dir.join("pytorch_model.bin"))?.into_iter().collect()
    };
    debug!(tensors = weights_map.len(), "weights read");
    Ok(VarBuilder::from_tensors(weights_map, DType::F32, device))
}

/// Deterministic stand-in: hashed bag of BM25 tokens, L2-normalized.
///
/// Texts sharing vocabulary land close together, which is enough for tests and
/// offline development without model files.
pub struct FakeEmbedder { dim: usize }

impl FakeEmbedder { pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } } }

impl FakeEmbedder {
    fn embed_text(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher}; use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for token in localrag_core::tokenize::tokenize_for_bm25(text) {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            v[idx] += 0.5 + (((h >> 32) as u32) as f32) / (u32::MAX as f32);
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { MAX_LEN }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name).ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// `FakeEmbedder` when `APP_USE_FAKE_EMBEDDINGS` is set, otherwise BGE-M3 from
/// `model_dir` or the usual model locations.
pub fn get_default_embedder(model_dir: Option<&Path>) -> Result<Arc<dyn Embedder>> {
    if env_flag("APP_USE_FAKE_EMBEDDINGS") { info!("using FakeEmbedder"); return Ok(Arc::new(FakeEmbedder::new(EMBEDDING_DIM))); }
    let dir = resolve_model_dir(model_dir, "bge-m3", &["APP_MODEL_DIR", "MODEL_DIR"])?;
    Ok(Arc::new(EmbeddingModel::new(&dir)?))
}

/// First existing directory among: the explicit path, the given env vars, then
/// `../models/<name>` and `models/<name>`.
pub fn resolve_model_dir(explicit: Option<&Path>, name: &str, env_vars: &[&str]) -> Result<PathBuf> {
    if let Some(p) = explicit {
        if p.exists() { debug!(dir = %p.display(), "using configured model dir"); return Ok(p.to_path_buf()); }
        warn!(dir = %p.display(), "configured model dir does not exist");
    }
    for var in env_vars {
        if let Ok(dir) = std::env::var(var) { let p = PathBuf::from(&dir); if p.exists() { debug!(var, dir = %p.display(), "using model dir from env"); return Ok(p); } }
    }
    for root in [Path::new("../models"), Path::new("models")] {
        let p = root.join(name);
        if p.exists() { debug!(dir = %p.display(), "using model dir"); return Ok(p); }
    }
    Err(anyhow!("Could not locate {name} model directory"))
}
