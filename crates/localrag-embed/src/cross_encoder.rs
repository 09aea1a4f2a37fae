//! Cross-encoder relevance scoring for (query, passage) pairs.
//!
//! `BertCrossEncoder` loads an MS MARCO style sequence classifier (BERT
//! encoder, pooler, single-logit head) and returns raw logits; callers map them
//! to `[0, 1]` with [`sigmoid`].

use anyhow::{anyhow, Result};
use std::path::Path;
use std::sync::Arc;

use candle_core::{DType, Device, IndexOp, Module};
use candle_nn::{linear, Linear};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::info;

use localrag_core::traits::CrossEncoder;

use crate::{device, env_flag, load_weights, resolve_model_dir, tokenize};

const MAX_LEN: usize = 512;
const BERT_PAD_ID: u32 = 0;

pub fn sigmoid(x: f32) -> f32 { 1.0 / (1.0 + (-x).exp()) }

pub struct BertCrossEncoder {
    bert: BertModel,
    pooler: Linear,
    classifier: Linear,
    tokenizer: Tokenizer,
    device: Device,
}

impl BertCrossEncoder {
    pub fn new(model_dir: &Path) -> Result<Self> {
        let device = device::select_device();
        info!(dir = %model_dir.display(), "loading cross-encoder");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        tokenizer
            .with_truncation(Some(TruncationParams { max_length: MAX_LEN, ..Default::default() }))
            .map_err(|e| anyhow!("Failed to configure truncation: {}", e))?;
        tokenizer.with_padding(None);

        let raw = std::fs::read_to_string(model_dir.join("config.json"))?;
        let config: BertConfig = serde_json::from_str(&raw)?;
        let hidden = serde_json::from_str::<serde_json::Value>(&raw)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| anyhow!("config.json has no hidden_size"))? as usize;

        let vb = load_weights(model_dir, &device)?;
        let bert = BertModel::load(vb.pp("bert"), &config)?;
        let pooler = linear(hidden, hidden, vb.pp("bert.pooler.dense"))?;
        let classifier = linear(hidden, 1, vb.pp("classifier"))?;
        info!("cross-encoder loaded");
        Ok(Self { bert, pooler, classifier, tokenizer, device })
    }
}

impl CrossEncoder for BertCrossEncoder {
    fn predict(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        if pairs.is_empty() { return Ok(Vec::new()); }
        let inputs: Vec<(&str, &str)> = pairs.iter().map(|(q, p)| (q.as_str(), p.as_str())).collect();
        let batch = tokenize::tokenize_batch_on_device(&self.tokenizer, inputs, MAX_LEN, BERT_PAD_ID, &self.device)?;
        let hidden = self.bert.forward(&batch.input_ids, &batch.token_type_ids, Some(&batch.attention_mask))?;
        let cls = hidden.i((.., 0))?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logits = self.classifier.forward(&pooled)?.squeeze(1)?;
        Ok(logits.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec1()?)
    }
}

/// Deterministic scorer for tests and offline runs.
///
/// The logit grows with the share of query tokens found in the passage:
/// no overlap maps to -4, full overlap to +4.
#[derive(Debug, Default, Clone, Copy)]
pub struct FakeCrossEncoder;

impl CrossEncoder for FakeCrossEncoder {
    fn predict(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        use localrag_core::tokenize::tokenize_for_bm25;
        Ok(pairs
            .iter()
            .map(|(q, p)| {
                let query: std::collections::HashSet<String> = tokenize_for_bm25(q).into_iter().collect();
                if query.is_empty() { return -4.0; }
                let passage: std::collections::HashSet<String> = tokenize_for_bm25(p).into_iter().collect();
                let hit = query.iter().filter(|t| passage.contains(*t)).count() as f32 / query.len() as f32;
                8.0 * hit - 4.0
            })
            .collect())
    }
}

/// `FakeCrossEncoder` when `APP_USE_FAKE_RERANKER` is set, otherwise the BERT
/// cross-encoder from `model_dir` or the usual model locations.
pub fn get_default_cross_encoder(model_dir: Option<&Path>) -> Result<Arc<dyn CrossEncoder>> {
    if env_flag("APP_USE_FAKE_RERANKER") { info!("using FakeCrossEncoder"); return Ok(Arc::new(FakeCrossEncoder)); }
    let dir = resolve_model_dir(model_dir, "ms-marco-MiniLM-L-6-v2", &["APP_RERANKER_DIR"])?;
    Ok(Arc::new(BertCrossEncoder::new(&dir)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_maps_logits_into_unit_interval() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(8.0) > 0.99);
        assert!(sigmoid(-8.0) < 0.01);
    }

    #[test]
    fn fake_cross_encoder_prefers_overlapping_passages() {
        let q = "iso 4406 code".to_string();
        let scores = FakeCrossEncoder
            .predict(&[(q.clone(), "The ISO 4406 code 16/14/11".into()), (q.clone(), "gear pump notes".into()), (String::new(), "x".into())])
            .expect("predict");
        assert!((scores[0] - 4.0).abs() < 1e-6);
        assert!((scores[1] + 4.0).abs() < 1e-6);
        assert!((scores[2] + 4.0).abs() < 1e-6);
    }
}
