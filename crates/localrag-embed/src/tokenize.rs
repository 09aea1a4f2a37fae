use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::{EncodeInput, Tokenizer};

/// Token ids, attention mask and type ids for a batch, each shaped `[B, T]`.
pub struct BatchTensors {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub token_type_ids: Tensor,
}

/// Encode `inputs`, truncate to `max_len` and right-pad every row with `pad_id`
/// to the longest row in the batch.
pub fn tokenize_batch_on_device<'s, E>(tokenizer: &Tokenizer, inputs: Vec<E>, max_len: usize, pad_id: u32, device: &Device) -> Result<BatchTensors>
where
    E: Into<EncodeInput<'s>> + Send,
{
    let encodings = tokenizer.encode_batch(inputs, true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let batch = encodings.len();
    let width = encodings.iter().map(|e| e.get_ids().len().min(max_len)).max().unwrap_or(0).max(1);

    let mut ids = Vec::with_capacity(batch * width);
    let mut mask = Vec::with_capacity(batch * width);
    let mut types = Vec::with_capacity(batch * width);
    for enc in &encodings {
        let n = enc.get_ids().len().min(max_len);
        ids.extend_from_slice(&enc.get_ids()[..n]);
        mask.extend_from_slice(&enc.get_attention_mask()[..n]);
        types.extend_from_slice(&enc.get_type_ids()[..n]);
        let pad = width - n;
        ids.extend(std::iter::repeat(pad_id).take(pad));
        mask.extend(std::iter::repeat(0).take(pad));
        types.extend(std::iter::repeat(0).take(pad));
    }
    Ok(BatchTensors {
        input_ids: Tensor::from_vec(ids, (batch, width), device)?,
        attention_mask: Tensor::from_vec(mask, (batch, width), device)?,
        token_type_ids: Tensor::from_vec(types, (batch, width), device)?,
    })
}
