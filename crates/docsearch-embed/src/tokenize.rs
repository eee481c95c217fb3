use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

use docsearch_core::error::{Error, Result};

use crate::candle_err;

const PAD_ID: u32 = 1;

/// Encode `text` padded or truncated to exactly `max_len` tokens.
pub fn tokenize_on_device(tokenizer: &Tokenizer, text: &str, max_len: usize, device: &Device) -> Result<(Tensor, Tensor)> {
    let enc = tokenizer.encode(text, true).map_err(|e| Error::Operation(format!("Tokenization failed: {e}")))?;
    let mut ids = enc.get_ids().to_vec();
    let mut mask = enc.get_attention_mask().to_vec();
    ids.resize(max_len, PAD_ID);
    mask.resize(max_len, 0);
    let input_ids = Tensor::from_iter(ids, device).and_then(|t| t.reshape((1, max_len))).map_err(candle_err)?;
    let attention_mask = Tensor::from_iter(mask, device).and_then(|t| t.reshape((1, max_len))).map_err(candle_err)?;
    Ok((input_ids, attention_mask))
}
