//! Text embedding over the ONNX encoder export.
//!
//! The encoder accepts `input_ids` and `attention_mask`, and its first
//! output holds token-level embeddings whose first-token row serves as the
//! sentence vector. Batched encoding pads every sequence to the longest in
//! the batch.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use log::info;
use ndarray::{Array1, Array2};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::error::RankerError;
use crate::config::Device;
use crate::runtime::{create_session, RuntimeConfig};

pub struct TextEncoder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

impl TextEncoder {
    /// Loads the tokenizer and encoder session. This is the heavy, one-time
    /// step; the loaded encoder is reused for the component's lifetime.
    pub fn load(
        model_path: &Path,
        tokenizer_path: &Path,
        runtime_config: &RuntimeConfig,
        device: Device,
    ) -> Result<Self, RankerError> {
        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| RankerError::Tokenizer(format!("Failed to load tokenizer: {}", e)))?;

        let session = create_session(model_path, runtime_config, device)
            .map_err(|e| RankerError::Model(format!("Failed to load encoder: {}", e)))?;
        if session.inputs.len() < 2 {
            return Err(RankerError::Model(format!(
                "Encoder must accept input_ids and attention_mask, found {} inputs",
                session.inputs.len()
            )));
        }
        if session.outputs.is_empty() {
            return Err(RankerError::Model("Encoder has no outputs".to_string()));
        }

        info!("Text encoder loaded from {}", model_path.display());
        Ok(Self { session: Mutex::new(session), tokenizer })
    }

    /// Encodes a batch of texts into L2-normalized embedding vectors, one
    /// forward pass for the whole batch.
    pub fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Array1<f32>>, RankerError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = texts
            .iter()
            .map(|text| {
                self.tokenizer
                    .encode(*text, true)
                    .map_err(|e| RankerError::Tokenizer(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let max_len = encodings.iter().map(|enc| enc.get_ids().len()).max().unwrap_or(0);
        if max_len == 0 {
            return Err(RankerError::Tokenizer("empty encodings for batch".to_string()));
        }

        let mut input_ids = Vec::with_capacity(texts.len() * max_len);
        let mut attention_mask = Vec::with_capacity(texts.len() * max_len);
        for encoding in &encodings {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            input_ids.extend(ids.iter().map(|&id| id as i64));
            attention_mask.extend(mask.iter().map(|&m| m as i64));

            let padding = max_len - ids.len();
            input_ids.extend(std::iter::repeat(0i64).take(padding));
            attention_mask.extend(std::iter::repeat(0i64).take(padding));
        }

        let ids_array = Array2::from_shape_vec((texts.len(), max_len), input_ids)
            .map_err(|e| RankerError::Model(format!("Failed to create input array: {}", e)))?;
        let mask_array = Array2::from_shape_vec((texts.len(), max_len), attention_mask)
            .map_err(|e| RankerError::Model(format!("Failed to create mask array: {}", e)))?;

        let ids_dyn = ids_array.into_dyn();
        let ids_view = ids_dyn.as_standard_layout();
        let mask_dyn = mask_array.into_dyn();
        let mask_view = mask_dyn.as_standard_layout();

        let mut input_tensors = HashMap::new();
        input_tensors.insert(
            "input_ids",
            Tensor::from_array(&ids_view)
                .map_err(|e| RankerError::Model(format!("Failed to create input tensor: {}", e)))?,
        );
        input_tensors.insert(
            "attention_mask",
            Tensor::from_array(&mask_view)
                .map_err(|e| RankerError::Model(format!("Failed to create mask tensor: {}", e)))?,
        );

        let session = self
            .session
            .lock()
            .map_err(|_| RankerError::Model("encoder session lock poisoned".to_string()))?;
        let outputs = session
            .run(input_tensors)
            .map_err(|e| RankerError::Model(format!("Failed to run encoder: {}", e)))?;
        let output = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RankerError::Model(format!("Failed to extract output: {}", e)))?;

        let mut embeddings = Vec::with_capacity(texts.len());
        for i in 0..texts.len() {
            let row: Array1<f32> = match output.ndim() {
                // Token-level output: first token's row is the sentence vector.
                3 => Array1::from_iter(output.slice(ndarray::s![i, 0, ..]).iter().cloned()),
                // Already pooled.
                2 => Array1::from_iter(output.slice(ndarray::s![i, ..]).iter().cloned()),
                n => {
                    return Err(RankerError::Model(format!(
                        "unexpected encoder output rank {} (shape {:?})",
                        n,
                        output.shape()
                    )))
                }
            };
            embeddings.push(normalize_vector(&row));
        }

        Ok(embeddings)
    }

    /// Encodes a single text.
    pub fn encode(&self, text: &str) -> Result<Array1<f32>, RankerError> {
        let mut batch = self.encode_batch(&[text])?;
        batch
            .pop()
            .ok_or_else(|| RankerError::Model("encoder returned empty batch".to_string()))
    }
}

pub(crate) fn normalize_vector(vec: &Array1<f32>) -> Array1<f32> {
    let norm: f32 = vec.iter().map(|&x| x * x).sum::<f32>().sqrt();
    if norm > 1e-10 {
        vec / norm
    } else {
        Array1::zeros(vec.len())
    }
}

pub(crate) fn dot(a: &Array1<f32>, b: &Array1<f32>) -> f32 {
    a.dot(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_vector_unit_length() {
        let v = Array1::from_vec(vec![3.0, 4.0]);
        let n = normalize_vector(&v);
        assert!((n.dot(&n).sqrt() - 1.0).abs() < 1e-6);
        assert!((n[0] - 0.6).abs() < 1e-6);
        assert!((n[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_stays_zero() {
        let v = Array1::from_vec(vec![0.0, 0.0, 0.0]);
        let n = normalize_vector(&v);
        assert!(n.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_normalized_self_similarity_is_one() {
        let v = normalize_vector(&Array1::from_vec(vec![0.2, -0.7, 1.3, 0.05]));
        assert!((dot(&v, &v) - 1.0).abs() < 1e-6);
    }
}
