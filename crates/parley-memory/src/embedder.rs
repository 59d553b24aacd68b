// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local all-MiniLM-L6-v2 sentence embeddings on ONNX Runtime.
//!
//! Produces L2-normalized 384-dimensional vectors, so cosine similarity
//! between two outputs equals their dot product.

use std::fmt::Display;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use ndarray::Array2;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;
use tracing::debug;

use parley_core::types::{AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus};
use parley_core::{EmbeddingAdapter, ParleyError, PluginAdapter};

/// Output width of all-MiniLM-L6-v2.
pub const EMBEDDING_DIM: usize = 384;

/// The model was trained on sequences of at most this many tokens.
const MAX_TOKENS: usize = 256;

fn embed_err<E: Display>(context: &'static str) -> impl FnOnce(E) -> ParleyError {
    move |e| ParleyError::embedding(format!("{context}: {e}"))
}

/// Token ids for one input text, truncated to the model window.
struct Encoded {
    ids: Vec<i64>,
    mask: Vec<i64>,
    type_ids: Vec<i64>,
}

impl Encoded {
    fn len(&self) -> usize {
        self.ids.len()
    }
}

pub struct OnnxEmbedder {
    /// Inference needs `&mut Session`; calls are serialized.
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
}

// SAFETY: the session is only reached through the mutex, and tokenizer
// encoding takes `&self` without interior mutation.
unsafe impl Send for OnnxEmbedder {}
unsafe impl Sync for OnnxEmbedder {}

impl OnnxEmbedder {
    /// Loads `model.onnx` and the sibling `tokenizer.json`.
    pub fn load(model_path: &Path) -> Result<Self, ParleyError> {
        let tokenizer_path = model_path
            .parent()
            .map(|dir| dir.join("tokenizer.json"))
            .ok_or_else(|| ParleyError::embedding("model path has no parent directory"))?;

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(embed_err("failed to load tokenizer"))?;

        let session = Session::builder()
            .map_err(embed_err("failed to create ONNX session builder"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(embed_err("failed to set optimization level"))?
            .with_intra_threads(1)
            .map_err(embed_err("failed to set ONNX thread count"))?
            .commit_from_file(model_path)
            .map_err(embed_err("failed to load ONNX model"))?;

        debug!(path = %model_path.display(), "embedding model loaded");
        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    fn encode(&self, text: &str) -> Result<Encoded, ParleyError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(embed_err("tokenization failed"))?;
        let take = encoding.get_ids().len().min(MAX_TOKENS);
        let widen = |xs: &[u32]| xs[..take].iter().map(|&x| i64::from(x)).collect::<Vec<_>>();
        Ok(Encoded {
            ids: widen(encoding.get_ids()),
            mask: widen(encoding.get_attention_mask()),
            type_ids: widen(encoding.get_type_ids()),
        })
    }

    /// Embeds one text into a normalized vector.
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>, ParleyError> {
        let encoded = self.encode(text)?;
        let seq_len = encoded.len();
        let shape = (1, seq_len);

        let ids = Array2::from_shape_vec(shape, encoded.ids).map_err(embed_err("bad input_ids shape"))?;
        let mask = Array2::from_shape_vec(shape, encoded.mask.clone())
            .map_err(embed_err("bad attention_mask shape"))?;
        let type_ids = Array2::from_shape_vec(shape, encoded.type_ids)
            .map_err(embed_err("bad token_type_ids shape"))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| ParleyError::embedding(format!("ONNX session lock poisoned: {e}")))?;

        let ids = TensorRef::from_array_view(&ids).map_err(embed_err("input_ids tensor"))?;
        let mask_t = TensorRef::from_array_view(&mask).map_err(embed_err("attention_mask tensor"))?;
        let type_ids =
            TensorRef::from_array_view(&type_ids).map_err(embed_err("token_type_ids tensor"))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => ids,
                "attention_mask" => mask_t,
                "token_type_ids" => type_ids
            ])
            .map_err(embed_err("ONNX inference failed"))?;

        // Last hidden state: [1, seq_len, hidden].
        let (out_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(embed_err("failed to read output tensor"))?;
        let hidden = out_shape
            .last()
            .map(|&d| d as usize)
            .ok_or_else(|| ParleyError::embedding("output tensor has no dimensions"))?;

        let mut pooled = masked_mean(data, &encoded.mask, hidden);
        normalize(&mut pooled);
        Ok(pooled)
    }
}

/// Averages token vectors whose attention mask is set.
fn masked_mean(hidden_states: &[f32], mask: &[i64], hidden: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden];
    let mut count = 0usize;
    for (token, _) in hidden_states
        .chunks_exact(hidden)
        .zip(mask)
        .filter(|(_, m)| **m > 0)
    {
        for (acc, v) in sum.iter_mut().zip(token) {
            *acc += v;
        }
        count += 1;
    }
    if count > 0 {
        let n = count as f32;
        sum.iter_mut().for_each(|v| *v /= n);
    }
    sum
}

/// Scales to unit length in place. Near-zero vectors are left untouched.
fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

#[async_trait]
impl PluginAdapter for OnnxEmbedder {
    fn name(&self) -> &str {
        "onnx-minilm"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(match self.session.lock() {
            Ok(_) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(format!("session lock poisoned: {e}")),
        })
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for OnnxEmbedder {
    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }

    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, ParleyError> {
        let embeddings = input
            .texts
            .iter()
            .map(|text| self.embed_text(text))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(EmbeddingOutput {
            embeddings,
            dimensions: EMBEDDING_DIM,
        })
    }
}
