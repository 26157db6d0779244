use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result, anyhow, bail};
use ort::{session::Session, value::Tensor};
use tokenizers::{EncodeInput, Tokenizer};

use crate::config::{EmbeddingConfig, ExecutionDevice};

pub struct EmbeddingEngine {
    config: EmbeddingConfig,
    device_used: ExecutionDevice,
    backend: EmbeddingBackend,
}

enum EmbeddingBackend {
    Onnx(OnnxBackend),
    Pseudo,
    Unavailable(String),
}

struct OnnxBackend {
    session: Mutex<Session>,
    tokenizer: Option<Arc<Tokenizer>>,
}

struct TokenBatch {
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
    rows: usize,
    seq_len: usize,
}

impl EmbeddingEngine {
    pub fn new(config: EmbeddingConfig) -> Self {
        let device_used = resolve_device(config.execution_device);
        let backend = match build_backend(&config) {
            Ok(backend) => backend,
            Err(err) => {
                tracing::warn!(model = %config.model_id, error = %err, "embedding backend unavailable");
                EmbeddingBackend::Unavailable(err.to_string())
            }
        };
        Self {
            config,
            device_used,
            backend,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.config.model_id
    }

    pub const fn dimension(&self) -> usize {
        self.config.vector_dim
    }

    pub const fn device_mode(&self) -> &'static str {
        match self.device_used {
            ExecutionDevice::Cpu => "cpu",
            ExecutionDevice::GpuPreferred => "gpu",
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self.backend, EmbeddingBackend::Unavailable(_))
    }

    pub fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let raw = match &self.backend {
            EmbeddingBackend::Onnx(backend) => backend.embed_batch(inputs, &self.config)?,
            EmbeddingBackend::Pseudo => inputs
                .iter()
                .map(|input| pseudo_embed(input, self.config.vector_dim))
                .collect(),
            EmbeddingBackend::Unavailable(msg) => bail!(
                "embedding unavailable: {msg}. set RAGXIV_ALLOW_PSEUDO_EMBED=true only for local test scaffolding"
            ),
        };
        Ok(raw.into_iter().map(normalize).collect())
    }

    pub fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[query.to_string()])?
            .pop()
            .ok_or_else(|| anyhow!("embedding backend returned no vector for query"))
    }
}

impl OnnxBackend {
    fn embed_batch(&self, inputs: &[String], cfg: &EmbeddingConfig) -> Result<Vec<Vec<f32>>> {
        let batch = tokenize(inputs, cfg.max_sequence_length, self.tokenizer.as_deref())?;
        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("embedding session lock poisoned"))?;

        let shape = vec![batch.rows as i64, batch.seq_len as i64];
        let ids = Tensor::<i64>::from_array((shape.clone(), batch.input_ids.clone()))?;
        let mask = Tensor::<i64>::from_array((shape.clone(), batch.attention_mask.clone()))?;
        let token_types =
            Tensor::<i64>::from_array((shape, vec![0i64; batch.rows * batch.seq_len]))?;

        let mut feeds = HashMap::new();
        for input in session.inputs() {
            let name = input.name().to_lowercase();
            let value = if name.contains("attention") && name.contains("mask") {
                mask.clone().upcast()
            } else if name.contains("token_type") {
                token_types.clone().upcast()
            } else {
                ids.clone().upcast()
            };
            feeds.insert(input.name().to_string(), value);
        }

        let mut outputs = session.run(feeds)?;
        let first = outputs
            .keys()
            .next()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("embedding model returned no outputs"))?;
        let output = outputs
            .remove(first)
            .ok_or_else(|| anyhow!("embedding model output extraction failed"))?;
        let (dims, values) = output
            .try_extract_tensor::<f32>()
            .map_err(|err| anyhow!("embedding output decode failed: {err}"))?;

        pool_output(dims, values, &batch, cfg.vector_dim)
    }
}

// Accepts either already-pooled `[rows, hidden]` output or token-level
// `[rows, seq, hidden]` output, which is mean-pooled over the attention mask.
fn pool_output(
    dims: &[i64],
    values: &[f32],
    batch: &TokenBatch,
    target_dim: usize,
) -> Result<Vec<Vec<f32>>> {
    let hidden = dims
        .last()
        .and_then(|d| usize::try_from(*d).ok())
        .filter(|d| *d > 0)
        .ok_or_else(|| anyhow!("embedding output has invalid shape {dims:?}"))?;

    match dims.len() {
        2 => {
            if values.len() < batch.rows * hidden {
                bail!("embedding output too small for {} rows of {hidden}", batch.rows);
            }
            Ok(values
                .chunks(hidden)
                .take(batch.rows)
                .map(|row| fit_dimension(row, target_dim))
                .collect())
        }
        3 => {
            let model_seq = usize::try_from(dims[1]).unwrap_or(batch.seq_len);
            if values.len() < batch.rows * model_seq * hidden {
                bail!("embedding output too small for mean pooling");
            }
            let mut pooled_rows = Vec::with_capacity(batch.rows);
            for row in 0..batch.rows {
                let mut pooled = vec![0.0f32; hidden];
                let mut weight = 0.0f32;
                for token in 0..model_seq.min(batch.seq_len) {
                    if batch.attention_mask[row * batch.seq_len + token] == 0 {
                        continue;
                    }
                    weight += 1.0;
                    let start = (row * model_seq + token) * hidden;
                    for (acc, v) in pooled.iter_mut().zip(&values[start..start + hidden]) {
                        *acc += v;
                    }
                }
                if weight > 0.0 {
                    pooled.iter_mut().for_each(|v| *v /= weight);
                }
                pooled_rows.push(fit_dimension(&pooled, target_dim));
            }
            Ok(pooled_rows)
        }
        rank => bail!("embedding output rank {rank} is unsupported"),
    }
}

fn fit_dimension(values: &[f32], target_dim: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; target_dim];
    let n = values.len().min(target_dim);
    out[..n].copy_from_slice(&values[..n]);
    out
}

pub fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
}

fn build_backend(config: &EmbeddingConfig) -> Result<EmbeddingBackend> {
    if config.allow_pseudo_fallback {
        return Ok(EmbeddingBackend::Pseudo);
    }
    let model_path = Path::new(&config.model_path);
    if !model_path.exists() {
        bail!("embedding model not found at {}", model_path.display());
    }

    let session = Session::builder()
        .context("failed to create ONNX session builder")?
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load ONNX model {}", model_path.display()))?;
    let tokenizer = match config.tokenizer_path.as_deref() {
        Some(path) => Some(Arc::new(
            Tokenizer::from_file(path)
                .map_err(|err| anyhow!("failed loading tokenizer from {path}: {err}"))?,
        )),
        None => None,
    };

    Ok(EmbeddingBackend::Onnx(OnnxBackend {
        session: Mutex::new(session),
        tokenizer,
    }))
}

fn tokenize(inputs: &[String], max_len: usize, tokenizer: Option<&Tokenizer>) -> Result<TokenBatch> {
    let seq_len = max_len.max(1);
    let token_rows: Vec<Vec<i64>> = match tokenizer {
        Some(tokenizer) => tokenizer
            .encode_batch(
                inputs
                    .iter()
                    .map(|text| EncodeInput::Single(text.as_str().into()))
                    .collect::<Vec<_>>(),
                true,
            )
            .map_err(|err| anyhow!("tokenization failed: {err}"))?
            .iter()
            .map(|enc| enc.get_ids().iter().map(|id| i64::from(*id)).collect())
            .collect(),
        // Byte-level ids keep the model runnable without a tokenizer file.
        None => inputs
            .iter()
            .map(|text| text.bytes().map(|b| i64::from(b) + 1).collect())
            .collect(),
    };

    let mut input_ids = vec![0i64; inputs.len() * seq_len];
    let mut attention_mask = vec![0i64; inputs.len() * seq_len];
    for (row, tokens) in token_rows.iter().enumerate() {
        for (col, token) in tokens.iter().take(seq_len).enumerate() {
            input_ids[row * seq_len + col] = *token;
            attention_mask[row * seq_len + col] = 1;
        }
    }
    Ok(TokenBatch {
        input_ids,
        attention_mask,
        rows: inputs.len(),
        seq_len,
    })
}

fn resolve_device(preferred: ExecutionDevice) -> ExecutionDevice {
    let gpu_available = std::env::var("EMBEDDING_GPU_AVAILABLE")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    match preferred {
        ExecutionDevice::GpuPreferred if gpu_available => ExecutionDevice::GpuPreferred,
        _ => ExecutionDevice::Cpu,
    }
}

fn pseudo_embed(input: &str, dim: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; dim.max(1)];
    let n = out.len();
    for word in input.split_whitespace() {
        let word = word.to_lowercase();
        let slot = word
            .bytes()
            .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(usize::from(b)));
        out[slot % n] += 1.0;
    }
    out
}
