use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_EMBEDDING_MODEL: &str = "multi-qa-mpnet-base-dot-v1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub embedding_model: String,
    pub model_path: String,
    pub vector_dim: usize,
    pub qdrant_url: Option<String>,
    pub lexical_index_dir: String,
    pub abstract_collection: Option<String>,
    pub document_collection: Option<String>,
    pub similarity_metric: String,
    pub abstract_limit: usize,
    pub document_limit: usize,
    pub encoder_cache_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            model_path: format!("models/{DEFAULT_EMBEDDING_MODEL}.onnx"),
            vector_dim: 768,
            qdrant_url: None,
            lexical_index_dir: ".ragxiv/lexical".to_string(),
            abstract_collection: None,
            document_collection: None,
            similarity_metric: "inner-product".to_string(),
            abstract_limit: 5,
            document_limit: 5,
            encoder_cache_size: 256,
        }
    }
}

/// Everything a fragment store adapter needs at construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    pub abstract_collection: String,
    pub document_collection: String,
    pub vector_dim: usize,
    pub qdrant_url: Option<String>,
    pub lexical_index_dir: String,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut cfg = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed reading config file: {}", path.display()))?;
            toml::from_str::<Self>(&raw)
                .with_context(|| format!("failed parsing config file: {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(model) = std::env::var("RAGXIV_EMBEDDING_MODEL") {
            cfg.embedding_model = model;
        }
        if let Ok(model_path) = std::env::var("RAGXIV_MODEL_PATH") {
            cfg.model_path = model_path;
        }
        if let Ok(url) = std::env::var("RAGXIV_QDRANT_URL") {
            let url = url.trim().to_string();
            cfg.qdrant_url = (!url.is_empty()).then_some(url);
        }
        if let Ok(dir) = std::env::var("RAGXIV_LEXICAL_INDEX_DIR") {
            cfg.lexical_index_dir = dir;
        }
        if let Ok(metric) = std::env::var("RAGXIV_SIMILARITY_METRIC") {
            cfg.similarity_metric = metric;
        }
        if let Ok(limit) = std::env::var("RAGXIV_ABSTRACT_LIMIT") {
            cfg.abstract_limit = limit.parse().unwrap_or(cfg.abstract_limit);
        }
        if let Ok(limit) = std::env::var("RAGXIV_DOCUMENT_LIMIT") {
            cfg.document_limit = limit.parse().unwrap_or(cfg.document_limit);
        }

        tracing::debug!(model = %cfg.embedding_model, path = %path.display(), "resolved configuration");
        Ok(cfg)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            abstract_collection: self
                .abstract_collection
                .clone()
                .unwrap_or_else(|| collection_name("abstract", &self.embedding_model)),
            document_collection: self
                .document_collection
                .clone()
                .unwrap_or_else(|| collection_name("article", &self.embedding_model)),
            vector_dim: self.vector_dim,
            qdrant_url: self.qdrant_url.clone(),
            lexical_index_dir: self.lexical_index_dir.clone(),
        }
    }
}

pub fn collection_name(granularity: &str, model: &str) -> String {
    format!("embedding_{granularity}_{model}").replace('-', "_")
}
