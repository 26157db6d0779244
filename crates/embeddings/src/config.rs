use common::config::DEFAULT_EMBEDDING_MODEL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionDevice {
    Cpu,
    GpuPreferred,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingConfig {
    pub model_id: String,
    pub model_path: String,
    pub tokenizer_path: Option<String>,
    pub vector_dim: usize,
    pub max_sequence_length: usize,
    pub execution_device: ExecutionDevice,
    pub allow_pseudo_fallback: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let model_path = std::env::var("RAGXIV_MODEL_PATH")
            .unwrap_or_else(|_| format!("models/{DEFAULT_EMBEDDING_MODEL}.onnx"));
        let tokenizer_path = std::env::var("RAGXIV_TOKENIZER_PATH")
            .ok()
            .or_else(|| sibling_tokenizer(&model_path));
        Self {
            model_id: DEFAULT_EMBEDDING_MODEL.to_string(),
            model_path,
            tokenizer_path,
            vector_dim: 768,
            max_sequence_length: 384,
            execution_device: ExecutionDevice::from_env(),
            allow_pseudo_fallback: std::env::var("RAGXIV_ALLOW_PSEUDO_EMBED")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(cfg!(test)),
        }
    }
}

impl EmbeddingConfig {
    pub fn from_app_config(app: &common::AppConfig) -> Self {
        let tokenizer_path = std::env::var("RAGXIV_TOKENIZER_PATH")
            .ok()
            .or_else(|| sibling_tokenizer(&app.model_path));
        Self {
            model_id: app.embedding_model.clone(),
            model_path: app.model_path.clone(),
            tokenizer_path,
            vector_dim: app.vector_dim,
            ..Self::default()
        }
    }
}

fn sibling_tokenizer(model_path: &str) -> Option<String> {
    let candidate = std::path::Path::new(model_path).with_extension("tokenizer.json");
    candidate.exists().then(|| candidate.display().to_string())
}

impl ExecutionDevice {
    pub fn from_env() -> Self {
        let raw = std::env::var("EMBEDDING_DEVICE").unwrap_or_default();
        if raw.eq_ignore_ascii_case("gpu") {
            Self::GpuPreferred
        } else {
            Self::Cpu
        }
    }
}
