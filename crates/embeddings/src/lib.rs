pub mod config;
pub mod engine;

pub use config::{EmbeddingConfig, ExecutionDevice};
pub use engine::{EmbeddingEngine, normalize};
