pub mod encoder;
pub mod error;
pub mod evaluation;
pub mod lexical;
pub mod memory;
pub mod metric;
pub mod params;
pub mod ranking;
pub mod store;
pub mod strategy;
pub mod vector;

pub use encoder::{CachedEncoder, QueryEncoder};
pub use error::{Result, RetrievalError};
pub use evaluation::{
    EvaluationReport, QueryRetriever, StrategyRunner, evaluate, evaluate_pair, evaluate_parallel,
    labeled_pairs_in_store, summarize,
};
pub use memory::InMemoryFragmentStore;
pub use metric::{Collection, SimilarityMetric};
pub use params::{KeywordStageParams, RawStageParams, StageParams, VectorStageParams};
pub use ranking::Retriever;
pub use store::FragmentStore;
pub use strategy::{RetrievalStrategy, StrategyKind, default_bundles};
pub use vector::QdrantFragmentStore;
