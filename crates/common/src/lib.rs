pub mod config;
pub mod labels;

use schemars::JsonSchema;
use schemars::Schema;
use serde::{Deserialize, Serialize};

pub use config::{AppConfig, StoreConfig};
pub use labels::{LabeledPair, LabeledQuestions, flatten_labels};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Fragment {
    pub document_id: String,
    pub text: String,
    pub vector: Vec<f32>,
}

/// One row returned by a store lookup. `score` is oriented so that larger is closer.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct FragmentHit {
    pub document_id: String,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RetrievalResult {
    pub question: String,
    pub documents: Vec<String>,
    pub references: Vec<String>,
    pub document_ids: Vec<String>,
}

impl RetrievalResult {
    pub fn from_hits(question: &str, hits: Vec<FragmentHit>) -> Self {
        let mut documents = Vec::with_capacity(hits.len());
        let mut document_ids = Vec::with_capacity(hits.len());
        for hit in hits {
            documents.push(hit.text);
            document_ids.push(hit.document_id);
        }
        Self {
            question: question.to_string(),
            documents,
            references: document_ids.clone(),
            document_ids,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct EvaluationRecord {
    pub document_id: String,
    pub question: String,
    pub retrieved_document_ids: Vec<String>,
    pub hit_rate: bool,
    pub reciprocal_rank: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationRecord {
    pub const fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct MetricRow {
    pub hit_rate: f64,
    pub mean_reciprocal_rank: f64,
    pub evaluated: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SchemaBundle {
    pub fragment_hit: Schema,
    pub retrieval_result: Schema,
    pub evaluation_record: Schema,
    pub metric_row: Schema,
}

pub fn schema_bundle() -> SchemaBundle {
    SchemaBundle {
        fragment_hit: schemars::schema_for!(FragmentHit),
        retrieval_result: schemars::schema_for!(RetrievalResult),
        evaluation_record: schemars::schema_for!(EvaluationRecord),
        metric_row: schemars::schema_for!(MetricRow),
    }
}
