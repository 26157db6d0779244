use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, RetrievalError},
    metric::{Collection, SimilarityMetric},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorStageParams {
    pub query_text: String,
    pub collection: Collection,
    pub similarity_metric: SimilarityMetric,
    pub max_results: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordStageParams {
    pub query_text: String,
    pub collection: Collection,
    pub max_results: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StageParams {
    Vector(VectorStageParams),
    Keyword(KeywordStageParams),
}

impl StageParams {
    pub fn vector(
        query_text: &str,
        collection: Collection,
        similarity_metric: SimilarityMetric,
        max_results: usize,
    ) -> Self {
        Self::Vector(VectorStageParams {
            query_text: query_text.to_string(),
            collection,
            similarity_metric,
            max_results,
        })
    }

    pub fn keyword(query_text: &str, collection: Collection, max_results: usize) -> Self {
        Self::Keyword(KeywordStageParams {
            query_text: query_text.to_string(),
            collection,
            max_results,
        })
    }

    pub fn query_text(&self) -> &str {
        match self {
            Self::Vector(p) => &p.query_text,
            Self::Keyword(p) => &p.query_text,
        }
    }

    pub const fn collection(&self) -> Collection {
        match self {
            Self::Vector(p) => p.collection,
            Self::Keyword(p) => p.collection,
        }
    }

    #[must_use]
    pub fn with_query(&self, query_text: &str) -> Self {
        let mut next = self.clone();
        match &mut next {
            Self::Vector(p) => query_text.clone_into(&mut p.query_text),
            Self::Keyword(p) => query_text.clone_into(&mut p.query_text),
        }
        next
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawStageParams {
    pub query_text: String,
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_metric: Option<String>,
    pub max_results: usize,
}

impl TryFrom<RawStageParams> for StageParams {
    type Error = RetrievalError;

    fn try_from(raw: RawStageParams) -> Result<Self> {
        let collection = raw.collection.parse::<Collection>()?;
        match raw.similarity_metric {
            Some(metric) => Ok(Self::vector(
                &raw.query_text,
                collection,
                metric.parse::<SimilarityMetric>()?,
                raw.max_results,
            )),
            None => Ok(Self::keyword(&raw.query_text, collection, raw.max_results)),
        }
    }
}
