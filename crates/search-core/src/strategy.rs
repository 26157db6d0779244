use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, RetrievalError},
    metric::{Collection, SimilarityMetric},
    params::{KeywordStageParams, StageParams, VectorStageParams},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    SingleVector,
    SingleKeyword,
    HierarchicalVector,
}

impl StrategyKind {
    pub const ALL: [Self; 3] = [
        Self::SingleVector,
        Self::SingleKeyword,
        Self::HierarchicalVector,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SingleVector => "single-vector",
            Self::SingleKeyword => "single-keyword",
            Self::HierarchicalVector => "hierarchical-vector",
        }
    }

    pub const fn stage_count(self) -> usize {
        match self {
            Self::SingleVector | Self::SingleKeyword => 1,
            Self::HierarchicalVector => 2,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = RetrievalError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim() {
            "single-vector" | "pg_semantic_article" => Ok(Self::SingleVector),
            "single-keyword" | "pg_text_article" => Ok(Self::SingleKeyword),
            "hierarchical-vector" | "pg_semantic_abstract+article" => Ok(Self::HierarchicalVector),
            _ => Err(RetrievalError::UnknownStrategy(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalStrategy {
    SingleVector(VectorStageParams),
    SingleKeyword(KeywordStageParams),
    HierarchicalVector {
        abstract_stage: VectorStageParams,
        document_stage: VectorStageParams,
    },
}

impl RetrievalStrategy {
    pub fn select(name: &str, bundles: Vec<StageParams>) -> Result<Self> {
        let kind = name.parse::<StrategyKind>()?;
        Self::from_kind(kind, bundles)
    }

    pub fn from_kind(kind: StrategyKind, bundles: Vec<StageParams>) -> Result<Self> {
        let strategy = kind.as_str();
        if bundles.len() != kind.stage_count() {
            return Err(RetrievalError::malformed(
                strategy,
                format!(
                    "expected {} parameter bundle(s), got {}",
                    kind.stage_count(),
                    bundles.len()
                ),
            ));
        }

        let mut bundles = bundles.into_iter();
        let (first, second) = (bundles.next(), bundles.next());
        match (kind, first, second) {
            (StrategyKind::SingleVector, Some(StageParams::Vector(p)), None) => {
                Ok(Self::SingleVector(p))
            }
            (StrategyKind::SingleKeyword, Some(StageParams::Keyword(p)), None) => {
                Ok(Self::SingleKeyword(p))
            }
            (
                StrategyKind::HierarchicalVector,
                Some(StageParams::Vector(abstract_stage)),
                Some(StageParams::Vector(document_stage)),
            ) => {
                if abstract_stage.collection != Collection::Abstract {
                    return Err(RetrievalError::malformed(
                        strategy,
                        format!(
                            "first stage must search the abstract collection, got {}",
                            abstract_stage.collection
                        ),
                    ));
                }
                if document_stage.collection != Collection::Document {
                    return Err(RetrievalError::malformed(
                        strategy,
                        format!(
                            "second stage must search the document collection, got {}",
                            document_stage.collection
                        ),
                    ));
                }
                if abstract_stage.query_text != document_stage.query_text {
                    return Err(RetrievalError::malformed(
                        strategy,
                        "both stages must carry the same query text",
                    ));
                }
                Ok(Self::HierarchicalVector {
                    abstract_stage,
                    document_stage,
                })
            }
            (StrategyKind::SingleKeyword, ..) => Err(RetrievalError::malformed(
                strategy,
                "expected a keyword parameter bundle",
            )),
            _ => Err(RetrievalError::malformed(
                strategy,
                "expected vector parameter bundles",
            )),
        }
    }

    pub const fn kind(&self) -> StrategyKind {
        match self {
            Self::SingleVector(_) => StrategyKind::SingleVector,
            Self::SingleKeyword(_) => StrategyKind::SingleKeyword,
            Self::HierarchicalVector { .. } => StrategyKind::HierarchicalVector,
        }
    }

    pub fn query_text(&self) -> &str {
        match self {
            Self::SingleVector(p) => &p.query_text,
            Self::SingleKeyword(p) => &p.query_text,
            Self::HierarchicalVector { abstract_stage, .. } => &abstract_stage.query_text,
        }
    }
}

pub fn default_bundles(
    kind: StrategyKind,
    metric: SimilarityMetric,
    abstract_limit: usize,
    document_limit: usize,
) -> Vec<StageParams> {
    match kind {
        StrategyKind::SingleVector => vec![StageParams::vector(
            "",
            Collection::Document,
            metric,
            document_limit,
        )],
        StrategyKind::SingleKeyword => {
            vec![StageParams::keyword("", Collection::Document, document_limit)]
        }
        StrategyKind::HierarchicalVector => vec![
            StageParams::vector("", Collection::Abstract, metric, abstract_limit),
            StageParams::vector("", Collection::Document, metric, document_limit),
        ],
    }
}
