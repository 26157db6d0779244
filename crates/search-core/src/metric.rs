use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Collection {
    Abstract,
    Document,
}

impl Collection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Abstract => "abstract",
            Self::Document => "document",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = RetrievalError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "abstract" => Ok(Self::Abstract),
            "document" | "article" => Ok(Self::Document),
            _ => Err(RetrievalError::UnknownCollection(raw.to_string())),
        }
    }
}

/// Every metric is evaluated as a distance where smaller means closer.
/// Hit scores are the negated orientation, so a larger score is always closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimilarityMetric {
    Cosine,
    InnerProduct,
    Euclidean,
    L1,
}

impl SimilarityMetric {
    pub const ALL: [Self; 4] = [Self::Cosine, Self::InnerProduct, Self::Euclidean, Self::L1];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::InnerProduct => "inner-product",
            Self::Euclidean => "euclidean",
            Self::L1 => "l1",
        }
    }

    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => {
                let (dot, na, nb) = a.iter().zip(b).fold((0.0f32, 0.0f32, 0.0f32), |acc, (x, y)| {
                    (acc.0 + x * y, acc.1 + x * x, acc.2 + y * y)
                });
                if na == 0.0 || nb == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (na.sqrt() * nb.sqrt())
                }
            }
            Self::InnerProduct => -a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
            Self::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            Self::L1 => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
        }
    }

    pub fn score_from_distance(self, distance: f32) -> f32 {
        match self {
            Self::Cosine => 1.0 - distance,
            Self::InnerProduct | Self::Euclidean | Self::L1 => -distance,
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimilarityMetric {
    type Err = RetrievalError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cosine" | "<=>" => Ok(Self::Cosine),
            "inner-product" | "inner_product" | "dot" | "ip" | "<#>" => Ok(Self::InnerProduct),
            "euclidean" | "l2" | "<->" => Ok(Self::Euclidean),
            "l1" | "manhattan" | "<+>" => Ok(Self::L1),
            _ => Err(RetrievalError::UnknownSimilarityMetric(raw.to_string())),
        }
    }
}
