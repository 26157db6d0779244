use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("store connection unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("unknown retrieval strategy `{0}`")]
    UnknownStrategy(String),

    #[error("unknown collection `{0}`")]
    UnknownCollection(String),

    #[error("unknown similarity metric `{0}`")]
    UnknownSimilarityMetric(String),

    #[error("malformed parameter bundle for `{strategy}`: {reason}")]
    MalformedParameterBundle { strategy: String, reason: String },

    #[error("query encoding failed: {0}")]
    EncodingFailure(String),

    #[error("store lookup failed on `{collection}`: {message}")]
    Store { collection: String, message: String },
}

impl RetrievalError {
    pub fn malformed(strategy: &str, reason: impl Into<String>) -> Self {
        Self::MalformedParameterBundle {
            strategy: strategy.to_string(),
            reason: reason.into(),
        }
    }

    pub fn store(collection: &str, err: impl std::fmt::Display) -> Self {
        Self::Store {
            collection: collection.to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;

#[cfg(test)]
mod tests {
    use super::RetrievalError;

    #[test]
    fn messages_name_the_offending_value() {
        let err = RetrievalError::UnknownStrategy("pg_unknown".to_string());
        assert_eq!(err.to_string(), "unknown retrieval strategy `pg_unknown`");

        let err = RetrievalError::malformed("hierarchical-vector", "expected 2 bundles, got 1");
        assert!(err.to_string().contains("hierarchical-vector"));
        assert!(err.to_string().contains("expected 2 bundles"));
    }
}
