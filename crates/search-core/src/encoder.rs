use std::num::NonZeroUsize;

use embeddings::EmbeddingEngine;
use lru::LruCache;
use parking_lot::Mutex;

use crate::error::{Result, RetrievalError};

pub trait QueryEncoder {
    fn encode(&self, text: &str) -> Result<Vec<f32>>;

    fn model_id(&self) -> &str;
}

impl QueryEncoder for EmbeddingEngine {
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_query(text)
            .map_err(|err| RetrievalError::EncodingFailure(format!("{err:#}")))
    }

    fn model_id(&self) -> &str {
        Self::model_id(self)
    }
}

impl<E: QueryEncoder + ?Sized> QueryEncoder for &E {
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        (**self).encode(text)
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

pub struct CachedEncoder<E> {
    inner: E,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl<E: QueryEncoder> CachedEncoder<E> {
    pub fn new(inner: E, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub const fn inner(&self) -> &E {
        &self.inner
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}

impl<E: QueryEncoder> QueryEncoder for CachedEncoder<E> {
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.cache.lock().get(text) {
            return Ok(hit.clone());
        }
        let vector = self.inner.encode(text)?;
        self.cache.lock().put(text.to_string(), vector.clone());
        Ok(vector)
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}
