use std::collections::BTreeSet;

use ahash::AHashSet;
use anyhow::bail;
use common::{Fragment, FragmentHit};

use crate::{
    error::{Result, RetrievalError},
    lexical::TantivyKeywordIndex,
    metric::{Collection, SimilarityMetric},
    store::FragmentStore,
};

pub struct InMemoryFragmentStore {
    abstracts: MemoryCollection,
    documents: MemoryCollection,
    open: bool,
}

struct MemoryCollection {
    fragments: Vec<Fragment>,
    dimension: Option<usize>,
    keywords: TantivyKeywordIndex,
}

impl MemoryCollection {
    fn new(collection: Collection, fragments: Vec<Fragment>) -> anyhow::Result<Self> {
        let dimension = fragments.first().map(|f| f.vector.len());
        if let Some(dim) = dimension
            && let Some(bad) = fragments.iter().find(|f| f.vector.len() != dim)
        {
            bail!(
                "{collection} fragment of `{}` has dimension {}, expected {dim}",
                bad.document_id,
                bad.vector.len()
            );
        }
        let keywords = TantivyKeywordIndex::build_in_memory(
            fragments
                .iter()
                .map(|f| (f.document_id.as_str(), f.text.as_str())),
        )?;
        Ok(Self {
            fragments,
            dimension,
            keywords,
        })
    }
}

impl InMemoryFragmentStore {
    pub fn new(abstracts: Vec<Fragment>, documents: Vec<Fragment>) -> anyhow::Result<Self> {
        let abstracts = MemoryCollection::new(Collection::Abstract, abstracts)?;
        let documents = MemoryCollection::new(Collection::Document, documents)?;
        if let (Some(a), Some(d)) = (abstracts.dimension, documents.dimension)
            && a != d
        {
            bail!("abstract dimension {a} differs from document dimension {d}");
        }
        tracing::debug!(
            abstracts = abstracts.fragments.len(),
            documents = documents.fragments.len(),
            "built in-memory fragment store"
        );
        Ok(Self {
            abstracts,
            documents,
            open: true,
        })
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn fragment_count(&self, collection: Collection) -> usize {
        self.collection(collection).fragments.len()
    }

    const fn collection(&self, collection: Collection) -> &MemoryCollection {
        match collection {
            Collection::Abstract => &self.abstracts,
            Collection::Document => &self.documents,
        }
    }
}

impl FragmentStore for InMemoryFragmentStore {
    fn check_connection(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(RetrievalError::ConnectionUnavailable(
                "in-memory store has been closed".to_string(),
            ))
        }
    }

    fn vector_lookup(
        &self,
        collection: Collection,
        query_vector: &[f32],
        metric: SimilarityMetric,
        limit: usize,
        restrict_to: Option<&[String]>,
    ) -> Result<Vec<FragmentHit>> {
        let target = self.collection(collection);
        if let Some(dim) = target.dimension
            && dim != query_vector.len()
        {
            return Err(RetrievalError::store(
                collection.as_str(),
                format!("query dimension {} does not match {dim}", query_vector.len()),
            ));
        }

        let allowed: Option<AHashSet<&str>> =
            restrict_to.map(|ids| ids.iter().map(String::as_str).collect());
        if allowed.as_ref().is_some_and(|ids| ids.is_empty()) {
            return Ok(Vec::new());
        }

        let mut scored = target
            .fragments
            .iter()
            .filter(|f| {
                allowed
                    .as_ref()
                    .is_none_or(|ids| ids.contains(f.document_id.as_str()))
            })
            .map(|f| (metric.distance(query_vector, &f.vector), f))
            .collect::<Vec<_>>();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(distance, f)| FragmentHit {
                document_id: f.document_id.clone(),
                text: f.text.clone(),
                score: metric.score_from_distance(distance),
            })
            .collect())
    }

    fn keyword_lookup(
        &self,
        collection: Collection,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<FragmentHit>> {
        self.collection(collection)
            .keywords
            .search(query_text, limit)
            .map_err(|err| RetrievalError::store(collection.as_str(), err))
    }

    fn list_document_ids(&self, collection: Collection) -> Result<BTreeSet<String>> {
        Ok(self
            .collection(collection)
            .fragments
            .iter()
            .map(|f| f.document_id.clone())
            .collect())
    }
}
