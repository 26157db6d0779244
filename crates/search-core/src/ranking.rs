use ahash::AHashSet;
use common::{FragmentHit, RetrievalResult};

use crate::{
    encoder::QueryEncoder,
    error::Result,
    params::{KeywordStageParams, VectorStageParams},
    store::FragmentStore,
    strategy::RetrievalStrategy,
};

pub struct Retriever<'a, S: ?Sized, E: ?Sized> {
    store: &'a S,
    encoder: &'a E,
}

impl<'a, S, E> Retriever<'a, S, E>
where
    S: FragmentStore + ?Sized,
    E: QueryEncoder + ?Sized,
{
    pub const fn new(store: &'a S, encoder: &'a E) -> Self {
        Self { store, encoder }
    }

    pub fn execute(&self, strategy: &RetrievalStrategy) -> Result<RetrievalResult> {
        self.store.check_connection()?;
        match strategy {
            RetrievalStrategy::SingleVector(params) => self.single_vector(params),
            RetrievalStrategy::SingleKeyword(params) => self.single_keyword(params),
            RetrievalStrategy::HierarchicalVector {
                abstract_stage,
                document_stage,
            } => self.hierarchical_vector(abstract_stage, document_stage),
        }
    }

    fn single_vector(&self, params: &VectorStageParams) -> Result<RetrievalResult> {
        let query_vector = self.encoder.encode(&params.query_text)?;
        let hits = self.store.vector_lookup(
            params.collection,
            &query_vector,
            params.similarity_metric,
            params.max_results,
            None,
        )?;
        tracing::debug!(
            strategy = "single-vector",
            collection = %params.collection,
            metric = %params.similarity_metric,
            hits = hits.len(),
            "ranked"
        );
        Ok(RetrievalResult::from_hits(&params.query_text, hits))
    }

    fn single_keyword(&self, params: &KeywordStageParams) -> Result<RetrievalResult> {
        let hits = self
            .store
            .keyword_lookup(params.collection, &params.query_text, params.max_results)?;
        tracing::debug!(
            strategy = "single-keyword",
            collection = %params.collection,
            hits = hits.len(),
            "ranked"
        );
        Ok(RetrievalResult::from_hits(&params.query_text, hits))
    }

    fn hierarchical_vector(
        &self,
        abstract_stage: &VectorStageParams,
        document_stage: &VectorStageParams,
    ) -> Result<RetrievalResult> {
        let query_vector = self.encoder.encode(&abstract_stage.query_text)?;

        let abstract_hits = self.store.vector_lookup(
            abstract_stage.collection,
            &query_vector,
            abstract_stage.similarity_metric,
            abstract_stage.max_results,
            None,
        )?;
        let candidates = candidate_set(&abstract_hits);

        let document_hits = self.store.vector_lookup(
            document_stage.collection,
            &query_vector,
            document_stage.similarity_metric,
            document_stage.max_results,
            Some(candidates.as_slice()),
        )?;

        tracing::debug!(
            strategy = "hierarchical-vector",
            abstract_hits = abstract_hits.len(),
            candidates = candidates.len(),
            document_hits = document_hits.len(),
            "ranked"
        );

        let (documents, document_ids): (Vec<String>, Vec<String>) = abstract_hits
            .into_iter()
            .chain(document_hits)
            .map(|hit| (hit.text, hit.document_id))
            .unzip();
        Ok(RetrievalResult {
            question: abstract_stage.query_text.clone(),
            documents,
            references: candidates,
            document_ids,
        })
    }
}

pub fn candidate_set(hits: &[FragmentHit]) -> Vec<String> {
    let mut seen = AHashSet::with_capacity(hits.len());
    hits.iter()
        .filter(|hit| seen.insert(hit.document_id.as_str()))
        .map(|hit| hit.document_id.clone())
        .collect()
}
