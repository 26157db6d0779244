use std::collections::BTreeSet;

use common::FragmentHit;

use crate::{
    error::Result,
    metric::{Collection, SimilarityMetric},
};

/// Read access to the abstract-level and document-level fragment collections.
///
/// Implementations hold a single connection and are not assumed safe for
/// concurrent use by several callers; give every worker its own store.
pub trait FragmentStore {
    fn check_connection(&self) -> Result<()>;

    /// Nearest fragments to `query_vector`, closest first.
    ///
    /// `restrict_to: Some(ids)` only admits fragments whose `document_id` is in
    /// `ids`; an empty slice admits nothing.
    fn vector_lookup(
        &self,
        collection: Collection,
        query_vector: &[f32],
        metric: SimilarityMetric,
        limit: usize,
        restrict_to: Option<&[String]>,
    ) -> Result<Vec<FragmentHit>>;

    fn keyword_lookup(
        &self,
        collection: Collection,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<FragmentHit>>;

    fn list_document_ids(&self, collection: Collection) -> Result<BTreeSet<String>>;
}

impl<S: FragmentStore + ?Sized> FragmentStore for &S {
    fn check_connection(&self) -> Result<()> {
        (**self).check_connection()
    }

    fn vector_lookup(
        &self,
        collection: Collection,
        query_vector: &[f32],
        metric: SimilarityMetric,
        limit: usize,
        restrict_to: Option<&[String]>,
    ) -> Result<Vec<FragmentHit>> {
        (**self).vector_lookup(collection, query_vector, metric, limit, restrict_to)
    }

    fn keyword_lookup(
        &self,
        collection: Collection,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<FragmentHit>> {
        (**self).keyword_lookup(collection, query_text, limit)
    }

    fn list_document_ids(&self, collection: Collection) -> Result<BTreeSet<String>> {
        (**self).list_document_ids(collection)
    }
}

impl<S: FragmentStore + ?Sized> FragmentStore for Box<S> {
    fn check_connection(&self) -> Result<()> {
        (**self).check_connection()
    }

    fn vector_lookup(
        &self,
        collection: Collection,
        query_vector: &[f32],
        metric: SimilarityMetric,
        limit: usize,
        restrict_to: Option<&[String]>,
    ) -> Result<Vec<FragmentHit>> {
        (**self).vector_lookup(collection, query_vector, metric, limit, restrict_to)
    }

    fn keyword_lookup(
        &self,
        collection: Collection,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<FragmentHit>> {
        (**self).keyword_lookup(collection, query_text, limit)
    }

    fn list_document_ids(&self, collection: Collection) -> Result<BTreeSet<String>> {
        (**self).list_document_ids(collection)
    }
}
