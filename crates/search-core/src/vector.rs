use std::{
    collections::{BTreeSet, HashMap},
    path::Path,
};

use anyhow::Context;
use common::{FragmentHit, StoreConfig};
use qdrant_client::{
    Qdrant,
    qdrant::{
        Condition, Filter, PayloadIncludeSelector, PointId, QueryPointsBuilder, ScrollPointsBuilder,
        Value, value::Kind,
    },
};
use tokio::runtime::Runtime;

use crate::{
    error::{Result, RetrievalError},
    lexical::TantivyKeywordIndex,
    metric::{Collection, SimilarityMetric},
    store::FragmentStore,
};

const SCROLL_PAGE: u32 = 512;

pub struct QdrantFragmentStore {
    runtime: Runtime,
    client: Qdrant,
    config: StoreConfig,
    abstract_keywords: Option<TantivyKeywordIndex>,
    document_keywords: Option<TantivyKeywordIndex>,
}

pub const fn named_vector(metric: SimilarityMetric) -> &'static str {
    match metric {
        SimilarityMetric::Cosine => "cosine",
        SimilarityMetric::InnerProduct => "dot",
        SimilarityMetric::Euclidean => "euclid",
        SimilarityMetric::L1 => "manhattan",
    }
}

// Qdrant reports distances for euclid/manhattan and similarities otherwise.
pub fn oriented_score(metric: SimilarityMetric, raw: f32) -> f32 {
    match metric {
        SimilarityMetric::Cosine | SimilarityMetric::InnerProduct => raw,
        SimilarityMetric::Euclidean | SimilarityMetric::L1 => -raw,
    }
}

impl QdrantFragmentStore {
    pub fn connect(config: StoreConfig) -> anyhow::Result<Self> {
        let url = config
            .qdrant_url
            .clone()
            .context("qdrant_url is not configured")?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed building qdrant runtime")?;
        let client = {
            let _guard = runtime.enter();
            Qdrant::from_url(&url)
                .build()
                .with_context(|| format!("failed building qdrant client for {url}"))?
        };

        let index_root = Path::new(&config.lexical_index_dir);
        let abstract_keywords = open_keywords(index_root, &config.abstract_collection);
        let document_keywords = open_keywords(index_root, &config.document_collection);

        Ok(Self {
            runtime,
            client,
            config,
            abstract_keywords,
            document_keywords,
        })
    }

    fn collection_name(&self, collection: Collection) -> &str {
        match collection {
            Collection::Abstract => &self.config.abstract_collection,
            Collection::Document => &self.config.document_collection,
        }
    }

    const fn keywords(&self, collection: Collection) -> Option<&TantivyKeywordIndex> {
        match collection {
            Collection::Abstract => self.abstract_keywords.as_ref(),
            Collection::Document => self.document_keywords.as_ref(),
        }
    }
}

fn open_keywords(root: &Path, collection: &str) -> Option<TantivyKeywordIndex> {
    match TantivyKeywordIndex::open_on_disk(&root.join(collection)) {
        Ok(index) => Some(index),
        Err(err) => {
            tracing::warn!(collection, error = %err, "keyword index unavailable");
            None
        }
    }
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::StringValue(v) => Some(v.clone()),
        _ => None,
    }
}

fn document_id_only() -> PayloadIncludeSelector {
    PayloadIncludeSelector {
        fields: vec!["document_id".to_string()],
    }
}

fn check_dimension(collection: &str, expected: usize, query_vector: &[f32]) -> Result<()> {
    if query_vector.len() == expected {
        Ok(())
    } else {
        Err(RetrievalError::store(
            collection,
            format!("query dimension {} does not match {expected}", query_vector.len()),
        ))
    }
}

fn point_hit(
    collection: &str,
    metric: SimilarityMetric,
    payload: &HashMap<String, Value>,
    raw_score: f32,
) -> Result<FragmentHit> {
    let field = |key: &str| {
        payload_str(payload, key)
            .ok_or_else(|| RetrievalError::store(collection, format!("point without `{key}` payload")))
    };
    Ok(FragmentHit {
        document_id: field("document_id")?,
        text: field("text")?,
        score: oriented_score(metric, raw_score),
    })
}

impl FragmentStore for QdrantFragmentStore {
    fn check_connection(&self) -> Result<()> {
        self.runtime
            .block_on(self.client.health_check())
            .map(|_| ())
            .map_err(|err| RetrievalError::ConnectionUnavailable(err.to_string()))
    }

    fn vector_lookup(
        &self,
        collection: Collection,
        query_vector: &[f32],
        metric: SimilarityMetric,
        limit: usize,
        restrict_to: Option<&[String]>,
    ) -> Result<Vec<FragmentHit>> {
        let name = self.collection_name(collection);
        check_dimension(name, self.config.vector_dim, query_vector)?;
        if limit == 0 || restrict_to.is_some_and(<[String]>::is_empty) {
            return Ok(Vec::new());
        }
        let mut request = QueryPointsBuilder::new(name)
            .query(query_vector.to_vec())
            .using(named_vector(metric))
            .limit(limit as u64)
            .with_payload(true);
        if let Some(ids) = restrict_to {
            request = request.filter(Filter::must([Condition::matches(
                "document_id",
                ids.to_vec(),
            )]));
        }

        let response = self
            .runtime
            .block_on(self.client.query(request))
            .map_err(|err| RetrievalError::store(name, err))?;

        response
            .result
            .iter()
            .map(|point| point_hit(name, metric, &point.payload, point.score))
            .collect()
    }

    fn keyword_lookup(
        &self,
        collection: Collection,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<FragmentHit>> {
        let name = self.collection_name(collection);
        let index = self
            .keywords(collection)
            .ok_or_else(|| RetrievalError::store(name, "keyword index is not available"))?;
        index
            .search(query_text, limit)
            .map_err(|err| RetrievalError::store(name, err))
    }

    fn list_document_ids(&self, collection: Collection) -> Result<BTreeSet<String>> {
        let name = self.collection_name(collection);
        let mut ids = BTreeSet::new();
        let mut offset: Option<PointId> = None;
        loop {
            let mut request = ScrollPointsBuilder::new(name)
                .limit(SCROLL_PAGE)
                .with_payload(document_id_only())
                .with_vectors(false);
            if let Some(next) = offset.take() {
                request = request.offset(next);
            }
            let page = self
                .runtime
                .block_on(self.client.scroll(request))
                .map_err(|err| RetrievalError::store(name, err))?;
            ids.extend(
                page.result
                    .iter()
                    .filter_map(|point| payload_str(&point.payload, "document_id")),
            );
            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(ids)
    }
}
