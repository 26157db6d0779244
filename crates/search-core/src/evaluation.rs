use std::collections::BTreeMap;

use common::{
    EvaluationRecord, LabeledPair, LabeledQuestions, MetricRow, RetrievalResult, flatten_labels,
    labels::restrict_to_documents,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    encoder::QueryEncoder,
    error::Result,
    metric::Collection,
    params::StageParams,
    ranking::Retriever,
    store::FragmentStore,
    strategy::{RetrievalStrategy, StrategyKind},
};

pub trait QueryRetriever {
    fn retrieve(&self, query: &str) -> Result<RetrievalResult>;
}

impl<F> QueryRetriever for F
where
    F: Fn(&str) -> Result<RetrievalResult>,
{
    fn retrieve(&self, query: &str) -> Result<RetrievalResult> {
        self(query)
    }
}

pub struct StrategyRunner<S, E> {
    kind: StrategyKind,
    templates: Vec<StageParams>,
    store: S,
    encoder: E,
}

impl<S: FragmentStore, E: QueryEncoder> StrategyRunner<S, E> {
    pub fn new(name: &str, templates: Vec<StageParams>, store: S, encoder: E) -> Result<Self> {
        let kind = RetrievalStrategy::select(name, templates.clone())?.kind();
        Ok(Self {
            kind,
            templates,
            store,
            encoder,
        })
    }

    pub const fn kind(&self) -> StrategyKind {
        self.kind
    }

    pub fn strategy_for(&self, query: &str) -> Result<RetrievalStrategy> {
        RetrievalStrategy::from_kind(
            self.kind,
            self.templates.iter().map(|t| t.with_query(query)).collect(),
        )
    }
}

impl<S: FragmentStore, E: QueryEncoder> QueryRetriever for StrategyRunner<S, E> {
    fn retrieve(&self, query: &str) -> Result<RetrievalResult> {
        let strategy = self.strategy_for(query)?;
        Retriever::new(&self.store, &self.encoder).execute(&strategy)
    }
}

pub fn evaluate_pair<R: QueryRetriever + ?Sized>(retriever: &R, pair: &LabeledPair) -> EvaluationRecord {
    match retriever.retrieve(&pair.question) {
        Ok(result) => {
            let position = result
                .references
                .iter()
                .position(|id| *id == pair.document_id);
            EvaluationRecord {
                document_id: pair.document_id.clone(),
                question: pair.question.clone(),
                hit_rate: position.is_some(),
                reciprocal_rank: position.map_or(0.0, |p| 1.0 / (1.0 + p as f64)),
                retrieved_document_ids: result.references,
                error: None,
            }
        }
        Err(err) => {
            tracing::warn!(
                document_id = %pair.document_id,
                question = %pair.question,
                error = %err,
                "retrieval failed during evaluation"
            );
            failed_record(pair, err.to_string())
        }
    }
}

fn failed_record(pair: &LabeledPair, error: String) -> EvaluationRecord {
    EvaluationRecord {
        document_id: pair.document_id.clone(),
        question: pair.question.clone(),
        retrieved_document_ids: Vec::new(),
        hit_rate: false,
        reciprocal_rank: 0.0,
        error: Some(error),
    }
}

pub fn evaluate<R: QueryRetriever + ?Sized>(retriever: &R, pairs: &[LabeledPair]) -> Vec<EvaluationRecord> {
    pairs.iter().map(|pair| evaluate_pair(retriever, pair)).collect()
}

pub fn evaluate_parallel<R, F>(pairs: &[LabeledPair], factory: F) -> Vec<EvaluationRecord>
where
    R: QueryRetriever,
    F: Fn() -> Result<R> + Sync + Send,
{
    pairs
        .par_iter()
        .map_init(&factory, |retriever, pair| match retriever {
            Ok(retriever) => evaluate_pair(&*retriever, pair),
            Err(err) => {
                tracing::warn!(document_id = %pair.document_id, error = %err, "worker has no retriever");
                failed_record(pair, err.to_string())
            }
        })
        .collect()
}

pub fn summarize(records: &[EvaluationRecord]) -> MetricRow {
    let (scored, failed): (Vec<_>, Vec<_>) = records.iter().partition(|r| !r.is_failure());
    if scored.is_empty() {
        return MetricRow {
            failed: failed.len(),
            ..MetricRow::default()
        };
    }
    let n = scored.len() as f64;
    let hits = scored.iter().filter(|r| r.hit_rate).count() as f64;
    let rr_sum: f64 = scored.iter().map(|r| r.reciprocal_rank).sum();
    MetricRow {
        hit_rate: hits / n,
        mean_reciprocal_rank: rr_sum / n,
        evaluated: scored.len(),
        failed: failed.len(),
    }
}

pub fn labeled_pairs_in_store<S: FragmentStore + ?Sized>(
    store: &S,
    labels: &[LabeledQuestions],
) -> Result<Vec<LabeledPair>> {
    let present = store.list_document_ids(Collection::Abstract)?;
    let pairs = flatten_labels(labels);
    let total = pairs.len();
    let kept = restrict_to_documents(pairs, &present);
    if kept.len() < total {
        tracing::info!(
            kept = kept.len(),
            dropped = total - kept.len(),
            "dropped labeled pairs for documents missing from the store"
        );
    }
    Ok(kept)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationReport {
    rows: BTreeMap<String, MetricRow>,
}

impl EvaluationReport {
    pub fn insert(&mut self, strategy: &str, row: MetricRow) {
        self.rows.insert(strategy.to_string(), row);
    }

    pub fn get(&self, strategy: &str) -> Option<&MetricRow> {
        self.rows.get(strategy)
    }

    pub fn rows(&self) -> impl Iterator<Item = (&str, &MetricRow)> {
        self.rows.iter().map(|(name, row)| (name.as_str(), row))
    }
}
