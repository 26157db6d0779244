use std::{
    cell::{Cell, RefCell},
    collections::BTreeSet,
};

use common::{Fragment, FragmentHit, LabeledPair, LabeledQuestions};
use search_core::{
    Collection, FragmentStore, InMemoryFragmentStore, QueryEncoder, QueryRetriever,
    RetrievalError, RetrievalStrategy, Retriever, SimilarityMetric, StageParams, StrategyKind,
    StrategyRunner, default_bundles, evaluate, evaluate_parallel, labeled_pairs_in_store,
    summarize,
};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Check,
    Vector {
        collection: Collection,
        limit: usize,
        restrict_to: Option<Vec<String>>,
    },
    Keyword(String),
    List,
}

/// Returns canned hits per collection and records every call it receives.
#[derive(Default)]
struct ScriptedStore {
    abstracts: Vec<FragmentHit>,
    documents: Vec<FragmentHit>,
    fail_documents: bool,
    disconnected: bool,
    calls: RefCell<Vec<Call>>,
}

impl ScriptedStore {
    fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }
}

impl FragmentStore for ScriptedStore {
    fn check_connection(&self) -> search_core::Result<()> {
        self.calls.borrow_mut().push(Call::Check);
        if self.disconnected {
            return Err(RetrievalError::ConnectionUnavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn vector_lookup(
        &self,
        collection: Collection,
        _query_vector: &[f32],
        _metric: SimilarityMetric,
        limit: usize,
        restrict_to: Option<&[String]>,
    ) -> search_core::Result<Vec<FragmentHit>> {
        self.calls.borrow_mut().push(Call::Vector {
            collection,
            limit,
            restrict_to: restrict_to.map(<[String]>::to_vec),
        });
        let source = match collection {
            Collection::Abstract => &self.abstracts,
            Collection::Document if self.fail_documents => {
                return Err(RetrievalError::store("document", "timeout"));
            }
            Collection::Document => &self.documents,
        };
        Ok(source
            .iter()
            .filter(|h| restrict_to.is_none_or(|ids| ids.contains(&h.document_id)))
            .take(limit)
            .cloned()
            .collect())
    }

    fn keyword_lookup(
        &self,
        _collection: Collection,
        query_text: &str,
        limit: usize,
    ) -> search_core::Result<Vec<FragmentHit>> {
        self.calls.borrow_mut().push(Call::Keyword(query_text.to_string()));
        Ok(self.documents.iter().take(limit).cloned().collect())
    }

    fn list_document_ids(&self, _collection: Collection) -> search_core::Result<BTreeSet<String>> {
        self.calls.borrow_mut().push(Call::List);
        Ok(self.abstracts.iter().map(|h| h.document_id.clone()).collect())
    }
}

#[derive(Default)]
struct CountingEncoder {
    calls: Cell<usize>,
}

impl QueryEncoder for CountingEncoder {
    fn encode(&self, _text: &str) -> search_core::Result<Vec<f32>> {
        self.calls.set(self.calls.get() + 1);
        Ok(vec![1.0, 0.0])
    }

    fn model_id(&self) -> &str {
        "counting"
    }
}

fn hit(document_id: &str, text: &str) -> FragmentHit {
    FragmentHit {
        document_id: document_id.to_string(),
        text: text.to_string(),
        score: 0.0,
    }
}

fn hierarchical(query: &str, abstract_limit: usize, document_limit: usize) -> RetrievalStrategy {
    RetrievalStrategy::select(
        "hierarchical-vector",
        vec![
            StageParams::vector(query, Collection::Abstract, SimilarityMetric::InnerProduct, abstract_limit),
            StageParams::vector(query, Collection::Document, SimilarityMetric::InnerProduct, document_limit),
        ],
    )
    .expect("valid hierarchical strategy")
}

fn abc_store() -> ScriptedStore {
    ScriptedStore {
        abstracts: vec![
            hit("A", "abstract-A-text"),
            hit("B", "abstract-B-text"),
            hit("C", "abstract-C-text"),
        ],
        documents: vec![
            hit("D", "body-D-text"),
            hit("B", "body-B-text"),
            hit("A", "body-A-text"),
            hit("C", "body-C-text"),
        ],
        ..ScriptedStore::default()
    }
}

#[test]
fn hierarchical_restricts_document_stage_to_abstract_candidates() {
    let store = abc_store();
    let encoder = CountingEncoder::default();
    let result = Retriever::new(&store, &encoder)
        .execute(&hierarchical("q", 3, 2))
        .expect("ranking");

    assert_eq!(result.references, vec!["A", "B", "C"]);
    assert_eq!(
        result.documents,
        vec![
            "abstract-A-text",
            "abstract-B-text",
            "abstract-C-text",
            "body-B-text",
            "body-A-text",
        ]
    );
    assert_eq!(result.document_ids, vec!["A", "B", "C", "B", "A"]);
    assert_eq!(encoder.calls.get(), 1);

    let calls = store.calls();
    assert_eq!(calls[0], Call::Check);
    assert_eq!(
        calls[2],
        Call::Vector {
            collection: Collection::Document,
            limit: 2,
            restrict_to: Some(vec!["A".to_string(), "B".to_string(), "C".to_string()]),
        }
    );
}

#[test]
fn duplicate_abstract_hits_collapse_in_references() {
    let store = ScriptedStore {
        abstracts: vec![hit("B", "b-1"), hit("A", "a-1"), hit("B", "b-2")],
        documents: vec![hit("A", "body-A")],
        ..ScriptedStore::default()
    };
    let result = Retriever::new(&store, &CountingEncoder::default())
        .execute(&hierarchical("q", 3, 5))
        .expect("ranking");
    assert_eq!(result.references, vec!["B", "A"]);
    assert_eq!(result.document_ids, vec!["B", "A", "B", "A"]);
}

#[test]
fn empty_abstract_stage_fails_closed() {
    let store = ScriptedStore {
        documents: vec![hit("A", "body-A")],
        ..ScriptedStore::default()
    };
    let result = Retriever::new(&store, &CountingEncoder::default())
        .execute(&hierarchical("q", 3, 5))
        .expect("ranking");
    assert!(result.documents.is_empty());
    assert!(result.references.is_empty());
    assert!(store.calls().contains(&Call::Vector {
        collection: Collection::Document,
        limit: 5,
        restrict_to: Some(Vec::new()),
    }));
}

#[test]
fn document_stage_failure_aborts_without_partial_result() {
    let store = ScriptedStore {
        fail_documents: true,
        ..abc_store()
    };
    let err = Retriever::new(&store, &CountingEncoder::default())
        .execute(&hierarchical("q", 3, 2))
        .expect_err("store failure");
    assert!(matches!(err, RetrievalError::Store { .. }));
}

#[test]
fn keyword_strategy_never_encodes() {
    let store = abc_store();
    let encoder = CountingEncoder::default();
    let strategy = RetrievalStrategy::select(
        "single-keyword",
        vec![StageParams::keyword("risk parity", Collection::Document, 2)],
    )
    .expect("valid");
    let result = Retriever::new(&store, &encoder).execute(&strategy).expect("ranking");
    assert_eq!(encoder.calls.get(), 0);
    assert_eq!(result.document_ids, vec!["D", "B"]);
    assert_eq!(result.references, result.document_ids);
    assert_eq!(store.calls()[1], Call::Keyword("risk parity".to_string()));
}

#[test]
fn unknown_strategy_is_rejected_before_any_store_call() {
    let store = abc_store();
    let encoder = CountingEncoder::default();
    let err = StrategyRunner::new(
        "pg_unknown",
        default_bundles(StrategyKind::SingleVector, SimilarityMetric::Cosine, 3, 3),
        &store,
        &encoder,
    )
    .err()
    .expect("unknown strategy");
    assert!(matches!(err, RetrievalError::UnknownStrategy(ref name) if name == "pg_unknown"));
    assert!(store.calls().is_empty());
    assert_eq!(encoder.calls.get(), 0);
}

#[test]
fn runner_evaluates_hierarchical_references() {
    let store = ScriptedStore {
        abstracts: vec![hit("Y", "y"), hit("X", "x"), hit("Z", "z")],
        documents: vec![hit("X", "body-x")],
        ..ScriptedStore::default()
    };
    let encoder = CountingEncoder::default();
    let runner = StrategyRunner::new(
        "pg_semantic_abstract+article",
        default_bundles(StrategyKind::HierarchicalVector, SimilarityMetric::Cosine, 3, 3),
        &store,
        &encoder,
    )
    .expect("runner");

    let records = evaluate(
        &runner,
        &[LabeledPair {
            document_id: "X".to_string(),
            question: "what is x?".to_string(),
        }],
    );
    assert!(records[0].hit_rate);
    assert!((records[0].reciprocal_rank - 0.5).abs() < f64::EPSILON);
    assert_eq!(records[0].retrieved_document_ids, vec!["Y", "X", "Z"]);
}

fn fragment(document_id: &str, text: &str, vector: [f32; 3]) -> Fragment {
    Fragment {
        document_id: document_id.to_string(),
        text: text.to_string(),
        vector: vector.to_vec(),
    }
}

fn corpus() -> (Vec<Fragment>, Vec<Fragment>) {
    (
        vec![
            fragment("momentum", "Momentum in equity returns", [1.0, 0.0, 0.0]),
            fragment("carry", "Currency carry trades", [0.0, 1.0, 0.0]),
            fragment("vol", "Stochastic volatility models", [0.0, 0.0, 1.0]),
        ],
        vec![
            fragment("momentum", "Winners keep winning for twelve months", [0.9, 0.1, 0.0]),
            fragment("carry", "High-yield currencies earn a premium", [0.1, 0.9, 0.0]),
            fragment("vol", "Variance follows a mean-reverting process", [0.0, 0.1, 0.9]),
        ],
    )
}

/// Maps a handful of words onto the corpus axes.
struct AxisEncoder;

impl QueryEncoder for AxisEncoder {
    fn encode(&self, text: &str) -> search_core::Result<Vec<f32>> {
        let text = text.to_lowercase();
        let axis = |word: &str| if text.contains(word) { 1.0 } else { 0.0 };
        let vector = vec![axis("momentum"), axis("carry"), axis("volatility")];
        if vector.iter().all(|v| *v == 0.0) {
            return Err(RetrievalError::EncodingFailure(format!("no axis for `{text}`")));
        }
        Ok(vector)
    }

    fn model_id(&self) -> &str {
        "axis"
    }
}

#[test]
fn in_memory_store_end_to_end_with_parallel_evaluation() {
    let (abstracts, documents) = corpus();
    let store = InMemoryFragmentStore::new(abstracts, documents).expect("store");
    let labels = vec![
        LabeledQuestions {
            document_id: "momentum".to_string(),
            questions: vec!["Does momentum persist?".to_string()],
        },
        LabeledQuestions {
            document_id: "carry".to_string(),
            questions: vec!["Why does carry pay?".to_string(), "What is a haircut?".to_string()],
        },
        LabeledQuestions {
            document_id: "missing".to_string(),
            questions: vec!["Not in the store".to_string()],
        },
    ];
    let pairs = labeled_pairs_in_store(&store, &labels).expect("pairs");
    assert_eq!(pairs.len(), 3);

    let sequential = {
        let runner = StrategyRunner::new(
            "hierarchical-vector",
            default_bundles(StrategyKind::HierarchicalVector, SimilarityMetric::Cosine, 1, 2),
            &store,
            AxisEncoder,
        )
        .expect("runner");
        evaluate(&runner, &pairs)
    };

    let (abstracts, documents) = corpus();
    let parallel = evaluate_parallel(&pairs, || {
        let store = InMemoryFragmentStore::new(abstracts.clone(), documents.clone())
            .map_err(|err| RetrievalError::ConnectionUnavailable(err.to_string()))?;
        StrategyRunner::new(
            "hierarchical-vector",
            default_bundles(StrategyKind::HierarchicalVector, SimilarityMetric::Cosine, 1, 2),
            store,
            AxisEncoder,
        )
    });
    assert_eq!(sequential, parallel);

    let row = summarize(&parallel);
    assert_eq!(row.evaluated, 2);
    assert_eq!(row.failed, 1);
    assert!((row.hit_rate - 1.0).abs() < f64::EPSILON);
    assert!((row.mean_reciprocal_rank - 1.0).abs() < f64::EPSILON);
    assert_eq!(parallel[2].question, "What is a haircut?");
    assert!(parallel[2].error.is_some());
}

#[test]
fn closure_retrievers_plug_into_evaluation() {
    let (abstracts, documents) = corpus();
    let store = InMemoryFragmentStore::new(abstracts, documents).expect("store");
    let retriever = |query: &str| {
        let strategy = RetrievalStrategy::select(
            "single-vector",
            vec![StageParams::vector(query, Collection::Document, SimilarityMetric::L1, 3)],
        )?;
        Retriever::new(&store, &AxisEncoder).execute(&strategy)
    };
    let result = retriever.retrieve("volatility clustering").expect("retrieve");
    assert_eq!(result.document_ids.first().map(String::as_str), Some("vol"));
}

#[test]
fn dead_connection_fails_before_any_encode_or_lookup() {
    let strategies = [
        hierarchical("q", 3, 2),
        RetrievalStrategy::select(
            "single-vector",
            vec![StageParams::vector("q", Collection::Document, SimilarityMetric::Cosine, 2)],
        )
        .expect("valid"),
        RetrievalStrategy::select(
            "single-keyword",
            vec![StageParams::keyword("q", Collection::Document, 2)],
        )
        .expect("valid"),
    ];
    for strategy in &strategies {
        let store = ScriptedStore {
            disconnected: true,
            ..abc_store()
        };
        let encoder = CountingEncoder::default();
        let err = Retriever::new(&store, &encoder)
            .execute(strategy)
            .expect_err("connection is down");
        assert!(matches!(err, RetrievalError::ConnectionUnavailable(_)), "{:?}", strategy.kind());
        assert_eq!(encoder.calls.get(), 0);
        assert_eq!(store.calls(), vec![Call::Check]);
    }
}
