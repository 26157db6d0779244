use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use common::{AppConfig, EvaluationRecord, Fragment, LabeledQuestions};
use embeddings::{EmbeddingConfig, EmbeddingEngine};
use search_core::{
    CachedEncoder, Collection, EvaluationReport, FragmentStore, InMemoryFragmentStore,
    QdrantFragmentStore, RetrievalError, RetrievalStrategy, Retriever, SimilarityMetric,
    StrategyKind, StrategyRunner, default_bundles, evaluate, evaluate_parallel,
    labeled_pairs_in_store, summarize,
};
use serde::Deserialize;

#[derive(Debug, Parser)]
#[command(name = "ragxiv")]
#[command(about = "Hierarchical retrieval and ranking evaluation over paper collections")]
struct Cli {
    #[arg(long, global = true, default_value = "ragxiv.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Rank fragments for one question and print the result as JSON.
    Retrieve {
        #[arg(long, default_value = "hierarchical-vector")]
        strategy: String,
        #[arg(long)]
        corpus: Option<PathBuf>,
        #[arg(long)]
        abstract_limit: Option<usize>,
        #[arg(long)]
        document_limit: Option<usize>,
        #[arg(long)]
        metric: Option<String>,
        question: String,
    },
    /// Replay a labeled question set against one or more strategies.
    Evaluate {
        #[arg(long)]
        labels: PathBuf,
        #[arg(long = "strategy")]
        strategies: Vec<String>,
        #[arg(long)]
        corpus: Option<PathBuf>,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        #[arg(long, default_value_t = 1)]
        workers: usize,
        #[arg(long)]
        force: bool,
    },
    ListDocuments {
        #[arg(long, default_value = "abstract")]
        collection: String,
        #[arg(long)]
        corpus: Option<PathBuf>,
    },
    Config,
    /// Print JSON schemas of the result and record types.
    Schema,
}

type Encoder = CachedEncoder<EmbeddingEngine>;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .json()
        .init();
    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Retrieve {
            strategy,
            corpus,
            abstract_limit,
            document_limit,
            metric,
            question,
        } => {
            let mut cfg = cfg;
            if let Some(limit) = abstract_limit {
                cfg.abstract_limit = limit;
            }
            if let Some(limit) = document_limit {
                cfg.document_limit = limit;
            }
            if let Some(metric) = metric {
                cfg.similarity_metric = metric;
            }
            retrieve(&cfg, &strategy, corpus.as_deref(), &question)
        }
        Commands::Evaluate {
            labels,
            strategies,
            corpus,
            out_dir,
            workers,
            force,
        } => run_evaluation(
            &cfg,
            &EvaluationArgs {
                labels,
                strategies,
                corpus,
                out_dir,
                workers,
                force,
            },
        ),
        Commands::ListDocuments { collection, corpus } => {
            list_documents(&cfg, &collection, corpus.as_deref())
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&cfg)?);
            Ok(())
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&common::schema_bundle())?);
            Ok(())
        }
    }
}

fn build_encoder(cfg: &AppConfig) -> Encoder {
    let engine = EmbeddingEngine::new(EmbeddingConfig::from_app_config(cfg));
    tracing::info!(
        model = engine.model_id(),
        device = engine.device_mode(),
        available = engine.is_available(),
        "embedding engine ready"
    );
    CachedEncoder::new(engine, cfg.encoder_cache_size)
}

fn retrieve(
    cfg: &AppConfig,
    strategy: &str,
    corpus: Option<&Path>,
    question: &str,
) -> anyhow::Result<()> {
    let kind = strategy.parse::<StrategyKind>()?;
    let metric = cfg.similarity_metric.parse::<SimilarityMetric>()?;
    let encoder = build_encoder(cfg);
    let store = open_store(cfg, corpus, encoder.inner())?;

    let bundles = default_bundles(kind, metric, cfg.abstract_limit, cfg.document_limit)
        .iter()
        .map(|b| b.with_query(question))
        .collect();
    let plan = RetrievalStrategy::from_kind(kind, bundles)?;
    let result = Retriever::new(&store, &encoder)
        .execute(&plan)
        .with_context(|| format!("{kind} retrieval failed"))?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn list_documents(cfg: &AppConfig, collection: &str, corpus: Option<&Path>) -> anyhow::Result<()> {
    let collection = collection.parse::<Collection>()?;
    let encoder = build_encoder(cfg);
    let store = open_store(cfg, corpus, encoder.inner())?;
    store.check_connection()?;
    for id in store.list_document_ids(collection)? {
        println!("{id}");
    }
    Ok(())
}

struct EvaluationArgs {
    labels: PathBuf,
    strategies: Vec<String>,
    corpus: Option<PathBuf>,
    out_dir: PathBuf,
    workers: usize,
    force: bool,
}

fn run_evaluation(cfg: &AppConfig, args: &EvaluationArgs) -> anyhow::Result<()> {
    let kinds = if args.strategies.is_empty() {
        StrategyKind::ALL.to_vec()
    } else {
        args.strategies
            .iter()
            .map(|name| name.parse::<StrategyKind>())
            .collect::<Result<Vec<_>, _>>()?
    };
    let metric = cfg.similarity_metric.parse::<SimilarityMetric>()?;
    let labels = LabeledQuestions::load_all(&args.labels)?;
    let encoder = build_encoder(cfg);
    let store = open_store(cfg, args.corpus.as_deref(), encoder.inner())?;
    store.check_connection()?;
    let pairs = labeled_pairs_in_store(&store, &labels)?;
    let n = pairs.len();
    tracing::info!(pairs = n, strategies = kinds.len(), "starting evaluation");

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed creating {}", args.out_dir.display()))?;

    let mut report = EvaluationReport::default();
    for kind in kinds {
        let templates = default_bundles(kind, metric, cfg.abstract_limit, cfg.document_limit);
        let records_path = args
            .out_dir
            .join(format!("retrieval_evaluation_{n}_{kind}.json"));

        let records = if records_path.exists() && !args.force {
            tracing::info!(strategy = %kind, path = %records_path.display(), "reusing saved records");
            read_records(&records_path)?
        } else {
            let records = if args.workers > 1 {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(args.workers)
                    .build()
                    .context("failed building evaluation worker pool")?;
                let corpus = args.corpus.as_deref();
                let encoder = &encoder;
                pool.install(|| {
                    evaluate_parallel(&pairs, || {
                        let store = open_store(cfg, corpus, encoder.inner())
                            .map_err(|err| RetrievalError::ConnectionUnavailable(format!("{err:#}")))?;
                        StrategyRunner::new(kind.as_str(), templates.clone(), store, encoder)
                    })
                })
            } else {
                let runner = StrategyRunner::new(kind.as_str(), templates, &store, &encoder)?;
                evaluate(&runner, &pairs)
            };
            write_records(&records_path, &records)?;
            records
        };

        let row = summarize(&records);
        tracing::info!(
            strategy = %kind,
            hit_rate = row.hit_rate,
            mrr = row.mean_reciprocal_rank,
            failed = row.failed,
            "strategy evaluated"
        );
        report.insert(kind.as_str(), row);
    }

    let comparison_path = args
        .out_dir
        .join(format!("comparison_retrieval_methods_{n}.json"));
    fs::write(&comparison_path, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("failed writing {}", comparison_path.display()))?;
    println!("{}", render_table(&report));
    Ok(())
}

fn read_records(path: &Path) -> anyhow::Result<Vec<EvaluationRecord>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading evaluation records: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing evaluation records: {}", path.display()))
}

fn write_records(path: &Path, records: &[EvaluationRecord]) -> anyhow::Result<()> {
    fs::write(path, serde_json::to_string_pretty(records)?)
        .with_context(|| format!("failed writing evaluation records: {}", path.display()))
}

fn render_table(report: &EvaluationReport) -> String {
    let mut lines = vec![format!(
        "{:<20} {:>8} {:>8} {:>9} {:>6}",
        "strategy", "hit_rate", "mrr", "evaluated", "failed"
    )];
    for (name, row) in report.rows() {
        lines.push(format!(
            "{:<20} {:>8.4} {:>8.4} {:>9} {:>6}",
            name, row.hit_rate, row.mean_reciprocal_rank, row.evaluated, row.failed
        ));
    }
    lines.join("\n")
}

/// On-disk corpus used in place of a Qdrant deployment. Fragments without a
/// vector are embedded with the configured model when loaded.
#[derive(Debug, Deserialize)]
struct CorpusFile {
    #[serde(default)]
    abstracts: Vec<CorpusFragment>,
    #[serde(default)]
    documents: Vec<CorpusFragment>,
}

#[derive(Debug, Deserialize)]
struct CorpusFragment {
    document_id: String,
    text: String,
    #[serde(default)]
    vector: Option<Vec<f32>>,
}

fn open_store(
    cfg: &AppConfig,
    corpus: Option<&Path>,
    engine: &EmbeddingEngine,
) -> anyhow::Result<Box<dyn FragmentStore>> {
    match corpus {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed reading corpus: {}", path.display()))?;
            let corpus: CorpusFile = serde_json::from_str(&raw)
                .with_context(|| format!("failed parsing corpus: {}", path.display()))?;
            let abstracts = embed_missing(engine, corpus.abstracts)?;
            let documents = embed_missing(engine, corpus.documents)?;
            Ok(Box::new(InMemoryFragmentStore::new(abstracts, documents)?))
        }
        None => Ok(Box::new(QdrantFragmentStore::connect(cfg.store_config())?)),
    }
}

fn embed_missing(engine: &EmbeddingEngine, fragments: Vec<CorpusFragment>) -> anyhow::Result<Vec<Fragment>> {
    let missing = fragments
        .iter()
        .filter(|f| f.vector.is_none())
        .map(|f| f.text.clone())
        .collect::<Vec<_>>();
    let mut embedded = engine.embed_batch(&missing)?.into_iter();

    fragments
        .into_iter()
        .map(|f| {
            let vector = match f.vector {
                Some(v) => v,
                None => embedded
                    .next()
                    .with_context(|| format!("no embedding produced for `{}`", f.document_id))?,
            };
            Ok(Fragment {
                document_id: f.document_id,
                text: f.text,
                vector,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use common::MetricRow;
    use search_core::EvaluationReport;

    use super::render_table;

    #[test]
    fn comparison_table_lists_strategies_in_name_order() {
        let mut report = EvaluationReport::default();
        report.insert(
            "single-vector",
            MetricRow {
                hit_rate: 0.5,
                mean_reciprocal_rank: 0.375,
                evaluated: 4,
                failed: 0,
            },
        );
        report.insert(
            "hierarchical-vector",
            MetricRow {
                hit_rate: 0.75,
                mean_reciprocal_rank: 0.625,
                evaluated: 4,
                failed: 1,
            },
        );
        insta::assert_snapshot!(render_table(&report), @r"
        strategy             hit_rate      mrr evaluated failed
        hierarchical-vector    0.7500   0.6250         4      1
        single-vector          0.5000   0.3750         4      0
        ");
    }
}
