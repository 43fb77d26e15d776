use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use corpus_core::{BuildReport, CacheBackend, Corpus, CorpusLoader, Loaded, PathSource, DEFAULT_TOP_N};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build, cache and query a TF-IDF vacancy corpus", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Source {
    /// Input path (JSON/JSONL/txt file or directory)
    #[arg(long)]
    input: PathBuf,
    /// Cache directory
    #[arg(long, default_value = "./cache")]
    cache_dir: PathBuf,
    /// Name of the cached corpus
    #[arg(long, default_value = "default")]
    corpus_id: String,
    /// Cache backend: fs or sled
    #[arg(long, default_value_t = CacheBackend::Fs)]
    backend: CacheBackend,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the corpus and store it in the cache
    Build {
        #[command(flatten)]
        source: Source,
        /// Rebuild even if a cached copy exists
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Corpus-wide counts
    Stats {
        #[command(flatten)]
        source: Source,
    },
    /// Tokens most associated with a keyword
    Similar {
        #[command(flatten)]
        source: Source,
        #[arg(long)]
        keyword: String,
        #[arg(long, default_value_t = DEFAULT_TOP_N)]
        top_n: usize,
    },
    /// Documents ranked by Jaccard similarity to one document
    Jaccard {
        #[command(flatten)]
        source: Source,
        #[arg(long)]
        doc: String,
        /// Print at most this many rows
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = false)]
        exclude_self: bool,
    },
    /// 2-D coordinates of every document
    Project {
        #[command(flatten)]
        source: Source,
    },
    /// Summary of one document
    Doc {
        #[command(flatten)]
        source: Source,
        #[arg(long)]
        doc: String,
    },
}

#[derive(Serialize)]
struct BuildOutput<'a> {
    corpus_id: &'a str,
    from_cache: bool,
    documents: usize,
    tokens: usize,
    report: Option<BuildReport>,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { source, force } => {
            let loaded = load(&source, force)?;
            print_json(&BuildOutput {
                corpus_id: &source.corpus_id,
                from_cache: loaded.report.is_none(),
                documents: loaded.corpus.documents().len(),
                tokens: loaded.corpus.lexicon().token_count(),
                report: loaded.report,
            })
        }
        Commands::Stats { source } => print_json(&corpus(&source)?.corpus_stats()),
        Commands::Similar { source, keyword, top_n } => print_json(&corpus(&source)?.query().similar_words(&keyword, top_n)?),
        Commands::Jaccard { source, doc, limit, exclude_self } => {
            let corpus = corpus(&source)?;
            let query = corpus.query();
            let mut rows = if exclude_self { query.jaccard_similarity_to_others(&doc)? } else { query.jaccard_similarity(&doc)? };
            if let Some(limit) = limit {
                rows.truncate(limit);
            }
            print_json(&rows)
        }
        Commands::Project { source } => print_json(&corpus(&source)?.query().project_2d()?),
        Commands::Doc { source, doc } => print_json(&corpus(&source)?.document_summary(&doc)?),
    }
}

fn load(source: &Source, force: bool) -> Result<Loaded> {
    let cache = source
        .backend
        .open(&source.cache_dir)
        .with_context(|| format!("open {} cache in {}", source.backend, source.cache_dir.display()))?;
    let loader = CorpusLoader::new(cache);
    let input = PathSource::new(&source.input);
    let loaded = if force {
        loader.rebuild(&source.corpus_id, &input)?
    } else {
        loader.load_or_build(&source.corpus_id, &input)?
    };
    if let Some(report) = &loaded.report {
        for skipped in &report.skipped {
            tracing::warn!(document_id = %skipped.document_id, reason = %skipped.reason, "skipped document");
        }
    }
    Ok(loaded)
}

fn corpus(source: &Source) -> Result<Corpus> {
    Ok(load(source, false)?.corpus)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
