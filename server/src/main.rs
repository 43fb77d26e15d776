use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use corpus_core::{CacheBackend, CorpusLoader, PathSource};
use server::{build_app, AppState, Reloader};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
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
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let cache = args
        .backend
        .open(&args.cache_dir)
        .with_context(|| format!("open {} cache in {}", args.backend, args.cache_dir.display()))?;
    let reloader = Reloader {
        loader: CorpusLoader::new(cache),
        corpus_id: args.corpus_id.clone(),
        source: Box::new(PathSource::new(&args.input)),
    };
    let loaded = reloader.loader.load_or_build(&reloader.corpus_id, reloader.source.as_ref())?;
    if let Some(report) = &loaded.report {
        tracing::info!(documents = report.documents, skipped = report.skipped.len(), "corpus built from source");
    }

    let state = AppState::new(loaded.corpus, std::env::var("ADMIN_TOKEN").ok()).with_reloader(reloader);
    let app: Router = build_app(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, corpus_id = %args.corpus_id, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
