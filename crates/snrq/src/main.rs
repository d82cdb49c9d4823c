//! SnrScope query shell - filter and search SNR measurements from stdin

mod handler;
mod loader;

use anyhow::{Context, Result};
use clap::Parser;
use snrfilter::{EngineConfig, SharedDataset, SnrEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use crate::handler::{CommandHandler, Reply};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Measurement CSV (columns pre,main,post,snr)
    #[arg(short, long)]
    data: PathBuf,

    /// Engine configuration JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cache capacity (number of result sets)
    #[arg(long)]
    cache_capacity: Option<usize>,

    /// Concurrent scan workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Search history length
    #[arg(long)]
    history_limit: Option<usize>,
}

impl Args {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(capacity) = self.cache_capacity {
            config.cache.capacity = capacity;
        }
        if let Some(workers) = self.workers {
            config.dispatch.workers = workers;
        }
        if let Some(limit) = self.history_limit {
            config.search.history_limit = limit;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Stdout carries replies; logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    info!("Starting snrq v{}", env!("CARGO_PKG_VERSION"));
    info!("Data file: {}", args.data.display());

    let config = args.engine_config()?;
    let records = loader::load_csv(&args.data)?;
    info!("Loaded {} records", records.len());

    let data = Arc::new(SharedDataset::new(records));
    let engine = SnrEngine::new(data, config)?;
    let mut handler = CommandHandler::new(engine);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let reply = handler.handle(&line).await;
        if reply == Reply::Quit {
            break;
        }
        let text = reply.to_string();
        if !text.is_empty() {
            stdout.write_all(text.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    handler.engine().shutdown();
    info!("Bye");
    Ok(())
}
