use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use testforge::config::Config;
use testforge::llm::client::LlmClient;
use testforge::madl::embedding::HttpEmbedder;
use testforge::madl::engine::ReuseEngine;
use testforge::madl::index::{QdrantIndex, VectorIndex};
use testforge::orchestrator::{Collaborators, Orchestrator};
use testforge::persistence::JsonRecordStore;
use testforge::plan::JsonCatalog;
use testforge::server;

#[derive(Parser)]
#[command(
    name = "testforge",
    version,
    about = "AI-assisted BDD test execution service: generates scripts, runs them \
             with live log streaming, self-heals failures, and learns reusable methods."
)]
struct Cli {
    /// Path to config.toml (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override [server].listen_addr
    #[arg(long)]
    listen: Option<String>,

    /// Override the test-case catalog path
    #[arg(long)]
    catalog: Option<PathBuf>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("testforge: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let cli = Cli::parse();

    let mut cfg = Config::load(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        cfg.server.listen_addr = listen;
    }
    if let Some(catalog) = cli.catalog {
        cfg.storage.catalog_path = Some(catalog);
    }

    let catalog = Arc::new(JsonCatalog::load(&cfg.catalog_path())?);
    let llm = Arc::new(LlmClient::from_config(&cfg.llm)?);
    let embedder = Arc::new(HttpEmbedder::from_config(&cfg.embedding)?);
    let index = Arc::new(QdrantIndex::from_config(&cfg.index)?);

    // Reuse search degrades to empty when the index is down; the service
    // still starts.
    if let Err(e) = index.ensure_collection(cfg.index.vector_size) {
        eprintln!(
            "testforge: similarity index unavailable ({}); reuse search degraded",
            e
        );
    }

    let reuse = Arc::new(ReuseEngine::new(
        embedder,
        index,
        cfg.index.top_k,
        cfg.index.min_score,
    ));
    let records = Arc::new(JsonRecordStore::new(cfg.data_dir()));

    let deps = Arc::new(Collaborators {
        catalog,
        llm,
        reuse,
        records,
    });

    let listen_addr = cfg.server.listen_addr.clone();
    let orchestrator = Arc::new(Orchestrator::new(cfg, deps));

    server::serve(orchestrator, &listen_addr)
}
