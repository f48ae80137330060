use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use docqa_rag::{QueryRequest, RagService};
use docqa_server::{AppState, ServerConfig, init_tracing, load_documents, run_server};
use tracing::{info, warn};

/// docqa - answer questions from your own documents
#[derive(Parser, Debug)]
#[command(name = "docqa")]
#[command(version)]
#[command(about = "Retrieval-augmented question answering over local documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Index these files or directories before accepting requests
        #[arg(long, value_name = "PATH")]
        ingest: Vec<PathBuf>,
    },

    /// Index .txt and .md files (directories are walked recursively)
    Ingest {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        /// Drop and recreate the collection first
        #[arg(long)]
        recreate: bool,
    },

    /// Ask one question and print the answer with its sources
    Ask {
        #[arg(value_name = "QUESTION")]
        question: String,

        /// Number of passages to retrieve
        #[arg(long)]
        top_k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = ServerConfig::from_env().context("invalid configuration")?;
    info!(
        collection = %config.collection,
        embedding = ?config.embedding,
        generation = ?config.generation,
        vector_store = ?config.vector_store,
        "configuration loaded"
    );

    let service = Arc::new(config.build_service().context("failed to build pipeline")?);
    service.ensure_collection().await.context("failed to prepare collection")?;

    match cli.command {
        Commands::Serve { ingest } => {
            if !ingest.is_empty() {
                ingest_paths(&service, &ingest, false).await?;
            }
            let addr: SocketAddr = format!("{}:{}", config.host, config.port)
                .parse()
                .with_context(|| "invalid host/port for docqa")?;
            let state = AppState::new(service).with_answer_format(config.answer_format);
            run_server(addr, state).await
        }
        Commands::Ingest { paths, recreate } => {
            if config.vector_store == docqa_server::config::StoreBackend::Memory {
                warn!("the in-memory store does not outlive this process; use `serve --ingest` or Qdrant");
            }
            ingest_paths(&service, &paths, recreate).await
        }
        Commands::Ask { question, top_k } => {
            let request = QueryRequest { question, top_k };
            let response = service.query(request).await?;
            println!("{}", response.answer);
            if !response.context_found {
                println!("\n(no relevant context was found)");
            }
            for source in &response.sources {
                println!("  - {} [{}] score {:.3}", source.document_id, source.chunk_id, source.score);
            }
            Ok(())
        }
    }
}

async fn ingest_paths(service: &RagService, paths: &[PathBuf], recreate: bool) -> anyhow::Result<()> {
    let documents = load_documents(paths)?;
    info!(documents = documents.len(), recreate, "ingesting documents");

    let report = if recreate {
        service.rebuild(&documents).await?
    } else {
        service.index(&documents).await
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_complete() {
        warn!(failures = report.failures.len(), "some documents were not indexed");
    }
    Ok(())
}
