use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use specdex::spec::{SpecDocument, SpecFormat};
use specdex::{
    IngestOutcome, IngestService, RetrievalService, Settings, embedding, logging, store,
};

#[derive(Parser)]
#[command(name = "specdex")]
#[command(about = "Semantic search over API specification documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration file
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Ingest a specification file into the vector store
    Ingest {
        /// Path to the specification file
        file: PathBuf,

        /// Treat the file as a tabular export (inferred from .csv otherwise)
        #[arg(long)]
        tabular: bool,
    },

    /// Search the ingested specifications
    Search {
        /// Natural-language query
        query: String,

        /// Number of results (overrides config)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show ingestion status and embedded files
    Status,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load().unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        eprintln!("Using default configuration.");
        Settings::default()
    });
    logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Init { force } => {
            let path = Settings::init_config_file(force)
                .map_err(|e| anyhow::anyhow!("{e}"))
                .context("failed to initialize configuration")?;
            println!("Created configuration file at: {}", path.display());
            println!("Edit this file to customize your settings.");
            Ok(())
        }

        Commands::Config => {
            let toml_str =
                toml::to_string_pretty(&settings).context("failed to render configuration")?;
            println!("{toml_str}");
            Ok(())
        }

        Commands::Ingest { file, tabular } => ingest(&settings, &file, tabular).await,

        Commands::Search { query, limit } => search(&settings, &query, limit).await,

        Commands::Status => status(&settings).await,
    }
}

fn build_pipeline(
    settings: &Settings,
) -> Result<(Arc<dyn specdex::VectorStore>, Arc<dyn specdex::Embedder>)> {
    let embedder = embedding::from_config(&settings.embedding)
        .context("failed to construct embedding provider")?;
    let store = store::open_store(&settings.store, embedder.dimension())
        .context("failed to open vector store")?;
    Ok((store, embedder))
}

async fn ingest(settings: &Settings, file: &Path, tabular: bool) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let format = if tabular || file.extension().is_some_and(|ext| ext == "csv") {
        SpecFormat::Tabular
    } else {
        SpecFormat::Structured
    };

    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    let (store, embedder) = build_pipeline(settings)?;
    let service = IngestService::new(store, embedder)
        .with_batch_size(settings.embedding.batch_size);
    service.heal_history().await?;

    let document = SpecDocument::new(content, format);
    match service.ingest(&document, &file_name).await? {
        IngestOutcome::Completed {
            chunk_count,
            row_errors,
        } => {
            println!(
                "Embedded {chunk_count} chunks from {file_name} (spec {})",
                document.spec_id
            );
            if !row_errors.is_empty() {
                println!("Skipped {} invalid rows:", row_errors.len());
                for row_error in &row_errors {
                    println!("  line {}: {}", row_error.line_number, row_error.error);
                }
            }
            Ok(())
        }
        IngestOutcome::AlreadyProcessing => {
            bail!("another ingestion is already in progress")
        }
    }
}

async fn search(settings: &Settings, query: &str, limit: Option<usize>) -> Result<()> {
    let mut retrieval = settings.retrieval.clone();
    if let Some(limit) = limit {
        retrieval.top_k = limit;
    }

    let (store, embedder) = build_pipeline(settings)?;
    let service = RetrievalService::new(store, embedder, &retrieval);

    let results = service.retrieve(query, None).await?;
    if results.is_empty() {
        println!("No matches.");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        let endpoint = result
            .metadata
            .get("endpoint")
            .and_then(serde_json::Value::as_str);
        let method = result
            .metadata
            .get("method")
            .and_then(serde_json::Value::as_str);

        print!("{:2}. [{:.3}]", rank + 1, result.score);
        match (method, endpoint) {
            (Some(method), Some(endpoint)) => println!(" {method} {endpoint}"),
            _ => println!(),
        }

        for line in result.text.lines() {
            println!("    {line}");
        }
        println!();
    }
    Ok(())
}

async fn status(settings: &Settings) -> Result<()> {
    let (store, embedder) = build_pipeline(settings)?;
    let record_count = store.count().await?;

    let service = IngestService::new(store, embedder);
    service.heal_history().await?;
    let snapshot = service.status().snapshot();

    println!("State: {:?}", snapshot.state);
    println!("Records in store: {record_count}");

    if snapshot.embedded_files.is_empty() {
        println!("No files embedded yet.");
    } else {
        println!("Embedded files:");
        for file in &snapshot.embedded_files {
            println!(
                "  {} (spec {}, {} chunks, {})",
                file.file_name,
                file.spec_id,
                file.total_chunks,
                file.embedded_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
    }
    Ok(())
}
