//! tessera-ingest: ingest one batch of extracted entities into the graph.
//!
//! The batch is either a JSON file in the `IngestionBatch` format or a text
//! file sent through the extraction service first.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tessera_db::{create_pool_with_config, MemoryGraphStore, PgGraphStore, PoolConfig};
use tessera_inference::{ExtractionClient, ExtractionConfig, LlmRelationshipInferrer, OllamaBackend};
use tessera_ingest::{
    GraphStore, IngestConfig, IngestionBatch, IngestionPipeline, IngestionUnit,
    OntologyDefinition, OntologySnapshot,
};

#[derive(Parser)]
#[command(name = "tessera-ingest")]
#[command(author, version, about = "Ingest extracted entities into a knowledge graph")]
struct Cli {
    /// Batch file (JSON) with entities and relationships
    #[arg(short, long, conflicts_with = "text", required_unless_present = "text")]
    batch: Option<PathBuf>,

    /// Text file to run through the extraction service
    #[arg(short, long)]
    text: Option<PathBuf>,

    /// Ontology definition (YAML or JSON)
    #[arg(short, long)]
    ontology: PathBuf,

    /// PostgreSQL URL; an in-memory graph is used when omitted
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Ask the generation model for additional relationships
    #[arg(long)]
    model_inference: bool,

    /// Embed entities without an embedding through the extraction service
    #[arg(long)]
    embed: bool,

    /// Container id for the ingested unit
    #[arg(long)]
    unit_id: Option<String>,
}

fn init_tracing() {
    // RUST_LOG filters, LOG_FORMAT=json switches to JSON lines.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(env_filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f == "json") {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let definition = OntologyDefinition::from_file(&cli.ontology)
        .with_context(|| format!("loading ontology {}", cli.ontology.display()))?;
    let snapshot = OntologySnapshot::from(&definition);

    let store: Arc<dyn GraphStore> = match &cli.database_url {
        Some(url) => {
            let pool = create_pool_with_config(url, PoolConfig::from_env()).await?;
            let store = PgGraphStore::new(pool);
            store.ensure_schema().await?;
            Arc::new(store)
        }
        None => {
            info!("No DATABASE_URL, using an in-memory graph");
            Arc::new(MemoryGraphStore::new())
        }
    };

    let config = IngestConfig::from_env();
    let mut pipeline = IngestionPipeline::new(snapshot.clone(), store, config)?;

    let extraction = if cli.text.is_some() || cli.embed {
        Some(Arc::new(ExtractionClient::new(ExtractionConfig::from_env())?))
    } else {
        None
    };
    if let (true, Some(client)) = (cli.embed, &extraction) {
        pipeline = pipeline.with_embedder(client.clone());
    }
    if cli.model_inference {
        let rule_names = snapshot.rules().iter().map(|r| r.name.clone()).collect();
        let inferrer =
            LlmRelationshipInferrer::new(OllamaBackend::from_env()).with_known_types(rule_names);
        pipeline = pipeline.with_inferrer(Arc::new(inferrer));
    }

    let batch = match (&cli.batch, &cli.text) {
        (Some(path), _) => load_batch(path, cli.unit_id.as_deref())?,
        (None, Some(path)) => {
            let Some(client) = &extraction else {
                bail!("extraction client not configured");
            };
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let unit = IngestionUnit::new(
                cli.unit_id
                    .clone()
                    .unwrap_or_else(|| tessera_ingest::new_v7().to_string()),
            )
            .with_name(path.display().to_string());
            let ontology_name = Some(definition.name.as_str()).filter(|n| !n.is_empty());
            client
                .extract_graph(&text, ontology_name)
                .await?
                .into_batch(Some(unit))
        }
        (None, None) => bail!("either --batch or --text is required"),
    };

    let report = pipeline.ingest(batch).await?;
    println!("{}", serde_json::to_string_pretty(&report.stats)?);
    Ok(())
}

fn load_batch(path: &Path, unit_id: Option<&str>) -> anyhow::Result<IngestionBatch> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut batch: IngestionBatch =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    if let Some(id) = unit_id {
        let unit = batch.unit.take().unwrap_or_else(|| IngestionUnit::new(id));
        batch.unit = Some(IngestionUnit {
            id: id.to_string(),
            ..unit
        });
    }
    Ok(batch)
}
