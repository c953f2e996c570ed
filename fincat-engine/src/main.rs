//! fincat - transaction categorization CLI
//!
//! Runs the categorization engine against JSON files of canonical
//! records and a taxonomy, without a backing database: prior-category
//! prefill is disabled (NullStore) and results go to stdout as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use fincat_engine::models::{CanonicalRecord, TaxonomyEntry};
use fincat_engine::services::classifier_client::ClassifierClient;
use fincat_engine::services::page_cache::PageCache;
use fincat_engine::services::{dataset_identity, group_indexer};
use fincat_engine::types::NullStore;
use fincat_engine::{Engine, EngineConfig, Scope};

#[derive(Parser)]
#[command(name = "fincat", version, about = "Categorize financial transactions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Categorize records and print the run report as JSON
    Run {
        /// JSON file: array of canonical records
        #[arg(long)]
        input: PathBuf,
        /// JSON file: array of taxonomy entries
        #[arg(long)]
        taxonomy: PathBuf,
        #[arg(long)]
        provider: String,
        #[arg(long, default_value = "default")]
        account: String,
        /// Abort the whole run on the first page failure
        #[arg(long)]
        stop_on_error: bool,
        /// Exemplars per model request
        #[arg(long)]
        page_size: Option<usize>,
        /// Concurrent in-flight page requests
        #[arg(long)]
        concurrency: Option<usize>,
        /// Page cache root directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Write a starter config file at the default location
    InitConfig,
    /// Print the page cache directory a run would use, without running
    CachePath {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        taxonomy: PathBuf,
        #[arg(long)]
        provider: String,
    },
}

fn load_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    fincat_common::logging::init_tracing("info");
    let cli = Cli::parse();

    let toml = fincat_common::config::read_toml_config(
        &fincat_common::config::default_config_path()?,
    )?;
    let mut config = EngineConfig::resolve(&toml)?;

    match cli.command {
        Command::Run {
            input,
            taxonomy,
            provider,
            account,
            stop_on_error,
            page_size,
            concurrency,
            cache_dir,
        } => {
            config.stop_on_error = stop_on_error;
            if let Some(n) = page_size {
                anyhow::ensure!(n > 0, "--page-size must be at least 1");
                config.page_size = n;
            }
            if let Some(n) = concurrency {
                anyhow::ensure!(n > 0, "--concurrency must be at least 1");
                config.concurrency = n;
            }
            if let Some(dir) = cache_dir {
                config.cache_dir = dir;
            }
            let records: Vec<CanonicalRecord> = load_json(&input)?;
            let entries: Vec<TaxonomyEntry> = load_json(&taxonomy)?;
            info!(
                records = records.len(),
                taxonomy = entries.len(),
                model = %config.model.model,
                "starting run"
            );

            let transport = Arc::new(ClassifierClient::new(&config.model)?);
            let engine = Engine::new(config, transport, Arc::new(NullStore));
            let scope = Scope::new(provider, account);
            let report = engine.run(&scope, &records, &entries).await?;

            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::InitConfig => {
            let path = fincat_common::config::default_config_path()?;
            anyhow::ensure!(
                !path.exists(),
                "config file already exists at {}",
                path.display()
            );
            let starter = fincat_common::config::TomlConfig {
                model: Some(config.model.model.clone()),
                endpoint: Some(config.model.endpoint.clone()),
                ..Default::default()
            };
            fincat_common::config::write_toml_config(&starter, &path)?;
            println!("{}", path.display());
        }
        Command::CachePath {
            input,
            taxonomy,
            provider,
        } => {
            let records: Vec<CanonicalRecord> = load_json(&input)?;
            let entries: Vec<TaxonomyEntry> = load_json(&taxonomy)?;

            // with no store every group is unresolved, so the dataset
            // covers all exemplars
            let fingerprints: Vec<String> = records
                .iter()
                .map(|r| dataset_identity::record_fingerprint(&provider, r))
                .collect();
            let exemplar_fps: Vec<String> = group_indexer::index_groups(&records)
                .iter()
                .map(|g| fingerprints[g.exemplar].clone())
                .collect();
            let settings = dataset_identity::settings_hash(
                &config.model.model,
                &config.model.system_instructions,
                &entries,
            );
            let dataset_id = dataset_identity::dataset_id(&exemplar_fps, &settings);

            let cache = PageCache::new(config.cache_dir.clone());
            println!("{}", cache.pages_dir(&dataset_id, config.page_size).display());
        }
    }
    Ok(())
}
