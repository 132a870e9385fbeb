//! Inspect and seed the local artifact store used by the cleaning step.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

use basic_cleaning::artifacts::{ArtifactRef, ArtifactService, LocalArtifactStore};
use basic_cleaning::config::AppConfig;
use basic_cleaning::constants::UPLOAD_JOB_TYPE;
use basic_cleaning::logging;

#[derive(Parser)]
#[command(name = "artifact-store")]
#[command(about = "Manage artifacts in the local artifact store")]
#[command(version)]
struct Cli {
    /// Store root (overrides config and ARTIFACT_STORE_ROOT)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log a local file as a new artifact version
    Put {
        file: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long = "type")]
        artifact_type: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List artifacts, or the versions of one artifact
    List { name: Option<String> },
    /// Print the manifest a reference resolves to
    Show { reference: String },
    /// Point a named alias at a version
    Alias { reference: String, alias: String },
    /// Materialize an artifact locally and print its path
    Fetch { reference: String },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load().context("loading configuration")?;
    if let Some(root) = cli.root {
        config.store.root = root;
    }
    let _log_guard = logging::init_logging(&config.logging).context("initializing logging")?;

    let store = LocalArtifactStore::open(&config.store)
        .with_context(|| format!("opening artifact store at {}", config.store.root.display()))?;

    match cli.command {
        Commands::Put {
            file,
            name,
            artifact_type,
            description,
        } => {
            let run_config = json!({
                "file": file.display().to_string(),
                "name": name,
                "type": artifact_type,
                "description": description,
            });
            let mut session = store.start_run(&config.run.project, UPLOAD_JOB_TYPE, run_config)?;
            let published = session.publish(&file, &name, &artifact_type, &description);
            let (id, _run) = session.finish_with(published)?;
            info!(artifact = %id, "Uploaded");
            println!("{}", id);
        }
        Commands::List { name: None } => {
            for name in store.names()? {
                let versions = store.versions(&name)?;
                let latest = versions.last().map(|m| m.version).unwrap_or_default();
                let artifact_type = versions.last().map(|m| m.artifact_type.as_str()).unwrap_or("");
                println!("{}\t{}\tv{}\t({} versions)", name, artifact_type, latest, versions.len());
            }
        }
        Commands::List { name: Some(name) } => {
            let aliases = store.aliases(&name)?;
            for manifest in store.versions(&name)? {
                let tags: Vec<&str> = aliases
                    .iter()
                    .filter(|(_, v)| **v == manifest.version)
                    .map(|(a, _)| a.as_str())
                    .collect();
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    manifest.id(),
                    manifest.digest,
                    manifest.size_bytes,
                    manifest.created_at.to_rfc3339(),
                    tags.join(",")
                );
            }
        }
        Commands::Show { reference } => {
            let manifest = store.resolve(&ArtifactRef::parse(&reference)?)?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }
        Commands::Alias { reference, alias } => {
            let id = store.set_alias(&ArtifactRef::parse(&reference)?, &alias)?;
            println!("{} -> {}", alias, id);
        }
        Commands::Fetch { reference } => {
            let manifest = store.resolve(&ArtifactRef::parse(&reference)?)?;
            let path = store.materialize(&manifest)?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
