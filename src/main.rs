use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use tracing::{error, info, warn};

use basic_cleaning::artifacts::LocalArtifactStore;
use basic_cleaning::config::AppConfig;
use basic_cleaning::{logging, metrics, CleaningStep, Parameters};

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let params = Parameters::parse();

    let config = AppConfig::load().context("loading configuration")?;
    let _log_guard = logging::init_logging(&config.logging).context("initializing logging")?;
    metrics::init_metrics();

    let store = LocalArtifactStore::open(&config.store)
        .with_context(|| format!("opening artifact store at {}", config.store.root.display()))?;
    let run_config = serde_json::to_value(&params).context("recording run config")?;
    let mut session = store.start_run(&config.run.project, &config.run.job_type, run_config)?;
    let run_id = session.record().id;

    let outcome = CleaningStep::new(&mut session, &config.run.output_dir)
        .with_preview_rows(config.run.preview_rows)
        .run(&params);
    let finished = session.finish_with(outcome);
    write_metrics_snapshot(&config);

    match finished {
        Ok((report, run)) => {
            info!(run_id = %run.id, artifact = %report.artifact, "Published cleaned dataset");
            println!("\n📊 Cleaning results:");
            println!("   Rows loaded: {}", report.rows_loaded);
            println!("   After price filter: {}", report.rows_after_price_filter);
            println!("   After bounding box: {}", report.rows_after_geo_filter);
            println!("   last_review values nulled: {}", report.review_dates_nulled);
            println!("   Output file: {}", report.output_path.display());
            println!("   Artifact: {}", report.artifact);
            Ok(())
        }
        Err(e) => {
            error!(run_id = %run_id, kind = e.kind(), "Run failed");
            Err(e.into())
        }
    }
}

fn write_metrics_snapshot(config: &AppConfig) {
    let Some(rendered) = metrics::render() else {
        return;
    };
    let path = config.logging.dir.join("basic_cleaning.prom");
    if let Err(e) = fs::write(&path, rendered) {
        warn!(path = %path.display(), error = %e, "Failed to write metrics snapshot");
    }
}
