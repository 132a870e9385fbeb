//! The cleaning step: fetch, load, filter, normalize, write, publish.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::artifacts::{validate_name, ArtifactService, ArtifactVersionId};
use crate::cleaning;
use crate::constants::{DEFAULT_PREVIEW_ROWS, REQUIRED_COLUMNS};
use crate::dataset::Table;
use crate::error::{CleaningError, Result};
use crate::metrics;
use crate::params::Parameters;

/// Linear progression of a run. There is no branching and no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Fetched,
    Loaded,
    PriceFiltered,
    GeoFiltered,
    DateNormalized,
    Written,
    Published,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Fetched => "fetched",
            Stage::Loaded => "loaded",
            Stage::PriceFiltered => "price_filtered",
            Stage::GeoFiltered => "geo_filtered",
            Stage::DateNormalized => "date_normalized",
            Stage::Written => "written",
            Stage::Published => "published",
            Stage::Done => "done",
        }
    }

    /// The stage a run moves to from here. `Done` is terminal.
    pub fn next(&self) -> Stage {
        match self {
            Stage::Init => Stage::Fetched,
            Stage::Fetched => Stage::Loaded,
            Stage::Loaded => Stage::PriceFiltered,
            Stage::PriceFiltered => Stage::GeoFiltered,
            Stage::GeoFiltered => Stage::DateNormalized,
            Stage::DateNormalized => Stage::Written,
            Stage::Written => Stage::Published,
            Stage::Published | Stage::Done => Stage::Done,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq)]
pub struct CleaningReport {
    pub input_path: PathBuf,
    pub rows_loaded: usize,
    pub rows_after_price_filter: usize,
    pub rows_after_geo_filter: usize,
    pub review_dates_nulled: usize,
    pub output_path: PathBuf,
    pub artifact: ArtifactVersionId,
}

pub struct CleaningStep<'a, S: ArtifactService + ?Sized> {
    service: &'a mut S,
    output_dir: PathBuf,
    preview_rows: usize,
    stage: Stage,
    stage_started: Instant,
}

impl<'a, S: ArtifactService + ?Sized> CleaningStep<'a, S> {
    pub fn new<P: Into<PathBuf>>(service: &'a mut S, output_dir: P) -> Self {
        Self {
            service,
            output_dir: output_dir.into(),
            preview_rows: DEFAULT_PREVIEW_ROWS,
            stage: Stage::Init,
            stage_started: Instant::now(),
        }
    }

    /// Rows printed after load; 0 disables the preview.
    pub fn with_preview_rows(mut self, rows: usize) -> Self {
        self.preview_rows = rows;
        self
    }

    /// Last stage completed.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Stage currently being worked on; after a failure, the one that failed.
    pub fn attempting(&self) -> Stage {
        self.stage.next()
    }

    /// Where the cleaned CSV for `params` is written.
    pub fn output_path(&self, params: &Parameters) -> PathBuf {
        self.output_dir.join(&params.output_artifact_name)
    }

    /// Runs every stage in order. The first failure aborts the run and is
    /// returned unchanged; nothing is published in that case.
    pub fn run(&mut self, params: &Parameters) -> Result<CleaningReport> {
        let result = self.run_stages(params);
        if let Err(e) = &result {
            error!(
                stage = %self.attempting(),
                completed = %self.stage,
                kind = e.kind(),
                error = %e,
                "Cleaning step failed"
            );
        }
        result
    }

    fn run_stages(&mut self, params: &Parameters) -> Result<CleaningReport> {
        validate_name(&params.output_artifact_name)?;
        if !params.has_satisfiable_price_range() {
            warn!(
                min_price = params.min_price,
                max_price = params.max_price,
                "min_price is above max_price, no row can pass the price filter"
            );
        }

        info!(artifact = %params.input_artifact_ref, "Downloading artifact");
        let input_path = self.service.resolve_and_fetch(&params.input_artifact_ref)?;
        info!(path = %input_path.display(), "Downloaded artifact");
        self.advance(Stage::Fetched, None);

        info!("Loading data");
        let mut table = load(&input_path)?;
        if self.preview_rows > 0 {
            println!("{}", table.preview(self.preview_rows));
        }
        let rows_loaded = table.len();
        self.advance(Stage::Loaded, Some(rows_loaded));

        info!(
            min_price = params.min_price,
            max_price = params.max_price,
            "Dropping outliers in the price column"
        );
        cleaning::filter_price_range(&mut table, params.min_price, params.max_price)?;
        let rows_after_price_filter = table.len();
        self.advance(Stage::PriceFiltered, Some(rows_after_price_filter));

        info!("Restricting rows to the longitude/latitude bounding box");
        cleaning::filter_bounding_box(&mut table)?;
        let rows_after_geo_filter = table.len();
        self.advance(Stage::GeoFiltered, Some(rows_after_geo_filter));

        let review_dates_nulled = cleaning::normalize_review_dates(&mut table)?;
        if review_dates_nulled > 0 {
            warn!(count = review_dates_nulled, "Unparsable last_review values set to null");
        }
        metrics::review_dates_nulled(review_dates_nulled);
        self.advance(Stage::DateNormalized, None);

        let output_path = self.output_path(params);
        info!(path = %output_path.display(), "Save the results to CSV");
        table.write_path(&output_path)?;
        self.advance(Stage::Written, Some(table.len()));

        info!(artifact = %params.output_artifact_name, "Log artifact");
        let artifact = self.service.publish(
            &output_path,
            &params.output_artifact_name,
            &params.output_type,
            &params.output_description,
        )?;
        self.advance(Stage::Published, None);

        let report = CleaningReport {
            input_path,
            rows_loaded,
            rows_after_price_filter,
            rows_after_geo_filter,
            review_dates_nulled,
            output_path,
            artifact,
        };
        self.advance(Stage::Done, None);
        info!(
            artifact = %report.artifact,
            rows_in = report.rows_loaded,
            rows_out = report.rows_after_geo_filter,
            "Cleaning step complete"
        );
        Ok(report)
    }

    fn advance(&mut self, next: Stage, rows: Option<usize>) {
        let elapsed = self.stage_started.elapsed();
        metrics::stage_duration(next.as_str(), elapsed);
        if let Some(rows) = rows {
            metrics::rows_after_stage(next.as_str(), rows);
        }
        debug!(from = %self.stage, to = %next, rows = ?rows, elapsed_ms = elapsed.as_millis() as u64, "Stage transition");
        self.stage = next;
        self.stage_started = Instant::now();
    }
}

fn load(path: &Path) -> Result<Table> {
    let table = Table::from_path(path)?;
    table.require_columns(&REQUIRED_COLUMNS).map_err(|e| match e {
        CleaningError::Parse(msg) => CleaningError::Parse(format!("{}: {}", path.display(), msg)),
        other => other,
    })?;
    Ok(table)
}
