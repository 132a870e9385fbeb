pub mod artifacts;
pub mod cleaning;
pub mod config;
pub mod constants;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod params;
pub mod step;

pub use artifacts::{ArtifactService, ArtifactVersionId, LocalArtifactStore};
pub use error::{CleaningError, Result};
pub use params::Parameters;
pub use step::{CleaningReport, CleaningStep, Stage};
