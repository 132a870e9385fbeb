//! Artifact service boundary and the types shared by its implementations.

pub mod cas;
pub mod local_store;
pub mod run;

pub use local_store::{LocalArtifactStore, RunSession};
pub use run::{RunOutcome, RunRecord, RunState};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::constants::LATEST_ALIAS;
use crate::error::{CleaningError, Result};

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").expect("valid name regex"));
static VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^v(\d+)$").expect("valid version regex"));

/// The two operations the cleaning step needs from an artifact tracker.
pub trait ArtifactService {
    /// Resolves `reference` (`name[:alias]`) and materializes the artifact's file locally.
    fn resolve_and_fetch(&mut self, reference: &str) -> Result<PathBuf>;

    /// Registers `local_path` as a new version of artifact `name`.
    fn publish(
        &mut self,
        local_path: &Path,
        name: &str,
        artifact_type: &str,
        description: &str,
    ) -> Result<ArtifactVersionId>;
}

/// One concrete version of a named artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactVersionId {
    pub name: String,
    pub version: u32,
}

impl ArtifactVersionId {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for ArtifactVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:v{}", self.name, self.version)
    }
}

/// A parsed `name[:alias]` reference. The alias is either `vN` or a named alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub name: String,
    pub alias: String,
}

impl ArtifactRef {
    pub fn parse(reference: &str) -> Result<Self> {
        let trimmed = reference.trim();
        let (name, alias) = match trimmed.rsplit_once(':') {
            Some((name, alias)) => (name, alias),
            None => (trimmed, LATEST_ALIAS),
        };
        let invalid = |reason: &str| CleaningError::InvalidReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };
        if !is_valid_name(name) {
            return Err(invalid("artifact names use letters, digits, '_', '-' and '.'"));
        }
        if !is_valid_name(alias) {
            return Err(invalid("aliases use letters, digits, '_', '-' and '.'"));
        }
        Ok(Self {
            name: name.to_string(),
            alias: alias.to_string(),
        })
    }

    /// The explicit version number when the alias has the `vN` form.
    pub fn version(&self) -> Option<u32> {
        parse_version_alias(&self.alias)
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.alias)
    }
}

pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.is_match(name)
}

pub fn validate_name(name: &str) -> Result<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(CleaningError::InvalidReference {
            reference: name.to_string(),
            reason: "artifact names use letters, digits, '_', '-' and '.'".to_string(),
        })
    }
}

pub fn parse_version_alias(alias: &str) -> Option<u32> {
    VERSION_RE
        .captures(alias)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Metadata recorded for every artifact version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub name: String,
    pub version: u32,
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub description: String,
    /// `sha256:<hex>` of the file contents
    pub digest: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    /// Run that logged this version
    pub run_id: Uuid,
    pub job_type: String,
    /// Versions the producing run had consumed before logging this one
    #[serde(default)]
    pub inputs: Vec<ArtifactVersionId>,
}

impl ArtifactManifest {
    pub fn id(&self) -> ArtifactVersionId {
        ArtifactVersionId::new(self.name.clone(), self.version)
    }
}
