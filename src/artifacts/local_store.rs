//! Filesystem-backed artifact store.
//!
//! ```text
//! <root>/objects/sha256/ab/cd/<hex>      blobs
//! <root>/artifacts/<name>/v<N>.json      version manifests
//! <root>/artifacts/<name>/aliases.json   alias -> version
//! <root>/runs/<run_id>.json              run records
//! <download_dir>/<name>-v<N>/<file>      materialized copies
//! ```

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::cas::BlobStore;
use super::run::{RunOutcome, RunRecord};
use super::{
    parse_version_alias, validate_name, ArtifactManifest, ArtifactRef, ArtifactService,
    ArtifactVersionId,
};
use crate::config::StoreConfig;
use crate::constants::LATEST_ALIAS;
use crate::error::{CleaningError, Result};
use crate::metrics;

const ALIASES_FILE: &str = "aliases.json";

pub struct LocalArtifactStore {
    root: PathBuf,
    download_dir: PathBuf,
    blobs: BlobStore,
}

impl LocalArtifactStore {
    pub fn open(config: &StoreConfig) -> Result<Self> {
        Self::open_at(&config.root, config.download_dir())
    }

    pub fn open_at<P: Into<PathBuf>, D: Into<PathBuf>>(root: P, download_dir: D) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("artifacts"))?;
        fs::create_dir_all(root.join("runs"))?;
        let blobs = BlobStore::new(root.join("objects"));
        Ok(Self {
            root,
            download_dir: download_dir.into(),
            blobs,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn artifact_dir(&self, name: &str) -> PathBuf {
        self.root.join("artifacts").join(name)
    }

    fn manifest_path(&self, name: &str, version: u32) -> PathBuf {
        self.artifact_dir(name).join(format!("v{}.json", version))
    }

    fn run_path(&self, id: Uuid) -> PathBuf {
        self.root.join("runs").join(format!("{}.json", id))
    }

    /// Names of every artifact with at least one version, sorted.
    pub fn names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.root.join("artifacts"))? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if !self.version_numbers(&name)?.is_empty() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn version_numbers(&self, name: &str) -> Result<Vec<u32>> {
        let dir = self.artifact_dir(name);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut versions = Vec::new();
        for entry in fs::read_dir(dir)? {
            let file_name = entry?.file_name().to_string_lossy().to_string();
            if let Some(v) = file_name.strip_suffix(".json").and_then(parse_version_alias) {
                versions.push(v);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    fn latest_version(&self, name: &str) -> Result<Option<u32>> {
        Ok(self.version_numbers(name)?.last().copied())
    }

    /// All manifests of an artifact, oldest first.
    pub fn versions(&self, name: &str) -> Result<Vec<ArtifactManifest>> {
        validate_name(name)?;
        self.version_numbers(name)?
            .into_iter()
            .map(|v| self.load_manifest(&ArtifactVersionId::new(name, v)))
            .collect()
    }

    pub fn load_manifest(&self, id: &ArtifactVersionId) -> Result<ArtifactManifest> {
        let path = self.manifest_path(&id.name, id.version);
        if !path.exists() {
            return Err(CleaningError::not_found(id.to_string()));
        }
        read_json(&path)
    }

    pub fn aliases(&self, name: &str) -> Result<BTreeMap<String, u32>> {
        let path = self.artifact_dir(name).join(ALIASES_FILE);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        read_json(&path)
    }

    fn save_aliases(&self, name: &str, aliases: &BTreeMap<String, u32>) -> Result<()> {
        write_json(&self.artifact_dir(name).join(ALIASES_FILE), aliases)
    }

    /// Resolves a reference to the manifest of the version it points at.
    pub fn resolve(&self, reference: &ArtifactRef) -> Result<ArtifactManifest> {
        let version = match reference.version() {
            Some(v) => Some(v),
            None => match self.aliases(&reference.name)?.get(&reference.alias) {
                Some(v) => Some(*v),
                None if reference.alias == LATEST_ALIAS => self.latest_version(&reference.name)?,
                None => None,
            },
        };
        let version = version.ok_or_else(|| CleaningError::not_found(reference.to_string()))?;
        self.load_manifest(&ArtifactVersionId::new(reference.name.clone(), version))
            .map_err(|e| match e {
                CleaningError::ArtifactNotFound { .. } => {
                    CleaningError::not_found(reference.to_string())
                }
                other => other,
            })
    }

    /// Points `alias` at the version `reference` resolves to.
    pub fn set_alias(&self, reference: &ArtifactRef, alias: &str) -> Result<ArtifactVersionId> {
        if alias == LATEST_ALIAS || parse_version_alias(alias).is_some() {
            return Err(CleaningError::InvalidReference {
                reference: alias.to_string(),
                reason: "this alias is managed by the store".to_string(),
            });
        }
        validate_name(alias)?;
        let manifest = self.resolve(reference)?;
        let mut aliases = self.aliases(&manifest.name)?;
        aliases.insert(alias.to_string(), manifest.version);
        self.save_aliases(&manifest.name, &aliases)?;
        info!(artifact = %manifest.id(), alias = %alias, "Alias updated");
        Ok(manifest.id())
    }

    /// Copies a version's blob into the download directory and returns the local path.
    pub fn materialize(&self, manifest: &ArtifactManifest) -> Result<PathBuf> {
        let dest = self
            .download_dir
            .join(format!("{}-v{}", manifest.name, manifest.version))
            .join(&manifest.file_name);
        let bytes = self.blobs.copy_to(&manifest.digest, &dest)?;
        metrics::artifact_fetched(bytes);
        debug!(artifact = %manifest.id(), bytes, path = %dest.display(), "Materialized artifact");
        Ok(dest)
    }

    /// Stores a file as the next version of `name`.
    ///
    /// If any existing version already holds identical bytes that version is
    /// returned, `latest` is pointed at it and the flag is `true`; no new
    /// version is created.
    pub fn publish_file(
        &self,
        local_path: &Path,
        name: &str,
        artifact_type: &str,
        description: &str,
        run: &RunRecord,
    ) -> Result<(ArtifactManifest, bool)> {
        validate_name(name)?;
        let file_name = local_path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .ok_or_else(|| {
                CleaningError::Publish(format!("'{}' is not a file", local_path.display()))
            })?;
        let bytes = fs::read(local_path)?;
        let digest = self.blobs.put(&bytes)?;

        let versions = self.version_numbers(name)?;
        let latest = versions.last().copied();
        for (i, v) in versions.iter().rev().enumerate() {
            let existing = self.load_manifest(&ArtifactVersionId::new(name, *v))?;
            if i == 0 && existing.artifact_type != artifact_type {
                return Err(CleaningError::Publish(format!(
                    "artifact '{}' has type '{}', cannot log it as '{}'",
                    name, existing.artifact_type, artifact_type
                )));
            }
            if existing.digest == digest {
                let mut aliases = self.aliases(name)?;
                if aliases.get(LATEST_ALIAS) != Some(v) {
                    aliases.insert(LATEST_ALIAS.to_string(), *v);
                    self.save_aliases(name, &aliases)?;
                }
                debug!(artifact = %existing.id(), "Content unchanged, reusing version");
                return Ok((existing, true));
            }
        }

        let manifest = ArtifactManifest {
            name: name.to_string(),
            version: latest.map_or(0, |v| v + 1),
            artifact_type: artifact_type.to_string(),
            description: description.to_string(),
            digest,
            file_name,
            size_bytes: bytes.len() as u64,
            created_at: Utc::now(),
            run_id: run.id,
            job_type: run.job_type.clone(),
            inputs: run.used.clone(),
        };
        write_json(&self.manifest_path(name, manifest.version), &manifest)?;

        let mut aliases = self.aliases(name)?;
        aliases.insert(LATEST_ALIAS.to_string(), manifest.version);
        self.save_aliases(name, &aliases)?;

        Ok((manifest, false))
    }

    pub fn save_run(&self, run: &RunRecord) -> Result<()> {
        write_json(&self.run_path(run.id), run)
    }

    pub fn load_run(&self, id: Uuid) -> Result<RunRecord> {
        let path = self.run_path(id);
        if !path.exists() {
            return Err(CleaningError::not_found(format!("run {}", id)));
        }
        read_json(&path)
    }

    /// Opens a run; the record is written immediately in the `running` state.
    pub fn start_run(
        &self,
        project: &str,
        job_type: &str,
        config: serde_json::Value,
    ) -> Result<RunSession<'_>> {
        let record = RunRecord::new(project, job_type, config);
        self.save_run(&record)?;
        info!(run_id = %record.id, job_type = %job_type, "Run started");
        Ok(RunSession {
            store: self,
            record,
        })
    }
}

/// A run against a `LocalArtifactStore`. Every fetch and publish made through
/// the session is added to the run's lineage.
pub struct RunSession<'a> {
    store: &'a LocalArtifactStore,
    record: RunRecord,
}

impl<'a> RunSession<'a> {
    pub fn record(&self) -> &RunRecord {
        &self.record
    }

    pub fn finish(mut self, outcome: RunOutcome) -> Result<RunRecord> {
        self.record.finish(outcome);
        self.store.save_run(&self.record)?;
        info!(run_id = %self.record.id, state = ?self.record.state, "Run finished");
        Ok(self.record)
    }

    /// Closes the run with the outcome of `result`. When the step itself
    /// failed, that error is returned even if saving the run record fails too;
    /// the save error is only logged.
    pub fn finish_with<T>(self, result: Result<T>) -> Result<(T, RunRecord)> {
        match result {
            Ok(value) => {
                let record = self.finish(RunOutcome::Success)?;
                Ok((value, record))
            }
            Err(e) => {
                let run_id = self.record.id;
                if let Err(save_err) = self.finish(RunOutcome::Failure(e.to_string())) {
                    error!(run_id = %run_id, error = %save_err, "Failed to record run failure");
                }
                Err(e)
            }
        }
    }
}

impl ArtifactService for RunSession<'_> {
    fn resolve_and_fetch(&mut self, reference: &str) -> Result<PathBuf> {
        let reference = ArtifactRef::parse(reference)?;
        let manifest = self.store.resolve(&reference)?;
        let path = self.store.materialize(&manifest)?;
        self.record.record_used(manifest.id());
        self.store.save_run(&self.record)?;
        Ok(path)
    }

    fn publish(
        &mut self,
        local_path: &Path,
        name: &str,
        artifact_type: &str,
        description: &str,
    ) -> Result<ArtifactVersionId> {
        let (manifest, deduplicated) = self
            .store
            .publish_file(local_path, name, artifact_type, description, &self.record)
            .map_err(into_publish_error)?;
        self.record.record_logged(manifest.id());
        self.store.save_run(&self.record).map_err(into_publish_error)?;
        metrics::artifact_published(deduplicated);
        info!(artifact = %manifest.id(), deduplicated, "Artifact logged");
        Ok(manifest.id())
    }
}

fn into_publish_error(e: CleaningError) -> CleaningError {
    match e {
        CleaningError::Publish(_) => e,
        other => CleaningError::Publish(other.to_string()),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Writes through a sibling temp file so readers never observe a half-written document.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(parent)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::RunState;
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    fn store() -> (TempDir, LocalArtifactStore) {
        let dir = tempdir().unwrap();
        let store =
            LocalArtifactStore::open_at(dir.path().join("store"), dir.path().join("downloads"))
                .unwrap();
        (dir, store)
    }

    fn write(dir: &TempDir, file: &str, body: &str) -> PathBuf {
        let path = dir.path().join(file);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn publish_then_fetch_latest() {
        let (dir, store) = store();
        let file = write(&dir, "sample.csv", "price\n1\n");
        let mut session = store.start_run("p", "upload", json!({})).unwrap();
        let id = session.publish(&file, "sample.csv", "raw_data", "raw").unwrap();
        assert_eq!(id, ArtifactVersionId::new("sample.csv", 0));

        let path = session.resolve_and_fetch("sample.csv:latest").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "price\n1\n");
        assert!(path.starts_with(dir.path().join("downloads").join("sample.csv-v0")));
    }

    #[test]
    fn new_content_gets_next_version_and_moves_latest() {
        let (dir, store) = store();
        let mut session = store.start_run("p", "upload", json!({})).unwrap();
        let a = write(&dir, "sample.csv", "price\n1\n");
        session.publish(&a, "sample.csv", "raw_data", "").unwrap();
        let b = write(&dir, "sample.csv", "price\n2\n");
        let id = session.publish(&b, "sample.csv", "raw_data", "").unwrap();
        assert_eq!(id.version, 1);

        let latest = store.resolve(&ArtifactRef::parse("sample.csv").unwrap()).unwrap();
        assert_eq!(latest.version, 1);
        let first = store.resolve(&ArtifactRef::parse("sample.csv:v0").unwrap()).unwrap();
        assert_eq!(first.version, 0);
        assert_eq!(store.versions("sample.csv").unwrap().len(), 2);
        assert_eq!(store.names().unwrap(), vec!["sample.csv".to_string()]);
    }

    #[test]
    fn identical_content_reuses_version() {
        let (dir, store) = store();
        let mut session = store.start_run("p", "upload", json!({})).unwrap();
        let file = write(&dir, "sample.csv", "price\n1\n");
        let first = session.publish(&file, "sample.csv", "raw_data", "").unwrap();
        let second = session.publish(&file, "sample.csv", "raw_data", "").unwrap();
        assert_eq!(first, second);
        assert_eq!(store.versions("sample.csv").unwrap().len(), 1);
    }

    #[test]
    fn content_matching_an_older_version_reuses_it() {
        let (dir, store) = store();
        let mut session = store.start_run("p", "upload", json!({})).unwrap();
        let a = write(&dir, "sample.csv", "price\n1\n");
        session.publish(&a, "sample.csv", "raw_data", "").unwrap();
        let b = write(&dir, "sample.csv", "price\n2\n");
        session.publish(&b, "sample.csv", "raw_data", "").unwrap();
        let again = write(&dir, "sample.csv", "price\n1\n");
        let id = session.publish(&again, "sample.csv", "raw_data", "").unwrap();

        assert_eq!(id, ArtifactVersionId::new("sample.csv", 0));
        assert_eq!(store.versions("sample.csv").unwrap().len(), 2);
        let latest = store.resolve(&ArtifactRef::parse("sample.csv:latest").unwrap()).unwrap();
        assert_eq!(latest.version, 0);
    }

    #[test]
    fn type_mismatch_is_a_publish_error() {
        let (dir, store) = store();
        let mut session = store.start_run("p", "upload", json!({})).unwrap();
        let file = write(&dir, "sample.csv", "price\n1\n");
        session.publish(&file, "sample.csv", "raw_data", "").unwrap();
        let other = write(&dir, "sample.csv", "price\n3\n");
        let err = session
            .publish(&other, "sample.csv", "clean_sample", "")
            .unwrap_err();
        assert!(matches!(err, CleaningError::Publish(_)));
    }

    #[test]
    fn missing_file_is_a_publish_error() {
        let (dir, store) = store();
        let mut session = store.start_run("p", "upload", json!({})).unwrap();
        let err = session
            .publish(&dir.path().join("nope.csv"), "nope.csv", "raw_data", "")
            .unwrap_err();
        assert!(matches!(err, CleaningError::Publish(_)));
    }

    #[test]
    fn unknown_reference_is_not_found() {
        let (_dir, store) = store();
        let mut session = store.start_run("p", "j", json!({})).unwrap();
        for reference in ["ghost.csv", "ghost.csv:v3", "ghost.csv:prod"] {
            let err = session.resolve_and_fetch(reference).unwrap_err();
            assert!(
                matches!(err, CleaningError::ArtifactNotFound { .. }),
                "{reference}"
            );
        }
    }

    #[test]
    fn named_alias_resolves() {
        let (dir, store) = store();
        let mut session = store.start_run("p", "upload", json!({})).unwrap();
        let a = write(&dir, "model.csv", "x\n1\n");
        session.publish(&a, "model.csv", "t", "").unwrap();
        let b = write(&dir, "model.csv", "x\n2\n");
        session.publish(&b, "model.csv", "t", "").unwrap();

        let id = store
            .set_alias(&ArtifactRef::parse("model.csv:v0").unwrap(), "prod")
            .unwrap();
        assert_eq!(id.version, 0);
        let resolved = store.resolve(&ArtifactRef::parse("model.csv:prod").unwrap()).unwrap();
        assert_eq!(resolved.version, 0);
        assert!(store
            .set_alias(&ArtifactRef::parse("model.csv").unwrap(), "latest")
            .is_err());
    }

    #[test]
    fn lineage_is_recorded_on_manifest_and_run() {
        let (dir, store) = store();
        let raw = write(&dir, "sample.csv", "price\n1\n");
        let mut upload = store.start_run("p", "upload", json!({})).unwrap();
        upload.publish(&raw, "sample.csv", "raw_data", "").unwrap();
        upload.finish(RunOutcome::Success).unwrap();

        let mut session = store
            .start_run("p", "basic_cleaning", json!({"min_price": 10.0}))
            .unwrap();
        session.resolve_and_fetch("sample.csv:latest").unwrap();
        let clean = write(&dir, "clean.csv", "price\n1\n");
        let id = session.publish(&clean, "clean.csv", "clean_sample", "").unwrap();
        let run = session.finish(RunOutcome::Success).unwrap();

        let manifest = store.load_manifest(&id).unwrap();
        assert_eq!(manifest.inputs, vec![ArtifactVersionId::new("sample.csv", 0)]);
        assert_eq!(manifest.run_id, run.id);
        assert_eq!(manifest.job_type, "basic_cleaning");

        let stored = store.load_run(run.id).unwrap();
        assert_eq!(stored.state, RunState::Finished);
        assert_eq!(stored.logged, vec![id]);
        assert_eq!(stored.config["min_price"], 10.0);
    }

    #[test]
    fn step_error_survives_a_failed_run_save() {
        let (_dir, store) = store();
        let session = store.start_run("p", "basic_cleaning", json!({})).unwrap();
        let runs = store.root().join("runs");
        fs::remove_dir_all(&runs).unwrap();
        fs::write(&runs, "not a directory").unwrap();

        let err = session
            .finish_with::<()>(Err(CleaningError::not_found("sample.csv:latest")))
            .unwrap_err();
        assert!(matches!(err, CleaningError::ArtifactNotFound { .. }));
    }

    #[test]
    fn finish_with_success_returns_value_and_finished_record() {
        let (_dir, store) = store();
        let session = store.start_run("p", "basic_cleaning", json!({})).unwrap();
        let (value, run) = session.finish_with(Ok(7)).unwrap();
        assert_eq!(value, 7);
        assert_eq!(run.state, RunState::Finished);
        assert_eq!(store.load_run(run.id).unwrap().state, RunState::Finished);
    }
}
