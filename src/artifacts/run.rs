use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ArtifactVersionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Finished,
    Failed,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Success,
    Failure(String),
}

/// Lineage record of one step execution: its config and the artifact
/// versions it consumed and produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub project: String,
    pub job_type: String,
    pub config: serde_json::Value,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    #[serde(default)]
    pub used: Vec<ArtifactVersionId>,
    #[serde(default)]
    pub logged: Vec<ArtifactVersionId>,
}

impl RunRecord {
    pub fn new(project: &str, job_type: &str, config: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            project: project.to_string(),
            job_type: job_type.to_string(),
            config,
            state: RunState::Running,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
            used: Vec::new(),
            logged: Vec::new(),
        }
    }

    pub fn record_used(&mut self, id: ArtifactVersionId) {
        if !self.used.contains(&id) {
            self.used.push(id);
        }
    }

    pub fn record_logged(&mut self, id: ArtifactVersionId) {
        if !self.logged.contains(&id) {
            self.logged.push(id);
        }
    }

    pub fn finish(&mut self, outcome: RunOutcome) {
        self.finished_at = Some(Utc::now());
        match outcome {
            RunOutcome::Success => self.state = RunState::Finished,
            RunOutcome::Failure(message) => {
                self.state = RunState::Failed;
                self.error = Some(message);
            }
        }
    }
}
