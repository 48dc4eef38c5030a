//! Data model (§3): the records every other component reads and writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserIdentifiers {
    pub user_id: String,
    pub emails: HashSet<String>,
    pub phones: HashSet<String>,
    pub aliases: HashSet<String>,
}

impl UserIdentifiers {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            emails: HashSet::new(),
            phones: HashSet::new(),
            aliases: HashSet::new(),
        }
    }

    /// Deduplicated list of every identifier attached to this user, for
    /// `DataLineageSnapshot.identifiers` (§3 invariant: contains `userId`
    /// and every email/phone/alias, no duplicates).
    pub fn all_identifiers(&self) -> Vec<String> {
        let mut all: Vec<String> = std::iter::once(self.user_id.clone())
            .chain(self.emails.iter().cloned())
            .chain(self.phones.iter().cloned())
            .chain(self.aliases.iter().cloned())
            .collect();
        all.sort();
        all.dedup();
        all
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegalProofType {
    SignedRequest,
    LegalForm,
    OtpVerified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalProof {
    #[serde(rename = "type")]
    pub proof_type: LegalProofType,
    pub evidence: String,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Jurisdiction {
    Eu,
    Us,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requester {
    pub user_id: String,
    pub role: String,
    pub organization: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErasureRequest {
    pub request_id: String,
    pub workflow_id: String,
    pub user_identifiers: UserIdentifiers,
    pub legal_proof: LegalProof,
    pub jurisdiction: Jurisdiction,
    pub requested_by: Requester,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    InProgress,
    Completed,
    CompletedWithExceptions,
    Failed,
    AwaitingManualReview,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkflowStatus::InProgress)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    NotStarted,
    InProgress,
    Deleted,
    Failed,
    LegalHold,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepEvidence {
    pub receipt: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub api_response: Option<serde_json::Value>,
    pub error: Option<StepError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepError {
    pub error_type: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub attempt_number: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub status: StepStatus,
    pub attempts: u32,
    pub evidence: StepEvidence,
}

impl WorkflowStep {
    pub fn not_started() -> Self {
        Self {
            status: StepStatus::NotStarted,
            attempts: 0,
            evidence: StepEvidence::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalHold {
    pub system: String,
    pub reason: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub added_at: DateTime<Utc>,
}

impl LegalHold {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expiry) => expiry > now,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataLineageSnapshot {
    pub systems: Vec<String>,
    pub identifiers: Vec<String>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PiiType {
    Email,
    Name,
    Phone,
    Address,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub timestamp: DateTime<Utc>,
    pub message_id: Option<String>,
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiFinding {
    pub match_id: String,
    pub system: String,
    pub location: String,
    pub pii_type: PiiType,
    pub confidence: f64,
    pub snippet: String,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackgroundJobType {
    ObjectStoreScan,
    WarehouseScan,
    BackupCheck,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackgroundJobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundJob {
    pub job_id: String,
    pub workflow_id: String,
    pub job_type: BackgroundJobType,
    pub status: BackgroundJobStatus,
    pub progress: f64,
    pub checkpoints: Vec<String>,
    pub findings: Vec<PiiFinding>,
}

impl BackgroundJob {
    pub fn new(job_id: impl Into<String>, workflow_id: impl Into<String>, job_type: BackgroundJobType) -> Self {
        Self {
            job_id: job_id.into(),
            workflow_id: workflow_id.into(),
            job_type,
            status: BackgroundJobStatus::Pending,
            progress: 0.0,
            checkpoints: Vec::new(),
            findings: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, BackgroundJobStatus::Completed | BackgroundJobStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub workflow_id: String,
    pub user_identifiers: UserIdentifiers,
    pub status: WorkflowStatus,
    pub policy_version: String,
    pub jurisdiction: Jurisdiction,
    pub legal_holds: Vec<LegalHold>,
    pub steps: BTreeMap<String, WorkflowStep>,
    pub background_jobs: BTreeMap<String, BackgroundJob>,
    pub audit_hashes: Vec<crate::crypto::Hash>,
    pub data_lineage_snapshot: Option<DataLineageSnapshot>,
}

impl WorkflowState {
    pub fn new(workflow_id: impl Into<String>, user_identifiers: UserIdentifiers, policy_version: impl Into<String>, jurisdiction: Jurisdiction) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            user_identifiers,
            status: WorkflowStatus::InProgress,
            policy_version: policy_version.into(),
            jurisdiction,
            legal_holds: Vec::new(),
            steps: BTreeMap::new(),
            background_jobs: BTreeMap::new(),
            audit_hashes: vec![crate::crypto::genesis_hash()],
            data_lineage_snapshot: None,
        }
    }

    pub fn step_or_default(&mut self, name: &str) -> &mut WorkflowStep {
        self.steps.entry(name.to_string()).or_insert_with(WorkflowStep::not_started)
    }

    pub fn is_system_under_legal_hold(&self, system: &str, now: DateTime<Utc>) -> bool {
        self.legal_holds.iter().any(|hold| hold.system == system && hold.is_active(now))
    }

    pub fn all_steps_terminal(&self) -> bool {
        self.steps.values().all(|s| {
            matches!(s.status, StepStatus::Deleted | StepStatus::Failed | StepStatus::LegalHold)
        })
    }

    pub fn all_background_jobs_terminal(&self) -> bool {
        self.background_jobs.values().all(BackgroundJob::is_terminal)
    }
}
