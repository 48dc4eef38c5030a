//! Concurrency guard (§4.G, §5): the three admission gates every intake
//! request passes through before a workflow is created.
//!
//! Gate 1 is a per-user lock; a dangling lock (its workflow already reached a
//! terminal state) is garbage-collected and the request proceeds, a live one
//! is rejected. Gate 2 is a request-hash map that survives lock release, so
//! a byte-identical request submitted after completion is still recognized
//! as a duplicate. Gate 3 is that both checks run under one per-user mutual
//! exclusion section, so two concurrent admissions for the same user can
//! never both pass gate 1.

use crate::clock::Clock;
use crate::crypto;
use crate::error::{Error, ErrorCode, Result};
use crate::workflow::model::{Jurisdiction, LegalProof, UserIdentifiers};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionConflictReason {
    ConcurrentWorkflow,
    DuplicateRequest,
}

#[derive(Debug, Clone)]
pub struct AdmissionConflict {
    pub existing_workflow_id: String,
    pub reason: AdmissionConflictReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserLock {
    workflow_id: String,
    request_id: String,
    locked_at: chrono::DateTime<chrono::Utc>,
    locked_by: String,
}

/// Returns whether the lock's workflow is still in flight. Supplied by the
/// caller (the orchestrator owns workflow-status lookups); keeps this module
/// free of a dependency on the workflow store.
pub type WorkflowLiveCheck<'a> = dyn Fn(&str) -> bool + Send + Sync + 'a;

#[derive(Default)]
struct GuardState {
    /// userId -> active lock.
    user_locks: HashMap<String, UserLock>,
    /// hash(canonical({userIdentifiers, legalProof, jurisdiction})) -> workflowId.
    /// Survives lock release (§4.G gate 2).
    request_hashes: HashMap<String, String>,
}

pub struct ConcurrencyGuard {
    state: Mutex<GuardState>,
}

impl Default for ConcurrencyGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ConcurrencyGuard {
    pub fn new() -> Self {
        Self { state: Mutex::new(GuardState::default()) }
    }

    pub fn request_hash(user_identifiers: &UserIdentifiers, legal_proof: &LegalProof, jurisdiction: Jurisdiction) -> Result<String> {
        #[derive(Serialize)]
        struct Key<'a> {
            user_identifiers: &'a UserIdentifiers,
            legal_proof: &'a LegalProof,
            jurisdiction: Jurisdiction,
        }
        let bytes = crypto::canonical(&Key { user_identifiers, legal_proof, jurisdiction })
            .map_err(|e| Error::internal(format!("failed to canonicalize admission key: {e}")))?;
        Ok(crypto::to_hex(&crypto::hash(&bytes)))
    }

    /// Runs the three gates and, on success, reserves the user lock and
    /// request-hash entry for `workflow_id`. `is_workflow_live` lets a
    /// dangling lock (workflow already terminal) be garbage-collected instead
    /// of blocking the new request.
    pub async fn admit(
        &self,
        user_identifiers: &UserIdentifiers,
        legal_proof: &LegalProof,
        jurisdiction: Jurisdiction,
        workflow_id: &str,
        request_id: &str,
        locked_by: &str,
        clock: &dyn Clock,
        is_workflow_live: &WorkflowLiveCheck<'_>,
    ) -> Result<std::result::Result<(), AdmissionConflict>> {
        let request_hash = Self::request_hash(user_identifiers, legal_proof, jurisdiction)?;
        let mut state = self.state.lock().await;

        if let Some(existing) = state.user_locks.get(&user_identifiers.user_id).cloned() {
            if is_workflow_live(&existing.workflow_id) {
                return Ok(Err(AdmissionConflict {
                    existing_workflow_id: existing.workflow_id,
                    reason: AdmissionConflictReason::ConcurrentWorkflow,
                }));
            }
            state.user_locks.remove(&user_identifiers.user_id);
        }

        if let Some(existing_workflow_id) = state.request_hashes.get(&request_hash).cloned() {
            return Ok(Err(AdmissionConflict {
                existing_workflow_id,
                reason: AdmissionConflictReason::DuplicateRequest,
            }));
        }

        state.user_locks.insert(
            user_identifiers.user_id.clone(),
            UserLock {
                workflow_id: workflow_id.to_string(),
                request_id: request_id.to_string(),
                locked_at: clock.now(),
                locked_by: locked_by.to_string(),
            },
        );
        state.request_hashes.insert(request_hash, workflow_id.to_string());

        Ok(Ok(()))
    }

    /// Releases the user lock once the workflow reaches a terminal state.
    /// The request-hash entry is never released (duplicate detection must
    /// outlive the lock).
    pub async fn release_user_lock(&self, user_id: &str) {
        self.state.lock().await.user_locks.remove(user_id);
    }

    pub async fn is_user_locked(&self, user_id: &str) -> bool {
        self.state.lock().await.user_locks.contains_key(user_id)
    }
}

pub fn admission_conflict_error(conflict: &AdmissionConflict) -> Error {
    let reason = match conflict.reason {
        AdmissionConflictReason::ConcurrentWorkflow => "ConcurrentWorkflow",
        AdmissionConflictReason::DuplicateRequest => "DuplicateRequest",
    };
    Error::new(ErrorCode::AdmissionConflict, format!("admission rejected: {reason}"))
        .add_metadata("existingWorkflowId", serde_json::Value::String(conflict.existing_workflow_id.clone()))
        .add_metadata("reason", serde_json::Value::String(reason.to_string()))
}
