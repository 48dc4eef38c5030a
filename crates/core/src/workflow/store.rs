//! Workflow state store (§4.F).
//!
//! Backed by the [`KvStore`](crate::persistence::KvStore) port; every method
//! reads the current state and audit trail, applies one change, and writes
//! both back. Callers are responsible for the single-writer-per-workflow
//! guarantee (§5) -- this store does not itself serialize concurrent callers.

use crate::audit::{AuditLog, EventType};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::persistence::{KvStore, TypedKvStore};
use crate::workflow::model::{
    BackgroundJob, ErasureRequest, LegalHold, Requester, StepEvidence, StepStatus, UserIdentifiers, WorkflowState,
};
use std::sync::Arc;

const NS_WORKFLOWS: &str = "workflows";
const NS_REQUESTS: &str = "requests";
const NS_AUDIT_TRAILS: &str = "audit_trails";

pub struct CreateWorkflowOptions {
    pub workflow_id: String,
    pub request_id: String,
    pub user_identifiers: UserIdentifiers,
    pub legal_proof: crate::workflow::model::LegalProof,
    pub jurisdiction: crate::workflow::model::Jurisdiction,
    pub requested_by: Requester,
    pub policy_version: String,
    pub data_lineage_snapshot: Option<crate::workflow::model::DataLineageSnapshot>,
}

pub struct CreateWorkflowResult {
    pub workflow_id: String,
    pub request_id: String,
    pub state: WorkflowState,
    pub request: ErasureRequest,
    pub is_existing: bool,
}

pub struct WorkflowStore {
    kv: Arc<dyn KvStore>,
}

impl WorkflowStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    async fn load_state(&self, workflow_id: &str) -> Result<WorkflowState> {
        self.kv
            .get_json(NS_WORKFLOWS, workflow_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("no workflow state for '{workflow_id}'")))
    }

    async fn save_state(&self, state: &WorkflowState) -> Result<()> {
        self.kv.set_json(NS_WORKFLOWS, &state.workflow_id, state).await
    }

    async fn load_audit_log(&self, workflow_id: &str) -> Result<AuditLog> {
        self.kv
            .get_json(NS_AUDIT_TRAILS, workflow_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("no audit trail for '{workflow_id}'")))
    }

    async fn save_audit_log(&self, log: &AuditLog) -> Result<()> {
        self.kv.set_json(NS_AUDIT_TRAILS, &log.workflow_id, log).await
    }

    pub async fn get_state(&self, workflow_id: &str) -> Result<WorkflowState> {
        self.load_state(workflow_id).await
    }

    pub async fn list_workflow_ids(&self) -> Result<Vec<String>> {
        self.kv.list_by_namespace(NS_WORKFLOWS).await
    }

    pub async fn get_request(&self, request_id: &str) -> Result<ErasureRequest> {
        self.kv
            .get_json(NS_REQUESTS, request_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("no request for '{request_id}'")))
    }

    /// Creates a fresh workflow seeded with a Genesis-only audit log and
    /// `WorkflowCreated` event, or returns the already-persisted state if a
    /// workflow with this id exists (idempotent re-admission after a crash).
    pub async fn create_workflow(&self, options: CreateWorkflowOptions, clock: &dyn Clock) -> Result<CreateWorkflowResult> {
        if let Ok(existing_state) = self.load_state(&options.workflow_id).await {
            let existing_request = self.get_request(&options.request_id).await?;
            return Ok(CreateWorkflowResult {
                workflow_id: options.workflow_id,
                request_id: options.request_id,
                state: existing_state,
                request: existing_request,
                is_existing: true,
            });
        }

        let request = ErasureRequest {
            request_id: options.request_id.clone(),
            workflow_id: options.workflow_id.clone(),
            user_identifiers: options.user_identifiers.clone(),
            legal_proof: options.legal_proof,
            jurisdiction: options.jurisdiction,
            requested_by: options.requested_by,
            created_at: clock.now(),
        };

        let mut state = WorkflowState::new(&options.workflow_id, options.user_identifiers, options.policy_version, options.jurisdiction);
        state.data_lineage_snapshot = options.data_lineage_snapshot;

        let mut log = AuditLog::new(&options.workflow_id, clock);
        log.append(
            EventType::WorkflowCreated,
            serde_json::json!({ "requestId": options.request_id, "jurisdiction": options.jurisdiction }),
            None,
            clock,
        );
        state.audit_hashes = log.hash_chain();

        self.kv.set_json(NS_REQUESTS, &request.request_id, &request).await?;
        self.save_state(&state).await?;
        self.save_audit_log(&log).await?;

        Ok(CreateWorkflowResult {
            workflow_id: options.workflow_id,
            request_id: options.request_id,
            state,
            request,
            is_existing: false,
        })
    }

    /// Applies `mutation` to the current state and, unless `audit_event` is
    /// `None` (skip-chain updates), appends the given event to the audit log.
    pub async fn update<F>(
        &self,
        workflow_id: &str,
        mutation: F,
        audit_event: Option<(EventType, serde_json::Value, Option<serde_json::Value>)>,
        clock: &dyn Clock,
    ) -> Result<WorkflowState>
    where
        F: FnOnce(&mut WorkflowState),
    {
        let mut state = self.load_state(workflow_id).await?;
        mutation(&mut state);

        if let Some((event_type, data, metadata)) = audit_event {
            let mut log = self.load_audit_log(workflow_id).await?;
            log.append(event_type, data, metadata, clock);
            state.audit_hashes = log.hash_chain();
            self.save_audit_log(&log).await?;
        }

        self.save_state(&state).await?;
        Ok(state)
    }

    pub async fn update_step_status(
        &self,
        workflow_id: &str,
        step_name: &str,
        status: StepStatus,
        evidence: Option<StepEvidence>,
        increment_attempts: bool,
        clock: &dyn Clock,
    ) -> Result<WorkflowState> {
        let step_name_owned = step_name.to_string();
        let event_type = match status {
            StepStatus::InProgress => EventType::StepStarted,
            StepStatus::Deleted => EventType::StepCompleted,
            StepStatus::Failed => EventType::StepFailed,
            StepStatus::NotStarted | StepStatus::LegalHold => EventType::StateUpdated,
        };

        self.update(
            workflow_id,
            move |state| {
                let step = state.step_or_default(&step_name_owned);
                step.status = status;
                if increment_attempts {
                    step.attempts += 1;
                }
                if let Some(evidence) = evidence {
                    step.evidence = evidence;
                }
            },
            Some((
                event_type,
                serde_json::json!({ "stepName": step_name, "status": status }),
                None,
            )),
            clock,
        )
        .await
    }

    pub async fn update_background_job(&self, workflow_id: &str, job: BackgroundJob, clock: &dyn Clock) -> Result<WorkflowState> {
        let job_id = job.job_id.clone();
        self.update(
            workflow_id,
            move |state| {
                state.background_jobs.insert(job_id, job);
            },
            Some((
                EventType::BackgroundJobUpdated,
                serde_json::json!({ "jobId": "updated" }),
                None,
            )),
            clock,
        )
        .await
    }

    pub async fn add_legal_hold(&self, workflow_id: &str, hold: LegalHold, clock: &dyn Clock) -> Result<WorkflowState> {
        let system = hold.system.clone();
        let reason = hold.reason.clone();
        let closure_system = system.clone();
        self.update(
            workflow_id,
            move |state| {
                let step = state.step_or_default(&closure_system);
                step.status = StepStatus::LegalHold;
                state.legal_holds.push(hold);
            },
            Some((
                EventType::LegalHoldAdded,
                serde_json::json!({ "system": system, "reason": reason }),
                None,
            )),
            clock,
        )
        .await
    }

    pub async fn verify_audit_trail(&self, workflow_id: &str) -> Result<bool> {
        let log = self.load_audit_log(workflow_id).await?;
        Ok(log.verify_integrity())
    }

    pub async fn audit_log(&self, workflow_id: &str) -> Result<AuditLog> {
        self.load_audit_log(workflow_id).await
    }
}
