//! Orchestrator (§4.I): the phased state machine driving a workflow from
//! intake through completion --
//! `Intake -> IdentityCritical -> Checkpoint -> ParallelFanout -> BackgroundScans -> Completion`
//! -- plus the continuous `LegalHoldSweeper` state that runs alongside it.

use crate::audit::EventType;
use crate::certificate::{CertificateGenerator, CertificateOfDestruction};
use crate::clock::Clock;
use crate::contracts::DeletionAdapter;
use crate::crypto::SigningService;
use crate::error::{Error, ErrorCode, ErrorMetrics, Result};
use crate::executor::{StepExecutor, StepOutcome};
use crate::guard::{admission_conflict_error, AdmissionConflict, ConcurrencyGuard};
use crate::legal_hold::LegalHoldManager;
use crate::metrics::ErasureMetrics;
use crate::monitoring::{
    CertificateSummary, CompletionEvent, CompletionSummary, ComplianceSummary, ErrorDetail, ErrorEvent, ErrorEventContext, ErrorSeverity, Impact,
    MonitoringPublisher, NextAction, Remediation, Resolution, ResolutionStatus, StatusEvent, StatusEventType,
};
use crate::policy::{ConfidenceThresholds, PolicyConfig};
use crate::scanner::{self, BackgroundScanner, FindingCategory};
use crate::contracts::{PiiClassifier, ScanAdapter};
use crate::workflow::model::{
    BackgroundJobType, DataLineageSnapshot, Jurisdiction, LegalProof, Requester, StepStatus, UserIdentifiers, WorkflowState, WorkflowStatus,
};
use crate::workflow::store::{CreateWorkflowOptions, WorkflowStore};
use crate::zombie::ZombieScheduler;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

pub struct IntakeRequest {
    pub user_identifiers: UserIdentifiers,
    pub legal_proof: LegalProof,
    pub jurisdiction: Jurisdiction,
    pub requested_by: Requester,
}

pub enum IntakeOutcome {
    Admitted(WorkflowState),
    Conflict(AdmissionConflict),
}

/// One non-critical or critical step paired with the adapter that executes
/// it. `critical` steps run strictly in sequence during `IdentityCritical`;
/// everything else runs concurrently during `ParallelFanout`.
pub struct StepSpec {
    pub system: String,
    pub adapter: Arc<dyn DeletionAdapter>,
    pub critical: bool,
}

/// One background scan to run during `BackgroundScans` (§4.I step 5).
pub struct BackgroundScanSpec {
    pub job_id: String,
    pub job_type: BackgroundJobType,
    pub adapter: Arc<dyn ScanAdapter>,
    pub classifier: Option<Arc<dyn PiiClassifier>>,
}

pub struct Orchestrator {
    pub store: Arc<WorkflowStore>,
    pub guard: Arc<ConcurrencyGuard>,
    pub executor: Arc<StepExecutor>,
    pub legal_holds: Arc<LegalHoldManager>,
    pub scanner: Arc<BackgroundScanner>,
    pub zombie_scheduler: Arc<ZombieScheduler>,
    pub signing_service: Arc<SigningService>,
    pub metrics: Arc<ErasureMetrics>,
    pub error_metrics: Arc<ErrorMetrics>,
    pub monitoring: Arc<MonitoringPublisher>,
    /// Workflow ids admitted but not yet completed, consulted synchronously
    /// by the admission gate's dangling-lock check. Kept here rather than in
    /// `ConcurrencyGuard` so that module stays free of any store dependency;
    /// this set is the in-process source of truth for liveness, since a
    /// crash loses the guard's in-memory locks along with it anyway.
    live_workflows: Mutex<HashSet<String>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<WorkflowStore>,
        guard: Arc<ConcurrencyGuard>,
        executor: Arc<StepExecutor>,
        legal_holds: Arc<LegalHoldManager>,
        scanner: Arc<BackgroundScanner>,
        zombie_scheduler: Arc<ZombieScheduler>,
        signing_service: Arc<SigningService>,
        metrics: Arc<ErasureMetrics>,
        error_metrics: Arc<ErrorMetrics>,
        monitoring: Arc<MonitoringPublisher>,
    ) -> Self {
        Self {
            store,
            guard,
            executor,
            legal_holds,
            scanner,
            zombie_scheduler,
            signing_service,
            metrics,
            error_metrics,
            monitoring,
            live_workflows: Mutex::new(HashSet::new()),
        }
    }

    /// §4.I step 1 (Intake): runs the three-gate admission check, and on
    /// success creates a fresh `WorkflowState` with a Genesis-seeded audit
    /// log and emits `WorkflowCreated`.
    pub async fn intake(&self, request: IntakeRequest, policy: &PolicyConfig, clock: &dyn Clock) -> Result<IntakeOutcome> {
        let workflow_id = clock.new_id().to_string();
        let request_id = clock.new_id().to_string();

        let is_live = |candidate_workflow_id: &str| self.live_workflows.lock().unwrap().contains(candidate_workflow_id);

        let admission = self
            .guard
            .admit(
                &request.user_identifiers,
                &request.legal_proof,
                request.jurisdiction,
                &workflow_id,
                &request_id,
                "intake",
                clock,
                &is_live,
            )
            .await?;

        let conflict = match admission {
            Ok(()) => None,
            Err(conflict) => Some(conflict),
        };
        if let Some(conflict) = conflict {
            return Ok(IntakeOutcome::Conflict(conflict));
        }

        self.live_workflows.lock().unwrap().insert(workflow_id.clone());

        let mut systems: Vec<String> = policy.retention_rules.iter().map(|r| r.system.clone()).collect();
        systems.sort();
        systems.dedup();

        let lineage = DataLineageSnapshot {
            systems,
            identifiers: request.user_identifiers.all_identifiers(),
            captured_at: clock.now(),
        };

        let result = self
            .store
            .create_workflow(
                CreateWorkflowOptions {
                    workflow_id: workflow_id.clone(),
                    request_id,
                    user_identifiers: request.user_identifiers,
                    legal_proof: request.legal_proof,
                    jurisdiction: request.jurisdiction,
                    requested_by: request.requested_by,
                    policy_version: policy.version.clone(),
                    data_lineage_snapshot: Some(lineage),
                },
                clock,
            )
            .await?;

        info!(workflow_id = %workflow_id, "workflow admitted");
        self.metrics.workflows_created.inc();

        let status_event = StatusEvent {
            id: clock.new_id().to_string(),
            workflow_id: workflow_id.clone(),
            timestamp: clock.now(),
            event_type: StatusEventType::StatusChange,
            status: format!("{:?}", result.state.status),
            step_name: None,
            step_status: None,
            progress: None,
            metadata: None,
        };
        if let Err(e) = self.monitoring.publish_status(&status_event, clock).await {
            warn!(workflow_id = %workflow_id, error = %e, "failed to publish intake status event");
        }

        Ok(IntakeOutcome::Admitted(result.state))
    }

    /// §4.I step 2 (IdentityCritical): runs critical steps strictly in
    /// order. A critical step exhausting its attempts halts the workflow
    /// (`AwaitingManualReview`) unless `policy` authorizes forced completion
    /// -- this orchestration never does, by design (§9: no silent
    /// downgrading of a compliance failure).
    pub async fn run_identity_critical(&self, workflow_id: &str, critical_steps: &[StepSpec], clock: &dyn Clock) -> Result<bool> {
        for step in critical_steps {
            let outcome = self.executor.execute_step(workflow_id, &step.system, step.adapter.as_ref(), true, clock).await?;
            if let StepOutcome::Failed { critical: true } = outcome {
                self.halt_for_manual_review(workflow_id, &step.system, clock).await?;
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn halt_for_manual_review(&self, workflow_id: &str, step_name: &str, clock: &dyn Clock) -> Result<()> {
        let step_name = step_name.to_string();
        self.store
            .update(
                workflow_id,
                move |state| {
                    state.status = WorkflowStatus::AwaitingManualReview;
                },
                Some((
                    EventType::StateUpdated,
                    serde_json::json!({ "status": "AwaitingManualReview", "haltedOnStep": step_name }),
                    None,
                )),
                clock,
            )
            .await?;

        self.metrics.workflows_awaiting_manual_review.inc();

        let err = Error::new(ErrorCode::WorkflowStateError, format!("workflow halted for manual review on step '{step_name}'"))
            .add_metadata("workflow_id", serde_json::json!(workflow_id))
            .add_metadata("step_name", serde_json::json!(step_name));
        self.error_metrics.record_error(&err).await;

        let error_event = ErrorEvent {
            id: clock.new_id().to_string(),
            workflow_id: workflow_id.to_string(),
            timestamp: clock.now(),
            severity: ErrorSeverity::High,
            category: err.code.category().to_string(),
            error: ErrorDetail {
                code: format!("{:?}", err.code),
                message: err.message.clone(),
                details: None,
            },
            context: ErrorEventContext { step_name: Some(step_name.clone()), attempt_number: None },
            remediation: Remediation {
                description: "a critical step exhausted its retry attempts and requires operator intervention".to_string(),
                actions: vec!["review the step's failure evidence".to_string(), "resolve or override manually".to_string()],
                retryable: false,
                escalation_required: true,
            },
            impact: Impact {
                affected_systems: vec![step_name.clone()],
                data_at_risk: true,
                compliance_impact: true,
            },
            resolution: Resolution { status: ResolutionStatus::Open },
        };
        if let Err(e) = self.monitoring.publish_error(&error_event).await {
            warn!(workflow_id = %workflow_id, error = %e, "failed to publish manual-review error event");
        }

        Ok(())
    }

    /// §4.I step 3 (Checkpoint): the prerequisite for any parallel or
    /// background work -- every critical step must have reached `Deleted`.
    pub async fn checkpoint(&self, workflow_id: &str, critical_steps: &[StepSpec], clock: &dyn Clock) -> Result<bool> {
        let state = self.store.get_state(workflow_id).await?;
        let all_deleted = critical_steps
            .iter()
            .all(|step| state.steps.get(&step.system).map(|s| s.status == StepStatus::Deleted).unwrap_or(false));

        if all_deleted {
            self.store
                .update(
                    workflow_id,
                    |_state| {},
                    Some((EventType::StateUpdated, serde_json::json!({ "checkpoint": "identity-gone" }), None)),
                    clock,
                )
                .await?;
            Ok(true)
        } else {
            self.halt_for_manual_review(workflow_id, "checkpoint", clock).await?;
            Ok(false)
        }
    }

    /// §4.I step 4 (ParallelFanout): refuses to run unless the checkpoint
    /// was reached, and dispatches every non-critical step concurrently.
    /// Individual failures never halt the workflow.
    pub async fn run_parallel_fanout(&self, workflow_id: &str, non_critical_steps: &[StepSpec], checkpoint_passed: bool, clock: &dyn Clock) -> Result<()> {
        if !checkpoint_passed {
            return Err(Error::new(
                ErrorCode::WorkflowStateError,
                "ParallelFanout refused: checkpoint was not reached",
            ));
        }

        let futures = non_critical_steps
            .iter()
            .map(|step| self.executor.execute_step(workflow_id, &step.system, step.adapter.as_ref(), false, clock));

        for outcome in join_all(futures).await {
            outcome?;
        }
        Ok(())
    }

    /// §4.I step 5 (BackgroundScans): drives every configured scan to
    /// completion, concurrently, and categorizes the findings it surfaces
    /// against the workflow's frozen policy snapshot rather than whatever
    /// policy happens to be current when the scan finishes.
    pub async fn run_background_scans(
        &self,
        workflow_id: &str,
        jobs: &[BackgroundScanSpec],
        thresholds: &ConfidenceThresholds,
        clock: &dyn Clock,
    ) -> Result<Vec<(FindingCategory, u32)>> {
        let scans = jobs.iter().map(|job| {
            self.scanner
                .run_scan(workflow_id, &job.job_id, job.job_type, job.adapter.as_ref(), job.classifier.as_deref(), clock)
        });

        let mut tally: std::collections::HashMap<FindingCategory, u32> = std::collections::HashMap::new();
        for outcome in join_all(scans).await {
            let job = outcome?;
            for finding in &job.findings {
                let category = scanner::categorize_finding(finding.confidence, thresholds);
                *tally.entry(category).or_insert(0) += 1;
            }
        }

        let mut summary: Vec<(FindingCategory, u32)> = tally.into_iter().collect();
        summary.sort_by_key(|(category, _)| format!("{category:?}"));
        Ok(summary)
    }

    /// §4.I step 6 (Completion): derives the terminal status from every
    /// step/job's final state, generates the certificate, schedules the
    /// zombie check, and releases the per-user lock.
    pub async fn complete(
        &self,
        workflow_id: &str,
        certificate_id: String,
        zombie_interval_days: u32,
        clock: &dyn Clock,
    ) -> Result<(WorkflowState, Option<CertificateOfDestruction>)> {
        let state = self.store.get_state(workflow_id).await?;

        if state.status == WorkflowStatus::AwaitingManualReview || state.status == WorkflowStatus::Failed {
            return Ok((state, None));
        }
        if !state.all_steps_terminal() || !state.all_background_jobs_terminal() {
            return Err(Error::new(ErrorCode::WorkflowStateError, "cannot complete: not every step/job is terminal"));
        }

        let any_failed = state.steps.values().any(|s| s.status == StepStatus::Failed);
        let final_status = if any_failed { WorkflowStatus::CompletedWithExceptions } else { WorkflowStatus::Completed };

        let state = self
            .store
            .update(
                workflow_id,
                move |state| {
                    state.status = final_status;
                },
                Some((EventType::StateUpdated, serde_json::json!({ "status": final_status }), None)),
                clock,
            )
            .await?;

        let audit_log = self.store.audit_log(workflow_id).await?;
        let generator = CertificateGenerator::new(&self.signing_service);
        let certificate = generator.generate(&state, &audit_log, certificate_id, clock.now())?;

        self.store
            .update(
                workflow_id,
                |_state| {},
                Some((EventType::CertificateGenerated, serde_json::json!({ "certificateId": certificate.body.certificate_id }), None)),
                clock,
            )
            .await?;

        let zombie_schedule = self
            .zombie_scheduler
            .schedule(workflow_id, state.user_identifiers.clone(), clock.now(), zombie_interval_days, clock)
            .await?;

        self.guard.release_user_lock(&state.user_identifiers.user_id).await;
        self.live_workflows.lock().unwrap().remove(workflow_id);

        match final_status {
            WorkflowStatus::Completed => self.metrics.workflows_completed.inc(),
            WorkflowStatus::CompletedWithExceptions => self.metrics.workflows_completed_with_exceptions.inc(),
            _ => {}
        }

        let deleted = state.steps.values().filter(|s| s.status == StepStatus::Deleted).count() as u32;
        let failed = state.steps.values().filter(|s| s.status == StepStatus::Failed).count() as u32;
        let legal_hold = state.steps.values().filter(|s| s.status == StepStatus::LegalHold).count() as u32;

        let completion_event = CompletionEvent {
            id: clock.new_id().to_string(),
            workflow_id: workflow_id.to_string(),
            event_type: "WORKFLOW_COMPLETED",
            timestamp: clock.now(),
            status: format!("{final_status:?}"),
            summary: CompletionSummary { total_steps: state.steps.len() as u32, deleted, failed, legal_hold },
            certificate_id: Some(certificate.body.certificate_id.clone()),
            certificate: Some(CertificateSummary {
                certificate_id: certificate.body.certificate_id.clone(),
                audit_hash_root: certificate.body.audit_hash_root,
                signature: certificate.signature.clone(),
            }),
            legal_holds: state.legal_holds.iter().map(|h| h.system.clone()).collect(),
            compliance: ComplianceSummary {
                jurisdiction: state.jurisdiction,
                policy_version: state.policy_version.clone(),
                zombie_check_scheduled: true,
                zombie_check_date: Some(zombie_schedule.scheduled_for),
            },
            next_actions: vec![NextAction {
                action: "zombie_check".to_string(),
                priority: "low".to_string(),
                due_date: Some(zombie_schedule.scheduled_for),
            }],
        };
        if let Err(e) = self.monitoring.publish_completion(&completion_event).await {
            warn!(workflow_id = %workflow_id, error = %e, "failed to publish completion event");
        }

        Ok((state, Some(certificate)))
    }

    /// The continuous `LegalHoldSweeper` state: walks every known workflow
    /// and reverts steps whose holds have expired.
    pub async fn sweep_legal_holds(&self, clock: &dyn Clock) -> Result<u32> {
        let mut swept = 0;
        for workflow_id in self.store.list_workflow_ids().await? {
            match self.legal_holds.remove_expired_legal_holds(&workflow_id, clock).await {
                Ok(_) => swept += 1,
                Err(e) => warn!(workflow_id, error = %e, "legal hold sweep failed for workflow"),
            }
        }
        Ok(swept)
    }
}

pub fn intake_conflict_error(conflict: &AdmissionConflict) -> Error {
    admission_conflict_error(conflict)
}
