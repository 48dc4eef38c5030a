//! Step executor (§4.H): drives a single step through
//! `NotStarted -> InProgress -> {Deleted | Failed | LegalHold}`.
//!
//! Retries use an async sleep rather than a blocking one, so no OS thread is
//! pinned while a step waits out its backoff; the sleep is bounded by
//! [`ErasureConfig::retry_max_delay_seconds`] and re-checks for a legal hold
//! before every attempt, so a hold applied mid-backoff redirects the step to
//! `LegalHold` instead of retrying.

use crate::clock::Clock;
use crate::config::ErasureConfig;
use crate::contracts::{DeleteContext, DeleteOutcome, DeletionAdapter};
use crate::error::{Error, ErrorCode, ErrorMetrics, Result};
use crate::metrics::ErasureMetrics;
use crate::workflow::model::{StepError, StepEvidence, StepStatus};
use crate::workflow::store::WorkflowStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Deleted,
    Failed { critical: bool },
    LegalHold,
}

pub struct StepExecutor {
    store: Arc<WorkflowStore>,
    config: ErasureConfig,
    metrics: Arc<ErasureMetrics>,
    error_metrics: Arc<ErrorMetrics>,
}

impl StepExecutor {
    pub fn new(store: Arc<WorkflowStore>, config: ErasureConfig, metrics: Arc<ErasureMetrics>, error_metrics: Arc<ErrorMetrics>) -> Self {
        Self { store, config, metrics, error_metrics }
    }

    fn retry_delay(&self, attempts: u32) -> Duration {
        let multiplier = self.config.retry_backoff_multiplier.max(1).pow(attempts.saturating_sub(1));
        let seconds = self.config.retry_initial_delay_seconds.saturating_mul(multiplier);
        Duration::from_secs(seconds.min(self.config.retry_max_delay_seconds))
    }

    /// Runs `step_name` to completion, honoring legal holds and the
    /// critical/non-critical halt distinction. `critical` steps that exhaust
    /// their attempts signal the caller to halt the workflow.
    pub async fn execute_step(
        &self,
        workflow_id: &str,
        step_name: &str,
        adapter: &dyn DeletionAdapter,
        critical: bool,
        clock: &dyn Clock,
    ) -> Result<StepOutcome> {
        loop {
            let state = self.store.get_state(workflow_id).await?;
            if state.is_system_under_legal_hold(step_name, clock.now()) {
                self.store
                    .update_step_status(workflow_id, step_name, StepStatus::LegalHold, None, false, clock)
                    .await?;
                return Ok(StepOutcome::LegalHold);
            }

            let state = self
                .store
                .update_step_status(workflow_id, step_name, StepStatus::InProgress, None, true, clock)
                .await?;
            let attempts = state.steps.get(step_name).map(|s| s.attempts).unwrap_or(1);

            let ctx = DeleteContext {
                workflow_id: workflow_id.to_string(),
                step_name: step_name.to_string(),
                attempt_number: attempts,
            };

            let timeout = Duration::from_secs(self.config.adapter_timeout_seconds);
            let outcome = match tokio::time::timeout(timeout, adapter.delete(&state.user_identifiers, &ctx)).await {
                Ok(outcome) => outcome,
                Err(_) => DeleteOutcome::failure("timeout", format!("adapter '{step_name}' exceeded {timeout:?}")),
            };

            if outcome.success {
                let evidence = StepEvidence {
                    receipt: outcome.receipt,
                    timestamp: Some(clock.now()),
                    api_response: outcome.api_response,
                    error: None,
                };
                self.store
                    .update_step_status(workflow_id, step_name, StepStatus::Deleted, Some(evidence), false, clock)
                    .await?;
                self.metrics.steps_deleted.with_label_values(&[step_name]).inc();
                info!(workflow_id, step_name, attempts, "step deleted");
                return Ok(StepOutcome::Deleted);
            }

            let adapter_error = outcome.error.unwrap_or_else(|| crate::contracts::AdapterError {
                error_type: "unknown".to_string(),
                message: "adapter reported failure with no error detail".to_string(),
            });
            let evidence = StepEvidence {
                receipt: None,
                timestamp: Some(clock.now()),
                api_response: None,
                error: Some(StepError {
                    error_type: adapter_error.error_type,
                    message: adapter_error.message,
                    timestamp: clock.now(),
                    attempt_number: attempts,
                }),
            };

            if attempts >= self.config.max_attempts {
                self.store
                    .update_step_status(workflow_id, step_name, StepStatus::Failed, Some(evidence), false, clock)
                    .await?;
                self.metrics.steps_failed.with_label_values(&[step_name]).inc();
                let err = Error::new(ErrorCode::AdapterPermanent, format!("step '{step_name}' failed after exhausting attempts"))
                    .add_metadata("workflow_id", serde_json::json!(workflow_id))
                    .add_metadata("attempts", serde_json::json!(attempts));
                self.error_metrics.record_error(&err).await;
                warn!(workflow_id, step_name, attempts, "step failed after exhausting attempts");
                return Ok(StepOutcome::Failed { critical });
            }

            self.store
                .update_step_status(workflow_id, step_name, StepStatus::InProgress, Some(evidence), false, clock)
                .await?;
            tokio::time::sleep(self.retry_delay(attempts)).await;
        }
    }
}
