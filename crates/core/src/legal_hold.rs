//! Legal-hold manager (§4.K): add/remove/sweep holds and the step gating
//! they imply. Consulted by the step executor before every attempt and by a
//! periodic sweeper for expiry.

use crate::audit::EventType;
use crate::clock::Clock;
use crate::error::Result;
use crate::metrics::ErasureMetrics;
use crate::workflow::model::{LegalHold, StepStatus, WorkflowState};
use crate::workflow::store::WorkflowStore;
use std::sync::Arc;

pub struct LegalHoldManager {
    store: Arc<WorkflowStore>,
    metrics: Arc<ErasureMetrics>,
}

impl LegalHoldManager {
    pub fn new(store: Arc<WorkflowStore>, metrics: Arc<ErasureMetrics>) -> Self {
        Self { store, metrics }
    }

    pub async fn add_legal_hold(
        &self,
        workflow_id: &str,
        system: impl Into<String>,
        reason: impl Into<String>,
        expires_at: Option<chrono::DateTime<chrono::Utc>>,
        clock: &dyn Clock,
    ) -> Result<WorkflowState> {
        let hold = LegalHold {
            system: system.into(),
            reason: reason.into(),
            expires_at,
            added_at: clock.now(),
        };
        let state = self.store.add_legal_hold(workflow_id, hold, clock).await?;
        self.metrics.legal_holds_active.inc();
        Ok(state)
    }

    /// Removes holds matching `system` (and `reason`, if given). If the
    /// matching system's step was `LegalHold`, it reverts to `NotStarted` so
    /// the step executor picks it up again.
    pub async fn remove_legal_hold(
        &self,
        workflow_id: &str,
        system: &str,
        reason: Option<&str>,
        clock: &dyn Clock,
    ) -> Result<WorkflowState> {
        let system_owned = system.to_string();
        let reason_owned = reason.map(|r| r.to_string());

        let before = self.store.get_state(workflow_id).await?;
        let removed = before
            .legal_holds
            .iter()
            .filter(|hold| hold.system == system_owned && reason_owned.as_deref().map(|r| r == hold.reason).unwrap_or(true))
            .count();

        let state = self
            .store
            .update(
                workflow_id,
                move |state| {
                    state.legal_holds.retain(|hold| {
                        !(hold.system == system_owned && reason_owned.as_deref().map(|r| r == hold.reason).unwrap_or(true))
                    });
                    if !state.is_system_under_legal_hold(&system_owned, chrono::Utc::now()) {
                        if let Some(step) = state.steps.get_mut(&system_owned) {
                            if step.status == StepStatus::LegalHold {
                                step.status = StepStatus::NotStarted;
                            }
                        }
                    }
                },
                Some((
                    EventType::LegalHoldRemoved,
                    serde_json::json!({ "system": system, "reason": reason }),
                    None,
                )),
                clock,
            )
            .await?;

        if removed > 0 {
            self.metrics.legal_holds_active.sub(removed as i64);
        }
        Ok(state)
    }

    pub async fn is_system_under_legal_hold(&self, workflow_id: &str, system: &str, clock: &dyn Clock) -> Result<bool> {
        let state = self.store.get_state(workflow_id).await?;
        Ok(state.is_system_under_legal_hold(system, clock.now()))
    }

    /// Sweeps expired holds, reverting their steps to `NotStarted`. Called
    /// periodically by the orchestrator's `LegalHoldSweeper` state.
    pub async fn remove_expired_legal_holds(&self, workflow_id: &str, clock: &dyn Clock) -> Result<WorkflowState> {
        let now = clock.now();
        let state = self.store.get_state(workflow_id).await?;
        let expired: Vec<String> = state
            .legal_holds
            .iter()
            .filter(|hold| !hold.is_active(now))
            .map(|hold| hold.system.clone())
            .collect();

        if expired.is_empty() {
            return Ok(state);
        }
        let expired_count = expired.len();

        let state = self
            .store
            .update(
                workflow_id,
                move |state| {
                    state.legal_holds.retain(|hold| hold.is_active(now));
                    for system in &expired {
                        if !state.is_system_under_legal_hold(system, now) {
                            if let Some(step) = state.steps.get_mut(system) {
                                if step.status == StepStatus::LegalHold {
                                    step.status = StepStatus::NotStarted;
                                }
                            }
                        }
                    }
                },
                Some((
                    EventType::LegalHoldRemoved,
                    serde_json::json!({ "reason": "expired", "sweptAt": now }),
                    None,
                )),
                clock,
            )
            .await?;

        self.metrics.legal_holds_active.sub(expired_count as i64);
        Ok(state)
    }
}
