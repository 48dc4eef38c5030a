//! Zombie scheduler (§4.L): schedules a re-scan of a completed workflow's
//! systems some interval after completion, to catch data that resurfaces
//! from backups, caches, or replication lag ("zombie data" -- see glossary).

use crate::audit::EventType;
use crate::clock::Clock;
use crate::contracts::ScanAdapter;
use crate::error::Result;
use crate::metrics::ErasureMetrics;
use crate::persistence::{KvStore, TypedKvStore};
use crate::workflow::model::UserIdentifiers;
use crate::workflow::store::{CreateWorkflowOptions, WorkflowStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

const NS_ZOMBIE_CHECKS: &str = "zombie_checks";
const NS_ZOMBIE_CHECKS_BY_WORKFLOW: &str = "zombie_checks_by_workflow";
const NS_ALERTS: &str = "alerts";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZombieScheduleStatus {
    Scheduled,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZombieSchedule {
    pub schedule_id: String,
    pub workflow_id: String,
    pub user_identifiers: UserIdentifiers,
    pub scheduled_for: chrono::DateTime<chrono::Utc>,
    pub status: ZombieScheduleStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ZombieCheckResult {
    Positive,
    Negative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZombieAlert {
    pub original_workflow_id: String,
    pub spawned_workflow_id: String,
    pub severity: &'static str,
    pub raised_at: chrono::DateTime<chrono::Utc>,
}

pub struct ZombieScheduler {
    kv: Arc<dyn KvStore>,
    store: Arc<WorkflowStore>,
    metrics: Arc<ErasureMetrics>,
}

impl ZombieScheduler {
    pub fn new(kv: Arc<dyn KvStore>, store: Arc<WorkflowStore>, metrics: Arc<ErasureMetrics>) -> Self {
        Self { kv, store, metrics }
    }

    /// Schedules a re-check `interval_days` after `completed_at`, indexed
    /// both by `scheduleId` and by `workflowId`.
    pub async fn schedule(
        &self,
        workflow_id: &str,
        user_identifiers: UserIdentifiers,
        completed_at: chrono::DateTime<chrono::Utc>,
        interval_days: u32,
        clock: &dyn Clock,
    ) -> Result<ZombieSchedule> {
        let schedule = ZombieSchedule {
            schedule_id: clock.new_id().to_string(),
            workflow_id: workflow_id.to_string(),
            user_identifiers,
            scheduled_for: completed_at + chrono::Duration::days(interval_days as i64),
            status: ZombieScheduleStatus::Scheduled,
        };

        self.kv.set_json(NS_ZOMBIE_CHECKS, &schedule.schedule_id, &schedule).await?;
        self.kv.set_json(NS_ZOMBIE_CHECKS_BY_WORKFLOW, workflow_id, &schedule).await?;

        Ok(schedule)
    }

    /// Every schedule with `scheduledFor <= now` and status `Scheduled`.
    pub async fn due_schedules(&self, clock: &dyn Clock) -> Result<Vec<ZombieSchedule>> {
        let now = clock.now();
        let mut due = Vec::new();
        for schedule_id in self.kv.list_by_namespace(NS_ZOMBIE_CHECKS).await? {
            if let Some(schedule) = self.kv.get_json::<ZombieSchedule>(NS_ZOMBIE_CHECKS, &schedule_id).await? {
                if schedule.status == ZombieScheduleStatus::Scheduled && schedule.scheduled_for <= now {
                    due.push(schedule);
                }
            }
        }
        Ok(due)
    }

    /// Re-scans `systems` for `schedule`'s identifiers. Every check is
    /// audited on the original workflow regardless of outcome; a positive
    /// result spawns a follow-up erasure workflow linked back via
    /// `originalWorkflowId` and raises a high-severity alert.
    pub async fn run_check(
        &self,
        schedule: &ZombieSchedule,
        systems: &[Arc<dyn ScanAdapter>],
        clock: &dyn Clock,
    ) -> Result<ZombieCheckResult> {
        let mut found_any = false;
        for adapter in systems {
            let page = adapter.next(None).await?;
            if !page.items.is_empty() {
                found_any = true;
                break;
            }
        }

        let result = if found_any { ZombieCheckResult::Positive } else { ZombieCheckResult::Negative };
        match result {
            ZombieCheckResult::Positive => self.metrics.zombie_checks_positive.inc(),
            ZombieCheckResult::Negative => self.metrics.zombie_checks_negative.inc(),
        }

        self.store
            .update(
                &schedule.workflow_id,
                |_state| {},
                Some((
                    EventType::ZombieCheckCompleted,
                    serde_json::json!({ "result": if found_any { "POSITIVE" } else { "NEGATIVE" } }),
                    None,
                )),
                clock,
            )
            .await?;

        if found_any {
            let spawned_workflow_id = clock.new_id().to_string();
            warn!(
                original_workflow_id = %schedule.workflow_id,
                spawned_workflow_id = %spawned_workflow_id,
                "zombie data detected, spawning follow-up erasure workflow"
            );

            self.store
                .create_workflow(
                    CreateWorkflowOptions {
                        workflow_id: spawned_workflow_id.clone(),
                        request_id: clock.new_id().to_string(),
                        user_identifiers: schedule.user_identifiers.clone(),
                        legal_proof: crate::workflow::model::LegalProof {
                            proof_type: crate::workflow::model::LegalProofType::SignedRequest,
                            evidence: format!("ZOMBIE_DATA_DETECTED:{}", schedule.workflow_id),
                            verified_at: clock.now(),
                        },
                        jurisdiction: crate::workflow::model::Jurisdiction::Other,
                        requested_by: crate::workflow::model::Requester {
                            user_id: "system".to_string(),
                            role: "zombie_scheduler".to_string(),
                            organization: "internal".to_string(),
                        },
                        policy_version: "1.0.0".to_string(),
                        data_lineage_snapshot: None,
                    },
                    clock,
                )
                .await?;

            let alert = ZombieAlert {
                original_workflow_id: schedule.workflow_id.clone(),
                spawned_workflow_id: spawned_workflow_id.clone(),
                severity: "high",
                raised_at: clock.now(),
            };
            self.kv.set_json(NS_ALERTS, &clock.new_id().to_string(), &alert).await?;
        } else {
            info!(workflow_id = %schedule.workflow_id, "zombie check found no residual data");
        }

        let mut completed = schedule.clone();
        completed.status = ZombieScheduleStatus::Completed;
        self.kv.set_json(NS_ZOMBIE_CHECKS, &completed.schedule_id, &completed).await?;
        self.kv.set_json(NS_ZOMBIE_CHECKS_BY_WORKFLOW, &completed.workflow_id, &completed).await?;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::config::MetricsConfig;
    use crate::contracts::ScanPage;
    use crate::metrics::MetricsRegistry;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn metrics() -> Arc<ErasureMetrics> {
        let registry = MetricsRegistry::new(MetricsConfig { enabled: true, namespace: "erasure_test".to_string() });
        Arc::new(ErasureMetrics::new(&registry))
    }

    #[derive(Default)]
    struct MemoryKv {
        data: Mutex<HashMap<(String, String), Vec<u8>>>,
    }

    #[async_trait]
    impl KvStore for MemoryKv {
        async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.data.lock().unwrap().get(&(namespace.to_string(), key.to_string())).cloned())
        }
        async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<()> {
            self.data.lock().unwrap().insert((namespace.to_string(), key.to_string()), value);
            Ok(())
        }
        async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
            self.data.lock().unwrap().remove(&(namespace.to_string(), key.to_string()));
            Ok(())
        }
        async fn list_by_namespace(&self, namespace: &str) -> Result<Vec<String>> {
            Ok(self.data.lock().unwrap().keys().filter(|(ns, _)| ns == namespace).map(|(_, k)| k.clone()).collect())
        }
    }

    struct EmptyScan;
    #[async_trait]
    impl ScanAdapter for EmptyScan {
        fn system_name(&self) -> &str {
            "primary_db"
        }
        async fn next(&self, _checkpoint_token: Option<&str>) -> Result<ScanPage> {
            Ok(ScanPage { items: vec![], next_checkpoint: None, progress_percent: 100.0 })
        }
    }

    struct NonEmptyScan;
    #[async_trait]
    impl ScanAdapter for NonEmptyScan {
        fn system_name(&self) -> &str {
            "primary_db"
        }
        async fn next(&self, _checkpoint_token: Option<&str>) -> Result<ScanPage> {
            Ok(ScanPage { items: vec![serde_json::json!({"leftover": true})], next_checkpoint: None, progress_percent: 100.0 })
        }
    }

    async fn store() -> (Arc<WorkflowStore>, Arc<dyn KvStore>) {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::default());
        let store = Arc::new(WorkflowStore::new(kv.clone()));
        let clock = FakeClock::new(Utc::now());
        store
            .create_workflow(
                CreateWorkflowOptions {
                    workflow_id: "wf-1".to_string(),
                    request_id: "req-1".to_string(),
                    user_identifiers: UserIdentifiers::new("user-1"),
                    legal_proof: crate::workflow::model::LegalProof {
                        proof_type: crate::workflow::model::LegalProofType::OtpVerified,
                        evidence: "otp".to_string(),
                        verified_at: Utc::now(),
                    },
                    jurisdiction: crate::workflow::model::Jurisdiction::Eu,
                    requested_by: crate::workflow::model::Requester {
                        user_id: "admin".to_string(),
                        role: "support".to_string(),
                        organization: "acme".to_string(),
                    },
                    policy_version: "1.0.0".to_string(),
                    data_lineage_snapshot: None,
                },
                &clock,
            )
            .await
            .unwrap();
        (store, kv)
    }

    #[tokio::test]
    async fn schedule_is_exactly_interval_days_after_completion() {
        let (store, kv) = store().await;
        let scheduler = ZombieScheduler::new(kv, store, metrics());
        let clock = FakeClock::new(Utc::now());
        let completed_at = clock.now();

        let schedule = scheduler.schedule("wf-1", UserIdentifiers::new("user-1"), completed_at, 30, &clock).await.unwrap();
        assert_eq!(schedule.scheduled_for, completed_at + chrono::Duration::days(30));
    }

    #[tokio::test]
    async fn negative_check_is_audited_and_schedule_completes() {
        let (store, kv) = store().await;
        let scheduler = ZombieScheduler::new(kv, store.clone(), metrics());
        let clock = FakeClock::new(Utc::now());
        let schedule = scheduler.schedule("wf-1", UserIdentifiers::new("user-1"), clock.now(), 1, &clock).await.unwrap();

        let systems: Vec<Arc<dyn ScanAdapter>> = vec![Arc::new(EmptyScan)];
        let result = scheduler.run_check(&schedule, &systems, &clock).await.unwrap();
        assert_eq!(result, ZombieCheckResult::Negative);

        let log = store.audit_log("wf-1").await.unwrap();
        assert_eq!(log.filter(EventType::ZombieCheckCompleted).len(), 1);
    }

    #[tokio::test]
    async fn positive_check_spawns_follow_up_workflow() {
        let (store, kv) = store().await;
        let scheduler = ZombieScheduler::new(kv, store.clone(), metrics());
        let clock = FakeClock::new(Utc::now());
        let schedule = scheduler.schedule("wf-1", UserIdentifiers::new("user-1"), clock.now(), 1, &clock).await.unwrap();

        let systems: Vec<Arc<dyn ScanAdapter>> = vec![Arc::new(NonEmptyScan)];
        let result = scheduler.run_check(&schedule, &systems, &clock).await.unwrap();
        assert_eq!(result, ZombieCheckResult::Positive);

        let log = store.audit_log("wf-1").await.unwrap();
        let events = log.filter(EventType::ZombieCheckCompleted);
        assert_eq!(events[0].event.data["result"], "POSITIVE");
    }
}
