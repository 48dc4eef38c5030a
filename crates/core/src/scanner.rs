//! Background scanner (§4.J): resumable scans over large/slow systems
//! (object storage, warehouses, backups) that surface PII findings without
//! blocking the rest of the workflow.
//!
//! Progress and checkpoints are persisted after each chunk and before the
//! next is requested, so a restart resumes from the last durable checkpoint
//! rather than reprocessing or skipping data.

use crate::clock::Clock;
use crate::contracts::{PiiClassifier, ScanAdapter};
use crate::error::Result;
use crate::policy::ConfidenceThresholds;
use crate::workflow::model::{BackgroundJob, BackgroundJobStatus, BackgroundJobType, PiiFinding};
use crate::workflow::store::WorkflowStore;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FindingCategory {
    AutoDelete,
    ManualReview,
    RecordOnly,
}

/// Categorizes a finding using the workflow's frozen policy snapshot, not
/// whatever policy version happens to be current (§4.J).
pub fn categorize_finding(confidence: f64, thresholds: &ConfidenceThresholds) -> FindingCategory {
    if confidence >= thresholds.auto_delete {
        FindingCategory::AutoDelete
    } else if confidence >= thresholds.manual_review {
        FindingCategory::ManualReview
    } else {
        FindingCategory::RecordOnly
    }
}

pub struct BackgroundScanner {
    store: Arc<WorkflowStore>,
}

impl BackgroundScanner {
    pub fn new(store: Arc<WorkflowStore>) -> Self {
        Self { store }
    }

    /// Ingests one progress update. `progress` is clamped up to the job's
    /// current value so it can never regress; `findings` (if any) are
    /// appended, never replacing prior findings.
    pub async fn update_job_progress(
        &self,
        workflow_id: &str,
        job_id: &str,
        progress: f64,
        findings: Option<Vec<PiiFinding>>,
        checkpoint: Option<String>,
        clock: &dyn Clock,
    ) -> Result<BackgroundJob> {
        let job_id_owned = job_id.to_string();
        let state = self
            .store
            .update(
                workflow_id,
                move |state| {
                    let state_workflow_id = state.workflow_id.clone();
                    let job = state
                        .background_jobs
                        .entry(job_id_owned.clone())
                        .or_insert_with(|| BackgroundJob::new(job_id_owned.clone(), state_workflow_id, BackgroundJobType::ObjectStoreScan));
                    job.status = BackgroundJobStatus::Running;
                    job.progress = progress.max(job.progress).min(100.0);
                    if let Some(checkpoint) = checkpoint {
                        job.checkpoints.push(checkpoint);
                    }
                    if let Some(mut new_findings) = findings {
                        job.findings.append(&mut new_findings);
                    }
                    if job.progress >= 100.0 {
                        job.status = BackgroundJobStatus::Completed;
                    }
                },
                Some((
                    crate::audit::EventType::BackgroundJobUpdated,
                    serde_json::json!({ "jobId": job_id, "progress": progress }),
                    None,
                )),
                clock,
            )
            .await?;

        state
            .background_jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| crate::error::Error::internal("background job vanished after update"))
    }

    pub async fn mark_failed(&self, workflow_id: &str, job_id: &str, clock: &dyn Clock) -> Result<BackgroundJob> {
        let job_id_owned = job_id.to_string();
        let state = self
            .store
            .update(
                workflow_id,
                move |state| {
                    if let Some(job) = state.background_jobs.get_mut(&job_id_owned) {
                        job.status = BackgroundJobStatus::Failed;
                    }
                },
                Some((
                    crate::audit::EventType::BackgroundJobUpdated,
                    serde_json::json!({ "jobId": job_id, "status": "Failed" }),
                    None,
                )),
                clock,
            )
            .await?;
        state
            .background_jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| crate::error::Error::internal("background job vanished after update"))
    }

    /// Drives a scan to completion (or failure) against `adapter`, starting
    /// from the job's last persisted checkpoint. Each page's items are
    /// classified through `classifier` (when given) and the resulting
    /// findings are appended to the job; a page with no classifier attached
    /// advances progress without recording findings.
    pub async fn run_scan(
        &self,
        workflow_id: &str,
        job_id: &str,
        job_type: BackgroundJobType,
        adapter: &dyn ScanAdapter,
        classifier: Option<&dyn PiiClassifier>,
        clock: &dyn Clock,
    ) -> Result<BackgroundJob> {
        let job_id_owned = job_id.to_string();
        self.store
            .update(
                workflow_id,
                move |state| {
                    let state_workflow_id = state.workflow_id.clone();
                    state
                        .background_jobs
                        .entry(job_id_owned.clone())
                        .or_insert_with(|| BackgroundJob::new(job_id_owned, state_workflow_id, job_type));
                },
                None,
                clock,
            )
            .await?;

        let mut checkpoint: Option<String> = self
            .store
            .get_state(workflow_id)
            .await?
            .background_jobs
            .get(job_id)
            .and_then(|job| job.checkpoints.last().cloned());

        loop {
            let page = match adapter.next(checkpoint.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(workflow_id, job_id, error = %e, "background scan failed, preserving last good progress");
                    return self.mark_failed(workflow_id, job_id, clock).await;
                }
            };

            let mut findings = Vec::new();
            if let Some(classifier) = classifier {
                for item in &page.items {
                    let location = item.get("location").and_then(|v| v.as_str()).unwrap_or(job_id).to_string();
                    match classifier.classify(&item.to_string(), adapter.system_name(), &location).await {
                        Ok(result) => findings.extend(result.findings),
                        Err(e) => warn!(workflow_id, job_id, error = %e, "classification failed for a scan item"),
                    }
                }
            }

            let findings = if findings.is_empty() { None } else { Some(findings) };
            self.update_job_progress(workflow_id, job_id, page.progress_percent, findings, page.next_checkpoint.clone(), clock)
                .await?;

            checkpoint = page.next_checkpoint;
            if checkpoint.is_none() {
                info!(workflow_id, job_id, "background scan completed");
                break;
            }
        }

        self.update_job_progress(workflow_id, job_id, 100.0, None, None, clock).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::contracts::ScanPage;
    use crate::persistence::KvStore;
    use crate::workflow::model::{Jurisdiction, LegalProof, LegalProofType, Requester, UserIdentifiers};
    use crate::workflow::store::CreateWorkflowOptions;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

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

    struct TwoPageScan {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ScanAdapter for TwoPageScan {
        fn system_name(&self) -> &str {
            "object_store"
        }

        async fn next(&self, checkpoint_token: Option<&str>) -> Result<ScanPage> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(checkpoint_token.is_some(), call > 0);
            if call == 0 {
                Ok(ScanPage { items: vec![], next_checkpoint: Some("chunk-1".to_string()), progress_percent: 50.0 })
            } else {
                Ok(ScanPage { items: vec![], next_checkpoint: None, progress_percent: 100.0 })
            }
        }
    }

    async fn store_with_workflow() -> Arc<WorkflowStore> {
        let store = Arc::new(WorkflowStore::new(Arc::new(MemoryKv::default())));
        let clock = FakeClock::new(Utc::now());
        store
            .create_workflow(
                CreateWorkflowOptions {
                    workflow_id: "wf-1".to_string(),
                    request_id: "req-1".to_string(),
                    user_identifiers: UserIdentifiers::new("user-1"),
                    legal_proof: LegalProof { proof_type: LegalProofType::OtpVerified, evidence: "otp".to_string(), verified_at: Utc::now() },
                    jurisdiction: Jurisdiction::Eu,
                    requested_by: Requester { user_id: "admin".to_string(), role: "support".to_string(), organization: "acme".to_string() },
                    policy_version: "1.0.0".to_string(),
                    data_lineage_snapshot: None,
                },
                &clock,
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn scan_resumes_via_checkpoint_and_completes() {
        let store = store_with_workflow().await;
        let scanner = BackgroundScanner::new(store.clone());
        let clock = FakeClock::new(Utc::now());
        let adapter = TwoPageScan { calls: AtomicU32::new(0) };

        let job = scanner
            .run_scan("wf-1", "job-1", BackgroundJobType::ObjectStoreScan, &adapter, None, &clock)
            .await
            .unwrap();

        assert_eq!(job.status, BackgroundJobStatus::Completed);
        assert_eq!(job.progress, 100.0);
        assert_eq!(job.checkpoints, vec!["chunk-1".to_string()]);
    }

    struct OnePageScan;
    #[async_trait]
    impl ScanAdapter for OnePageScan {
        fn system_name(&self) -> &str {
            "object_store"
        }
        async fn next(&self, _checkpoint_token: Option<&str>) -> Result<ScanPage> {
            Ok(ScanPage { items: vec![serde_json::json!({"location": "bucket/key"})], next_checkpoint: None, progress_percent: 100.0 })
        }
    }

    struct AlwaysFindsEmail;
    #[async_trait]
    impl PiiClassifier for AlwaysFindsEmail {
        async fn classify(&self, _content: &str, system_name: &str, location: &str) -> Result<crate::contracts::ClassificationResult> {
            Ok(crate::contracts::ClassificationResult {
                findings: vec![PiiFinding {
                    match_id: "match-1".to_string(),
                    system: system_name.to_string(),
                    location: location.to_string(),
                    pii_type: crate::workflow::model::PiiType::Email,
                    confidence: 0.95,
                    snippet: "a***e@example.com".to_string(),
                    provenance: crate::workflow::model::Provenance { timestamp: Utc::now(), message_id: None, channel: None },
                }],
                metadata: crate::contracts::ClassificationMetadata { pre_filter_matches: 1, chunk_count: 1 },
            })
        }
    }

    #[tokio::test]
    async fn run_scan_classifies_items_into_findings() {
        let store = store_with_workflow().await;
        let scanner = BackgroundScanner::new(store.clone());
        let clock = FakeClock::new(Utc::now());

        let job = scanner
            .run_scan("wf-1", "job-1", BackgroundJobType::ObjectStoreScan, &OnePageScan, Some(&AlwaysFindsEmail), &clock)
            .await
            .unwrap();

        assert_eq!(job.findings.len(), 1);
        assert_eq!(job.findings[0].location, "bucket/key");
    }

    #[tokio::test]
    async fn progress_never_regresses() {
        let store = store_with_workflow().await;
        let scanner = BackgroundScanner::new(store.clone());
        let clock = FakeClock::new(Utc::now());

        scanner.update_job_progress("wf-1", "job-1", 60.0, None, None, &clock).await.unwrap();
        let job = scanner.update_job_progress("wf-1", "job-1", 30.0, None, None, &clock).await.unwrap();
        assert_eq!(job.progress, 60.0);
    }

    #[test]
    fn categorize_finding_uses_both_thresholds() {
        let thresholds = ConfidenceThresholds { auto_delete: 0.8, manual_review: 0.5 };
        assert_eq!(categorize_finding(0.9, &thresholds), FindingCategory::AutoDelete);
        assert_eq!(categorize_finding(0.6, &thresholds), FindingCategory::ManualReview);
        assert_eq!(categorize_finding(0.2, &thresholds), FindingCategory::RecordOnly);
    }
}
