//! Monitoring publisher (§4.N): structured events published over the event
//! bus for three topics -- status, error, and completion -- each durable per
//! `(topic, workflowId)` and fanned out live to any subscriber.

use crate::clock::Clock;
use crate::persistence::{EventBus, TypedEventBus};
use crate::workflow::model::StepStatus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const TOPIC_STATUS: &str = "status";
const TOPIC_ERROR: &str = "error";
const TOPIC_COMPLETION: &str = "completion";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusEventType {
    StatusChange,
    StepUpdate,
    ProgressUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub id: String,
    pub workflow_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "type")]
    pub event_type: StatusEventType,
    pub status: String,
    pub step_name: Option<String>,
    pub step_status: Option<StepStatus>,
    pub progress: Option<ProgressSummary>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEventContext {
    pub step_name: Option<String>,
    pub attempt_number: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Remediation {
    pub description: String,
    pub actions: Vec<String>,
    pub retryable: bool,
    pub escalation_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Impact {
    pub affected_systems: Vec<String>,
    pub data_at_risk: bool,
    pub compliance_impact: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStatus {
    Open,
    InProgress,
    Resolved,
    Escalated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub status: ResolutionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub id: String,
    pub workflow_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub severity: ErrorSeverity,
    pub category: String,
    pub error: ErrorDetail,
    pub context: ErrorEventContext,
    pub remediation: Remediation,
    pub impact: Impact,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionSummary {
    pub total_steps: u32,
    pub deleted: u32,
    pub failed: u32,
    pub legal_hold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateSummary {
    pub certificate_id: String,
    pub audit_hash_root: crate::crypto::Hash,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceSummary {
    pub jurisdiction: crate::workflow::model::Jurisdiction,
    pub policy_version: String,
    pub zombie_check_scheduled: bool,
    pub zombie_check_date: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextAction {
    pub action: String,
    pub priority: String,
    pub due_date: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub id: String,
    pub workflow_id: String,
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub status: String,
    pub summary: CompletionSummary,
    pub certificate_id: Option<String>,
    pub certificate: Option<CertificateSummary>,
    pub legal_holds: Vec<String>,
    pub compliance: ComplianceSummary,
    pub next_actions: Vec<NextAction>,
}

pub struct MonitoringPublisher {
    bus: Arc<dyn EventBus>,
}

impl MonitoringPublisher {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    pub async fn publish_status(&self, event: &StatusEvent, clock: &dyn Clock) -> crate::error::Result<()> {
        let _ = clock;
        self.bus.publish_json(TOPIC_STATUS, &event.workflow_id, event).await
    }

    pub async fn publish_error(&self, event: &ErrorEvent) -> crate::error::Result<()> {
        self.bus.publish_json(TOPIC_ERROR, &event.workflow_id, event).await
    }

    pub async fn publish_completion(&self, event: &CompletionEvent) -> crate::error::Result<()> {
        self.bus.publish_json(TOPIC_COMPLETION, &event.workflow_id, event).await
    }
}
