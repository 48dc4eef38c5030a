//! Hash-chained audit log (§3, §4.E).
//!
//! Every workflow owns exactly one [`AuditLog`]. Each entry links to its
//! predecessor's hash, so detecting tampering only requires recomputing the
//! chain, never trusting storage. Appending never fails under normal
//! operation; integrity checking is pure and never mutates the log.

use crate::clock::Clock;
use crate::crypto::{self, Hash};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Genesis,
    WorkflowCreated,
    StepStarted,
    StepCompleted,
    StepFailed,
    StateUpdated,
    LegalHoldAdded,
    LegalHoldRemoved,
    BackgroundJobUpdated,
    ZombieCheckCompleted,
    CertificateGenerated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub workflow_id: String,
    pub event_type: EventType,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub data: serde_json::Value,
    pub metadata: Option<serde_json::Value>,
}

/// Builds an [`AuditEvent`] one field at a time, mirroring the log-record
/// builders elsewhere in this crate.
pub struct AuditEventBuilder {
    workflow_id: String,
    event_type: EventType,
    data: serde_json::Value,
    metadata: Option<serde_json::Value>,
}

impl AuditEventBuilder {
    pub fn new(workflow_id: impl Into<String>, event_type: EventType) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            event_type,
            data: serde_json::Value::Null,
            metadata: None,
        }
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn build(self, clock: &dyn Clock) -> AuditEvent {
        AuditEvent {
            event_id: clock.new_id().to_string(),
            workflow_id: self.workflow_id,
            event_type: self.event_type,
            timestamp: clock.now(),
            data: self.data,
            metadata: self.metadata,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event: AuditEvent,
    pub previous_hash: Hash,
    pub hash: Hash,
}

#[derive(Debug, Clone)]
pub struct TamperReport {
    pub tampered: bool,
    pub corrupted_index: Option<usize>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub workflow_id: String,
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    /// Seeds a fresh log with the Genesis entry: `previousHash =
    /// hash("GENESIS")`, event type `Genesis`.
    pub fn new(workflow_id: impl Into<String>, clock: &dyn Clock) -> Self {
        let workflow_id = workflow_id.into();
        let genesis_event = AuditEvent {
            event_id: clock.new_id().to_string(),
            workflow_id: workflow_id.clone(),
            event_type: EventType::Genesis,
            timestamp: clock.now(),
            data: serde_json::json!({ "workflowId": workflow_id }),
            metadata: None,
        };
        let previous_hash = crypto::genesis_hash();
        let hash = crypto::chain(&previous_hash, &genesis_event)
            .expect("genesis event is always serializable");

        Self {
            workflow_id,
            entries: vec![AuditEntry {
                event: genesis_event,
                previous_hash,
                hash,
            }],
        }
    }

    /// Appends a new event, linking it to the current tail hash.
    pub fn append(
        &mut self,
        event_type: EventType,
        data: serde_json::Value,
        metadata: Option<serde_json::Value>,
        clock: &dyn Clock,
    ) -> &AuditEntry {
        let event = AuditEvent {
            event_id: clock.new_id().to_string(),
            workflow_id: self.workflow_id.clone(),
            event_type,
            timestamp: clock.now(),
            data,
            metadata,
        };
        self.append_event(event)
    }

    pub fn append_event(&mut self, event: AuditEvent) -> &AuditEntry {
        let previous_hash = self.root();
        let hash = crypto::chain(&previous_hash, &event).expect("audit event is always serializable");
        self.entries.push(AuditEntry {
            event,
            previous_hash,
            hash,
        });
        self.entries.last().expect("just pushed")
    }

    /// Defensive copy: callers cannot mutate the chain through this.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.clone()
    }

    pub fn hash_chain(&self) -> Vec<Hash> {
        self.entries.iter().map(|e| e.hash).collect()
    }

    /// The most recent hash, bound into the Certificate of Destruction as
    /// `auditHashRoot`.
    pub fn root(&self) -> Hash {
        self.entries.last().expect("log always has genesis entry").hash
    }

    pub fn verify_integrity(&self) -> bool {
        self.detect_tampering().tampered == false
    }

    /// Recomputes every hash in the chain from scratch; never mutates state.
    pub fn detect_tampering(&self) -> TamperReport {
        let mut expected_previous = crypto::genesis_hash();
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.previous_hash != expected_previous {
                return TamperReport {
                    tampered: true,
                    corrupted_index: Some(index),
                    details: Some(format!("entry {index} previousHash does not match predecessor's hash")),
                };
            }
            let recomputed = match crypto::chain(&entry.previous_hash, &entry.event) {
                Ok(h) => h,
                Err(e) => {
                    return TamperReport {
                        tampered: true,
                        corrupted_index: Some(index),
                        details: Some(format!("entry {index} event could not be canonicalized: {e}")),
                    }
                }
            };
            if recomputed != entry.hash {
                return TamperReport {
                    tampered: true,
                    corrupted_index: Some(index),
                    details: Some(format!("entry {index} hash does not match recomputed hash")),
                };
            }
            expected_previous = entry.hash;
        }
        TamperReport {
            tampered: false,
            corrupted_index: None,
            details: None,
        }
    }

    pub fn filter(&self, event_type: EventType) -> Vec<AuditEntry> {
        self.entries.iter().filter(|e| e.event.event_type == event_type).cloned().collect()
    }

    pub fn filter_by_step(&self, step_name: &str) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .filter(|e| {
                e.event
                    .data
                    .get("stepName")
                    .and_then(|v| v.as_str())
                    .map(|s| s == step_name)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}

pub fn new_event_id() -> String {
    Uuid::new_v4().to_string()
}
