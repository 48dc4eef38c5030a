//! External contracts (§6, Component O): the narrow async traits downstream
//! systems, scan sources, and the PII classifier must implement. Concrete
//! adapters live outside this crate; these traits are the seam.

use crate::workflow::model::UserIdentifiers;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteContext {
    pub workflow_id: String,
    pub step_name: String,
    pub attempt_number: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterError {
    pub error_type: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub success: bool,
    pub receipt: Option<String>,
    pub api_response: Option<serde_json::Value>,
    pub error: Option<AdapterError>,
}

impl DeleteOutcome {
    pub fn success(receipt: impl Into<String>) -> Self {
        Self {
            success: true,
            receipt: Some(receipt.into()),
            api_response: None,
            error: None,
        }
    }

    pub fn failure(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            receipt: None,
            api_response: None,
            error: Some(AdapterError { error_type: error_type.into(), message: message.into() }),
        }
    }
}

/// A downstream system capable of deleting a user's data (§6 "Downstream
/// adapter contract"). Timeouts and transport errors are expected to be
/// mapped to `success: false` with a structured `error`, never a panic.
#[async_trait]
pub trait DeletionAdapter: Send + Sync {
    fn system_name(&self) -> &str;
    async fn delete(&self, user_identifiers: &UserIdentifiers, ctx: &DeleteContext) -> DeleteOutcome;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanPage {
    pub items: Vec<serde_json::Value>,
    pub next_checkpoint: Option<String>,
    pub progress_percent: f64,
}

/// A background-scan data source (§6 "Background-scan adapter contract").
/// `next` is called repeatedly with the previous page's checkpoint until
/// `next_checkpoint` is `None`.
#[async_trait]
pub trait ScanAdapter: Send + Sync {
    fn system_name(&self) -> &str;
    async fn next(&self, checkpoint_token: Option<&str>) -> crate::error::Result<ScanPage>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationMetadata {
    pub pre_filter_matches: u64,
    pub chunk_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub findings: Vec<crate::workflow::model::PiiFinding>,
    pub metadata: ClassificationMetadata,
}

/// The PII-detection seam (§6 "PII classifier contract"). Concrete models
/// are out of scope (§1 Non-goals); this crate only orchestrates calls to
/// one.
#[async_trait]
pub trait PiiClassifier: Send + Sync {
    async fn classify(&self, content: &str, system_name: &str, location: &str) -> crate::error::Result<ClassificationResult>;
}
