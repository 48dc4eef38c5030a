//! Certificate of Destruction generator (§4.M): assembles, redacts, and
//! signs the final record of an erasure workflow.

use crate::audit::AuditLog;
use crate::crypto::{self, Hash, SigningService};
use crate::error::{Error, Result};
use crate::workflow::model::{
    LegalHold, StepStatus, UserIdentifiers, WorkflowState, WorkflowStatus,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemReceipt {
    pub system: String,
    pub status: StepStatus,
    pub evidence: serde_json::Value,
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalHoldDocument {
    pub system: String,
    pub reason: String,
    pub justification: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactedIdentifiers {
    pub user_id: String,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    Completed,
    CompletedWithExceptions,
}

/// Everything that gets signed. Kept separate from [`CertificateOfDestruction`]
/// so `sign(canonical(CertificateBody))` has an unambiguous input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateBody {
    pub certificate_id: String,
    pub workflow_id: String,
    pub user_identifiers: RedactedIdentifiers,
    pub completed_at: chrono::DateTime<chrono::Utc>,
    pub status: CertificateStatus,
    pub system_receipts: Vec<SystemReceipt>,
    pub legal_holds: Vec<LegalHoldDocument>,
    pub policy_version: String,
    pub data_lineage_snapshot: Option<crate::workflow::model::DataLineageSnapshot>,
    pub audit_hash_root: Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateOfDestruction {
    #[serde(flatten)]
    pub body: CertificateBody,
    pub signature: Vec<u8>,
}

/// Masks the local part of an email, keeping the first and last character
/// and the domain intact: `alice@example.com` -> `a***e@example.com`.
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => format!("{}@{}", mask_middle(local), domain),
        None => mask_middle(email),
    }
}

/// Masks the middle of a phone number, preserving a leading `+<country code>`
/// if present.
pub fn mask_phone(phone: &str) -> String {
    match phone.strip_prefix('+') {
        Some(rest) if rest.len() > 2 => {
            let code_len = 2.min(rest.len().saturating_sub(1));
            let (country_code, remainder) = rest.split_at(code_len);
            format!("+{}{}", country_code, mask_middle(remainder))
        }
        Some(rest) => format!("+{}", mask_middle(rest)),
        None => mask_middle(phone),
    }
}

/// Generic `X***Y` masking: keeps the first and last character of any
/// string at least 2 characters long.
pub fn mask_middle(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    match chars.len() {
        0 => String::new(),
        1 => "*".to_string(),
        len => {
            let first = chars[0];
            let last = chars[len - 1];
            format!("{first}***{last}")
        }
    }
}

fn redact_identifiers(identifiers: &UserIdentifiers) -> RedactedIdentifiers {
    RedactedIdentifiers {
        user_id: mask_middle(&identifiers.user_id),
        emails: identifiers.emails.iter().map(|e| mask_email(e)).collect(),
        phones: identifiers.phones.iter().map(|p| mask_phone(p)).collect(),
        aliases: identifiers.aliases.iter().map(|a| mask_middle(a)).collect(),
    }
}

fn legal_hold_justification(hold: &LegalHold) -> String {
    match hold.expires_at {
        Some(expiry) => format!("{} (expires {})", hold.reason, expiry.to_rfc3339()),
        None => hold.reason.clone(),
    }
}

pub struct CertificateGenerator<'a> {
    pub signing_service: &'a SigningService,
}

impl<'a> CertificateGenerator<'a> {
    pub fn new(signing_service: &'a SigningService) -> Self {
        Self { signing_service }
    }

    /// Refuses to generate a certificate for a workflow that isn't
    /// terminally complete, or whose audit trail fails integrity
    /// verification.
    pub fn generate(&self, state: &WorkflowState, audit_log: &AuditLog, certificate_id: String, completed_at: chrono::DateTime<chrono::Utc>) -> Result<CertificateOfDestruction> {
        if !audit_log.verify_integrity() {
            return Err(Error::new(
                crate::error::ErrorCode::AuditIntegrityError,
                "refusing to generate a certificate over a tampered audit trail",
            ));
        }

        let status = match state.status {
            WorkflowStatus::Completed => CertificateStatus::Completed,
            WorkflowStatus::CompletedWithExceptions => CertificateStatus::CompletedWithExceptions,
            _ => {
                return Err(Error::new(
                    crate::error::ErrorCode::WorkflowStateError,
                    "workflow is not in a completed state",
                ))
            }
        };

        let system_receipts = state
            .steps
            .iter()
            .map(|(system, step)| SystemReceipt {
                system: system.clone(),
                status: step.status,
                evidence: serde_json::to_value(&step.evidence).unwrap_or(serde_json::Value::Null),
                timestamp: step.evidence.timestamp,
            })
            .collect();

        let legal_holds = state
            .legal_holds
            .iter()
            .map(|hold| LegalHoldDocument {
                system: hold.system.clone(),
                reason: hold.reason.clone(),
                justification: legal_hold_justification(hold),
            })
            .collect();

        let body = CertificateBody {
            certificate_id,
            workflow_id: state.workflow_id.clone(),
            user_identifiers: redact_identifiers(&state.user_identifiers),
            completed_at,
            status,
            system_receipts,
            legal_holds,
            policy_version: state.policy_version.clone(),
            data_lineage_snapshot: state.data_lineage_snapshot.clone(),
            audit_hash_root: audit_log.root(),
        };

        let signed_bytes = crypto::canonical(&body).map_err(|e| Error::internal(format!("failed to canonicalize certificate body: {e}")))?;
        let signature = self.signing_service.sign(&signed_bytes);

        Ok(CertificateOfDestruction { body, signature })
    }

    pub fn verify(&self, certificate: &CertificateOfDestruction) -> Result<bool> {
        let signed_bytes = crypto::canonical(&certificate.body).map_err(|e| Error::internal(format!("failed to canonicalize certificate body: {e}")))?;
        Ok(self.signing_service.verify(&signed_bytes, &certificate.signature))
    }
}

/// Structural validity, independent of the signature: every system that had
/// a step carries a receipt, and the certificate names at least one system.
pub fn validate_certificate(certificate: &CertificateOfDestruction) -> (bool, Vec<String>) {
    let mut errors = Vec::new();
    if certificate.body.system_receipts.is_empty() {
        errors.push("certificate has no system receipts".to_string());
    }
    if certificate.body.certificate_id.is_empty() {
        errors.push("certificate_id must not be empty".to_string());
    }
    for receipt in &certificate.body.system_receipts {
        if receipt.system.is_empty() {
            errors.push("system receipt missing system name".to_string());
        }
    }
    (errors.is_empty(), errors)
}
