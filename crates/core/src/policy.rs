//! Policy engine (§4.D): jurisdiction defaults, versioned policy history,
//! and validation.
//!
//! Policy history is append-only; `createPolicyVersion` stores a new
//! immutable entry and moves a separate "current" pointer. Retention-rule
//! priority ties break on insertion order, since the specification leaves
//! the tie-break unstated (see DESIGN.md).

use crate::workflow::model::Jurisdiction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionRule {
    pub system: String,
    pub retention_days: u32,
    pub priority: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalHoldRule {
    pub system: String,
    pub conditions: String,
    pub max_duration_days: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    pub auto_delete: f64,
    pub manual_review: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub version: String,
    pub jurisdiction: Jurisdiction,
    pub retention_rules: Vec<RetentionRule>,
    pub legal_hold_rules: Vec<LegalHoldRule>,
    pub zombie_check_interval_days: u32,
    pub confidence_thresholds: ConfidenceThresholds,
}

impl PolicyConfig {
    /// Critical steps ordered by retention-rule priority; equal priorities
    /// keep their original (insertion) order, matching `Vec::sort_by`'s
    /// documented stability.
    pub fn systems_by_priority(&self) -> Vec<String> {
        let mut indexed: Vec<(usize, &RetentionRule)> = self.retention_rules.iter().enumerate().collect();
        indexed.sort_by(|(_, a), (_, b)| a.priority.cmp(&b.priority));
        indexed.into_iter().map(|(_, r)| r.system.clone()).collect()
    }

    pub fn retention_rule_for(&self, system: &str) -> Option<&RetentionRule> {
        self.retention_rules.iter().find(|r| r.system == system)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyApplication {
    pub workflow_id: String,
    pub policy_version: String,
    pub jurisdiction: Jurisdiction,
    pub applied_at: chrono::DateTime<chrono::Utc>,
    pub config_snapshot: PolicyConfig,
}

/// Systems every jurisdiction's policy is expected to cover, used by
/// [`validate_policy`] to enforce "every required downstream system has a
/// retention rule".
pub const REQUIRED_SYSTEMS: &[&str] = &["primary_db", "payment", "crm", "analytics_warehouse", "object_store"];

pub fn default_policy_for(jurisdiction: Jurisdiction) -> PolicyConfig {
    let retention_rules: Vec<RetentionRule> = REQUIRED_SYSTEMS
        .iter()
        .enumerate()
        .map(|(i, system)| RetentionRule {
            system: system.to_string(),
            retention_days: 30,
            priority: (i + 1) as u32,
        })
        .collect();

    let (zombie_check_interval_days, auto_delete, manual_review) = match jurisdiction {
        // EU: strictest re-check cadence and lowest bar for automatic deletion.
        Jurisdiction::Eu => (30, 0.75, 0.5),
        Jurisdiction::Us => (60, 0.85, 0.6),
        // OTHER: most conservative thresholds of the three.
        Jurisdiction::Other => (90, 0.9, 0.7),
    };

    PolicyConfig {
        version: "1.0.0".to_string(),
        jurisdiction,
        retention_rules,
        legal_hold_rules: Vec::new(),
        zombie_check_interval_days,
        confidence_thresholds: ConfidenceThresholds { auto_delete, manual_review },
    }
}

#[derive(Debug, Default)]
pub struct PolicyStore {
    /// `(jurisdiction, version) -> PolicyConfig`, append-only.
    history: HashMap<(String, String), PolicyConfig>,
    /// `jurisdiction -> current version`, the only mutable pointer.
    current: HashMap<String, String>,
    applications: HashMap<String, PolicyApplication>,
}

fn jurisdiction_key(j: Jurisdiction) -> String {
    match j {
        Jurisdiction::Eu => "EU".to_string(),
        Jurisdiction::Us => "US".to_string(),
        Jurisdiction::Other => "OTHER".to_string(),
    }
}

fn next_patch(version: &str) -> String {
    let mut parts: Vec<u32> = version.split('.').map(|p| p.parse().unwrap_or(0)).collect();
    while parts.len() < 3 {
        parts.push(0);
    }
    parts[2] += 1;
    format!("{}.{}.{}", parts[0], parts[1], parts[2])
}

impl PolicyStore {
    pub fn new() -> Self {
        let mut store = Self::default();
        for jurisdiction in [Jurisdiction::Eu, Jurisdiction::Us, Jurisdiction::Other] {
            let policy = default_policy_for(jurisdiction);
            let key = jurisdiction_key(jurisdiction);
            store.current.insert(key.clone(), policy.version.clone());
            store.history.insert((key, policy.version.clone()), policy);
        }
        store
    }

    pub fn get_policy_for_jurisdiction(&self, jurisdiction: Jurisdiction) -> Option<&PolicyConfig> {
        let key = jurisdiction_key(jurisdiction);
        let version = self.current.get(&key)?;
        self.history.get(&(key, version.clone()))
    }

    pub fn get_policy_version(&self, version: &str, jurisdiction: Jurisdiction) -> Option<&PolicyConfig> {
        self.history.get(&(jurisdiction_key(jurisdiction), version.to_string()))
    }

    /// Validates, stores the new version in the immutable history, and
    /// repoints `current` for that jurisdiction. Never mutates an existing
    /// history entry.
    pub fn create_policy_version(&mut self, mut policy: PolicyConfig) -> Result<String, Vec<String>> {
        let (ok, errors) = validate_policy(&policy);
        if !ok {
            return Err(errors);
        }
        let key = jurisdiction_key(policy.jurisdiction);
        let base_version = self
            .current
            .get(&key)
            .and_then(|v| self.history.get(&(key.clone(), v.clone())))
            .map(|p| p.version.clone())
            .unwrap_or_else(|| "0.0.0".to_string());
        policy.version = next_patch(&base_version);
        let new_version = policy.version.clone();

        self.history.insert((key.clone(), new_version.clone()), policy);
        self.current.insert(key, new_version.clone());
        Ok(new_version)
    }

    /// Idempotent per workflow: a second call for the same `workflow_id`
    /// leaves the originally recorded application untouched.
    pub fn record_policy_application(&mut self, application: PolicyApplication) -> &PolicyApplication {
        self.applications.entry(application.workflow_id.clone()).or_insert(application)
    }

    pub fn get_policy_application(&self, workflow_id: &str) -> Option<&PolicyApplication> {
        self.applications.get(workflow_id)
    }
}

/// `(ok, errors)`: rejects a policy missing a required retention rule, an
/// `autoDelete` threshold below `manualReview`, or a zombie-check interval
/// under one day.
pub fn validate_policy(policy: &PolicyConfig) -> (bool, Vec<String>) {
    let mut errors = Vec::new();

    for system in REQUIRED_SYSTEMS {
        if policy.retention_rule_for(system).is_none() {
            errors.push(format!("missing retention rule for required system '{system}'"));
        }
    }

    if policy.confidence_thresholds.auto_delete < policy.confidence_thresholds.manual_review {
        errors.push("confidenceThresholds.autoDelete must be >= manualReview".to_string());
    }

    if policy.zombie_check_interval_days < 1 {
        errors.push("zombieCheckInterval must be >= 1 day".to_string());
    }

    for rule in &policy.retention_rules {
        if rule.priority < 1 {
            errors.push(format!("retention rule for '{}' must have priority >= 1", rule.system));
        }
    }

    (errors.is_empty(), errors)
}
