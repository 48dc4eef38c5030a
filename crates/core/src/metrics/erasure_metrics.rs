//! Prometheus metrics for workflow and step throughput, registered through
//! [`MetricsRegistry`](super::MetricsRegistry).

use super::MetricsRegistry;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts};

#[derive(Debug, Clone)]
pub struct ErasureMetrics {
    pub workflows_created: IntCounter,
    pub workflows_completed: IntCounter,
    pub workflows_completed_with_exceptions: IntCounter,
    pub workflows_awaiting_manual_review: IntCounter,
    pub steps_deleted: IntCounterVec,
    pub steps_failed: IntCounterVec,
    pub legal_holds_active: IntGauge,
    pub zombie_checks_positive: IntCounter,
    pub zombie_checks_negative: IntCounter,
}

impl ErasureMetrics {
    pub fn new(registry: &MetricsRegistry) -> Self {
        let workflows_created = IntCounter::new("workflows_created_total", "erasure workflows admitted")
            .expect("static metric options are valid");
        let workflows_completed = IntCounter::new("workflows_completed_total", "erasure workflows fully completed")
            .expect("static metric options are valid");
        let workflows_completed_with_exceptions = IntCounter::new(
            "workflows_completed_with_exceptions_total",
            "erasure workflows completed with at least one failed step",
        )
        .expect("static metric options are valid");
        let workflows_awaiting_manual_review = IntCounter::new(
            "workflows_awaiting_manual_review_total",
            "erasure workflows halted pending manual review",
        )
        .expect("static metric options are valid");
        let steps_deleted = IntCounterVec::new(
            Opts::new("steps_deleted_total", "steps that reached Deleted, by system"),
            &["system"],
        )
        .expect("static metric options are valid");
        let steps_failed = IntCounterVec::new(
            Opts::new("steps_failed_total", "steps that reached Failed, by system"),
            &["system"],
        )
        .expect("static metric options are valid");
        let legal_holds_active = IntGauge::new("legal_holds_active", "legal holds currently in effect")
            .expect("static metric options are valid");
        let zombie_checks_positive = IntCounter::new("zombie_checks_positive_total", "zombie checks that found residual data")
            .expect("static metric options are valid");
        let zombie_checks_negative = IntCounter::new("zombie_checks_negative_total", "zombie checks that found nothing")
            .expect("static metric options are valid");

        let _ = registry.register(workflows_created.clone());
        let _ = registry.register(workflows_completed.clone());
        let _ = registry.register(workflows_completed_with_exceptions.clone());
        let _ = registry.register(workflows_awaiting_manual_review.clone());
        let _ = registry.register(steps_deleted.clone());
        let _ = registry.register(steps_failed.clone());
        let _ = registry.register(legal_holds_active.clone());
        let _ = registry.register(zombie_checks_positive.clone());
        let _ = registry.register(zombie_checks_negative.clone());

        Self {
            workflows_created,
            workflows_completed,
            workflows_completed_with_exceptions,
            workflows_awaiting_manual_review,
            steps_deleted,
            steps_failed,
            legal_holds_active,
            zombie_checks_positive,
            zombie_checks_negative,
        }
    }
}
