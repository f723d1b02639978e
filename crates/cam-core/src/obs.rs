//! Structured observability hooks for monitoring lifecycle events.
//!
//! This module provides:
//! - Service-scoped tracing spans via [`monitoring_span`]
//! - Emission functions for monitoring start/stop, collection triggers,
//!   evidence intake and compliance recomputation
//!
//! Events are emitted at `info!` level unless they report a failure.

use tracing::{info, warn};

/// Service-scoped span for work done on behalf of one monitored service.
///
/// Attach it to futures with `tracing::Instrument::instrument`.
pub fn monitoring_span(service_id: &str) -> tracing::Span {
    tracing::info_span!("cam.monitoring", service_id = %service_id)
}

/// Emit event: monitoring started for a service.
pub fn emit_monitoring_started(service_id: &str, controls: usize, modules: usize, period_secs: u64) {
    info!(
        event = "monitoring.started",
        service_id = %service_id,
        controls = controls,
        modules = modules,
        period_secs = period_secs,
    );
}

pub fn emit_monitoring_stopped(service_id: &str) {
    info!(event = "monitoring.stopped", service_id = %service_id);
}

/// Emit event: a collection module was asked to start collecting.
pub fn emit_collection_triggered(service_id: &str, module_id: &str, address: &str) {
    info!(
        event = "collection.triggered",
        service_id = %service_id,
        module_id = %module_id,
        address = %address,
    );
}

/// Emit event: a collection trigger failed; the job stays scheduled.
pub fn emit_collection_failed(service_id: &str, module_id: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "collection.failed",
        service_id = %service_id,
        module_id = %module_id,
        error = %error,
    );
}

pub fn emit_evidence_received(evidence_id: &str, service_id: &str, forwarded: bool) {
    info!(
        event = "evidence.received",
        evidence_id = %evidence_id,
        service_id = %service_id,
        forwarded = forwarded,
    );
}

/// Emit event: an evidence item was dropped from the channel.
pub fn emit_evidence_dropped(evidence_id: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "evidence.dropped", evidence_id = %evidence_id, reason = %reason);
}

/// Emit event: a compliance verdict was recomputed and persisted.
pub fn emit_compliance_calculated(
    service_id: &str,
    control_id: &str,
    status: bool,
    considered: usize,
) {
    info!(
        event = "compliance.calculated",
        service_id = %service_id,
        control_id = %control_id,
        status = status,
        considered = considered,
    );
}

/// Emit event: the assessment result hook failed (warning level).
pub fn emit_hook_error(evidence_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "hook.error", evidence_id = %evidence_id, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitoring_span_enters() {
        let span = monitoring_span("svc-test");
        let _guard = span.enter();
    }
}
