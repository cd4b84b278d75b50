//! audit.rs — best-effort audit trail
//!
//! The original agent persisted cycle outcomes to a Google Sheet for
//! longer-term analysis. That outer surface is named only by the interface
//! the core consumes: an [`AuditSink`] fed one [`AuditRow`] per cycle. A
//! sink's unavailability never blocks or slows the control loop: failures
//! are best-effort, non-blocking, and logged at WARN.

use chrono::{DateTime, Utc};

use crate::error::AuditError;
use crate::readiness::ReadinessState;
use crate::telemetry;

/// One control-cycle's worth of auditable outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRow {
    pub timestamp: DateTime<Utc>,
    pub loop_count: u64,
    pub readiness: ReadinessState,
    pub public_ip: Option<String>,
    pub dns_action: Option<String>,
    pub recovery_triggered: bool,
}

/// Destination for [`AuditRow`]s. Implementations must not block the
/// control loop on slow or unreachable backends — failures are reported to
/// the caller, never panicked on.
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, row: &AuditRow) -> Result<(), AuditError>;
}

/// Default sink: structured log line only. Always available, always
/// succeeds — a safe fallback when no richer sink is configured.
pub struct LoggingAuditSink;

#[async_trait::async_trait]
impl AuditSink for LoggingAuditSink {
    async fn record(&self, row: &AuditRow) -> Result<(), AuditError> {
        telemetry::emit(
            "📝",
            "AUDIT",
            "RECORD",
            &format!("loop={} readiness={}", row.loop_count, row.readiness),
            Some(&format!(
                "ip={} | dns={} | recovery={}",
                row.public_ip.as_deref().unwrap_or("-"),
                row.dns_action.as_deref().unwrap_or("-"),
                row.recovery_triggered
            )),
        );
        Ok(())
    }
}

/// Submit `row` to `sink`, demoting any failure to a warning. Called once
/// per cycle from the controller; never awaited for longer than the sink
/// itself chooses to take, and never allowed to abort the cycle.
pub async fn record_best_effort(sink: &dyn AuditSink, row: &AuditRow) {
    if let Err(e) = sink.record(row).await {
        telemetry::emit("🟡", "AUDIT", "UNAVAILABLE", &e.to_string(), None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    #[async_trait::async_trait]
    impl AuditSink for FailingSink {
        async fn record(&self, _row: &AuditRow) -> Result<(), AuditError> {
            Err(AuditError::Unavailable("backend unreachable".to_string()))
        }
    }

    fn sample_row() -> AuditRow {
        AuditRow {
            timestamp: Utc::now(),
            loop_count: 1,
            readiness: ReadinessState::Ready,
            public_ip: Some("203.0.113.5".to_string()),
            dns_action: Some("NO-OP".to_string()),
            recovery_triggered: false,
        }
    }

    #[tokio::test]
    async fn logging_sink_always_succeeds() {
        let sink = LoggingAuditSink;
        assert!(sink.record(&sample_row()).await.is_ok());
    }

    #[tokio::test]
    async fn failing_sink_never_propagates_past_best_effort_wrapper() {
        let sink = FailingSink;
        record_best_effort(&sink, &sample_row()).await;
    }
}
