//! recovery.rs — physical recovery orchestrator
//!
//! Responsibilities: track sustained `NotReady` conditions, enforce
//! escalation thresholds and cooldown guardrails, execute a single physical
//! recovery action when permitted, and emit clear, operator-grade
//! telemetry. Recovery is edge-triggered, never periodic — success of the
//! command sequence is not success of the remediation; the next cycle's
//! readiness is the ground truth.

use std::time::Instant;

use tokio::time::sleep;

use crate::probes::{ping_host, smart_relay_command};
use crate::readiness::ReadinessState;
use crate::recovery_policy::RecoveryPolicy;
use crate::telemetry;

pub struct RecoveryController {
    policy: RecoveryPolicy,
    allow_physical_recovery: bool,
    plug_ip: String,
    not_ready_streak: u32,
    last_recovery_time: Option<Instant>,
}

impl RecoveryController {
    pub fn new(policy: RecoveryPolicy, allow_physical_recovery: bool, plug_ip: String) -> Self {
        Self {
            policy,
            allow_physical_recovery,
            plug_ip,
            not_ready_streak: 0,
            last_recovery_time: None,
        }
    }

    pub fn not_ready_streak(&self) -> u32 {
        self.not_ready_streak
    }

    /// Observe the latest readiness verdict and update the internal streak.
    pub fn observe(&mut self, readiness: ReadinessState) {
        if readiness == ReadinessState::NotReady {
            self.not_ready_streak += 1;
        } else {
            self.not_ready_streak = 0;
        }
    }

    /// Attempt recovery if escalation thresholds are met and permitted.
    /// Returns `true` only if a power-cycle command sequence completed.
    pub async fn maybe_recover(&mut self) -> bool {
        if !self.allow_physical_recovery {
            self.emit_suppressed("disabled by config", None);
            return false;
        }

        if !ping_host(&self.plug_ip).await.success {
            self.emit_suppressed("smart plug unavailable", None);
            return false;
        }

        if self.not_ready_streak < self.policy.max_consecutive_down_before_escalation() {
            return false;
        }

        let now = Instant::now();
        if let Some(last) = self.last_recovery_time {
            let since_last = now.duration_since(last).as_secs();
            if since_last < self.policy.recovery_cooldown_s() {
                self.emit_suppressed(
                    "cooldown active",
                    Some(format!(
                        "last_attempt={since_last}s | window={}s",
                        self.policy.recovery_cooldown_s()
                    )),
                );
                return false;
            }
        }

        self.execute_recovery(now).await
    }

    async fn execute_recovery(&mut self, now: Instant) -> bool {
        telemetry::emit(
            "🔴",
            "RECOVERY",
            "TRIGGER",
            "power-cycle edge device",
            Some(&format!(
                "reboot_delay={}s",
                self.policy.reboot_settle_delay_s()
            )),
        );

        let success = self.power_cycle_edge().await;

        telemetry::emit(
            if success { "🟢" } else { "🔴" },
            "RECOVERY",
            if success { "COMPLETE" } else { "FAILED" },
            "power-cycle attempt",
            None,
        );

        if success {
            self.last_recovery_time = Some(now);
            self.not_ready_streak = 0;
        }

        success
    }

    /// A single OFF → delay → ON power cycle of the edge device. LAN-only,
    /// fast-fail semantics (no retries); success means the commands were
    /// issued, not that the device came back online.
    async fn power_cycle_edge(&self) -> bool {
        if let Err(e) = smart_relay_command(&self.plug_ip, false).await {
            telemetry::emit("🔴", "RECOVERY", "FAILED", "power OFF failed", Some(&e));
            return false;
        }

        sleep(std::time::Duration::from_secs(
            self.policy.reboot_settle_delay_s(),
        ))
        .await;

        if let Err(e) = smart_relay_command(&self.plug_ip, true).await {
            telemetry::emit("🔴", "RECOVERY", "FAILED", "power ON failed", Some(&e));
            return false;
        }

        true
    }

    fn emit_suppressed(&self, reason: &str, meta: Option<String>) {
        let meta = meta.unwrap_or_else(|| format!("down_count={}", self.not_ready_streak));
        telemetry::emit("🟡", "RECOVERY", "SUPPRESSED", reason, Some(&meta));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_with_threshold(threshold_cycles: u32) -> RecoveryPolicy {
        // fast_poll_nominal_interval_s = cycle_interval_s * fast_poll_scalar = 10 * 1 = 10
        // escalation_delay_s = expected_network_recovery_s + escalation_buffer_s
        // threshold = ceil(escalation_delay_s / 10)
        let escalation_delay = (threshold_cycles * 10) as f64;
        RecoveryPolicyTestBuilder {
            cycle_interval_s: 10.0,
            fast_poll_scalar: 1.0,
            expected_network_recovery_s: escalation_delay,
            escalation_buffer_s: 0.0,
            reboot_settle_delay_s: 0,
            recovery_cooldown_s: 0,
        }
        .build()
    }

    // RecoveryPolicy's fields are private; this mirrors its constructor
    // shape via `Config` in integration tests. For pure unit tests of
    // `RecoveryController`, a tiny local builder keeps the test focused on
    // the controller's own guard logic rather than config plumbing.
    struct RecoveryPolicyTestBuilder {
        cycle_interval_s: f64,
        fast_poll_scalar: f64,
        expected_network_recovery_s: f64,
        escalation_buffer_s: f64,
        reboot_settle_delay_s: u64,
        recovery_cooldown_s: u64,
    }

    impl RecoveryPolicyTestBuilder {
        fn build(self) -> RecoveryPolicy {
            crate::recovery_policy::RecoveryPolicy::from_parts(
                self.cycle_interval_s,
                self.fast_poll_scalar,
                self.expected_network_recovery_s,
                self.escalation_buffer_s,
                self.reboot_settle_delay_s,
                self.recovery_cooldown_s,
            )
        }
    }

    #[tokio::test]
    async fn suppressed_when_disabled_by_config() {
        let policy = policy_with_threshold(3);
        let mut controller = RecoveryController::new(policy, false, "10.0.0.1".to_string());
        controller.not_ready_streak = 10;
        assert!(!controller.maybe_recover().await);
        assert_eq!(controller.last_recovery_time, None);
    }

    #[test]
    fn streak_increments_only_on_not_ready() {
        let policy = policy_with_threshold(3);
        let mut controller = RecoveryController::new(policy, true, "10.0.0.1".to_string());
        controller.observe(ReadinessState::NotReady);
        controller.observe(ReadinessState::NotReady);
        assert_eq!(controller.not_ready_streak(), 2);
        controller.observe(ReadinessState::Ready);
        assert_eq!(controller.not_ready_streak(), 0);
    }
}
