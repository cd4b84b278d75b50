//! controller.rs — the autonomous control-plane agent
//!
//! Owns everything that must survive across cycles: the readiness FSM, the
//! recovery controller, public-IP stability bookkeeping, uptime counters,
//! and the loop counter. `run_cycle` runs the following eight-phase
//! sequence each time it is called:
//!
//! 1. observe raw signals (router, WAN path, public IP)
//! 2. assess readiness (FSM)
//! 3. emit the authoritative verdict
//! 4. reconcile DNS (READY-only)
//! 5. observe + attempt recovery
//! 6. account uptime
//! 7. audit
//! 8. loop telemetry

use std::path::PathBuf;
use std::time::Instant;

use crate::audit::{record_best_effort, AuditRow, AuditSink};
use crate::cache::{UptimeCounters, UptimeStore};
use crate::ddns::{reconcile_dns_if_needed, CloudflareClient};
use crate::error::CycleError;
use crate::probes::{get_public_ip, ping_host, verify_wan_reachability};
use crate::readiness::{ReadinessController, ReadinessState};
use crate::recovery::RecoveryController;
use crate::recovery_policy::RecoveryPolicy;
use crate::telemetry;

const WAN_PROBE_HOST: &str = "1.1.1.1";
const WAN_PROBE_PORT: u16 = 443;
const PROMOTION_CONFIRMATIONS_REQUIRED: u32 = 2;

/// Tracks public-IP continuity to gate `Probing` → `Ready` promotion.
/// Externalized from the FSM so promotion logic stays a pure, deterministic
/// function independent of readiness itself.
#[derive(Debug, Default)]
struct IpStabilityTracker {
    last_ip: Option<String>,
    votes: u32,
}

impl IpStabilityTracker {
    /// Any change or missing IP resets the counter; identical consecutive
    /// observations accrue it. Returns true only once the required number
    /// of consecutive matches has been reached.
    fn observe(&mut self, ip: Option<&str>) -> bool {
        let Some(ip) = ip else {
            self.votes = 0;
            self.last_ip = None;
            return false;
        };

        if self.last_ip.as_deref() == Some(ip) {
            self.votes += 1;
        } else {
            self.votes = 1;
            self.last_ip = Some(ip.to_string());
        }

        self.votes >= PROMOTION_CONFIRMATIONS_REQUIRED
    }

    fn reset(&mut self) {
        self.votes = 0;
        self.last_ip = None;
    }
}

pub struct Controller {
    readiness: ReadinessController,
    prev_readiness: ReadinessState,
    recovery: RecoveryController,
    recovery_policy: RecoveryPolicy,
    cloudflare: CloudflareClient,
    audit: Box<dyn AuditSink>,
    cache_dir: PathBuf,
    uptime_store: UptimeStore,
    uptime: UptimeCounters,

    router_ip: String,
    max_cache_age_s: f64,

    stability: IpStabilityTracker,
    not_ready_streak: u32,
    loop_count: u64,
}

impl Controller {
    pub fn new(
        readiness: ReadinessController,
        recovery: RecoveryController,
        recovery_policy: RecoveryPolicy,
        cloudflare: CloudflareClient,
        audit: Box<dyn AuditSink>,
        cache_dir: PathBuf,
        router_ip: String,
        max_cache_age_s: f64,
    ) -> Self {
        let uptime_store = UptimeStore::new(&cache_dir);
        let uptime = uptime_store.load();

        Self {
            readiness,
            prev_readiness: ReadinessState::Init,
            recovery,
            recovery_policy,
            cloudflare,
            audit,
            cache_dir,
            uptime_store,
            uptime,
            router_ip,
            max_cache_age_s,
            stability: IpStabilityTracker::default(),
            not_ready_streak: 0,
            loop_count: 1,
        }
    }

    pub fn readiness_state(&self) -> ReadinessState {
        self.readiness.state()
    }

    pub async fn run_cycle(&mut self) -> Result<ReadinessState, CycleError> {
        let start = Instant::now();
        let heartbeat = chrono::Local::now().format("%a %b %d %Y").to_string();
        telemetry::emit("🔁", "LOOP", "START", &heartbeat, Some(&format!("loop={}", self.loop_count)));

        // ─── Observe ───
        let lan = ping_host(&self.router_ip).await;
        telemetry::emit(
            if lan.success { "🟢" } else { "🔴" },
            "ROUTER",
            if lan.success { "UP" } else { "DOWN" },
            &format!("ip={}", self.router_ip),
            Some(&format!("rtt={:.0}ms", lan.elapsed_ms)),
        );

        let wan = verify_wan_reachability(WAN_PROBE_HOST, WAN_PROBE_PORT).await;
        telemetry::emit(
            if wan.success { "🟢" } else { "🔴" },
            "WAN_PATH",
            if wan.success { "UP" } else { "DOWN" },
            &format!("dest={WAN_PROBE_HOST}:{WAN_PROBE_PORT}"),
            Some(&format!("rtt={:.0}ms", wan.elapsed_ms)),
        );

        let mut allow_promotion = false;
        let mut public_ip: Option<String> = None;

        if wan.success && self.readiness.state() != ReadinessState::NotReady {
            let public = get_public_ip().await;
            telemetry::emit(
                if public.success { "🟢" } else { "🔴" },
                "PUBLIC_IP",
                if public.success { "OK" } else { "FAIL" },
                &format!("ip={}", public.ip.as_deref().unwrap_or("-")),
                Some(&format!("rtt={:.0}ms", public.elapsed_ms)),
            );

            if public.success && self.readiness.state() == ReadinessState::Probing {
                allow_promotion = self.stability.observe(public.ip.as_deref());
            }
            public_ip = public.ip;
        } else {
            telemetry::emit("🟡", "PUBLIC_IP", "SKIPPED", "-", None);
        }

        // ─── Assess ───
        let prev = self.prev_readiness;
        let readiness = self.readiness.advance(wan.success, allow_promotion);

        if prev != readiness {
            self.log_readiness_change(prev, readiness);
        }

        // ─── Verdict ───
        self.emit_verdict(readiness);

        let entering_not_ready = prev != ReadinessState::NotReady && readiness == ReadinessState::NotReady;
        if entering_not_ready {
            self.stability.reset();
        }
        self.prev_readiness = readiness;

        if readiness == ReadinessState::NotReady {
            self.not_ready_streak += 1;
        } else {
            self.not_ready_streak = 0;
        }

        // ─── Act: DDNS (READY-only) ───
        let mut dns_action = None;
        let mut dns_error = None;
        if readiness == ReadinessState::Ready {
            if !lan.success {
                telemetry::emit("🟡", "ROUTER", "FLAKY", "ICMP unreliable", Some("WAN confirmed healthy"));
            }
            if let Some(ip) = public_ip.as_deref() {
                match reconcile_dns_if_needed(&self.cloudflare, &self.cache_dir, self.max_cache_age_s, ip).await {
                    Ok(()) => dns_action = Some("attempted".to_string()),
                    Err(e) => {
                        dns_action = Some("failed".to_string());
                        dns_error = Some(e);
                    }
                }
            }
        }

        // ─── Recovery ───
        self.recovery.observe(readiness);
        let recovery_triggered = self.recovery.maybe_recover().await;

        // ─── Uptime ───
        self.uptime.total += 1;
        if readiness == ReadinessState::Ready {
            self.uptime.up += 1;
        }
        if let Err(e) = self.uptime_store.store(self.uptime) {
            telemetry::emit("🔴", "UPTIME", "WRITE_FAILED", &e.to_string(), None);
        }

        // ─── Audit ───
        let row = AuditRow {
            timestamp: chrono::Utc::now(),
            loop_count: self.loop_count,
            readiness,
            public_ip,
            dns_action,
            recovery_triggered,
        };
        record_best_effort(self.audit.as_ref(), &row).await;

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        telemetry::emit(
            "🔁",
            "LOOP",
            "COMPLETE",
            &format!("{elapsed_ms:.0}ms"),
            Some(&format!("uptime={}", self.uptime)),
        );

        self.loop_count += 1;

        match dns_error {
            Some(e) => Err(CycleError::Dns(e)),
            None => Ok(readiness),
        }
    }

    fn log_readiness_change(&self, prev: ReadinessState, current: ReadinessState) {
        let transition = format!("{prev} → {current}");
        let meta = if prev == ReadinessState::Probing && current == ReadinessState::Ready {
            Some(format!(
                "confirmations={}/{PROMOTION_CONFIRMATIONS_REQUIRED}",
                self.stability.votes
            ))
        } else {
            None
        };
        telemetry::emit(current.emoji(), "READINESS", "CHANGE", &transition, meta.as_deref());
    }

    fn emit_verdict(&self, readiness: ReadinessState) {
        let (primary, meta) = match readiness {
            ReadinessState::Probing => (
                "gate=HOLD".to_string(),
                if self.stability.votes == 0 {
                    "awaiting confirmation".to_string()
                } else {
                    format!("confirmations={}/{PROMOTION_CONFIRMATIONS_REQUIRED}", self.stability.votes)
                },
            ),
            ReadinessState::NotReady => (
                "observe-only".to_string(),
                format!(
                    "down_count={}/{}",
                    self.not_ready_streak,
                    self.recovery_policy.max_consecutive_down_before_escalation()
                ),
            ),
            _ => (String::new(), String::new()),
        };

        telemetry::emit(
            readiness.emoji(),
            "VERDICT",
            &readiness.to_string(),
            &primary,
            (!meta.is_empty()).then_some(meta.as_str()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stability_resets_on_missing_ip() {
        let mut tracker = IpStabilityTracker::default();
        assert!(!tracker.observe(Some("203.0.113.5")));
        assert!(tracker.observe(Some("203.0.113.5")));
        assert!(!tracker.observe(None));
        assert_eq!(tracker.votes, 0);
    }

    #[test]
    fn stability_resets_on_ip_change() {
        let mut tracker = IpStabilityTracker::default();
        assert!(!tracker.observe(Some("203.0.113.5")));
        assert!(tracker.observe(Some("203.0.113.5")));
        assert!(!tracker.observe(Some("203.0.113.9")));
        assert_eq!(tracker.votes, 1);
    }

    #[test]
    fn stability_requires_two_consecutive_matches() {
        let mut tracker = IpStabilityTracker::default();
        assert!(!tracker.observe(Some("203.0.113.5")));
        assert!(tracker.observe(Some("203.0.113.5")));
    }
}
