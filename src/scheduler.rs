//! scheduler.rs — readiness-aware polling policy
//!
//! Polls faster while the system is unhealthy or uncertain, slower once
//! steady-state is reached, and adds bounded jitter to avoid synchronized
//! polling patterns against external echo services.

use std::fmt;

use rand::Rng;

use crate::config::Config;
use crate::readiness::ReadinessState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollSpeed {
    Fast,
    Slow,
}

impl fmt::Display for PollSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollSpeed::Fast => write!(f, "FAST_POLL"),
            PollSpeed::Slow => write!(f, "SLOW_POLL"),
        }
    }
}

/// Concrete scheduling outcome for a single control-loop iteration. All
/// values are precomputed so the supervisor can sleep without re-deriving
/// timing logic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleDecision {
    pub poll_speed: PollSpeed,
    pub base_interval_s: f64,
    pub jitter_s: f64,
    pub sleep_for_s: f64,
}

fn is_fast_state(state: ReadinessState) -> bool {
    matches!(state, ReadinessState::NotReady | ReadinessState::Probing)
}

/// Readiness-aware polling policy. Stateless aside from configuration; safe
/// to call once per control-loop cycle.
pub struct SchedulingPolicy {
    base_interval_s: f64,
    jitter_max_s: f64,
    fast_scalar: f64,
    slow_scalar: f64,
}

impl SchedulingPolicy {
    pub fn new(config: &Config) -> Self {
        Self {
            base_interval_s: config.cycle_interval_s as f64,
            jitter_max_s: config.polling_jitter_s,
            fast_scalar: config.fast_poll_scalar,
            slow_scalar: config.slow_poll_scalar,
        }
    }

    /// Compute the next polling interval, drawing jitter from `rng`. Taking
    /// the RNG by parameter (rather than a global) lets tests seed it
    /// deterministically.
    pub fn next_schedule(
        &self,
        elapsed_s: f64,
        state: ReadinessState,
        rng: &mut impl Rng,
    ) -> ScheduleDecision {
        let poll_speed = if is_fast_state(state) {
            PollSpeed::Fast
        } else {
            PollSpeed::Slow
        };

        let scalar = match poll_speed {
            PollSpeed::Fast => self.fast_scalar,
            PollSpeed::Slow => self.slow_scalar,
        };

        let base_interval_s = (self.base_interval_s * scalar).round();
        let jitter_s = if self.jitter_max_s > 0.0 {
            rng.gen_range(0.0..=self.jitter_max_s)
        } else {
            0.0
        };
        let sleep_for_s = (base_interval_s + jitter_s - elapsed_s).max(0.0);

        ScheduleDecision {
            poll_speed,
            base_interval_s,
            jitter_s,
            sleep_for_s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn policy() -> SchedulingPolicy {
        SchedulingPolicy {
            base_interval_s: 60.0,
            jitter_max_s: 5.0,
            fast_scalar: 0.25,
            slow_scalar: 1.0,
        }
    }

    #[test]
    fn fast_poll_for_not_ready_and_probing() {
        let policy = policy();
        let mut rng = StepRng::new(0, 1);
        let d = policy.next_schedule(0.0, ReadinessState::NotReady, &mut rng);
        assert_eq!(d.poll_speed, PollSpeed::Fast);
        let d = policy.next_schedule(0.0, ReadinessState::Probing, &mut rng);
        assert_eq!(d.poll_speed, PollSpeed::Fast);
    }

    #[test]
    fn slow_poll_for_ready_and_init() {
        let policy = policy();
        let mut rng = StepRng::new(0, 1);
        let d = policy.next_schedule(0.0, ReadinessState::Ready, &mut rng);
        assert_eq!(d.poll_speed, PollSpeed::Slow);
        let d = policy.next_schedule(0.0, ReadinessState::Init, &mut rng);
        assert_eq!(d.poll_speed, PollSpeed::Slow);
    }

    #[test]
    fn sleep_for_never_negative_and_bounded() {
        let policy = policy();
        let mut rng = StepRng::new(u64::MAX / 2, 1);
        let d = policy.next_schedule(10_000.0, ReadinessState::Ready, &mut rng);
        assert!(d.sleep_for_s >= 0.0);

        let d = policy.next_schedule(0.0, ReadinessState::Ready, &mut rng);
        assert!(d.sleep_for_s <= d.base_interval_s + policy.jitter_max_s + 1e-9);
    }

    #[test]
    fn elapsed_time_is_subtracted() {
        let policy = policy();
        let mut rng = StepRng::new(0, 1);
        let d = policy.next_schedule(59.0, ReadinessState::Ready, &mut rng);
        assert!(d.sleep_for_s <= d.base_interval_s + d.jitter_s - 59.0 + 1e-9);
    }
}
