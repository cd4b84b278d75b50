//! readiness.rs — monotonic readiness gate for network-driven side effects
//!
//! Single source of truth for "is it safe to act?". Conservative by design:
//! readiness must be earned, and any verified WAN failure demotes
//! immediately (fail-fast).

use std::fmt;

/// Readiness classifications used to gate network-dependent side effects.
///
/// Invariants:
/// - Promotions are monotonic (`Init`/`NotReady` → `Probing` → `Ready`).
/// - Any verified failure forces `NotReady`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    Init,
    Probing,
    Ready,
    NotReady,
}

impl ReadinessState {
    /// Emoji used in telemetry lines for this state.
    pub fn emoji(self) -> &'static str {
        match self {
            ReadinessState::Init => "⚪",
            ReadinessState::Probing => "🟡",
            ReadinessState::Ready => "💚",
            ReadinessState::NotReady => "🔴",
        }
    }
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadinessState::Init => "INIT",
            ReadinessState::Probing => "PROBING",
            ReadinessState::Ready => "READY",
            ReadinessState::NotReady => "NOT_READY",
        };
        f.write_str(name)
    }
}

/// Monotonic readiness gate. Holds no counters, no timers, no I/O — it only
/// reasons about the two booleans handed to it each cycle.
#[derive(Debug, Clone)]
pub struct ReadinessController {
    state: ReadinessState,
}

impl Default for ReadinessController {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessController {
    pub fn new() -> Self {
        Self {
            state: ReadinessState::Init,
        }
    }

    pub fn state(&self) -> ReadinessState {
        self.state
    }

    /// Advance the readiness FSM by one evaluation cycle.
    ///
    /// - Any WAN failure → `NotReady`.
    /// - Promotions are sequential (`Init`/`NotReady` → `Probing` → `Ready`).
    /// - `Probing` is observational only.
    /// - Promotion to `Ready` is externally gated by `allow_promotion`.
    pub fn advance(&mut self, wan_path_ok: bool, allow_promotion: bool) -> ReadinessState {
        if !wan_path_ok {
            self.state = ReadinessState::NotReady;
            return self.state;
        }

        self.state = match self.state {
            ReadinessState::Init | ReadinessState::NotReady => ReadinessState::Probing,
            ReadinessState::Probing if allow_promotion => ReadinessState::Ready,
            other => other,
        };

        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_init() {
        let fsm = ReadinessController::new();
        assert_eq!(fsm.state(), ReadinessState::Init);
    }

    #[test]
    fn never_jumps_directly_from_not_ready_to_ready() {
        let mut fsm = ReadinessController::new();
        fsm.advance(false, true); // -> NotReady
        assert_eq!(fsm.state(), ReadinessState::NotReady);
        let next = fsm.advance(true, true); // allow_promotion is irrelevant outside Probing
        assert_eq!(next, ReadinessState::Probing);
    }

    #[test]
    fn promotion_requires_probing_and_allow_promotion() {
        let mut fsm = ReadinessController::new();
        fsm.advance(true, false); // Init -> Probing
        assert_eq!(fsm.state(), ReadinessState::Probing);
        fsm.advance(true, false); // stays Probing, not promoted
        assert_eq!(fsm.state(), ReadinessState::Probing);
        fsm.advance(true, true); // Probing -> Ready
        assert_eq!(fsm.state(), ReadinessState::Ready);
    }

    #[test]
    fn ready_is_a_fixed_point_until_failure() {
        let mut fsm = ReadinessController::new();
        fsm.advance(true, false);
        fsm.advance(true, true);
        assert_eq!(fsm.state(), ReadinessState::Ready);
        fsm.advance(true, false);
        assert_eq!(fsm.state(), ReadinessState::Ready);
        fsm.advance(false, false);
        assert_eq!(fsm.state(), ReadinessState::NotReady);
    }

    #[test]
    fn single_failure_demotes_fail_fast() {
        let mut fsm = ReadinessController::new();
        fsm.advance(true, false);
        fsm.advance(true, true);
        assert_eq!(fsm.state(), ReadinessState::Ready);
        let next = fsm.advance(false, true);
        assert_eq!(next, ReadinessState::NotReady);
    }
}
