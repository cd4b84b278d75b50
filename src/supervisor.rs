//! supervisor.rs — the forever-loop driving the control-plane agent
//!
//! Runs `Controller::run_cycle` on the readiness-aware schedule computed by
//! [`crate::scheduler`] — every fallible step inside a cycle is already
//! folded into telemetry by the controller itself, so a single bad cycle
//! never kills the process — and flags sleep anomalies that would indicate
//! the host itself is under load or suspended.

use tokio::time::{sleep, Duration};

use crate::controller::Controller;
use crate::scheduler::SchedulingPolicy;
use crate::telemetry;

/// Drive `controller` forever, sleeping on the schedule `policy` computes
/// from each cycle's resulting readiness state. Never returns under normal
/// operation.
pub async fn run_forever(mut controller: Controller, policy: SchedulingPolicy) -> ! {
    let mut rng = rand::thread_rng();

    loop {
        let cycle_start = std::time::Instant::now();
        let readiness = match controller.run_cycle().await {
            Ok(readiness) => readiness,
            Err(e) => {
                telemetry::emit("🔴", "LOOP", "ERROR", &e.to_string(), None);
                controller.readiness_state()
            }
        };
        let elapsed_s = cycle_start.elapsed().as_secs_f64();

        let decision = policy.next_schedule(elapsed_s, readiness, &mut rng);

        telemetry::emit(
            "⏱️",
            "SCHEDULER",
            &decision.poll_speed.to_string(),
            &format!("sleep={:.1}s", decision.sleep_for_s),
            Some(&format!("base={:.0}s | jitter={:.1}s", decision.base_interval_s, decision.jitter_s)),
        );

        let anomaly_threshold_s = decision.sleep_for_s * 1.10;
        let sleep_start = std::time::Instant::now();
        sleep(Duration::from_secs_f64(decision.sleep_for_s)).await;
        let actual_sleep_s = sleep_start.elapsed().as_secs_f64();

        if actual_sleep_s > anomaly_threshold_s {
            telemetry::emit(
                "🟡",
                "SCHEDULER",
                "SLEEP_ANOMALY",
                &format!("actual={actual_sleep_s:.1}s"),
                Some(&format!("expected<={anomaly_threshold_s:.1}s")),
            );
        }
    }
}
