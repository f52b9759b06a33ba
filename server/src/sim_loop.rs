use crate::config::ServerConfig;
use crate::SharedWorld;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

const OVERRUN_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Run the fixed-step simulation loop. Owns the cadence; the world itself lives behind
/// the shared lock.
///
/// A tick that falls behind is dropped rather than caught up, so simulated time runs
/// slower than wall time under overload. Skipped ticks are counted and reported.
pub async fn run_sim_loop(world: SharedWorld, config: ServerConfig) {
    let dt = config.tick_duration();

    let mut tick_interval = tokio::time::interval(dt);
    tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut expected = Instant::now();
    let mut skipped: u64 = 0;
    let mut last_report = Instant::now();

    loop {
        let fired = tick_interval.tick().await;

        // Skip realigns to the next multiple of dt, so the gap tells how many were lost.
        if fired > expected {
            let lost = (fired - expected).as_nanos() / dt.as_nanos().max(1);
            skipped += lost as u64;
        }
        expected = fired + dt;

        world.lock().tick(dt);

        if skipped > 0 && last_report.elapsed() >= OVERRUN_REPORT_INTERVAL {
            tracing::warn!(skipped, "simulation overrun, ticks dropped");
            skipped = 0;
            last_report = Instant::now();
        }
    }
}
