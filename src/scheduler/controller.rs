//! Adaptive throughput control.
//!
//! The governor watches the measured success rate and steers the
//! active-worker budget toward the configured QPS target: 5-sample moving
//! average, a dead band of ±15 pages/sec around the target, ×1.1 / ×0.9
//! steps, and a 30-second freeze after every step so the fleet settles
//! before the next judgment. Without a target the budget is pinned to the
//! full thread count.

use log::info;

use crate::control::Control;

/// Seconds the budget is frozen after an adjustment.
pub const FREEZE_SECS: f64 = 30.0;
/// Samples folded into one moving average.
pub const ACCMU_STEP: u32 = 5;
/// Dead band around the target, in pages/sec.
pub const RATE_BAND: f64 = 15.0;

/// What one observation did to the budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    Increased(f64),
    Decreased(f64),
    Unchanged,
}

/// Budget governor fed by the monitor every sampling window.
pub struct SpeedGovernor {
    qps: Option<f64>,
    total_threads: f64,
    freeze_left: f64,
    samples: u32,
    accum: f64,
}

impl SpeedGovernor {
    #[must_use]
    pub fn new(qps: Option<f64>, total_threads: usize) -> Self {
        Self {
            qps,
            total_threads: total_threads as f64,
            freeze_left: FREEZE_SECS,
            samples: 0,
            accum: 0.0,
        }
    }

    /// Feed one measured rate sample covering `dt` seconds.
    pub fn observe(&mut self, real_speed: f64, dt: f64, control: &Control) -> Adjustment {
        let Some(target) = self.qps else {
            control.set_budget(self.total_threads);
            return Adjustment::Unchanged;
        };

        self.freeze_left -= dt;
        self.samples += 1;
        self.accum += real_speed;
        if self.samples < ACCMU_STEP {
            return Adjustment::Unchanged;
        }
        let avg = self.accum / f64::from(ACCMU_STEP);
        self.samples = 0;
        self.accum = 0.0;

        if self.freeze_left > 0.0 {
            return Adjustment::Unchanged;
        }
        if avg > target + RATE_BAND {
            let budget = control.scale_budget(0.9, self.total_threads);
            self.freeze_left = FREEZE_SECS;
            info!("Decrease crawling speed.");
            Adjustment::Decreased(budget)
        } else if avg < target - RATE_BAND {
            let budget = control.scale_budget(1.1, self.total_threads);
            self.freeze_left = FREEZE_SECS;
            info!("Increase crawling speed.");
            Adjustment::Increased(budget)
        } else {
            Adjustment::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(gov: &mut SpeedGovernor, control: &Control, rate: f64, windows: u32) -> Vec<Adjustment> {
        (0..windows).map(|_| gov.observe(rate, 5.0, control)).collect()
    }

    #[test]
    fn no_target_pins_budget_to_thread_count() {
        let control = Control::new(50.0);
        let mut gov = SpeedGovernor::new(None, 200);
        assert_eq!(gov.observe(0.0, 5.0, &control), Adjustment::Unchanged);
        assert_eq!(control.budget(), 200.0);
    }

    #[test]
    fn overshooting_rate_shrinks_budget() {
        let control = Control::new(100.0);
        let mut gov = SpeedGovernor::new(Some(50.0), 200);
        // 10 windows of 5 s: freeze expires, two averages complete.
        let adjustments = feed(&mut gov, &control, 80.0, 10);
        assert!(adjustments.contains(&Adjustment::Decreased(90.0)));
        assert!(control.budget() < 100.0);
    }

    #[test]
    fn undershooting_rate_grows_budget_to_ceiling() {
        let control = Control::new(190.0);
        let mut gov = SpeedGovernor::new(Some(100.0), 200);
        for _ in 0..40 {
            gov.observe(10.0, 5.0, &control);
        }
        assert_eq!(control.budget(), 200.0);
    }

    #[test]
    fn converged_rate_stops_adjustments() {
        let control = Control::new(100.0);
        let mut gov = SpeedGovernor::new(Some(50.0), 200);
        // Within the ±15 band the budget never moves, freeze or not.
        let adjustments = feed(&mut gov, &control, 55.0, 40);
        assert!(adjustments.iter().all(|a| *a == Adjustment::Unchanged));
        assert_eq!(control.budget(), 100.0);
    }

    #[test]
    fn freeze_window_spaces_out_changes() {
        let control = Control::new(200.0);
        let mut gov = SpeedGovernor::new(Some(10.0), 200);
        let adjustments = feed(&mut gov, &control, 100.0, 20);
        let changes = adjustments
            .iter()
            .filter(|a| !matches!(a, Adjustment::Unchanged))
            .count();
        // 20 windows = 100 s: the averages at 50 s and 100 s land outside a
        // freeze and adjust; the one at 75 s is frozen out.
        assert_eq!(changes, 2);
    }
}
