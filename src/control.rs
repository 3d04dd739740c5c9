//! Shared runtime control state.
//!
//! One `Control` value is visible to every worker task in a run. It replaces
//! a generic shared dictionary with three typed fields: the adaptive
//! fetch-worker budget, the terminate flag, and the in-flight job count.
//! All access goes through methods; there is no lock to hold across awaits.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Hard floor for the adaptive worker budget.
pub const MIN_BUDGET: f64 = 10.0;

#[derive(Debug)]
struct Inner {
    /// `f64` bit pattern of the active-worker budget.
    budget_bits: AtomicU64,
    terminate: AtomicBool,
    working: AtomicUsize,
}

/// Cloneable handle to the shared runtime context.
#[derive(Debug, Clone)]
pub struct Control {
    inner: Arc<Inner>,
}

impl Control {
    #[must_use]
    pub fn new(initial_budget: f64) -> Self {
        Self {
            inner: Arc::new(Inner {
                budget_bits: AtomicU64::new(initial_budget.max(MIN_BUDGET).to_bits()),
                terminate: AtomicBool::new(false),
                working: AtomicUsize::new(0),
            }),
        }
    }

    /// Current active-worker budget. A fetch slot whose global index is at or
    /// above this value idles instead of taking jobs.
    #[must_use]
    pub fn budget(&self) -> f64 {
        f64::from_bits(self.inner.budget_bits.load(Ordering::Relaxed))
    }

    pub fn set_budget(&self, budget: f64) {
        self.inner
            .budget_bits
            .store(budget.max(MIN_BUDGET).to_bits(), Ordering::Relaxed);
    }

    /// Multiply the budget by `factor`, clamped to `[MIN_BUDGET, ceiling]`.
    /// Returns the new value.
    pub fn scale_budget(&self, factor: f64, ceiling: f64) -> f64 {
        let next = (self.budget() * factor).clamp(MIN_BUDGET, ceiling.max(MIN_BUDGET));
        self.set_budget(next);
        next
    }

    pub fn signal_terminate(&self) {
        self.inner.terminate.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.inner.terminate.load(Ordering::SeqCst)
    }

    pub fn job_started(&self) {
        self.inner.working.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_finished(&self) {
        self.inner.working.fetch_sub(1, Ordering::Relaxed);
    }

    /// Number of jobs currently inside the fetch state machine.
    #[must_use]
    pub fn working(&self) -> usize {
        self.inner.working.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_scaling_respects_floor_and_ceiling() {
        let ctl = Control::new(100.0);
        assert_eq!(ctl.scale_budget(1.1, 105.0), 105.0);
        for _ in 0..100 {
            ctl.scale_budget(0.9, 105.0);
        }
        assert_eq!(ctl.budget(), MIN_BUDGET);
    }

    #[test]
    fn working_counter_tracks_in_flight_jobs() {
        let ctl = Control::new(10.0);
        ctl.job_started();
        ctl.job_started();
        assert_eq!(ctl.working(), 2);
        ctl.job_finished();
        assert_eq!(ctl.working(), 1);
    }

    #[test]
    fn terminate_is_sticky() {
        let ctl = Control::new(10.0);
        assert!(!ctl.is_terminated());
        ctl.signal_terminate();
        assert!(ctl.is_terminated());
        assert!(ctl.clone().is_terminated());
    }
}
