//! Cooperative cancellation for a single run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::runtime::interpreter::Interrupt;

/// Steps between two clock reads.
const CHECK_INTERVAL: u32 = 1024;

/// Wall-clock deadline plus a cancellation flag shared with the harness.
pub struct Budget {
    deadline: Option<Instant>,
    cancel: Arc<AtomicBool>,
    ticks: u32,
}

impl Budget {
    pub fn new(deadline: Option<Instant>, cancel: Arc<AtomicBool>) -> Self {
        Self {
            deadline,
            cancel,
            ticks: 0,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None, Arc::new(AtomicBool::new(false)))
    }

    /// Counts one evaluation step; every [`CHECK_INTERVAL`] steps the flag and clock are consulted.
    pub fn tick(&mut self) -> Result<(), Interrupt> {
        self.ticks = self.ticks.wrapping_add(1);
        if self.ticks % CHECK_INTERVAL != 0 {
            return Ok(());
        }
        self.check()
    }

    pub fn check(&self) -> Result<(), Interrupt> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(Interrupt::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Interrupt::Timeout),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn expired_deadline_interrupts_on_check() {
        let budget = Budget::new(
            Some(Instant::now() - Duration::from_millis(1)),
            Arc::new(AtomicBool::new(false)),
        );
        assert!(matches!(budget.check(), Err(Interrupt::Timeout)));
    }

    #[test]
    fn cancellation_wins_over_deadline() {
        let flag = Arc::new(AtomicBool::new(true));
        let mut budget = Budget::new(None, flag);
        let outcome = (0..CHECK_INTERVAL).try_for_each(|_| budget.tick());
        assert!(matches!(outcome, Err(Interrupt::Cancelled)));
    }
}
