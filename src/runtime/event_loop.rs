//! Deterministic per-run event loop.
//!
//! Microtasks (promise reactions, `queueMicrotask`) drain completely after the script and
//! after every timer callback. Timers are ordered by virtual due time, then by the order they
//! were scheduled; the clock jumps straight to the next due timer.

use std::collections::{BTreeMap, HashMap, VecDeque};

use tracing::trace;

use crate::runtime::interpreter::{Eval, Interpreter, Interrupt, Thrown};
use crate::runtime::value::{ObjectKind, ObjectRef, PromiseState, Value};

/// Milliseconds since the epoch at virtual time zero, so `Date.now()` looks plausible.
pub const EPOCH_OFFSET_MS: f64 = 1_700_000_000_000.0;

pub enum Job {
    /// Runs a promise reaction handler and settles the derived promise with its outcome.
    Reaction {
        handler: Option<Value>,
        argument: Value,
        derived: Option<ObjectRef>,
        rejected: bool,
    },
    /// Adopts the state of a thenable passed to a resolve function.
    ResolveThenable {
        promise: ObjectRef,
        thenable: Value,
        then: Value,
    },
    Callback {
        callback: Value,
        args: Vec<Value>,
    },
}

pub struct Timer {
    pub callback: Value,
    pub args: Vec<Value>,
    /// Repeat period for `setInterval`.
    pub interval: Option<u64>,
}

#[derive(Default)]
pub struct EventLoop {
    microtasks: VecDeque<Job>,
    timers: BTreeMap<(u64, u64), (u32, Timer)>,
    due: HashMap<u32, (u64, u64)>,
    now: u64,
    next_id: u32,
    sequence: u64,
    /// Interval whose callback is running; clearing it stops the reschedule.
    running: Option<(u32, bool)>,
    rejections: Vec<ObjectRef>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Virtual milliseconds elapsed since the run started.
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn enqueue(&mut self, job: Job) {
        self.microtasks.push_back(job);
    }

    pub fn schedule(&mut self, callback: Value, args: Vec<Value>, delay: u64, repeat: bool) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        let timer = Timer {
            callback,
            args,
            interval: repeat.then_some(delay),
        };
        self.insert(id, timer, delay);
        id
    }

    fn insert(&mut self, id: u32, timer: Timer, delay: u64) {
        let key = (self.now + delay, self.sequence);
        self.sequence += 1;
        self.timers.insert(key, (id, timer));
        self.due.insert(id, key);
    }

    pub fn clear(&mut self, id: u32) {
        if let Some(key) = self.due.remove(&id) {
            self.timers.remove(&key);
        }
        if let Some((running, cleared)) = &mut self.running {
            if *running == id {
                *cleared = true;
            }
        }
    }

    fn pop_timer(&mut self) -> Option<(u32, Timer)> {
        let key = *self.timers.keys().next()?;
        let (id, timer) = self.timers.remove(&key)?;
        self.due.remove(&id);
        self.now = self.now.max(key.0);
        Some((id, timer))
    }

    pub fn track_rejection(&mut self, promise: &ObjectRef) {
        self.rejections.push(promise.clone());
    }

    pub fn has_pending_work(&self) -> bool {
        !self.microtasks.is_empty() || !self.timers.is_empty()
    }
}

/// Clamps a timer delay argument the way Node does: non-numbers and values below one become one.
pub fn timer_delay(delay: f64) -> u64 {
    if delay.is_nan() || !(1.0..=i32::MAX as f64).contains(&delay) {
        1
    } else {
        delay.trunc() as u64
    }
}

impl Interpreter {
    /// Drains microtasks, then fires timers in due order until nothing is left.
    pub fn run_event_loop(&mut self) -> Eval<()> {
        loop {
            self.drain_microtasks()?;
            self.check_unhandled_rejections()?;
            let Some((id, timer)) = self.event_loop.pop_timer() else {
                return Ok(());
            };
            self.budget.check()?;
            trace!(id, now = self.event_loop.now(), "firing timer");

            if timer.interval.is_some() {
                self.event_loop.running = Some((id, false));
            }
            let result = self.call(&timer.callback, Value::Undefined, &timer.args);
            if let (Some(period), Some((_, false))) = (timer.interval, self.event_loop.running.take()) {
                self.event_loop.insert(id, timer, period);
            }
            result?;
        }
    }

    fn drain_microtasks(&mut self) -> Eval<()> {
        while let Some(job) = self.event_loop.microtasks.pop_front() {
            self.budget.tick()?;
            self.run_job(job)?;
        }
        Ok(())
    }

    fn run_job(&mut self, job: Job) -> Eval<()> {
        match job {
            Job::Reaction {
                handler,
                argument,
                derived,
                rejected,
            } => {
                let outcome = match handler {
                    Some(handler) => match self.call(&handler, Value::Undefined, &[argument]) {
                        Ok(value) => Ok(value),
                        Err(Interrupt::Throw(thrown)) => Err(thrown.value),
                        Err(other) => return Err(other),
                    },
                    None if rejected => Err(argument),
                    None => Ok(argument),
                };
                if let Some(derived) = derived {
                    match outcome {
                        Ok(value) => self.resolve_promise(&derived, value)?,
                        Err(reason) => self.reject_promise(&derived, reason),
                    }
                }
                Ok(())
            }
            Job::ResolveThenable {
                promise,
                thenable,
                then,
            } => {
                let (resolve, reject) = self.resolving_functions(&promise);
                match self.call(&then, thenable, &[resolve, reject.clone()]) {
                    Ok(_) => Ok(()),
                    Err(Interrupt::Throw(thrown)) => {
                        self.call(&reject, Value::Undefined, &[thrown.value])?;
                        Ok(())
                    }
                    Err(other) => Err(other),
                }
            }
            Job::Callback { callback, args } => {
                self.call(&callback, Value::Undefined, &args)?;
                Ok(())
            }
        }
    }

    /// Fails the run with the first rejection that still has no handler.
    fn check_unhandled_rejections(&mut self) -> Eval<()> {
        let rejections = std::mem::take(&mut self.event_loop.rejections);
        for promise in rejections {
            let reason = match &promise.borrow().kind {
                ObjectKind::Promise(data) if !data.handled => match &data.state {
                    PromiseState::Rejected(reason) => Some((reason.clone(), data.rejected_at)),
                    _ => None,
                },
                _ => None,
            };
            if let Some((value, span)) = reason {
                return Err(Interrupt::Throw(Thrown {
                    value,
                    span,
                    unhandled_rejection: true,
                }));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_fire_by_due_time_then_schedule_order() {
        let mut event_loop = EventLoop::new();
        let late = event_loop.schedule(Value::from("late"), vec![], 100, false);
        let first = event_loop.schedule(Value::from("first"), vec![], 10, false);
        let second = event_loop.schedule(Value::from("second"), vec![], 10, false);
        let order: Vec<u32> = std::iter::from_fn(|| event_loop.pop_timer().map(|(id, _)| id)).collect();
        assert_eq!(order, vec![first, second, late]);
        assert_eq!(event_loop.now(), 100);
    }

    #[test]
    fn cleared_timers_never_fire() {
        let mut event_loop = EventLoop::new();
        let id = event_loop.schedule(Value::Undefined, vec![], 5, false);
        event_loop.clear(id);
        assert!(event_loop.pop_timer().is_none());
        assert!(!event_loop.has_pending_work());
    }

    #[test]
    fn delays_are_clamped() {
        assert_eq!(timer_delay(0.0), 1);
        assert_eq!(timer_delay(f64::NAN), 1);
        assert_eq!(timer_delay(25.9), 25);
    }
}
