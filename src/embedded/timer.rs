//! Cooperative one-shot timer and the fixed-rate frame trigger built on it.
//!
//! # Design Notes
//! - At most one callback is pending per timer; scheduling a second one is an
//!   error (`EngineError::TimerBusy`), not a silent overwrite
//! - The timer never reads a clock itself; callers pass `now`, which keeps it
//!   usable from an interrupt-style poll loop and trivially testable

use crate::error::{EngineError, EngineResult};
use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Monotonic time source.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Wait until `deadline`. Returns immediately if it has passed.
    fn sleep_until(&self, deadline: Instant) {
        let now = self.now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct Pending {
    due: Instant,
    callback: Box<dyn FnOnce()>,
}

/// Single-pending-callback timer.
#[derive(Default)]
pub struct OneShotTimer {
    pending: Option<Pending>,
}

impl OneShotTimer {
    pub fn new() -> Self {
        Self { pending: None }
    }

    /// Arm the timer to run `callback` once `delay` after `now`.
    pub fn schedule(
        &mut self,
        now: Instant,
        delay: Duration,
        callback: impl FnOnce() + 'static,
    ) -> EngineResult<()> {
        if self.pending.is_some() {
            return Err(EngineError::TimerBusy);
        }
        self.pending = Some(Pending {
            due: now + delay,
            callback: Box::new(callback),
        });
        Ok(())
    }

    /// Run the pending callback if it is due. Returns `true` if it ran.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.pending.take() {
            Some(p) if now >= p.due => {
                (p.callback)();
                true
            }
            other => {
                self.pending = other;
                false
            }
        }
    }

    /// Drop the pending callback without running it.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn due(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.due)
    }
}

// =============================================================================
// Frame Scheduler
// =============================================================================

/// Fixed-rate frame trigger.
///
/// Each trigger re-arms the timer for the next slot on the ideal grid
/// (`start + k * period`), so late wake-ups do not accumulate drift.
pub struct FrameScheduler<C: Clock> {
    clock: C,
    timer: OneShotTimer,
    period: Duration,
    next_slot: Instant,
    fired: Rc<Cell<bool>>,
    triggers: u64,
}

impl<C: Clock> FrameScheduler<C> {
    pub fn new(clock: C, period: Duration) -> Self {
        let now = clock.now();
        Self {
            clock,
            timer: OneShotTimer::new(),
            period,
            next_slot: now,
            fired: Rc::new(Cell::new(false)),
            triggers: 0,
        }
    }

    /// `1 / rate` seconds per frame.
    pub fn from_rate(clock: C, frames_per_second: f32) -> Self {
        let period = Duration::from_secs_f64(1.0 / frames_per_second.max(f32::EPSILON) as f64);
        Self::new(clock, period)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn triggers(&self) -> u64 {
        self.triggers
    }

    /// Arm the first trigger one period from now.
    pub fn start(&mut self) -> EngineResult<()> {
        let now = self.clock.now();
        self.next_slot = now + self.period;
        self.arm(now)
    }

    fn arm(&mut self, now: Instant) -> EngineResult<()> {
        let fired = Rc::clone(&self.fired);
        let delay = self.next_slot.saturating_duration_since(now);
        self.timer.schedule(now, delay, move || fired.set(true))
    }

    /// Non-blocking: `true` if a frame is due now. Re-arms for the next slot.
    pub fn poll(&mut self) -> EngineResult<bool> {
        let now = self.clock.now();
        if !self.timer.poll(now) || !self.fired.replace(false) {
            return Ok(false);
        }
        self.triggers += 1;
        self.next_slot += self.period;
        self.arm(now)?;
        Ok(true)
    }

    /// Block until the next frame is due.
    pub fn wait(&mut self) -> EngineResult<()> {
        if !self.timer.is_pending() {
            self.start()?;
        }
        loop {
            if self.poll()? {
                return Ok(());
            }
            if let Some(due) = self.timer.due() {
                self.clock.sleep_until(due);
            }
        }
    }

    pub fn stop(&mut self) {
        self.timer.cancel();
        self.fired.set(false);
    }
}
