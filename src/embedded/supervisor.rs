//! Deadline Supervisor (embedded frame loop)
//!
//! One ADC sample in, one filter-bank step and one engine frame out, inside
//! a fixed wall-clock budget (~91 µs at 11025 Hz).
//!
//! # Design Notes
//! - An overrun is fatal. The offending frame is discarded, the fixed
//!   fail-safe pattern goes to the sink, and the supervisor stays latched:
//!   every later trigger re-emits that pattern and nothing else. There is no
//!   recovery path short of a restart.
//! - The overrun is reported once, as `EngineError::DeadlineOverrun`.

use crate::control::OutputFrame;
use crate::dsp::FilterBank;
use crate::embedded::timer::{Clock, FrameScheduler};
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::io::FrameSink;
use log::{error, info};
use std::time::Duration;

/// Per-frame budget at 11025 Hz
pub const DEFAULT_BUDGET: Duration = Duration::from_micros(91);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    Running,
    FailSafe,
}

pub struct DeadlineSupervisor<S: FrameSink, C: Clock> {
    engine: Engine,
    bank: FilterBank,
    sink: S,
    clock: C,
    budget: Duration,
    state: SupervisorState,
    fail_safe: OutputFrame,
    frames: u64,
}

impl<S: FrameSink, C: Clock> DeadlineSupervisor<S, C> {
    pub fn new(engine: Engine, bank: FilterBank, sink: S, clock: C, budget: Duration) -> Self {
        let config = engine.config();
        let mut fail_safe = OutputFrame::new(config.num_channels);
        fail_safe.fill(&config.output.fail_safe_levels, config.output.swap);
        info!(
            "supervisor: {} bands -> {} channels, budget {:?}",
            bank.num_bands(),
            config.num_channels,
            budget
        );
        Self {
            engine,
            bank,
            sink,
            clock,
            budget,
            state: SupervisorState::Running,
            fail_safe,
            frames: 0,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn fail_safe_frame(&self) -> &OutputFrame {
        &self.fail_safe
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Run one frame for one input sample.
    pub fn step(&mut self, sample: f32) -> EngineResult<()> {
        self.frames += 1;
        if self.state == SupervisorState::FailSafe {
            return self.sink.emit(&self.fail_safe);
        }

        let start = self.clock.now();
        let spectrum = self.bank.step(sample);
        let frame = self.engine.process(spectrum)?;
        let elapsed = self.clock.now().saturating_duration_since(start);

        if elapsed > self.budget {
            self.state = SupervisorState::FailSafe;
            error!(
                "frame {}: {:?} over the {:?} budget, holding fail-safe output",
                self.frames, elapsed, self.budget
            );
            self.sink.emit(&self.fail_safe)?;
            return Err(EngineError::DeadlineOverrun {
                elapsed,
                budget: self.budget,
            });
        }

        self.sink.emit(frame)
    }

    /// Drive `frames` triggers from `scheduler`, pulling one sample per frame.
    ///
    /// A deadline overrun is logged and the loop carries on in fail-safe;
    /// any other error ends the loop.
    pub fn run<K: Clock>(
        &mut self,
        scheduler: &mut FrameScheduler<K>,
        frames: u64,
        mut next_sample: impl FnMut() -> f32,
    ) -> EngineResult<()> {
        scheduler.start()?;
        for _ in 0..frames {
            scheduler.wait()?;
            match self.step(next_sample()) {
                Ok(()) | Err(EngineError::DeadlineOverrun { .. }) => {}
                Err(e) => {
                    scheduler.stop();
                    return Err(e);
                }
            }
        }
        scheduler.stop();
        Ok(())
    }
}
