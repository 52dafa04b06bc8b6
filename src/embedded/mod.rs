//! Embedded runtime: frame trigger, one-shot timer, deadline supervision.

pub mod supervisor;
pub mod timer;

pub use supervisor::{DeadlineSupervisor, SupervisorState, DEFAULT_BUDGET};
pub use timer::{Clock, FrameScheduler, OneShotTimer, SystemClock};
