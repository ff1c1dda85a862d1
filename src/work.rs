//! Cooperative cancellation for long-running solves.
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Shared flag a solver polls between nonces.
#[derive(Debug)]
pub struct StopFlag {
    stop: AtomicBool,
}

impl StopFlag {
    pub const fn new() -> Self {
        Self {
            stop: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    pub fn force_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

impl Default for StopFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a [`StopCheck`] asked the solver to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    TimedOut,
}

/// Combines any number of stop flags with an optional deadline.
#[derive(Debug)]
pub(crate) struct StopCheck<'a> {
    flags: Vec<&'a StopFlag>,
    deadline: Option<Instant>,
}

impl<'a> StopCheck<'a> {
    pub(crate) fn new(flags: Vec<&'a StopFlag>, timeout: Option<Duration>) -> Self {
        Self {
            flags,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    pub(crate) fn reason(&self) -> Option<StopReason> {
        if self.flags.iter().any(|flag| flag.should_stop()) {
            return Some(StopReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(StopReason::TimedOut),
            _ => None,
        }
    }
}
