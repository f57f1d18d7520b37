//! Progress notices for in-flight completions
//!
//! Schedules cosmetic "still working" notices at fixed delays after a
//! request starts. The schedule is cancelled the moment the first delta
//! arrives. No timeout is enforced here.

use tokio::time::{Duration, Instant};

use crate::config::ProgressSettings;

const NOTICES: &[&str] = &[
    "Still working on it...",
    "This is taking a little longer than usual...",
    "Waiting on the provider to respond...",
];

/// A notice that has come due
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub message: String,
    pub elapsed_secs: u64,
}

/// Tracks which notices have fired for one request
pub struct ProgressNotices {
    started: Instant,
    delays: Vec<Duration>,
    fired: usize,
    cancelled: bool,
}

impl ProgressNotices {
    /// Start the schedule at `started`
    pub fn new(settings: &ProgressSettings, started: Instant) -> Self {
        let mut delays: Vec<Duration> = settings
            .delays_secs
            .iter()
            .map(|s| Duration::from_secs(*s))
            .collect();
        delays.sort();

        Self {
            started,
            delays,
            fired: 0,
            cancelled: false,
        }
    }

    /// When the next notice is due, if any remain
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.cancelled {
            return None;
        }
        self.delays.get(self.fired).map(|d| self.started + *d)
    }

    /// Fire the next notice
    pub fn fire(&mut self) -> Option<Notice> {
        if self.cancelled {
            return None;
        }
        let delay = *self.delays.get(self.fired)?;
        let message = NOTICES[self.fired.min(NOTICES.len() - 1)].to_string();
        self.fired += 1;

        Some(Notice {
            message,
            elapsed_secs: delay.as_secs(),
        })
    }

    /// Stop the schedule (first delta arrived)
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Get the number of notices fired so far
    pub fn fired(&self) -> usize {
        self.fired
    }
}
