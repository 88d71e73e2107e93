//! Burst coalescing for a single rule.
//!
//! Editors often write a temp file, rename it and touch metadata in quick
//! succession. The debouncer collapses such a burst into one notification
//! that fires once the rule has been quiet for the configured duration.

use std::time::Duration;

use tokio::time::Instant;

/// Quiet period used when nothing else is configured.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(1000);

/// Current state of a rule's debounce timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    /// No accepted change is waiting to be reported.
    Idle,
    /// A notification is due at `deadline` unless another change arrives.
    Armed { deadline: Instant },
}

/// Single-deadline debouncer.
///
/// Every accepted change pushes the deadline to `now + quiet`. The owner
/// sleeps until [`Debouncer::deadline`] and then calls [`Debouncer::fire`].
#[derive(Debug)]
pub struct Debouncer {
    state: DebounceState,
    quiet: Duration,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            state: DebounceState::Idle,
            quiet,
        }
    }

    /// Record an accepted change at `now`.
    ///
    /// Returns true when this change armed an idle debouncer, false when it
    /// only pushed back an existing deadline.
    pub fn record(&mut self, now: Instant) -> bool {
        let was_idle = self.state == DebounceState::Idle;
        self.state = DebounceState::Armed {
            deadline: now + self.quiet,
        };
        was_idle
    }

    /// Deadline of the pending notification, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            DebounceState::Idle => None,
            DebounceState::Armed { deadline } => Some(deadline),
        }
    }

    /// Fire the pending notification if its deadline has passed.
    ///
    /// Returns true exactly once per burst; the debouncer is idle afterwards.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.state {
            DebounceState::Armed { deadline } if now >= deadline => {
                self.state = DebounceState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Drop any pending notification without firing it.
    pub fn cancel(&mut self) {
        self.state = DebounceState::Idle;
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, DebounceState::Armed { .. })
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_PERIOD)
    }
}
