//! Per-listener playback tracking and duplicate suppression
//!
//! The server repeats the current state of a session every few seconds.
//! [`DebounceTracker`] remembers the last accepted (state, session, item)
//! and classifies each new alert so that heartbeats do not cause a presence
//! update every time.

use crate::media::{PlaybackAlert, PlaybackState};

/// Number of unchanged alerts swallowed before the session is re-published
pub const MAXIMUM_IGNORES: u32 = 2;

/// The session and item currently shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedSession {
    pub session_key: u64,
    pub rating_key: u64,
}

/// How an alert relates to what is currently tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Same session, item and state; swallowed
    Repeat,
    /// The tracked session stopped; tracking has been cleared
    Stop,
    /// Tracked session with a new state (or a repeat past the ignore limit)
    Transition,
    /// A "stopped" alert for a session we are not tracking
    ForeignStop,
    /// A session or item we are not tracking yet
    New,
}

/// Last observed playback for one listener
#[derive(Debug, Default)]
pub struct DebounceTracker {
    last_state: PlaybackState,
    tracked: Option<TrackedSession>,
    ignore_count: u32,
}

impl DebounceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_state(&self) -> PlaybackState {
        self.last_state
    }

    pub fn tracked(&self) -> Option<TrackedSession> {
        self.tracked
    }

    pub fn ignore_count(&self) -> u32 {
        self.ignore_count
    }

    /// Whether `alert` is about the tracked session and item
    pub fn is_tracking(&self, alert: &PlaybackAlert) -> bool {
        self.tracked
            == Some(TrackedSession {
                session_key: alert.session_key,
                rating_key: alert.rating_key,
            })
    }

    /// Classify an alert, updating the ignore counter and clearing tracking
    /// on a matching stop.
    pub fn observe(&mut self, alert: &PlaybackAlert) -> Verdict {
        if self.is_tracking(alert) {
            if alert.state == self.last_state && self.ignore_count < MAXIMUM_IGNORES {
                self.ignore_count += 1;
                return Verdict::Repeat;
            }

            self.ignore_count = 0;
            if alert.state == PlaybackState::Stopped {
                self.reset();
                return Verdict::Stop;
            }
            Verdict::Transition
        } else if alert.state == PlaybackState::Stopped {
            Verdict::ForeignStop
        } else {
            Verdict::New
        }
    }

    /// Start (or keep) tracking the alert's session and item.
    pub fn accept(&mut self, alert: &PlaybackAlert) {
        if !self.is_tracking(alert) || alert.state != self.last_state {
            self.ignore_count = 0;
        }
        self.last_state = alert.state;
        self.tracked = Some(TrackedSession {
            session_key: alert.session_key,
            rating_key: alert.rating_key,
        });
    }

    /// Forget everything
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
