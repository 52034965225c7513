//! Typing indicator debouncer.
//!
//! Keystrokes produce at most one `typing=true` write per window: a leading
//! emission on the first keystroke and a trailing one at the end of the
//! window if typing continued. `false` is never debounced.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct TypingDebouncer {
    window: Duration,
    last_true: Option<Instant>,
    trailing: bool,
}

impl TypingDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_true: None,
            trailing: false,
        }
    }

    fn window_open(&self, now: Instant) -> bool {
        self.last_true
            .is_some_and(|at| now.saturating_duration_since(at) < self.window)
    }

    /// A keystroke. Returns `Some(true)` when a write should go out now.
    pub fn on_input(&mut self, now: Instant) -> Option<bool> {
        if self.window_open(now) {
            self.trailing = true;
            return None;
        }
        self.last_true = Some(now);
        self.trailing = false;
        Some(true)
    }

    /// Window focus always re-affirms typing.
    pub fn focus(&mut self, now: Instant) -> bool {
        self.last_true = Some(now);
        self.trailing = false;
        true
    }

    /// When the pending trailing emission is due.
    pub fn deadline(&self) -> Option<Instant> {
        if !self.trailing {
            return None;
        }
        self.last_true.map(|at| at + self.window)
    }

    /// Fire the trailing emission if it is due.
    pub fn poll(&mut self, now: Instant) -> Option<bool> {
        let due = self.deadline()?;
        if now < due {
            return None;
        }
        self.last_true = Some(now);
        self.trailing = false;
        Some(true)
    }

    /// Blur, send or close: cancels any pending `true` and always yields
    /// `false`.
    pub fn stop(&mut self) -> bool {
        self.last_true = None;
        self.trailing = false;
        false
    }
}
