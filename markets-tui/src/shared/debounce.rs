/// Deadline based debouncing, polled from the UI loop
use std::time::{Duration, Instant};

/// Default quiet period for search input and favourites persistence
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Fires once after `delay` has elapsed since the most recent [`Debouncer::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// (Re)arm the deadline at `now + delay`, superseding any pending one.
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns true exactly once when the pending deadline has passed.
    pub fn fire_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Returns true if something was pending, clearing it.
    pub fn take(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}

/// Text input whose value is only applied once typing pauses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebouncedText {
    input: String,
    applied: String,
    debouncer: Debouncer,
}

impl DebouncedText {
    pub fn new(delay: Duration) -> Self {
        Self {
            debouncer: Debouncer::new(delay),
            ..Default::default()
        }
    }

    /// Raw text as typed.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Last applied text.
    pub fn applied(&self) -> &str {
        &self.applied
    }

    pub fn push(&mut self, c: char, now: Instant) {
        self.input.push(c);
        self.debouncer.schedule(now);
    }

    pub fn pop(&mut self, now: Instant) {
        if self.input.pop().is_some() {
            self.debouncer.schedule(now);
        }
    }

    pub fn clear(&mut self, now: Instant) {
        if !self.input.is_empty() {
            self.input.clear();
            self.debouncer.schedule(now);
        }
    }

    /// Apply the typed text if the quiet period has elapsed. Returns the newly applied text.
    pub fn poll(&mut self, now: Instant) -> Option<&str> {
        if self.debouncer.fire_due(now) {
            self.applied.clone_from(&self.input);
            Some(&self.applied)
        } else {
            None
        }
    }

    /// Apply any pending text immediately.
    pub fn flush(&mut self) -> Option<&str> {
        if self.debouncer.take() {
            self.applied.clone_from(&self.input);
            Some(&self.applied)
        } else {
            None
        }
    }
}
