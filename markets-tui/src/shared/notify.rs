/// Fire-and-forget user notifications
use std::time::{Duration, Instant};

/// How long the latest toast stays on screen
pub const TOAST_LIFETIME: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
    pub created_at: Instant,
}

/// Surface for short user-facing messages
pub trait Notifier {
    fn notify(&mut self, kind: ToastKind, message: String);

    fn success(&mut self, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.notify(ToastKind::Success, message.into());
    }

    fn error(&mut self, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.notify(ToastKind::Error, message.into());
    }
}

/// Keeps only the most recent toast until it expires
#[derive(Debug, Clone)]
pub struct ToastQueue {
    lifetime: Duration,
    latest: Option<Toast>,
}

impl Default for ToastQueue {
    fn default() -> Self {
        Self::new(TOAST_LIFETIME)
    }
}

impl ToastQueue {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            lifetime,
            latest: None,
        }
    }

    /// Latest toast if still visible at `now`
    pub fn current(&self, now: Instant) -> Option<&Toast> {
        self.latest
            .as_ref()
            .filter(|toast| now.saturating_duration_since(toast.created_at) < self.lifetime)
    }

    /// Latest toast regardless of expiry
    pub fn latest(&self) -> Option<&Toast> {
        self.latest.as_ref()
    }
}

impl Notifier for ToastQueue {
    fn notify(&mut self, kind: ToastKind, message: String) {
        self.latest = Some(Toast {
            kind,
            message,
            created_at: Instant::now(),
        });
    }
}
