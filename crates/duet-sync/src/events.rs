//! User-facing notices.
//!
//! The engine never renders anything itself; it pushes [`Notice`]s into a
//! channel owned by whatever draws the UI.

use tokio::sync::mpsc;
use tracing::{debug, info};

/// How long a notice should stay on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeSeverity {
    /// A write was rolled back. Shown briefly.
    Transient,
    /// A live subscription failed. Stays until the view closes.
    Persistent,
    /// Moderation block. Stays until the user dismisses it.
    Dismissible,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: NoticeSeverity,
    pub text: String,
}

/// Producer side of the notice channel. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct NoticeSink {
    tx: Option<mpsc::UnboundedSender<Notice>>,
}

impl NoticeSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that only logs.
    pub fn discard() -> Self {
        Self::default()
    }

    pub fn emit(&self, severity: NoticeSeverity, text: impl Into<String>) {
        let notice = Notice {
            severity,
            text: text.into(),
        };
        info!(severity = ?notice.severity, text = %notice.text, "notice");
        if let Some(tx) = &self.tx {
            if tx.send(notice).is_err() {
                debug!("notice receiver dropped");
            }
        }
    }

    pub fn transient(&self, text: impl Into<String>) {
        self.emit(NoticeSeverity::Transient, text);
    }

    pub fn persistent(&self, text: impl Into<String>) {
        self.emit(NoticeSeverity::Persistent, text);
    }

    pub fn dismissible(&self, text: impl Into<String>) {
        self.emit(NoticeSeverity::Dismissible, text);
    }
}
