//! Error side channel from background tasks to the control thread.
//!
//! Background scale tasks never fail hard; they degrade to a fallback frame
//! and post a `Notice` here. The control thread drains the receiver on each
//! tick and hands every notice to the host's error reporter exactly once.

use std::sync::mpsc;

use log::warn;

use crate::error::ViewerError;

/// A user-visible error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

impl From<&ViewerError> for Notice {
    fn from(err: &ViewerError) -> Self {
        Self {
            title: err.title().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct NoticeSender(mpsc::Sender<Notice>);

pub struct NoticeReceiver(mpsc::Receiver<Notice>);

pub fn channel() -> (NoticeSender, NoticeReceiver) {
    let (tx, rx) = mpsc::channel();
    (NoticeSender(tx), NoticeReceiver(rx))
}

impl NoticeSender {
    pub fn report(&self, err: &ViewerError) {
        warn!("notice: {err}");
        // Receiver gone means the session is shutting down.
        let _ = self.0.send(Notice::from(err));
    }
}

impl NoticeReceiver {
    /// Collect every pending notice (non-blocking).
    pub fn drain(&self) -> Vec<Notice> {
        self.0.try_iter().collect()
    }
}
