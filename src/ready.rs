//! Single-slot mailbox between render tasks and the control thread.
//!
//! A render task posts its finished frame; the control thread takes at most
//! one frame per tick. The page, its height and the index it was computed for
//! move together under one lock, so the reader never sees a torn pair. A post
//! never replaces a frame from a newer request.

use std::sync::{Arc, Mutex, PoisonError};

use log::trace;

use crate::page::ScaledPage;

/// A completed render, tagged with the request that produced it.
#[derive(Debug, Clone)]
pub struct ReadyFrame {
    pub generation: u64,
    pub index: usize,
    pub page: ScaledPage,
}

#[derive(Clone, Default)]
pub struct ReadySlot {
    inner: Arc<Mutex<Option<ReadyFrame>>>,
}

impl ReadySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&self, frame: ReadyFrame) {
        let mut slot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(held) if held.generation > frame.generation => {
                trace!(
                    "ready: dropping generation {} (holding {})",
                    frame.generation, held.generation
                );
            }
            _ => *slot = Some(frame),
        }
    }

    /// Take the held frame, leaving the slot empty.
    pub fn take(&self) -> Option<ReadyFrame> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
