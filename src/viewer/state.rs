//! Viewer session state machine: page index, pan offset, pending render.
//!
//! Pure logic, no I/O and no threads. The control loop feeds actions in via
//! `apply` and completed renders via `on_ready`; it executes the returned
//! requests and presentations.

use log::debug;

use crate::page::{PageId, PageList, ScaledPage, Viewport};
use crate::ready::ReadyFrame;

/// Logical transitions the host's action codes map onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    NextPage,
    PrevPage,
    PanUp,
    PanDown,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Last applied frame is authoritative.
    Idle,
    /// Waiting for the render of `generation`.
    Pending { generation: u64 },
    /// Closed; nothing more is rendered.
    Stopped,
}

/// Most recent navigation intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub generation: u64,
    pub index: usize,
    pub page: PageId,
    pub offset_y: u32,
}

/// What an action asks the control loop to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Render(RenderRequest),
    Stop,
}

/// A frame ready to hand to the display sink.
#[derive(Debug, Clone)]
pub struct Present {
    pub page: ScaledPage,
    pub index: usize,
    pub offset_y: u32,
    /// Set after a page change: show the "N / total" overlay.
    pub show_overlay: bool,
}

pub struct ViewerSession {
    pages: PageList,
    viewport: Viewport,
    pan_step: u32,
    current: usize,
    offset_y: u32,
    max_offset_y: u32,
    phase: Phase,
    next_generation: u64,
    overlay_armed: bool,
}

impl ViewerSession {
    /// `start` is clamped into the page list.
    pub fn new(pages: PageList, start: usize, viewport: Viewport, pan_step: u32) -> Self {
        let current = start.min(pages.len().saturating_sub(1));
        Self {
            pages,
            viewport,
            pan_step,
            current,
            offset_y: 0,
            max_offset_y: 0,
            phase: Phase::Idle,
            next_generation: 1,
            overlay_armed: false,
        }
    }

    pub fn pages(&self) -> &PageList {
        &self.pages
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_page(&self) -> Option<&PageId> {
        self.pages.get(self.current)
    }

    pub fn offset_y(&self) -> u32 {
        self.offset_y
    }

    pub fn max_offset_y(&self) -> u32 {
        self.max_offset_y
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_stopped(&self) -> bool {
        self.phase == Phase::Stopped
    }

    /// Initial render of the start page, with the overlay armed.
    pub fn start(&mut self) -> Option<RenderRequest> {
        if self.is_stopped() {
            return None;
        }
        self.overlay_armed = true;
        self.request()
    }

    pub fn apply(&mut self, action: Action) -> Option<Effect> {
        if self.is_stopped() {
            return None;
        }
        match action {
            Action::NextPage => {
                if self.current + 1 >= self.pages.len() {
                    debug!("next page: already at last page {}", self.current);
                    return None;
                }
                self.change_page(self.current + 1)
            }
            Action::PrevPage => {
                if self.current == 0 {
                    debug!("prev page: already at first page");
                    return None;
                }
                self.change_page(self.current - 1)
            }
            Action::PanUp => {
                let y = self.offset_y.saturating_sub(self.pan_step);
                self.pan_to(y)
            }
            Action::PanDown => {
                let y = self
                    .offset_y
                    .saturating_add(self.pan_step)
                    .min(self.max_offset_y);
                self.pan_to(y)
            }
            Action::Close => {
                debug!("close: stopping session at page {}", self.current);
                self.phase = Phase::Stopped;
                Some(Effect::Stop)
            }
        }
    }

    fn change_page(&mut self, index: usize) -> Option<Effect> {
        debug!("page: {} → {index}", self.current);
        self.current = index;
        self.offset_y = 0;
        // Unknown until the new page's render is applied.
        self.max_offset_y = 0;
        self.overlay_armed = true;
        self.request().map(Effect::Render)
    }

    fn pan_to(&mut self, y: u32) -> Option<Effect> {
        if y == self.offset_y {
            return None;
        }
        debug!(
            "pan: offset_y {} → {y} (step={}, max={})",
            self.offset_y, self.pan_step, self.max_offset_y
        );
        self.offset_y = y;
        self.request().map(Effect::Render)
    }

    fn request(&mut self) -> Option<RenderRequest> {
        let page = self.pages.get(self.current)?.clone();
        let generation = self.next_generation;
        self.next_generation += 1;
        self.phase = Phase::Pending { generation };
        Some(RenderRequest {
            generation,
            index: self.current,
            page,
            offset_y: self.offset_y,
        })
    }

    /// Consume a completed render. Returns what to display, or `None` when the
    /// frame belongs to a page that is no longer current.
    pub fn on_ready(&mut self, frame: ReadyFrame) -> Option<Present> {
        let pending = match self.phase {
            Phase::Stopped => return None,
            Phase::Pending { generation } => Some(generation),
            Phase::Idle => None,
        };

        if frame.index != self.current {
            debug!(
                "ready: discarding frame for page {} (current {})",
                frame.index, self.current
            );
            return None;
        }

        self.max_offset_y = frame.page.max_offset(self.viewport);
        self.offset_y = self.offset_y.min(self.max_offset_y);
        if pending.is_some_and(|g| frame.generation >= g) {
            self.phase = Phase::Idle;
        }

        Some(Present {
            page: frame.page,
            index: self.current,
            offset_y: self.offset_y,
            show_overlay: std::mem::take(&mut self.overlay_armed),
        })
    }
}
