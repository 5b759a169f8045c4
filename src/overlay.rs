//! Page-index overlay ("N / total"): geometry and auto-hide timer.
//!
//! The overlay lives on the control thread. `show` replaces whatever is on
//! screen and restarts the timer, so repeated page flips never stack
//! overlays; `tick` hides it once the delay has elapsed.

use std::time::{Duration, Instant};

use anyhow::Result;
use log::debug;

use crate::page::Viewport;
use crate::sink::DisplaySink;

/// Overlay rectangle in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl OverlayRect {
    /// Bottom-right box: 5% × 3% of the viewport with a 1% margin.
    pub fn bottom_right(viewport: Viewport) -> Self {
        let (w, h) = (viewport.width as f64, viewport.height as f64);
        let width = ((w * 0.05) as u32).max(1);
        let height = ((h * 0.03) as u32).max(1);
        let x = viewport
            .width
            .saturating_sub(width)
            .saturating_sub((w * 0.01) as u32);
        let y = viewport
            .height
            .saturating_sub(height)
            .saturating_sub((h * 0.01) as u32);
        Self { x, y, width, height }
    }
}

/// 1-based page label.
pub fn page_label(index: usize, total: usize) -> String {
    format!("{} / {}", index + 1, total)
}

pub struct Overlay {
    rect: OverlayRect,
    delay: Duration,
    shown_at: Option<Instant>,
}

impl Overlay {
    pub fn new(viewport: Viewport, delay: Duration) -> Self {
        Self {
            rect: OverlayRect::bottom_right(viewport),
            delay,
            shown_at: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.shown_at.is_some()
    }

    pub fn show(&mut self, sink: &mut dyn DisplaySink, text: &str, now: Instant) -> Result<()> {
        if self.shown_at.is_some() {
            sink.hide_overlay()?;
        }
        sink.show_overlay(text, self.rect)?;
        debug!("overlay: show {text:?}");
        self.shown_at = Some(now);
        Ok(())
    }

    /// Hide the overlay if its delay has elapsed.
    pub fn tick(&mut self, sink: &mut dyn DisplaySink, now: Instant) -> Result<()> {
        match self.shown_at {
            Some(at) if now.duration_since(at) >= self.delay => {
                sink.hide_overlay()?;
                debug!("overlay: hidden");
                self.shown_at = None;
            }
            _ => {}
        }
        Ok(())
    }
}
