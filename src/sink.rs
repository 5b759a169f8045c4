//! Host-side collaborators: the display surface and the error reporter.

use std::path::Path;

use anyhow::Result;

use crate::notice::Notice;
use crate::overlay::OverlayRect;

/// Image handed to the display surface.
#[derive(Debug, Clone, Copy)]
pub enum Content<'a> {
    /// Persisted PNG the host loads by reference.
    File(&'a Path),
    /// In-memory PNG, used when persisting the page failed.
    Bytes(&'a [u8]),
}

/// Surface that paints the current page and the page-index overlay.
pub trait DisplaySink {
    fn set_content(&mut self, content: Content<'_>, width: u32, height: u32) -> Result<()>;

    /// Place the page's top-left corner. Panning yields `(0, -offset_y)`.
    fn set_position(&mut self, x: i32, y: i32) -> Result<()>;

    /// Show `text` in `rect`, replacing any overlay already shown.
    fn show_overlay(&mut self, text: &str, rect: OverlayRect) -> Result<()>;

    fn hide_overlay(&mut self) -> Result<()>;
}

/// One-shot error message presentation.
pub trait ErrorReporter {
    fn show_error(&mut self, notice: &Notice) -> Result<()>;
}
