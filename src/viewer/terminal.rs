//! Terminal host: raw mode, Kitty Graphics Protocol, overlay, status bar.
//!
//! Pages are transmitted by file reference (`t=f`, the terminal reads the
//! persisted PNG itself); when the page could not be persisted the PNG bytes
//! are sent inline (`t=d`). Panning re-places the same image with a shifted
//! source rectangle, so no data is resent.
//!
//! All commands use `q=2` (suppress responses): error responses would arrive
//! as APC sequences that crossterm misparses as key events.
//!
//! The page is placed with `z=-1` so that overlay and status text, drawn with
//! a background colour, stays visible on top of it.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use crossterm::{
    ExecutableCommand, QueueableCommand, cursor,
    style::{self, Stylize},
    terminal,
};
use std::io::{self, Write, stdout};
use std::path::Path;

use anyhow::Result;
use log::{debug, error};

use crate::notice::Notice;
use crate::overlay::OverlayRect;
use crate::page::Viewport;
use crate::sink::{Content, DisplaySink, ErrorReporter};

const CHUNK_SIZE: usize = 4096;
const PAGE_IMAGE_ID: u32 = 1;

// ---------------------------------------------------------------------------
// RawGuard: restores raw mode / alternate screen / images on every exit path
// ---------------------------------------------------------------------------

pub(super) struct RawGuard {
    cleaned: bool,
}

impl RawGuard {
    pub(super) fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        stdout().execute(terminal::EnterAlternateScreen)?;
        stdout().execute(cursor::Hide)?;
        Ok(Self { cleaned: false })
    }

    pub(super) fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;
        let mut out = stdout();
        let _ = write!(out, "\x1b_Ga=d,d=A,q=2\x1b\\");
        let _ = out.execute(cursor::Show);
        let _ = out.execute(terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

impl Drop for RawGuard {
    fn drop(&mut self) {
        self.cleanup();
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Layout {
    pub image_cols: u16, // 画像領域の幅 (= term_cols)
    pub image_rows: u16, // 画像領域の高さ (= term_rows - 1)
    pub status_row: u16, // ステータスバーの行 (= term_rows - 1)
    pub cell_w: u16,     // ピクセル/セル（幅）
    pub cell_h: u16,     // ピクセル/セル（高さ）
}

pub(super) fn compute_layout(term_cols: u16, term_rows: u16, pixel_w: u16, pixel_h: u16) -> Layout {
    let image_rows = term_rows.saturating_sub(1).max(1);
    let status_row = term_rows.saturating_sub(1);
    let cell_w = if term_cols > 0 { (pixel_w / term_cols).max(1) } else { 1 };
    let cell_h = if term_rows > 0 { (pixel_h / term_rows).max(1) } else { 1 };
    Layout {
        image_cols: term_cols.max(1),
        image_rows,
        status_row,
        cell_w,
        cell_h,
    }
}

/// Pixel size of the image area.
pub(super) fn layout_viewport(layout: &Layout) -> Viewport {
    Viewport::new(
        layout.image_cols as u32 * layout.cell_w as u32,
        layout.image_rows as u32 * layout.cell_h as u32,
    )
}

/// Terminal rows needed to show `src_h` pixels of an image `img_w` wide
/// stretched across the image area.
fn rows_for(layout: &Layout, img_w: u32, src_h: u32) -> u16 {
    let area_w = layout.image_cols as f64 * layout.cell_w as f64;
    let display_h = src_h as f64 * area_w / img_w.max(1) as f64;
    let rows = (display_h / layout.cell_h as f64).ceil() as u16;
    rows.clamp(1, layout.image_rows)
}

// ---------------------------------------------------------------------------
// Kitty protocol helpers
// ---------------------------------------------------------------------------

/// PNG データをチャンク分割して送信（a=t: データ転送のみ、表示なし）
fn send_image(png_data: &[u8], image_id: u32) -> io::Result<()> {
    let encoded = BASE64.encode(png_data);
    let chunks: Vec<&[u8]> = encoded.as_bytes().chunks(CHUNK_SIZE).collect();

    let mut out = stdout();
    for (i, chunk) in chunks.iter().enumerate() {
        let m = if i + 1 == chunks.len() { 0 } else { 1 };
        if i == 0 {
            write!(out, "\x1b_Ga=t,f=100,i={image_id},t=d,q=2,m={m};")?;
        } else {
            write!(out, "\x1b_Gm={m},q=2;")?;
        }
        out.write_all(chunk)?;
        write!(out, "\x1b\\")?;
    }
    out.flush()
}

/// Let the terminal read the PNG at `path` itself (t=f).
fn send_file(path: &Path, image_id: u32) -> io::Result<()> {
    let encoded = BASE64.encode(path.to_string_lossy().as_bytes());
    let mut out = stdout();
    write!(out, "\x1b_Ga=t,f=100,i={image_id},t=f,q=2;{encoded}\x1b\\")?;
    out.flush()
}

/// 画像の配置だけを削除（データは保持）
fn delete_placements(image_id: u32) -> io::Result<()> {
    let mut out = stdout();
    write!(out, "\x1b_Ga=d,d=i,i={image_id},q=2\x1b\\")?;
    out.flush()
}

/// Write `text` at (`col`, `row`) padded to `width` cells.
fn draw_text_bar(col: u16, row: u16, width: usize, text: &str, error: bool) -> io::Result<()> {
    let mut out = stdout();
    out.queue(cursor::MoveTo(col, row))?;
    let padded = format!("{text:<width$}");
    let padded: String = padded.chars().take(width).collect();
    if error {
        write!(out, "{}", padded.on_dark_red().white())?;
    } else {
        write!(out, "{}", padded.on_dark_grey().white())?;
    }
    out.queue(style::ResetColor)?;
    out.flush()
}

pub(super) fn check_tty() -> anyhow::Result<()> {
    use std::io::IsTerminal;
    // Only stdout matters. crossterm's `use-dev-tty` reads keyboard from /dev/tty.
    if !io::stdout().is_terminal() {
        anyhow::bail!(
            "fitview requires an interactive terminal.\n\
             \n\
             Supported terminals: Kitty, Ghostty, WezTerm\n\
             To scale a single page to a file, use: fitview scale <image> -o out.png"
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// TerminalHost: DisplaySink + ErrorReporter
// ---------------------------------------------------------------------------

pub(super) struct TerminalHost {
    layout: Layout,
    viewport: Viewport,
    /// Size of the transmitted page image.
    content: Option<(u32, u32)>,
    /// (col, row, width) of the overlay currently drawn.
    overlay: Option<(u16, u16, u16)>,
    /// Last error, shown in place of the status until cleared.
    error: Option<String>,
}

impl TerminalHost {
    pub(super) fn new(layout: Layout, viewport: Viewport) -> Self {
        Self {
            layout,
            viewport,
            content: None,
            overlay: None,
            error: None,
        }
    }

    /// Redraw the status row. A pending error takes its place.
    pub(super) fn draw_status(&self, text: &str) -> io::Result<()> {
        let (line, is_error) = self.status_line(text);
        draw_text_bar(
            0,
            self.layout.status_row,
            self.layout.image_cols as usize,
            line,
            is_error,
        )
    }

    fn status_line<'a>(&'a self, status: &'a str) -> (&'a str, bool) {
        match &self.error {
            Some(error) => (error.as_str(), true),
            None => (status, false),
        }
    }

    fn remember_error(&mut self, notice: &Notice) {
        self.error = Some(format!(" {}: {}", notice.title, notice.message));
    }

    /// Drop the pending error so the next redraw shows the status again.
    pub(super) fn clear_error(&mut self) {
        self.error = None;
    }

    /// Map a viewport pixel coordinate to a terminal cell.
    fn to_cell(&self, x: u32, y: u32) -> (u16, u16) {
        let col = x as u64 * self.layout.image_cols as u64 / self.viewport.width as u64;
        let row = y as u64 * self.layout.image_rows as u64 / self.viewport.height as u64;
        (col as u16, row as u16)
    }
}

impl DisplaySink for TerminalHost {
    fn set_content(&mut self, content: Content<'_>, width: u32, height: u32) -> Result<()> {
        match content {
            Content::File(path) => {
                debug!("terminal: transmit file {}", path.display());
                send_file(path, PAGE_IMAGE_ID)?;
            }
            Content::Bytes(data) => {
                debug!("terminal: transmit {} bytes inline", data.len());
                send_image(data, PAGE_IMAGE_ID)?;
            }
        }
        self.content = Some((width, height));
        Ok(())
    }

    fn set_position(&mut self, x: i32, y: i32) -> Result<()> {
        let Some((img_w, img_h)) = self.content else {
            return Ok(());
        };
        let src_x = x.unsigned_abs().min(img_w.saturating_sub(1));
        let src_y = y.unsigned_abs().min(img_h.saturating_sub(1));
        let visible_h = self.viewport.height.min(img_h - src_y);
        let rows = rows_for(&self.layout, img_w, visible_h);
        let cols = self.layout.image_cols;

        delete_placements(PAGE_IMAGE_ID)?;
        let mut out = stdout();
        out.queue(terminal::Clear(terminal::ClearType::All))?;
        out.queue(cursor::MoveTo(0, 0))?;
        write!(
            out,
            "\x1b_Ga=p,i={PAGE_IMAGE_ID},x={src_x},y={src_y},w={w},h={visible_h},c={cols},r={rows},z=-1,C=1,q=2\x1b\\",
            w = img_w - src_x,
        )?;
        out.flush()?;
        // Clearing the screen wiped any overlay text.
        self.overlay = None;
        Ok(())
    }

    fn show_overlay(&mut self, text: &str, rect: OverlayRect) -> Result<()> {
        self.hide_overlay()?;
        let (col, row) = self.to_cell(rect.x, rect.y);
        let (right, _) = self.to_cell(rect.x + rect.width, rect.y);
        let min_w = text.chars().count() as u16 + 2;
        let width = right.saturating_sub(col).max(min_w);
        let col = col.min(self.layout.image_cols.saturating_sub(width));
        let row = row.min(self.layout.image_rows.saturating_sub(1));
        let label = format!("{text:^w$}", w = width as usize);
        draw_text_bar(col, row, width as usize, &label, false)?;
        self.overlay = Some((col, row, width));
        Ok(())
    }

    fn hide_overlay(&mut self) -> Result<()> {
        if let Some((col, row, width)) = self.overlay.take() {
            let mut out = stdout();
            out.queue(cursor::MoveTo(col, row))?;
            write!(out, "{:width$}", "", width = width as usize)?;
            out.flush()?;
        }
        Ok(())
    }
}

impl ErrorReporter for TerminalHost {
    fn show_error(&mut self, notice: &Notice) -> Result<()> {
        error!("{}: {}", notice.title, notice.message);
        self.remember_error(notice);
        self.draw_status("")?;
        Ok(())
    }
}
