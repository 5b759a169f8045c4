//! Fit-to-width page viewer.
//!
//! Threads:
//!   control thread : owns `ViewerSession`, handles input, polls the ready slot
//!   render tasks   : one spawned thread per render request, cache-checked
//!   prefetch pool  : warms {current+1, current+2, current-1} in the background
//!
//! The control thread never waits on a scale. Render tasks post finished
//! frames into a single-slot mailbox; each tick the control thread takes at
//! most one frame and presents it if it still matches the current page.
//!
//! Layout (terminal host):
//!   rows 0..term_rows-1 : page image, panned by re-placing its source rect
//!   row term_rows-1     : status bar / error notices

pub mod input;
pub mod state;
mod terminal;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossterm::{
    event::{self, Event},
    terminal as crossterm_terminal,
};
use log::{debug, info, warn};

use crate::cache::{CacheStats, PageCache};
use crate::config::ViewerConfig;
use crate::notice::{self, NoticeReceiver};
use crate::overlay::{Overlay, page_label};
use crate::page::{PageList, ScaledPage, Viewport};
use crate::prefetch::Prefetcher;
use crate::ready::{ReadyFrame, ReadySlot};
use crate::scale::{ImageScaler, Scaler};
use crate::selection;
use crate::sink::{Content, DisplaySink, ErrorReporter};

pub use input::{HostAction, map_code};
pub use state::{Action, Effect, Phase, Present, RenderRequest, ViewerSession};

/// Engine driving one session: state machine, cache, prefetch, ready slot.
pub struct Viewer<D: DisplaySink + ErrorReporter> {
    session: ViewerSession,
    cache: Arc<PageCache>,
    prefetcher: Prefetcher,
    slot: ReadySlot,
    renders: Vec<JoinHandle<()>>,
    notices: NoticeReceiver,
    overlay: Overlay,
    sink: D,
    /// Page whose image the sink currently holds.
    shown: Option<ScaledPage>,
    shut_down: bool,
}

impl<D: DisplaySink + ErrorReporter> Viewer<D> {
    /// Viewer backed by the image scaler.
    pub fn new(
        pages: PageList,
        start: usize,
        viewport: Viewport,
        config: &ViewerConfig,
        sink: D,
    ) -> crate::error::Result<Self> {
        let (tx, rx) = notice::channel();
        let scaler = ImageScaler::new(viewport, tx.clone());
        Self::with_scaler(pages, start, viewport, config, sink, Box::new(scaler), tx, rx)
    }

    /// Viewer with a caller-supplied scaler.
    #[allow(clippy::too_many_arguments)]
    pub fn with_scaler(
        pages: PageList,
        start: usize,
        viewport: Viewport,
        config: &ViewerConfig,
        sink: D,
        scaler: Box<dyn Scaler>,
        notice_tx: notice::NoticeSender,
        notices: NoticeReceiver,
    ) -> crate::error::Result<Self> {
        let cache = Arc::new(PageCache::new(scaler, config.cache_capacity, notice_tx)?);
        let prefetcher = Prefetcher::spawn(Arc::clone(&cache), config.prefetch_workers);
        info!(
            "viewer: {} page(s), start={}, viewport={}x{}, cache={}",
            pages.len(),
            start,
            viewport.width,
            viewport.height,
            cache.capacity()
        );
        Ok(Self {
            session: ViewerSession::new(pages, start, viewport, config.pan_step),
            cache,
            prefetcher,
            slot: ReadySlot::new(),
            renders: Vec::new(),
            notices,
            overlay: Overlay::new(viewport, config.overlay_delay),
            sink,
            shown: None,
            shut_down: false,
        })
    }

    pub fn session(&self) -> &ViewerSession {
        &self.session
    }

    pub fn sink(&self) -> &D {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut D {
        &mut self.sink
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn is_running(&self) -> bool {
        !self.session.is_stopped()
    }

    /// Issue the initial render.
    pub fn start(&mut self) {
        if let Some(req) = self.session.start() {
            self.spawn_render(req);
        }
    }

    /// Apply one input action. Returns false once the session has stopped.
    pub fn handle(&mut self, action: Action) -> bool {
        match self.session.apply(action) {
            Some(Effect::Render(req)) => self.spawn_render(req),
            Some(Effect::Stop) => info!("viewer: close requested"),
            None => {}
        }
        self.is_running()
    }

    fn spawn_render(&mut self, req: RenderRequest) {
        debug!(
            "render: request gen={} page={} offset_y={}",
            req.generation, req.index, req.offset_y
        );
        let cache = Arc::clone(&self.cache);
        let slot = self.slot.clone();
        let spawned = thread::Builder::new()
            .name(format!("render-{}", req.generation))
            .spawn(move || {
                let page = cache.get_or_compute(&req.page);
                slot.post(ReadyFrame {
                    generation: req.generation,
                    index: req.index,
                    page,
                });
            });
        match spawned {
            Ok(handle) => self.renders.push(handle),
            Err(e) => warn!("render: failed to spawn task: {e}"),
        }
        self.renders.retain(|h| !h.is_finished());
    }

    /// One control-loop tick: present the latest ready frame, hide an expired
    /// overlay, and report pending notices. Returns whether a frame was shown.
    pub fn tick(&mut self, now: Instant) -> anyhow::Result<bool> {
        let mut presented = false;
        if let Some(frame) = self.slot.take()
            && let Some(present) = self.session.on_ready(frame)
        {
            self.present(&present, now)?;
            presented = true;
        }

        self.overlay.tick(&mut self.sink, now)?;

        for notice in self.notices.drain() {
            self.sink.show_error(&notice)?;
        }
        Ok(presented)
    }

    fn present(&mut self, present: &Present, now: Instant) -> anyhow::Result<()> {
        let page = &present.page;
        // A pan of the page already on screen only moves it.
        let same_image = self
            .shown
            .as_ref()
            .is_some_and(|s| Arc::ptr_eq(&s.raster, &page.raster) && s.file == page.file);
        if !same_image {
            let content = match &page.file {
                Some(path) => Content::File(path),
                None => Content::Bytes(&page.raster),
            };
            self.sink.set_content(content, page.width, page.height)?;
            self.shown = Some(page.clone());
        }
        self.sink.set_position(0, -(present.offset_y as i64) as i32)?;
        debug!(
            "present: page {} height={} offset_y={}/{}",
            present.index,
            page.height,
            present.offset_y,
            self.session.max_offset_y()
        );

        if present.show_overlay {
            let label = page_label(present.index, self.session.pages().len());
            self.overlay.show(&mut self.sink, &label, now)?;
        }

        let neighbors: Vec<_> = self
            .session
            .pages()
            .neighbors(present.index)
            .into_iter()
            .filter_map(|i| self.session.pages().get(i).cloned())
            .collect();
        self.prefetcher.warm(&neighbors);
        Ok(())
    }

    /// Stop background work and delete persisted pages. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.prefetcher.shutdown();
        for handle in self.renders.drain(..) {
            if handle.join().is_err() {
                warn!("render: task panicked");
            }
        }
        self.cache.teardown();
        info!("viewer: shut down ({:?})", self.cache.stats());
    }
}

impl<D: DisplaySink + ErrorReporter> Drop for Viewer<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Why the event loop returned.
enum ExitReason {
    Quit,
    Resize { new_cols: u16, new_rows: u16 },
}

/// Run the terminal viewer on `path` (image, directory, or CBZ archive).
pub fn run(path: PathBuf, config: ViewerConfig) -> anyhow::Result<()> {
    // Selection owns the extraction dir; dropping it at any return cleans up.
    let selection = selection::select(&path)?;
    let title = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    terminal::check_tty()?;

    let winsize = crossterm_terminal::window_size()
        .map_err(|e| anyhow::anyhow!("failed to get terminal size: {e}"))?;
    if winsize.width == 0 || winsize.height == 0 {
        anyhow::bail!(
            "terminal pixel size {}x{} is zero; Kitty graphics requires non-zero pixel dimensions",
            winsize.width,
            winsize.height
        );
    }

    let mut guard = terminal::RawGuard::enter()?;
    let mut layout =
        terminal::compute_layout(winsize.columns, winsize.rows, winsize.width, winsize.height);
    let mut start = selection.start;

    // Outer loop: each iteration builds a new viewer (initial + resize).
    loop {
        let viewport = match (config.viewport_width, config.viewport_height) {
            (Some(w), Some(h)) => Viewport::new(w, h),
            (w, h) => {
                let term = terminal::layout_viewport(&layout);
                Viewport::new(w.unwrap_or(term.width), h.unwrap_or(term.height))
            }
        };
        let host = terminal::TerminalHost::new(layout, viewport);
        let mut viewer = Viewer::new(selection.pages.clone(), start, viewport, &config, host)?;

        let exit = event_loop(&mut viewer, &title, &config)?;
        start = viewer.session().current_index();
        viewer.shutdown();

        match exit {
            ExitReason::Quit => break,
            ExitReason::Resize { new_cols, new_rows } => {
                debug!("resize: rebuilding viewer at page {start}");
                let new_winsize = crossterm_terminal::window_size()?;
                layout = terminal::compute_layout(
                    new_cols,
                    new_rows,
                    new_winsize.width,
                    new_winsize.height,
                );
            }
        }
    }

    guard.cleanup();
    Ok(())
}

fn event_loop(
    viewer: &mut Viewer<terminal::TerminalHost>,
    title: &str,
    config: &ViewerConfig,
) -> anyhow::Result<ExitReason> {
    viewer.start();
    loop {
        if event::poll(config.tick)? {
            let ev = event::read()?;
            debug!("event: {:?}", ev);
            match ev {
                Event::Key(key) => {
                    if let Some(host_action) = input::map_key_event(key) {
                        debug!("input: {host_action:?} (code {})", host_action.code());
                        let action = host_action.action();
                        if matches!(action, Action::NextPage | Action::PrevPage) {
                            viewer.sink_mut().clear_error();
                        }
                        if !viewer.handle(action) {
                            return Ok(ExitReason::Quit);
                        }
                    }
                }
                Event::Resize(new_cols, new_rows) => {
                    return Ok(ExitReason::Resize { new_cols, new_rows });
                }
                _ => {}
            }
        }

        if viewer.tick(Instant::now())? {
            let s = viewer.session();
            let status = format!(
                " {} | {} | y={}/{} px  [←/→:page ↑/↓:pan q:quit]",
                title,
                page_label(s.current_index(), s.pages().len()),
                s.offset_y(),
                s.max_offset_y()
            );
            viewer.sink().draw_status(&status)?;
        }
    }
}
