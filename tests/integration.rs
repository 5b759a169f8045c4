use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use image::{ImageFormat, Rgb, RgbImage};

use fitview::cache::PageCache;
use fitview::config::ViewerConfig;
use fitview::notice::{self, Notice};
use fitview::overlay::OverlayRect;
use fitview::page::{PageId, PageList, ScaledPage, Viewport};
use fitview::scale::{ImageScaler, Scaler, scale_image};
use fitview::selection;
use fitview::sink::{Content, DisplaySink, ErrorReporter};
use fitview::viewer::{Action, Viewer};

fn png_bytes(w: u32, h: u32, shade: u8) -> Vec<u8> {
    let img = RgbImage::from_fn(w, h, |x, y| Rgb([shade, (x % 256) as u8, (y % 256) as u8]));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode fixture");
    buf
}

fn write_png(dir: &Path, name: &str, w: u32, h: u32) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, png_bytes(w, h, 40)).expect("write fixture");
    path
}

fn write_cbz(path: &Path, pages: &[(&str, u32, u32)]) {
    let file = fs::File::create(path).expect("create cbz");
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default();
    for (name, w, h) in pages {
        zip.start_file(*name, options).expect("start entry");
        zip.write_all(&png_bytes(*w, *h, 90)).expect("write entry");
    }
    zip.finish().expect("finish cbz");
}

fn config(cache_capacity: usize) -> ViewerConfig {
    ViewerConfig {
        pan_step: 100,
        cache_capacity,
        tick: Duration::from_millis(5),
        overlay_delay: Duration::from_secs(60),
        prefetch_workers: 2,
        viewport_width: None,
        viewport_height: None,
    }
}

// ---------------------------------------------------------------------------
// Recording sink
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Call {
    File { path: PathBuf, width: u32, height: u32 },
    Bytes { len: usize },
    Position(i32, i32),
    Overlay(String),
    HideOverlay,
    Error { title: String, message: String },
}

#[derive(Default)]
struct RecordingSink {
    calls: Vec<Call>,
}

impl RecordingSink {
    fn contents(&self) -> Vec<&Call> {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::File { .. } | Call::Bytes { .. }))
            .collect()
    }

    fn inline_bytes(&self) -> usize {
        self.calls
            .iter()
            .map(|c| match c {
                Call::Bytes { len } => *len,
                _ => 0,
            })
            .sum()
    }

    fn last_position(&self) -> Option<(i32, i32)> {
        self.calls.iter().rev().find_map(|c| match c {
            Call::Position(x, y) => Some((*x, *y)),
            _ => None,
        })
    }

    fn overlays(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Overlay(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn errors(&self) -> Vec<(&str, &str)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Error { title, message } => Some((title.as_str(), message.as_str())),
                _ => None,
            })
            .collect()
    }
}

impl DisplaySink for RecordingSink {
    fn set_content(&mut self, content: Content<'_>, width: u32, height: u32) -> Result<()> {
        self.calls.push(match content {
            Content::File(path) => {
                assert!(path.exists(), "sink got a missing file {}", path.display());
                Call::File {
                    path: path.to_path_buf(),
                    width,
                    height,
                }
            }
            Content::Bytes(data) => Call::Bytes { len: data.len() },
        });
        Ok(())
    }

    fn set_position(&mut self, x: i32, y: i32) -> Result<()> {
        self.calls.push(Call::Position(x, y));
        Ok(())
    }

    fn show_overlay(&mut self, text: &str, _rect: OverlayRect) -> Result<()> {
        self.calls.push(Call::Overlay(text.to_string()));
        Ok(())
    }

    fn hide_overlay(&mut self) -> Result<()> {
        self.calls.push(Call::HideOverlay);
        Ok(())
    }
}

impl ErrorReporter for RecordingSink {
    fn show_error(&mut self, notice: &Notice) -> Result<()> {
        self.calls.push(Call::Error {
            title: notice.title.to_string(),
            message: notice.message.clone(),
        });
        Ok(())
    }
}

/// Tick until a frame is presented.
fn present_next<D: DisplaySink + ErrorReporter>(viewer: &mut Viewer<D>) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if viewer.tick(Instant::now()).expect("tick") {
            return;
        }
        assert!(Instant::now() < deadline, "no frame presented within 10s");
        thread::sleep(Duration::from_millis(2));
    }
}

/// Keep ticking for `d`, e.g. to let background notices arrive.
fn settle<D: DisplaySink + ErrorReporter>(viewer: &mut Viewer<D>, d: Duration) {
    let until = Instant::now() + d;
    while Instant::now() < until {
        viewer.tick(Instant::now()).expect("tick");
        thread::sleep(Duration::from_millis(5));
    }
}

// ---------------------------------------------------------------------------
// Scaler with a call counter and a page-specific height
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct SlowScaler {
    calls: Arc<AtomicUsize>,
    delay: Duration,
}

impl Scaler for SlowScaler {
    fn scale(&self, page: &PageId) -> ScaledPage {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        // p<N>.png scales to height 1000 + 100*N.
        let n: u32 = page
            .path()
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.trim_start_matches('p').parse().ok())
            .unwrap_or(0);
        ScaledPage::new(page.to_string().into_bytes(), 1000, 1000 + 100 * n)
    }
}

fn fake_pages(n: usize) -> PageList {
    PageList::new((0..n).map(|i| PathBuf::from(format!("/pages/p{i}.png"))).collect())
        .expect("non-empty page list")
}

fn fake_viewer(n: usize, viewport: Viewport, scaler: SlowScaler) -> Viewer<RecordingSink> {
    let (tx, rx) = notice::channel();
    Viewer::with_scaler(
        fake_pages(n),
        0,
        viewport,
        &config(5),
        RecordingSink::default(),
        Box::new(scaler),
        tx,
        rx,
    )
    .expect("viewer")
}

// ---------------------------------------------------------------------------
// End-to-end with real images
// ---------------------------------------------------------------------------

#[test]
fn test_cbz_pages_fit_width_and_pan() {
    let tmp = tempfile::tempdir().unwrap();
    let cbz = tmp.path().join("book.cbz");
    write_cbz(
        &cbz,
        &[
            ("002.png", 300, 300),
            ("001.png", 150, 300),
            ("003.png", 200, 100),
        ],
    );

    let sel = selection::select(&cbz).expect("select cbz");
    assert_eq!(sel.pages.len(), 3);
    assert_eq!(sel.start, 0);
    assert_eq!(sel.page_name(0).as_deref(), Some("001.png"));
    let extracted = sel.extracted_dir().expect("extraction dir").to_path_buf();

    let viewport = Viewport::new(100, 50);
    let mut viewer = Viewer::new(
        sel.pages.clone(),
        sel.start,
        viewport,
        &config(5),
        RecordingSink::default(),
    )
    .expect("viewer");
    let scratch = viewer.cache().scratch_dir().to_path_buf();

    viewer.start();
    present_next(&mut viewer);

    // 150x300 fitted to width 100 is 100x200: pan range 0..=150.
    match viewer.sink().contents().last() {
        Some(Call::File { path, width, height }) => {
            assert!(path.starts_with(&scratch));
            assert_eq!((*width, *height), (100, 200));
            let decoded = image::open(path).expect("persisted page decodes");
            assert_eq!((decoded.width(), decoded.height()), (100, 200));
        }
        other => panic!("expected file content, got {other:?}"),
    }
    assert_eq!(viewer.session().max_offset_y(), 150);
    assert_eq!(viewer.sink().last_position(), Some((0, 0)));
    assert_eq!(viewer.sink().overlays(), vec!["1 / 3"]);

    assert!(viewer.handle(Action::PanDown));
    present_next(&mut viewer);
    assert_eq!(viewer.sink().last_position(), Some((0, -100)));
    assert!(viewer.handle(Action::PanDown));
    present_next(&mut viewer);
    assert_eq!(viewer.session().offset_y(), 150);
    assert_eq!(viewer.sink().last_position(), Some((0, -150)));
    // Panning does not re-show the page overlay or resend the image.
    assert_eq!(viewer.sink().overlays().len(), 1);
    assert_eq!(viewer.sink().contents().len(), 1);

    assert!(viewer.handle(Action::NextPage));
    present_next(&mut viewer);
    assert_eq!(viewer.session().current_index(), 1);
    assert_eq!(viewer.session().offset_y(), 0);
    assert_eq!(viewer.session().max_offset_y(), 50);
    assert_eq!(viewer.sink().overlays(), vec!["1 / 3", "2 / 3"]);
    assert_eq!(viewer.sink().contents().len(), 2);
    // Every page was persisted, so nothing went inline.
    assert_eq!(viewer.sink().inline_bytes(), 0);

    assert!(!viewer.handle(Action::Close));
    drop(viewer);
    assert!(!scratch.exists(), "scratch dir must be removed with the viewer");

    assert!(extracted.exists());
    drop(sel);
    assert!(!extracted.exists(), "extraction dir must be removed with the selection");
}

#[test]
fn test_over_height_page_pan_range() {
    let tmp = tempfile::tempdir().unwrap();
    let p0 = write_png(tmp.path(), "p0.png", 300, 600);
    write_png(tmp.path(), "p1.png", 10, 10);
    write_png(tmp.path(), "p2.png", 10, 10);

    let sel = selection::select(&p0).unwrap();
    assert_eq!(sel.pages.len(), 3);
    assert_eq!(sel.start, 0);

    // 300x600 fitted to width 200 is 200x400, exactly the viewport.
    let mut viewer = Viewer::new(
        sel.pages.clone(),
        sel.start,
        Viewport::new(200, 400),
        &config(5),
        RecordingSink::default(),
    )
    .unwrap();
    viewer.start();
    present_next(&mut viewer);
    assert_eq!(viewer.session().max_offset_y(), 0);
    assert!(viewer.handle(Action::NextPage));
    assert_eq!(viewer.session().current_index(), 1);
    assert_eq!(viewer.session().offset_y(), 0);
    drop(viewer);

    // Taller than the viewport: 400 - 100.
    let mut viewer = Viewer::new(
        sel.pages.clone(),
        sel.start,
        Viewport::new(200, 100),
        &config(5),
        RecordingSink::default(),
    )
    .unwrap();
    viewer.start();
    present_next(&mut viewer);
    assert_eq!(viewer.session().max_offset_y(), 300);
    for _ in 0..3 {
        assert!(viewer.handle(Action::PanDown));
    }
    assert_eq!(viewer.session().offset_y(), 300);

    // Already at the bottom: no new render request.
    let before = viewer.session().phase();
    viewer.handle(Action::PanDown);
    viewer.handle(Action::PanDown);
    assert_eq!(viewer.session().offset_y(), 300);
    assert_eq!(viewer.session().phase(), before);
}

#[test]
fn test_decode_failure_shows_fallback_and_one_notice() {
    let tmp = tempfile::tempdir().unwrap();
    write_png(tmp.path(), "a.png", 200, 100);
    fs::write(tmp.path().join("b.png"), b"not an image at all").unwrap();
    write_png(tmp.path(), "c.png", 200, 100);

    let sel = selection::select(tmp.path()).unwrap();
    let viewport = Viewport::new(120, 80);
    let mut viewer = Viewer::new(
        sel.pages.clone(),
        1,
        viewport,
        &config(5),
        RecordingSink::default(),
    )
    .unwrap();
    viewer.start();
    present_next(&mut viewer);

    match viewer.sink().contents().last() {
        Some(Call::File { width, height, .. }) => assert_eq!((*width, *height), (120, 80)),
        other => panic!("expected fallback frame, got {other:?}"),
    }
    assert_eq!(viewer.session().max_offset_y(), 0);

    // Revisit the broken page from the cache, then let prefetch finish.
    assert!(viewer.handle(Action::NextPage));
    present_next(&mut viewer);
    assert!(viewer.handle(Action::PrevPage));
    present_next(&mut viewer);
    settle(&mut viewer, Duration::from_millis(200));

    let errors = viewer.sink().errors();
    assert_eq!(errors.len(), 1, "errors: {errors:?}");
    assert_eq!(errors[0].0, "Decode error");
    assert!(errors[0].1.contains("b.png"));
}

#[test]
fn test_unwritable_scratch_dir_sends_bytes_inline() {
    let mut viewer = fake_viewer(1, Viewport::new(1000, 800), SlowScaler::default());
    fs::remove_dir_all(viewer.cache().scratch_dir()).unwrap();

    viewer.start();
    present_next(&mut viewer);
    settle(&mut viewer, Duration::from_millis(50));

    let expected_len = "/pages/p0.png".len();
    assert_eq!(viewer.sink().contents(), vec![&Call::Bytes { len: expected_len }]);
    let errors = viewer.sink().errors();
    assert_eq!(errors.len(), 1, "errors: {errors:?}");
    assert_eq!(errors[0].0, "Temp file error");
}

#[test]
fn test_evicted_page_is_rescaled_from_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let ids: Vec<PageId> = (0..3)
        .map(|i| PageId::new(write_png(tmp.path(), &format!("p{i}.png"), 64, 32)))
        .collect();

    let viewport = Viewport::new(32, 32);
    let (tx, rx) = notice::channel();
    let cache = PageCache::new(Box::new(ImageScaler::new(viewport, tx.clone())), 2, tx).unwrap();

    let first = cache.get_or_compute(&ids[0]);
    cache.get_or_compute(&ids[1]);
    cache.get_or_compute(&ids[2]);
    assert_eq!(cache.len(), 2);
    assert!(!cache.contains(&ids[0]));
    assert!(cache.contains(&ids[1]) && cache.contains(&ids[2]));

    let again = cache.get_or_compute(&ids[0]);
    let stats = cache.stats();
    assert_eq!(stats.misses, 4);
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.evictions, 2);
    assert_eq!(first.raster, again.raster, "rescale must be bit-identical");
    assert!(rx.drain().is_empty());

    let file = again.file.clone().expect("persisted");
    assert!(file.exists());
    cache.teardown();
    assert!(!file.exists());
}

#[test]
fn test_scale_image_matches_cached_raster() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_png(tmp.path(), "wide.png", 400, 100);
    let viewport = Viewport::new(200, 200);

    let direct = scale_image(&path, viewport).unwrap();
    let (tx, _rx) = notice::channel();
    let cache = PageCache::new(Box::new(ImageScaler::new(viewport, tx.clone())), 5, tx).unwrap();
    let cached = cache.get_or_compute(&PageId::new(&path));

    assert_eq!((direct.width, direct.height), (200, 50));
    assert_eq!(direct.raster, cached.raster);
    assert_eq!(fs::read(cached.file.unwrap()).unwrap(), &direct.raster[..]);
}

// ---------------------------------------------------------------------------
// Concurrency behaviour with a slow scaler
// ---------------------------------------------------------------------------

#[test]
fn test_rapid_navigation_presents_only_current_page() {
    let scaler = SlowScaler {
        delay: Duration::from_millis(60),
        ..Default::default()
    };
    let mut viewer = fake_viewer(6, Viewport::new(1000, 800), scaler);
    viewer.start();
    for _ in 0..3 {
        assert!(viewer.handle(Action::NextPage));
    }
    assert_eq!(viewer.session().current_index(), 3);

    present_next(&mut viewer);
    settle(&mut viewer, Duration::from_millis(300));

    let contents = viewer.sink().contents();
    assert!(!contents.is_empty());
    for call in contents {
        match call {
            // p3 is 1300 tall; any other height would be a stale page.
            Call::File { height, .. } => assert_eq!(*height, 1300),
            other => panic!("expected persisted page, got {other:?}"),
        }
    }
    assert_eq!(viewer.session().max_offset_y(), 500);
    assert_eq!(viewer.sink().overlays(), vec!["4 / 6"]);
}

#[test]
fn test_control_loop_does_not_wait_for_scaling() {
    let scaler = SlowScaler {
        delay: Duration::from_millis(300),
        ..Default::default()
    };
    let mut viewer = fake_viewer(3, Viewport::new(1000, 800), scaler);

    let t = Instant::now();
    viewer.start();
    viewer.handle(Action::NextPage);
    let presented = viewer.tick(Instant::now()).unwrap();
    assert!(!presented);
    assert!(t.elapsed() < Duration::from_millis(150));
}

#[test]
fn test_neighbors_are_prefetched_after_present() {
    let scaler = SlowScaler::default();
    let calls = Arc::clone(&scaler.calls);
    let mut viewer = fake_viewer(5, Viewport::new(1000, 800), scaler);
    viewer.start();
    present_next(&mut viewer);

    // Page 0: next two pages get warmed, there is no previous page.
    let deadline = Instant::now() + Duration::from_secs(5);
    while viewer.cache().len() < 3 {
        assert!(Instant::now() < deadline, "prefetch did not complete");
        thread::sleep(Duration::from_millis(5));
    }
    let pages = fake_pages(5);
    assert!(viewer.cache().contains(pages.get(1).unwrap()));
    assert!(viewer.cache().contains(pages.get(2).unwrap()));
    assert!(!viewer.cache().contains(pages.get(3).unwrap()));

    // Each page is scaled once; moving forward hits the warm cache.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(viewer.handle(Action::NextPage));
    present_next(&mut viewer);
    assert!(viewer.cache_stats().hits >= 1);
}

#[test]
fn test_close_stops_rendering() {
    let mut viewer = fake_viewer(3, Viewport::new(1000, 800), SlowScaler::default());
    viewer.start();
    present_next(&mut viewer);
    assert!(!viewer.handle(Action::Close));
    assert!(!viewer.is_running());
    assert!(!viewer.handle(Action::NextPage));
    assert_eq!(viewer.session().current_index(), 0);
    viewer.shutdown();
    viewer.shutdown();
}

#[test]
fn test_empty_selection_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("notes.txt"), "no pages here").unwrap();
    let err = selection::select(tmp.path()).err().expect("empty directory");
    assert!(matches!(err, fitview::ViewerError::EmptySelection(_)));
}
