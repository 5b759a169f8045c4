//! Width-fit scaling: decode → Lanczos resample → PNG encode.
//!
//! `scale_bytes` is the pure, fallible core. `ImageScaler` wraps it for the
//! cache: failures never escape, they become a blank viewport-sized frame
//! plus one notice on the error side channel.

use std::io::Cursor;
use std::path::Path;
use std::time::Instant;

use image::error::{LimitError, LimitErrorKind};
use image::imageops::FilterType;
use image::{ImageError, ImageFormat, RgbImage};
use log::{debug, error};

use crate::error::{Result, ViewerError};
use crate::notice::NoticeSender;
use crate::page::{PageId, ScaledPage, Viewport};

/// Scaled pages taller than this are rejected as undisplayable.
pub const MAX_SCALED_HEIGHT: u32 = 32_768;

/// Produces the scaled page for a page identifier. Must not fail: errors are
/// reported out of band and replaced by a fallback frame.
pub trait Scaler: Send + Sync {
    fn scale(&self, page: &PageId) -> ScaledPage;
}

/// Output height for a source of `src_w`×`src_h` fitted to `target_w`.
pub fn fitted_height(src_w: u32, src_h: u32, target_w: u32) -> u32 {
    let factor = target_w as f64 / src_w as f64;
    ((src_h as f64 * factor).round() as u32).max(1)
}

/// Decode an encoded image and fit it to the viewport width.
pub fn scale_bytes(data: &[u8], viewport: Viewport) -> std::result::Result<ScaledPage, ImageError> {
    let img = image::load_from_memory(data)?;
    let (src_w, src_h) = (img.width(), img.height());
    if src_w == 0 || src_h == 0 {
        return Err(ImageError::Limits(LimitError::from_kind(
            LimitErrorKind::DimensionError,
        )));
    }

    let out_h = fitted_height(src_w, src_h, viewport.width);
    if out_h > MAX_SCALED_HEIGHT {
        return Err(ImageError::Limits(LimitError::from_kind(
            LimitErrorKind::DimensionError,
        )));
    }

    let resized = img
        .resize_exact(viewport.width, out_h, FilterType::Lanczos3)
        .to_rgb8();
    let png = encode_png(&resized)?;
    Ok(ScaledPage::new(png, viewport.width, out_h))
}

/// Read and scale the image at `path`.
pub fn scale_image(path: &Path, viewport: Viewport) -> Result<ScaledPage> {
    let start = Instant::now();
    let data = std::fs::read(path).map_err(|source| ViewerError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let page = scale_bytes(&data, viewport).map_err(|source| ViewerError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(
        "scale: {} -> {}x{} ({} bytes) in {:.1}ms",
        path.display(),
        page.width,
        page.height,
        page.raster.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(page)
}

/// Solid black frame covering the whole viewport.
pub fn fallback_page(viewport: Viewport) -> ScaledPage {
    let blank = RgbImage::new(viewport.width, viewport.height);
    let png = match encode_png(&blank) {
        Ok(png) => png,
        Err(e) => {
            error!("scale: failed to encode fallback frame: {e}");
            Vec::new()
        }
    };
    ScaledPage::new(png, viewport.width, viewport.height)
}

fn encode_png(img: &RgbImage) -> std::result::Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// Production scaler: reads page files from disk.
pub struct ImageScaler {
    viewport: Viewport,
    notices: NoticeSender,
}

impl ImageScaler {
    pub fn new(viewport: Viewport, notices: NoticeSender) -> Self {
        Self { viewport, notices }
    }
}

impl Scaler for ImageScaler {
    fn scale(&self, page: &PageId) -> ScaledPage {
        match scale_image(page.path(), self.viewport) {
            Ok(scaled) => scaled,
            Err(e) => {
                self.notices.report(&e);
                fallback_page(self.viewport)
            }
        }
    }
}
