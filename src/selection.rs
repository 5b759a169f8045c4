//! Turn a user-chosen path into a page list.
//!
//! - `.cbz` / `.zip`: extracted into a fresh temp directory, every image found
//!   recursively becomes a page, starting at the first.
//! - image file: all images in the same directory, starting at the chosen one.
//! - directory: all images in it, starting at the first.
//!
//! The extraction directory is owned by the returned `Selection` and removed
//! recursively when it is dropped, whichever way the session ends.

use std::fs::File;
use std::path::{Path, PathBuf};

use log::{debug, info};
use tempfile::TempDir;

use crate::error::{Result, ViewerError};
use crate::page::PageList;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];
const ARCHIVE_EXTENSIONS: &[&str] = &["cbz", "zip"];

pub struct Selection {
    pub pages: PageList,
    pub start: usize,
    extracted: Option<TempDir>,
}

impl Selection {
    /// Directory the archive was extracted into, if any.
    pub fn extracted_dir(&self) -> Option<&Path> {
        self.extracted.as_ref().map(TempDir::path)
    }

    /// Display name for the page at `index` (file name only).
    pub fn page_name(&self, index: usize) -> Option<String> {
        self.pages
            .get(index)?
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }
}

fn has_extension(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| exts.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

pub fn is_image(path: &Path) -> bool {
    has_extension(path, IMAGE_EXTENSIONS)
}

pub fn is_archive(path: &Path) -> bool {
    has_extension(path, ARCHIVE_EXTENSIONS)
}

/// Resolve `path` into a page list and a start index.
pub fn select(path: &Path) -> Result<Selection> {
    let path = path.canonicalize().map_err(|e| {
        ViewerError::EmptySelection(format!("{}: {e}", path.display()))
    })?;

    if path.is_dir() {
        let pages = PageList::new(list_images(&path, false)?).map_err(|_| {
            ViewerError::EmptySelection(format!("no images in {}", path.display()))
        })?;
        info!("selection: {} page(s) in {}", pages.len(), path.display());
        return Ok(Selection {
            pages,
            start: 0,
            extracted: None,
        });
    }

    if is_archive(&path) {
        return select_archive(&path);
    }

    if !is_image(&path) {
        return Err(ViewerError::EmptySelection(format!(
            "{} is not an image or CBZ file",
            path.display()
        )));
    }

    let dir = path.parent().unwrap_or(Path::new("/"));
    let pages = PageList::new(list_images(dir, false)?)?;
    let start = pages.position(&path).unwrap_or(0);
    info!(
        "selection: {} page(s) in {}, starting at {}",
        pages.len(),
        dir.display(),
        start + 1
    );
    Ok(Selection {
        pages,
        start,
        extracted: None,
    })
}

fn select_archive(path: &Path) -> Result<Selection> {
    let temp = tempfile::Builder::new()
        .prefix("fitview-cbz-")
        .tempdir()
        .map_err(|e| extraction_error(path, e))?;
    extract_archive(path, temp.path())?;

    let images = list_images(temp.path(), true)?;
    let pages = PageList::new(images).map_err(|_| {
        ViewerError::EmptySelection(format!("archive {} contains no images", path.display()))
    })?;
    info!(
        "selection: extracted {} page(s) from {} into {}",
        pages.len(),
        path.display(),
        temp.path().display()
    );
    Ok(Selection {
        pages,
        start: 0,
        extracted: Some(temp),
    })
}

fn extraction_error(path: &Path, err: impl std::fmt::Display) -> ViewerError {
    ViewerError::ArchiveExtraction {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

/// Extract every entry of the zip archive at `archive` into `dest`.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|e| extraction_error(archive, e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| extraction_error(archive, e))?;
    debug!("selection: {} has {} entries", archive.display(), zip.len());
    zip.extract(dest).map_err(|e| extraction_error(archive, e))
}

/// Collect image files under `dir`. Hidden files and macOS resource-fork
/// folders are skipped.
fn list_images(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || name == "__MACOSX" {
                continue;
            }
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                if recursive {
                    stack.push(path);
                }
            } else if is_image(&path) {
                out.push(path);
            }
        }
    }
    Ok(out)
}
