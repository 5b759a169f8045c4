//! Page identity, the ordered page list, and scaled page values.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, ViewerError};

/// Stable identifier for a page: its resolved file path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(Arc<Path>);

impl PageId {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(Arc::from(path.into()))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Ordered, non-empty sequence of pages, sorted lexicographically by path.
#[derive(Clone, Debug)]
pub struct PageList {
    pages: Vec<PageId>,
}

impl PageList {
    /// Build a page list from unsorted paths. Fails with `EmptySelection`
    /// when there is nothing to show.
    pub fn new(paths: Vec<PathBuf>) -> Result<Self> {
        if paths.is_empty() {
            return Err(ViewerError::EmptySelection("no images found".into()));
        }
        let mut pages: Vec<PageId> = paths.into_iter().map(PageId::new).collect();
        pages.sort();
        pages.dedup();
        Ok(Self { pages })
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Always false: an empty list cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PageId> {
        self.pages.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageId> {
        self.pages.iter()
    }

    /// Index of the page whose path equals `path`.
    pub fn position(&self, path: &Path) -> Option<usize> {
        self.pages.iter().position(|p| p.path() == path)
    }

    /// Prefetch neighbourhood of `current`: 2 forward + 1 backward, in range.
    pub fn neighbors(&self, current: usize) -> Vec<usize> {
        [current + 1, current + 2, current.wrapping_sub(1)]
            .into_iter()
            .filter(|&i| i < self.pages.len())
            .collect()
    }
}

/// Fixed rendering surface size in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }
}

/// A page scaled to the viewport width and encoded as PNG.
///
/// Cloning shares the encoded bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScaledPage {
    pub raster: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    /// Persisted copy for sinks that load images by reference.
    pub file: Option<PathBuf>,
}

impl ScaledPage {
    pub fn new(raster: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            raster: Arc::from(raster),
            width,
            height,
            file: None,
        }
    }

    /// Bottom-most scroll offset for this page inside `viewport`.
    pub fn max_offset(&self, viewport: Viewport) -> u32 {
        self.height.saturating_sub(viewport.height)
    }
}
