//! Fit-to-width image paging engine.
//!
//! Pages are scaled to the viewport width, cached (LRU, persisted to a
//! scratch directory), prefetched around the current page, and presented
//! through a [`sink::DisplaySink`].

pub mod cache;
pub mod config;
pub mod error;
pub mod notice;
pub mod overlay;
pub mod page;
pub mod prefetch;
pub mod ready;
pub mod scale;
pub mod selection;
pub mod sink;
pub mod viewer;

pub use error::{Result, ViewerError};
