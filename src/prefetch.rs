//! Background warm-up of neighbouring pages.
//!
//! A small pool of workers consumes page ids from an mpsc queue in FIFO order
//! and runs `PageCache::get_or_compute`, discarding the result (the cache keeps
//! it). No drain-to-latest: the neighbour set is several independent ids and
//! every one of them should be warmed.
//!
//! `in_flight` holds ids queued but not yet finished. Checking the cache alone
//! leaves a window where a worker is mid-scale and the page is not yet
//! inserted, so the same page would be queued twice.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{debug, warn};

use crate::cache::PageCache;
use crate::page::PageId;

pub struct Prefetcher {
    tx: Option<mpsc::Sender<PageId>>,
    in_flight: Arc<Mutex<HashSet<PageId>>>,
    cache: Arc<PageCache>,
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl Prefetcher {
    pub fn spawn(cache: Arc<PageCache>, workers: usize) -> Self {
        let (tx, rx) = mpsc::channel::<PageId>();
        let rx = Arc::new(Mutex::new(rx));
        let in_flight = Arc::new(Mutex::new(HashSet::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let handles = (0..workers.max(1))
            .filter_map(|n| {
                let rx = Arc::clone(&rx);
                let cache = Arc::clone(&cache);
                let in_flight = Arc::clone(&in_flight);
                let stop = Arc::clone(&stop);
                thread::Builder::new()
                    .name(format!("prefetch-{n}"))
                    .spawn(move || worker_loop(n, &rx, &cache, &in_flight, &stop))
                    .map_err(|e| warn!("prefetch: failed to spawn worker {n}: {e}"))
                    .ok()
            })
            .collect();

        Self {
            tx: Some(tx),
            in_flight,
            cache,
            stop,
            workers: handles,
        }
    }

    /// Queue every id that is neither cached nor already in flight.
    pub fn warm<'a>(&self, ids: impl IntoIterator<Item = &'a PageId>) {
        let Some(tx) = &self.tx else {
            return;
        };
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        for id in ids {
            if self.cache.contains(id) || in_flight.contains(id) {
                continue;
            }
            debug!("prefetch: requesting {id}");
            if tx.send(id.clone()).is_ok() {
                in_flight.insert(id.clone());
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Close the queue and wait for workers to finish their current page.
    /// Queued pages that have not started are abandoned.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // Dropping the sender makes every idle worker's recv() fail.
        self.tx = None;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("prefetch: worker panicked");
            }
        }
    }
}

impl Drop for Prefetcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    n: usize,
    rx: &Mutex<mpsc::Receiver<PageId>>,
    cache: &PageCache,
    in_flight: &Mutex<HashSet<PageId>>,
    stop: &AtomicBool,
) {
    debug!("prefetch worker {n}: started");
    loop {
        // Hold the receiver lock only for the dequeue.
        let next = rx.lock().unwrap_or_else(PoisonError::into_inner).recv();
        let Ok(id) = next else {
            break;
        };
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let start = Instant::now();
        cache.get_or_compute(&id);
        debug!(
            "prefetch worker {n}: {id} done in {:.1}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
        in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
    debug!("prefetch worker {n}: channel closed, exiting");
}
