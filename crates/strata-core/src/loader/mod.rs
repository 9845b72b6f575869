//! Background bank loading
//!
//! Loads all seven registry loops concurrently. Each loop settles on its own
//! (success or failure); one bad asset never aborts the rest. Aggregate
//! progress is published through an atomic so the UI can poll it without
//! locking, and the finished bank is delivered over a channel from a
//! dedicated loader thread.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rayon::prelude::*;

use crate::decode::{self, LoopBuffer};
use crate::registry::TRACKS;
use crate::types::{TrackId, NUM_TRACKS};

/// The decoded loop bank, one optional buffer per registry track
///
/// A `None` slot means that track failed to load; it stays controllable in
/// the UI but produces no sound.
pub struct LoadedBank {
    pub loops: [Option<Arc<LoopBuffer>>; NUM_TRACKS],
}

impl LoadedBank {
    /// Number of tracks that decoded successfully
    pub fn loaded_count(&self) -> usize {
        self.loops.iter().filter(|l| l.is_some()).count()
    }

    /// Check whether a track has a decoded loop
    pub fn has_loop(&self, track: TrackId) -> bool {
        self.loops[track.index()].is_some()
    }
}

/// Load every registry loop from `dir`, resampled to `target_rate`
///
/// The seven loads run concurrently. After each one settles the shared
/// progress value advances to `floor(100 * settled / total)`, so progress
/// reaches 100 even when some loops fail.
pub fn load_bank(dir: &Path, target_rate: u32, progress: &AtomicU8) -> LoadedBank {
    let settled = AtomicUsize::new(0);
    let mut loops: [Option<Arc<LoopBuffer>>; NUM_TRACKS] = std::array::from_fn(|_| None);

    loops
        .par_iter_mut()
        .zip(TRACKS.par_iter())
        .for_each(|(slot, track)| {
            let path = dir.join(track.file);
            match decode::load_loop(&path, target_rate) {
                Ok(buffer) => {
                    log::info!(
                        "Loaded loop: {} ({:.2}s at {} Hz)",
                        track.name,
                        buffer.duration_seconds(),
                        buffer.sample_rate()
                    );
                    *slot = Some(Arc::new(buffer));
                }
                Err(e) => {
                    log::error!("Error loading loop {}: {}", track.name, e);
                }
            }

            let done = settled.fetch_add(1, Ordering::SeqCst) + 1;
            progress.store((100 * done / NUM_TRACKS) as u8, Ordering::SeqCst);
        });

    LoadedBank { loops }
}

/// Handle to the background bank loader thread
pub struct BankLoader {
    /// Channel delivering the finished bank
    rx: Receiver<LoadedBank>,
    /// Aggregate progress, 0-100
    progress: Arc<AtomicU8>,
    /// Thread handle (for graceful shutdown)
    _handle: JoinHandle<()>,
}

impl BankLoader {
    /// Spawn the loader thread for the bank in `dir`
    pub fn spawn(dir: PathBuf, target_rate: u32) -> Self {
        let (tx, rx) = mpsc::channel();
        let progress = Arc::new(AtomicU8::new(0));
        let thread_progress = progress.clone();

        let handle = thread::Builder::new()
            .name("bank-loader".to_string())
            .spawn(move || {
                log::info!("Bank loader started for {:?} at {} Hz", dir, target_rate);
                let bank = load_bank(&dir, target_rate, &thread_progress);
                log::info!(
                    "Bank load settled: {}/{} loops decoded",
                    bank.loaded_count(),
                    NUM_TRACKS
                );
                let _ = tx.send(bank);
            })
            .expect("Failed to spawn bank loader thread");

        Self {
            rx,
            progress,
            _handle: handle,
        }
    }

    /// Current aggregate loading progress (0-100)
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }

    /// Shared progress value for the session to poll
    pub fn progress_handle(&self) -> Arc<AtomicU8> {
        self.progress.clone()
    }

    /// Try to receive the finished bank (non-blocking)
    pub fn try_recv(&self) -> Option<LoadedBank> {
        match self.rx.try_recv() {
            Ok(bank) => Some(bank),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                log::error!("Bank loader thread disconnected unexpectedly");
                None
            }
        }
    }
}
