//! Visualization bands and the analysis frame loop
//!
//! Converts each track's analyser output into eight smoothed intensity
//! bands at animation-frame cadence. All tracks are recomputed under a
//! single lock per frame, so a reader never observes a half-updated set.
//! Re-render signals are coalesced to every sixth frame; the underlying
//! values still update every frame.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::types::{NUM_BANDS, NUM_TRACKS};

use super::analyser::{Analyser, BIN_COUNT};

/// Floor applied to the combined signal so bands stay visibly alive even in
/// near-silence
pub const MIN_BAND_LEVEL: f32 = 0.05;

/// A re-render signal fires once per this many frames
pub const REDRAW_INTERVAL: u64 = 6;

/// Frame cadence of the analysis loop (~60 fps)
const FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

/// One visual-intensity band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub height: f32,
    pub opacity: f32,
}

impl Default for Band {
    fn default() -> Self {
        Self {
            height: 0.0,
            opacity: 0.3,
        }
    }
}

/// The eight bands of one track
#[derive(Debug, Clone, Default)]
pub struct TrackBands {
    pub bands: [Band; NUM_BANDS],
}

/// Visualization state for all tracks
///
/// Written only by the analysis frame loop; everything else reads.
#[derive(Debug, Clone, Default)]
pub struct VizState {
    pub tracks: [TrackBands; NUM_TRACKS],
}

impl VizState {
    /// Reset every band to its resting value
    pub fn zero(&mut self) {
        for track in &mut self.tracks {
            for band in &mut track.bands {
                *band = Band::default();
            }
        }
    }
}

/// Recompute one track's bands from its analyser output
///
/// Frequency bins are sampled at an even stride; the time-domain index
/// rotates with the frame counter to keep the bands moving even when the
/// spectrum is static. The combined value is floored at
/// [`MIN_BAND_LEVEL`], low-pass smoothed against the previous frame, and
/// clamped to [0, 1].
pub fn update_bands(bands: &mut [Band; NUM_BANDS], freq: &[u8], time: &[u8], frame: u64) {
    let step = freq.len() / NUM_BANDS;
    for (i, band) in bands.iter_mut().enumerate() {
        let freq_value = freq.get(i * step).copied().unwrap_or(0);
        let time_index = i * 4 + (frame % 4) as usize;
        let time_value = time.get(time_index).copied().unwrap_or(128);

        let freq_norm = freq_value as f32 / 255.0;
        let time_norm = ((time_value as f32 - 128.0) / 128.0).abs();

        let combined = (freq_norm * 0.8 + time_norm * 0.8).max(MIN_BAND_LEVEL);
        let height = (band.height * 0.7 + combined * 0.3).clamp(0.0, 1.0);

        band.height = height;
        band.opacity = 0.3 + height * 0.7;
    }
}

/// Frame-rate analysis engine
///
/// Owns the tap consumers and analysers for all tracks, and publishes the
/// shared [`VizState`] plus a redraw generation counter.
pub struct VizEngine {
    taps: [rtrb::Consumer<f32>; NUM_TRACKS],
    analysers: [Analyser; NUM_TRACKS],
    /// Tracks with live audio behind their taps; the rest keep resting bands
    active: [bool; NUM_TRACKS],
    state: Arc<Mutex<VizState>>,
    generation: Arc<AtomicU64>,
    frame_count: u64,
}

impl VizEngine {
    /// Create the engine around one tap consumer per track
    pub fn new(taps: [rtrb::Consumer<f32>; NUM_TRACKS]) -> Self {
        let fft = Analyser::plan();
        Self {
            taps,
            analysers: std::array::from_fn(|_| Analyser::new(fft.clone())),
            active: [false; NUM_TRACKS],
            state: Arc::new(Mutex::new(VizState::default())),
            generation: Arc::new(AtomicU64::new(0)),
            frame_count: 0,
        }
    }

    /// Shared visualization state handle
    pub fn state_handle(&self) -> Arc<Mutex<VizState>> {
        self.state.clone()
    }

    /// Shared redraw generation handle
    pub fn generation_handle(&self) -> Arc<AtomicU64> {
        self.generation.clone()
    }

    /// Mark which tracks have loaded loops behind their taps
    pub fn set_active(&mut self, active: [bool; NUM_TRACKS]) {
        self.active = active;
    }

    /// One analysis frame
    ///
    /// Drains every tap, recomputes all active tracks' bands under a single
    /// lock, then coalesces the re-render signal.
    pub fn tick(&mut self) {
        self.frame_count += 1;

        let mut freq = [0u8; BIN_COUNT];
        let mut time = [0u8; BIN_COUNT];

        let mut state = self.state.lock().unwrap();
        for idx in 0..NUM_TRACKS {
            while let Ok(sample) = self.taps[idx].pop() {
                self.analysers[idx].push_sample(sample);
            }
            if !self.active[idx] {
                continue;
            }
            self.analysers[idx].byte_frequency_data(&mut freq);
            self.analysers[idx].byte_time_domain_data(&mut time);
            update_bands(&mut state.tracks[idx].bands, &freq, &time, self.frame_count);
        }
        drop(state);

        if self.frame_count % REDRAW_INTERVAL == 0 {
            self.generation.fetch_add(1, Ordering::Release);
        }
    }
}

/// Cancellable handle to the running frame loop
pub struct FrameLoop {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<VizEngine>,
}

impl FrameLoop {
    /// Cancel the loop synchronously and recover the engine
    ///
    /// No tick runs after this returns.
    pub fn cancel(self) -> VizEngine {
        self.cancel.store(true, Ordering::Release);
        self.handle.join().expect("visualization thread panicked")
    }
}

/// Start the frame loop, consuming the engine until cancelled
pub fn start_frame_loop(mut engine: VizEngine) -> FrameLoop {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();

    let handle = thread::Builder::new()
        .name("strata-viz".to_string())
        .spawn(move || {
            while !flag.load(Ordering::Acquire) {
                let started = Instant::now();
                engine.tick();
                if let Some(rest) = FRAME_INTERVAL.checked_sub(started.elapsed()) {
                    thread::sleep(rest);
                }
            }
            engine
        })
        .expect("Failed to spawn visualization thread");

    FrameLoop { cancel, handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tap_channel;

    fn test_engine() -> (VizEngine, Vec<rtrb::Producer<f32>>) {
        let mut producers = Vec::new();
        let taps = std::array::from_fn(|_| {
            let (producer, consumer) = tap_channel();
            producers.push(producer);
            consumer
        });
        (VizEngine::new(taps), producers)
    }

    #[test]
    fn test_resting_band_values() {
        let state = VizState::default();
        for track in &state.tracks {
            for band in &track.bands {
                assert_eq!(band.height, 0.0);
                assert_eq!(band.opacity, 0.3);
            }
        }
    }

    #[test]
    fn test_combined_signal_floor() {
        // Pure silence still produces motion through the floor value
        let mut bands = [Band::default(); NUM_BANDS];
        let freq = [0u8; BIN_COUNT];
        let time = [128u8; BIN_COUNT];

        update_bands(&mut bands, &freq, &time, 1);
        for band in &bands {
            assert!((band.height - MIN_BAND_LEVEL * 0.3).abs() < 1e-6);
            assert!((band.opacity - (0.3 + band.height * 0.7)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_height_clamped_to_unit_range() {
        // Saturated input combines to 1.6 before the clamp
        let mut bands = [Band::default(); NUM_BANDS];
        let freq = [255u8; BIN_COUNT];
        let time = [0u8; BIN_COUNT];

        for frame in 1..=60 {
            update_bands(&mut bands, &freq, &time, frame);
            for band in &bands {
                assert!(band.height <= 1.0);
                assert!(band.opacity <= 1.0);
            }
        }
        assert!(bands[0].height > 0.99);
    }

    #[test]
    fn test_smoothing_responds_within_frames() {
        let mut bands = [Band::default(); NUM_BANDS];
        let freq = [200u8; BIN_COUNT];
        let time = [128u8; BIN_COUNT];

        update_bands(&mut bands, &freq, &time, 1);
        let first = bands[0].height;
        update_bands(&mut bands, &freq, &time, 2);
        let second = bands[0].height;

        assert!(first > 0.0);
        assert!(second > first, "smoothed height should keep rising");
    }

    #[test]
    fn test_rotating_time_index() {
        // Band 0 reads time index frame % 4, injecting motion from the
        // time-domain data even when the spectrum is static
        let mut time = [128u8; BIN_COUNT];
        time[1] = 255;

        let mut quiet = [Band::default(); NUM_BANDS];
        let mut moving = [Band::default(); NUM_BANDS];
        let freq = [0u8; BIN_COUNT];

        // Frame 4 reads index 0 (quiet), frame 5 reads index 1 (loud)
        update_bands(&mut quiet, &freq, &time, 4);
        update_bands(&mut moving, &freq, &time, 5);

        assert!(moving[0].height > quiet[0].height);
    }

    #[test]
    fn test_redraw_coalescing() {
        let (mut engine, _producers) = test_engine();
        let generation = engine.generation_handle();

        for _ in 0..REDRAW_INTERVAL {
            engine.tick();
        }
        assert_eq!(generation.load(Ordering::Acquire), 1);

        for _ in 0..(REDRAW_INTERVAL * 3) {
            engine.tick();
        }
        assert_eq!(generation.load(Ordering::Acquire), 4);
    }

    #[test]
    fn test_inactive_tracks_keep_resting_bands() {
        let (mut engine, mut producers) = test_engine();
        let state = engine.state_handle();

        let mut active = [false; NUM_TRACKS];
        active[0] = true;
        engine.set_active(active);

        // Feed a loud signal into both track 0 (active) and track 1 (not)
        for _ in 0..256 {
            let _ = producers[0].push(0.9);
            let _ = producers[1].push(0.9);
        }
        for _ in 0..10 {
            engine.tick();
        }

        let state = state.lock().unwrap();
        assert!(state.tracks[0].bands[0].height > 0.05);
        assert_eq!(state.tracks[1].bands[0].height, 0.0);
        assert_eq!(state.tracks[1].bands[0].opacity, 0.3);
    }

    #[test]
    fn test_frame_loop_cancels_synchronously() {
        let (engine, _producers) = test_engine();
        let generation = engine.generation_handle();

        let frame_loop = start_frame_loop(engine);
        thread::sleep(Duration::from_millis(200));
        let _engine = frame_loop.cancel();

        let settled = generation.load(Ordering::Acquire);
        assert!(settled > 0, "loop never ticked");
        thread::sleep(Duration::from_millis(100));
        assert_eq!(generation.load(Ordering::Acquire), settled);
    }
}
