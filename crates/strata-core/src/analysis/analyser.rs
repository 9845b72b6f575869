//! Per-track spectral analyser
//!
//! Each track routes its post-gain signal into an analysis tap: a lock-free
//! ring written by the audio callback and drained at frame rate. The
//! analyser keeps a short window of the most recent samples and converts it
//! into byte-scaled (0-255) frequency bins, with exponential smoothing of
//! linear magnitudes across frames, plus a byte view of the raw time-domain
//! window centered at 128.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Analysis window length in samples
pub const FFT_SIZE: usize = 128;

/// Number of frequency bins exposed (half the window)
pub const BIN_COUNT: usize = FFT_SIZE / 2;

/// Capacity of one analysis tap ring
///
/// At 48 kHz a 60 fps frame drains ~800 samples, so this holds several
/// frames of slack before the audio thread starts dropping tap samples.
pub const TAP_CAPACITY: usize = 8192;

/// Decibel range mapped onto the 0-255 byte scale
const MIN_DB: f32 = -90.0;
const MAX_DB: f32 = -10.0;

/// Per-frame smoothing applied to linear magnitudes
const SMOOTHING: f32 = 0.65;

/// Create an analysis tap ring for one track
///
/// The producer goes to the audio thread, the consumer to the analysis
/// thread.
pub fn tap_channel() -> (rtrb::Producer<f32>, rtrb::Consumer<f32>) {
    rtrb::RingBuffer::new(TAP_CAPACITY)
}

/// FFT analyser over a rolling sample window
pub struct Analyser {
    fft: Arc<dyn Fft<f32>>,
    /// Ring of the most recent FFT_SIZE samples
    window: [f32; FFT_SIZE],
    write_pos: usize,
    /// Smoothed linear magnitudes carried across frames
    smoothed: [f32; BIN_COUNT],
}

impl Analyser {
    /// Plan the shared forward FFT
    pub fn plan() -> Arc<dyn Fft<f32>> {
        FftPlanner::new().plan_fft_forward(FFT_SIZE)
    }

    /// Create an analyser using a previously planned FFT
    pub fn new(fft: Arc<dyn Fft<f32>>) -> Self {
        Self {
            fft,
            window: [0.0; FFT_SIZE],
            write_pos: 0,
            smoothed: [0.0; BIN_COUNT],
        }
    }

    /// Append one sample drained from the tap
    #[inline]
    pub fn push_sample(&mut self, sample: f32) {
        self.window[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % FFT_SIZE;
    }

    /// Copy the window out in time order, oldest first
    fn linearized(&self) -> [f32; FFT_SIZE] {
        let mut out = [0.0; FFT_SIZE];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.window[(self.write_pos + i) % FFT_SIZE];
        }
        out
    }

    /// Byte-scaled frequency data for the current window
    pub fn byte_frequency_data(&mut self, out: &mut [u8; BIN_COUNT]) {
        let window = self.linearized();

        let mut buf = [Complex::new(0.0f32, 0.0); FFT_SIZE];
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = Complex::new(window[i] * hann_window(i, FFT_SIZE), 0.0);
        }
        self.fft.process(&mut buf);

        for (k, out_byte) in out.iter_mut().enumerate() {
            let magnitude = buf[k].norm() / FFT_SIZE as f32;
            self.smoothed[k] = SMOOTHING * self.smoothed[k] + (1.0 - SMOOTHING) * magnitude;

            let db = 20.0 * self.smoothed[k].max(f32::MIN_POSITIVE).log10();
            let scaled = 255.0 * (db - MIN_DB) / (MAX_DB - MIN_DB);
            *out_byte = scaled.clamp(0.0, 255.0) as u8;
        }
    }

    /// Byte-scaled time-domain data, centered at 128
    pub fn byte_time_domain_data(&self, out: &mut [u8; BIN_COUNT]) {
        let window = self.linearized();
        for (i, out_byte) in out.iter_mut().enumerate() {
            let sample = window[FFT_SIZE - BIN_COUNT + i];
            *out_byte = (sample * 128.0 + 128.0).clamp(0.0, 255.0) as u8;
        }
    }
}

/// Hann window function
fn hann_window(index: usize, size: usize) -> f32 {
    0.5 * (1.0 - ((2.0 * PI * index as f32) / (size as f32 - 1.0)).cos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    fn analyser() -> Analyser {
        Analyser::new(Analyser::plan())
    }

    #[test]
    fn test_hann_window_shape() {
        let size = FFT_SIZE;
        assert!(hann_window(0, size).abs() < 0.01);
        assert!(hann_window(size - 1, size).abs() < 0.01);
        assert!((hann_window(size / 2, size) - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_silence_maps_to_zero_bins() {
        let mut analyser = analyser();
        let mut freq = [0u8; BIN_COUNT];
        analyser.byte_frequency_data(&mut freq);
        assert!(freq.iter().all(|&b| b == 0));

        let mut time = [0u8; BIN_COUNT];
        analyser.byte_time_domain_data(&mut time);
        assert!(time.iter().all(|&b| b == 128));
    }

    #[test]
    fn test_sine_peaks_in_expected_bin() {
        // 3 kHz at 48 kHz with a 128-point window lands exactly in bin 8
        let mut analyser = analyser();
        let rate = 48000.0;
        for n in 0..FFT_SIZE {
            let t = n as f32 / rate;
            analyser.push_sample(0.5 * (TAU * 3000.0 * t).sin());
        }

        // Run several frames so the magnitude smoothing converges
        let mut freq = [0u8; BIN_COUNT];
        for _ in 0..12 {
            analyser.byte_frequency_data(&mut freq);
        }

        assert!(freq[8] > 180, "peak bin too quiet: {}", freq[8]);
        assert!(freq[40] < 60, "far bin too loud: {}", freq[40]);
    }

    #[test]
    fn test_time_domain_byte_scaling() {
        let mut analyser = analyser();
        for _ in 0..FFT_SIZE {
            analyser.push_sample(1.0);
        }
        let mut time = [0u8; BIN_COUNT];
        analyser.byte_time_domain_data(&mut time);
        assert!(time.iter().all(|&b| b == 255));

        for _ in 0..FFT_SIZE {
            analyser.push_sample(-1.0);
        }
        analyser.byte_time_domain_data(&mut time);
        assert!(time.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_tap_channel_roundtrip() {
        let (mut tx, mut rx) = tap_channel();
        tx.push(0.25).unwrap();
        assert_eq!(rx.pop().unwrap(), 0.25);
        assert!(rx.pop().is_err());
    }
}
