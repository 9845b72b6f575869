//! Live analysis and visualization
//!
//! This module contains the frame-rate side of the looper:
//! - Analyser: per-track FFT tap producing byte-scaled frequency and
//!   time-domain data
//! - VizEngine: converts analyser output into smoothed per-track bands
//! - FrameLoop: cancellable handle to the running analysis thread

mod analyser;
mod viz;

pub use analyser::*;
pub use viz::*;
