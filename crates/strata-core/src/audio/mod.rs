//! Cross-platform audio backend
//!
//! Provides the CPAL output stream hosting the looper engine.
//!
//! # Architecture
//!
//! The audio system follows a lock-free design for real-time safety:
//!
//! - **Session thread**: sends commands via a lock-free ringbuffer
//! - **Audio thread**: owns the LooperEngine exclusively, processes commands
//!   at buffer boundaries and feeds the per-track analysis taps
//! - **Analysis thread**: drains the taps at frame rate
//!
//! Any error during startup is fatal for the session; there is no retry.

mod config;
mod cpal_backend;
mod error;

pub use config::{
    AudioConfig, BufferSize, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE,
};
pub use cpal_backend::{start_audio_system, AudioHandle, AudioSystemResult};
pub use error::{AudioError, AudioResult};
