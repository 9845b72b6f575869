//! Audio backend configuration

/// Default sample rate preference (48 kHz)
///
/// Decoded loops are resampled to the negotiated rate at load time, so a
/// device that only supports another rate still plays correctly.
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Default output buffer size in frames
pub const DEFAULT_BUFFER_SIZE: u32 = 256;

/// Maximum buffer size to pre-allocate for real-time safety
///
/// Covers all common device configurations (64 to 4096 frames), so the
/// audio callback never allocates.
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Requested output buffer size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferSize {
    /// Let the backend pick a reasonable default
    #[default]
    Default,
    /// Request a fixed frame count, clamped to sane bounds
    Fixed(u32),
}

/// Audio system configuration
#[derive(Debug, Clone, Default)]
pub struct AudioConfig {
    /// Output device name; None selects the host default
    pub device: Option<String>,
    /// Preferred sample rate; None selects [`DEFAULT_SAMPLE_RATE`]
    pub sample_rate: Option<u32>,
    /// Output buffer size preference
    pub buffer_size: BufferSize,
}
