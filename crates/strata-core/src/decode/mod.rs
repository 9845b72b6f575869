//! Loop asset decoding
//!
//! Decodes a loop file (mp3/wav/flac/ogg via symphonia) into an in-memory
//! stereo buffer and resamples it to the engine rate, so every loaded loop
//! plays back at native speed regardless of the source rate.

use std::fs::File;
use std::path::{Path, PathBuf};

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::types::{Sample, StereoBuffer, StereoSample, SAMPLE_RATE};

/// Errors that can occur while loading a loop asset
///
/// All of these are per-track and non-fatal: a failed loop is logged and
/// skipped, the rest of the bank still loads.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The asset could not be read at all
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The asset was read but its audio data is malformed or unsupported
    #[error("failed to decode {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// The container held no audio track
    #[error("no audio track found in {0}")]
    NoAudioTrack(PathBuf),

    /// Sample rate conversion to the engine rate failed
    #[error("failed to resample {path}: {reason}")]
    Resample { path: PathBuf, reason: String },
}

/// A fully decoded loop, resampled to the engine rate
#[derive(Debug, Clone)]
pub struct LoopBuffer {
    samples: StereoBuffer,
    sample_rate: u32,
}

impl LoopBuffer {
    /// Wrap a decoded buffer with its sample rate
    pub fn new(samples: StereoBuffer, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Number of sample frames in the loop
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the loop holds no audio
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample rate of the stored audio
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Loop duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Get the sample frames
    #[inline]
    pub fn samples(&self) -> &[StereoSample] {
        self.samples.as_slice()
    }
}

/// Decode a loop file and resample it to `target_rate`
pub fn load_loop(path: &Path, target_rate: u32) -> Result<LoopBuffer, DecodeError> {
    let (left, right, src_rate) = decode_file(path)?;

    let (left, right) = if src_rate != target_rate {
        resample_stereo(&left, &right, src_rate, target_rate).map_err(|reason| {
            DecodeError::Resample {
                path: path.to_path_buf(),
                reason,
            }
        })?
    } else {
        (left, right)
    };

    Ok(LoopBuffer::new(
        StereoBuffer::from_channels(&left, &right),
        target_rate,
    ))
}

/// Decode a file to split left/right channel data at its native rate
///
/// Mono sources are duplicated into both channels; sources with more than
/// two channels keep the first two.
fn decode_file(path: &Path) -> Result<(Vec<Sample>, Vec<Sample>, u32), DecodeError> {
    let malformed = |reason: String| DecodeError::Malformed {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| DecodeError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| malformed(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::NoAudioTrack(path.to_path_buf()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params.sample_rate.unwrap_or(SAMPLE_RATE);
    let channels = codec_params.channels.map(|c| c.count()).unwrap_or(2).max(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| malformed(e.to_string()))?;

    let mut sample_buf: Option<SampleBuffer<Sample>> = None;
    let mut left = Vec::new();
    let mut right = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(malformed(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let buf = sample_buf.get_or_insert_with(|| {
                    SampleBuffer::<Sample>::new(decoded.capacity() as u64, *decoded.spec())
                });
                buf.copy_interleaved_ref(decoded);
                for frame in buf.samples().chunks(channels) {
                    left.push(frame[0]);
                    right.push(if channels > 1 { frame[1] } else { frame[0] });
                }
            }
            // A corrupt packet is skipped; the rest of the stream may still decode
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(malformed(e.to_string())),
        }
    }

    if left.is_empty() {
        return Err(malformed("decoded zero audio frames".to_string()));
    }

    Ok((left, right, sample_rate))
}

/// One-shot whole-buffer resample of a stereo pair
fn resample_stereo(
    left: &[Sample],
    right: &[Sample],
    src_rate: u32,
    target_rate: u32,
) -> Result<(Vec<Sample>, Vec<Sample>), String> {
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<Sample>::new(
        target_rate as f64 / src_rate as f64,
        2.0,
        params,
        left.len(),
        2,
    )
    .map_err(|e| e.to_string())?;

    let waves = resampler
        .process(&[left, right], None)
        .map_err(|e| e.to_string())?;

    let mut waves = waves.into_iter();
    Ok((
        waves.next().unwrap_or_default(),
        waves.next().unwrap_or_default(),
    ))
}
