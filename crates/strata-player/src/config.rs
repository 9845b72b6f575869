//! Player configuration for strata-player
//!
//! Configuration is stored as YAML in the user's config directory.
//! Default location: ~/.config/strata-player/config.yaml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use strata_core::audio::{AudioConfig, BufferSize};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Audio settings (output device, buffer size)
    pub audio: AudioSettings,
    /// Directory holding the seven loop assets
    pub sounds_dir: PathBuf,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            audio: AudioSettings::default(),
            sounds_dir: PathBuf::from("sounds"),
        }
    }
}

/// Audio configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Output device name; unset selects the host default
    pub device: Option<String>,
    /// Output buffer size in frames; 0 selects the backend default
    pub buffer_size: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            device: None,
            buffer_size: 0,
        }
    }
}

impl AudioSettings {
    /// Convert to the backend configuration
    pub fn to_audio_config(&self) -> AudioConfig {
        AudioConfig {
            device: self.device.clone(),
            sample_rate: None,
            buffer_size: if self.buffer_size == 0 {
                BufferSize::Default
            } else {
                BufferSize::Fixed(self.buffer_size)
            },
        }
    }
}

/// Get the default config file path
///
/// Returns: ~/.config/strata-player/config.yaml
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("strata-player")
        .join("config.yaml")
}

/// Load configuration from a YAML file
///
/// If the file doesn't exist, returns default config.
/// If the file exists but is invalid, logs a warning and returns default config.
pub fn load_config(path: &Path) -> PlayerConfig {
    if !path.exists() {
        log::info!("load_config: no config at {:?}, using defaults", path);
        return PlayerConfig::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<PlayerConfig>(&contents) {
            Ok(config) => {
                log::info!(
                    "load_config: loaded config - sounds dir: {:?}, buffer: {}",
                    config.sounds_dir,
                    config.audio.buffer_size
                );
                config
            }
            Err(e) => {
                log::warn!("load_config: failed to parse config: {}, using defaults", e);
                PlayerConfig::default()
            }
        },
        Err(e) => {
            log::warn!(
                "load_config: failed to read config file: {}, using defaults",
                e
            );
            PlayerConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PlayerConfig::default();
        assert_eq!(config.sounds_dir, PathBuf::from("sounds"));
        assert!(config.audio.device.is_none());
        assert_eq!(config.audio.buffer_size, 0);
        assert_eq!(config.audio.to_audio_config().buffer_size, BufferSize::Default);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = PlayerConfig {
            audio: AudioSettings {
                device: Some("USB Interface".to_string()),
                buffer_size: 512,
            },
            sounds_dir: PathBuf::from("/tmp/loops"),
        };

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: PlayerConfig = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(parsed.audio.device.as_deref(), Some("USB Interface"));
        assert_eq!(parsed.audio.buffer_size, 512);
        assert_eq!(parsed.sounds_dir, PathBuf::from("/tmp/loops"));
        assert_eq!(
            parsed.audio.to_audio_config().buffer_size,
            BufferSize::Fixed(512)
        );
    }

    #[test]
    fn test_load_missing_config_uses_defaults() {
        let config = load_config(Path::new("/nonexistent/strata/config.yaml"));
        assert_eq!(config.sounds_dir, PathBuf::from("sounds"));
    }
}
