//! Configuration loader for kaidan.
//!
//! * Looks for `kaidan.toml` in the cwd unless overridden by `--config`.
//! * Every field has a default so the file is optional.

use serde::Deserialize;
use std::fs;

use crate::settings::{Intensity, Language, VoiceName};

pub const DEFAULT_CONFIG_PATH: &str = "kaidan.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Master gain for the ambient soundscape (0.0 to 1.0).
    pub master_volume:          f32,
    /// Start the soundscape as soon as the director comes up.
    pub ambient_enabled:        bool,
    pub jump_scares_enabled:    bool,
    pub intensity:              Intensity,
    /// Narrator voice handed to the speech producer.
    pub voice:                  VoiceName,
    pub language:               Language,
    pub brightness:             f32,
    /// Begin playback from zero as soon as a narration finishes decoding.
    pub auto_play:              bool,
    /// Seconds before the cue at which anticipation starts.
    pub anticipation_lead_secs: f64,
    /// Generated payloads kept per settings session.
    pub voice_cache_capacity:   usize,
    /// Frame loop period used by the binary.
    pub frame_interval_ms:      u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            master_volume:          0.5,
            ambient_enabled:        false,
            jump_scares_enabled:    false,
            intensity:              Intensity::Standard,
            voice:                  VoiceName::default(),
            language:               Language::Japanese,
            brightness:             1.0,
            auto_play:              true,
            anticipation_lead_secs: 4.5,
            voice_cache_capacity:   8,
            frame_interval_ms:      16,
        }
    }
}

impl Config {
    /// Load from a TOML file; fall back to defaults on any error.
    pub fn load(path: Option<&str>) -> Self {
        let p = path.unwrap_or(DEFAULT_CONFIG_PATH);
        match fs::read_to_string(p) {
            Ok(text) => Self::parse(&text).unwrap_or_else(|e| {
                log::warn!("ignoring {p}: {e}");
                Self::default()
            }),
            Err(_) => {
                log::debug!("no config at {p}, using defaults");
                Self::default()
            }
        }
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}
