use serde::Deserialize;

use crate::config::Config;

/// How hard the jump scares hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Mild,
    #[default]
    Standard,
    Extreme,
}

impl Intensity {
    /// Cycle to the next variant.
    pub fn next(self) -> Self {
        use Intensity::*;
        match self {
            Mild     => Standard,
            Standard => Extreme,
            Extreme  => Mild,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Intensity::Mild => "Mild",
            Intensity::Standard => "Standard",
            Intensity::Extreme => "Extreme",
        }
    }
}

/// Narration language passed to the speech producer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "ja")]
    Japanese,
    #[serde(rename = "en")]
    English,
}

impl Language {
    /// Short line used when auditioning a narrator.
    pub fn preview_line(&self) -> &'static str {
        match self {
            Language::Japanese => "今夜は、あなたにだけ聞こえる話をしましょう。",
            Language::English => "Tonight, I will tell a story only you can hear.",
        }
    }
}

/// Narrator voice identifier. Open-ended: the speech producer decides what
/// is valid, [`VoiceName::KNOWN`] only lists the built-in choices.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct VoiceName(String);

impl VoiceName {
    pub const KNOWN: [&'static str; 9] = [
        "Fenrir", "Charon", "Kore", "Puck", "Zephyr", "Aoede", "Orion", "Lyra", "Ursa",
    ];

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_known(&self) -> bool {
        Self::KNOWN.contains(&self.0.as_str())
    }

    pub fn description(&self) -> Option<&'static str> {
        match self.0.as_str() {
            "Fenrir" => Some("Deep / Intense"),
            "Charon" => Some("Low / Authoritative"),
            "Kore" => Some("Calm / Clear"),
            "Puck" => Some("Neutral / Tenor"),
            "Zephyr" => Some("Soft / Gentle"),
            "Aoede" => Some("Confident / Proud"),
            _ => None,
        }
    }
}

impl Default for VoiceName {
    fn default() -> Self {
        Self::new("Fenrir")
    }
}

impl std::fmt::Display for VoiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Brightness slider bounds.
pub const BRIGHTNESS_RANGE: (f32, f32) = (0.2, 2.5);

/// Runtime listener preferences.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerProfile {
    pub intensity: Intensity,
    pub jump_scares_enabled: bool,
    pub voice: VoiceName,
    pub language: Language,
    pub brightness: f32,
}

impl Default for ListenerProfile {
    fn default() -> Self {
        Self {
            intensity: Intensity::Standard,
            jump_scares_enabled: false,
            voice: VoiceName::default(),
            language: Language::Japanese,
            brightness: 1.0,
        }
    }
}

impl ListenerProfile {
    pub fn from_config(config: &Config) -> Self {
        Self {
            intensity: config.intensity,
            jump_scares_enabled: config.jump_scares_enabled,
            voice: config.voice.clone(),
            language: config.language,
            brightness: config.brightness.clamp(BRIGHTNESS_RANGE.0, BRIGHTNESS_RANGE.1),
        }
    }

    /// Write the profile back over `base`, keeping its engine tunables.
    pub fn to_config(&self, base: &Config) -> Config {
        Config {
            intensity: self.intensity,
            jump_scares_enabled: self.jump_scares_enabled,
            voice: self.voice.clone(),
            language: self.language,
            brightness: self.brightness,
            ..base.clone()
        }
    }

    pub fn set_brightness(&mut self, brightness: f32) {
        self.brightness = brightness.clamp(BRIGHTNESS_RANGE.0, BRIGHTNESS_RANGE.1);
    }
}
