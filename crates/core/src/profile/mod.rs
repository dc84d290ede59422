use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of emotions the classifier can report and the table can map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Surprise,
    Fear,
    Disgust,
    #[default]
    Neutral,
}

impl Emotion {
    pub const ALL: [Emotion; 7] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Surprise,
        Emotion::Fear,
        Emotion::Disgust,
        Emotion::Neutral,
    ];

    /// Parses a classifier label, ignoring ASCII case and surrounding
    /// whitespace. Returns `None` for anything outside the closed set.
    pub fn parse(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|emotion| emotion.as_str() == normalized)
    }

    /// Like [`Emotion::parse`] but reroutes unknown labels to `Neutral`.
    pub fn coerce(label: &str) -> Self {
        Self::parse(label).unwrap_or(Emotion::Neutral)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Surprise => "surprise",
            Emotion::Fear => "fear",
            Emotion::Disgust => "disgust",
            Emotion::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Beat and carrier pair used to synthesize a session for one emotion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcousticProfile {
    pub beat_hz: f32,
    pub carrier_hz: f32,
}

impl AcousticProfile {
    pub const fn new(beat_hz: f32, carrier_hz: f32) -> Self {
        Self {
            beat_hz,
            carrier_hz,
        }
    }
}

const NEUTRAL_PROFILE: AcousticProfile = AcousticProfile::new(10.0, 440.0);

/// Static emotion to profile table. Every emotion has an entry, so lookups
/// by [`Emotion`] are total.
pub fn profile_for(emotion: Emotion) -> AcousticProfile {
    match emotion {
        Emotion::Happy => AcousticProfile::new(10.0, 440.0),
        Emotion::Sad => AcousticProfile::new(6.0, 220.0),
        Emotion::Angry => AcousticProfile::new(8.0, 440.0),
        Emotion::Surprise => AcousticProfile::new(7.0, 440.0),
        Emotion::Fear => AcousticProfile::new(4.0, 220.0),
        Emotion::Disgust => AcousticProfile::new(6.0, 330.0),
        Emotion::Neutral => NEUTRAL_PROFILE,
    }
}

/// Looks up a raw label. Labels outside the table resolve to the neutral
/// profile instead of failing.
pub fn profile_for_label(label: &str) -> AcousticProfile {
    Emotion::parse(label)
        .map(profile_for)
        .unwrap_or(NEUTRAL_PROFILE)
}

/// Iterates the full table in declaration order.
pub fn profiles() -> impl Iterator<Item = (Emotion, AcousticProfile)> {
    Emotion::ALL
        .into_iter()
        .map(|emotion| (emotion, profile_for(emotion)))
}
