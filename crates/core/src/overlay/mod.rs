use crate::EmotionState;

/// Text drawn on top of each displayed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub text: String,
    /// Baseline origin in pixels from the top-left corner.
    pub origin: (i32, i32),
    pub scale: f64,
    /// Blue, green, red.
    pub color: (u8, u8, u8),
    pub thickness: i32,
}

impl Overlay {
    pub fn for_state(state: &EmotionState) -> Self {
        Self {
            text: overlay_text(state),
            origin: (10, 30),
            scale: 0.9,
            color: (0, 255, 0),
            thickness: 2,
        }
    }
}

/// `Emotion: <label> (<confidence>)` with one decimal place.
pub fn overlay_text(state: &EmotionState) -> String {
    format!("Emotion: {} ({:.1})", state.label, state.confidence)
}
