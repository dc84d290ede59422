//! Core library for the MindBeat application.
//!
//! MindBeat watches a webcam, periodically classifies the dominant facial
//! emotion, and on request plays a binaural beat tuned to that emotion. This
//! crate holds the device-independent parts: the profile table, the
//! synthesizer, the debounced sampler, the playback dispatcher and the
//! interactive control loop. Cameras, windows, audio devices and HTTP
//! services are reached through traits implemented by the application crate.

pub mod chat;
pub mod config;
pub mod control;
pub mod error;
pub mod location;
pub mod overlay;
pub mod playback;
pub mod profile;
pub mod sampler;
pub mod synth;

pub use chat::{is_exit_command, ChatBackend, ChatMessage, ChatSession, ConversationState, Role};
pub use config::{
    AppConfig, CaptureConfig, ChatConfig, ClassifierConfig, NetworkConfig, SamplerConfig,
    SessionConfig,
};
pub use control::{
    Collaborators, Command, ControlLoop, Display, FrameSource, LoopExit, LoopSettings,
};
pub use error::{MindbeatError, Result};
pub use location::{
    locate_or_fallback, map_link, overpass_query, parse_overpass_json, Location, Locator,
    ProviderDirectory, ProviderListing,
};
pub use overlay::{overlay_text, Overlay};
pub use playback::{ActiveStream, AudioOutput, Dispatch, PlaybackDispatcher, PlaybackPolicy};
pub use profile::{profile_for, profile_for_label, profiles, AcousticProfile, Emotion};
pub use sampler::{
    Classification, EmotionClassifier, EmotionSampler, EmotionState, Region, SampleOutcome,
    VideoFrame, DEFAULT_DEBOUNCE,
};
pub use synth::{synthesize, synthesize_profile, AudioBuffer, FadeEnvelope};
