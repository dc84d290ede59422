use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::{Emotion, MindbeatError, Result};

/// Minimum spacing between two classifier invocations.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1200);

/// Most recent emotion reading held between classifier calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmotionState {
    pub label: Emotion,
    /// Classifier confidence in percent, `0..=100`.
    pub confidence: f32,
    /// When the reading was adopted; `None` until the first classification.
    pub observed_at: Option<Instant>,
}

impl Default for EmotionState {
    fn default() -> Self {
        Self {
            label: Emotion::Neutral,
            confidence: 0.0,
            observed_at: None,
        }
    }
}

/// Rectangle inside a frame, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Central part of a `width x height` frame with a sixth trimmed from
    /// every side.
    pub fn central(width: u32, height: u32) -> Self {
        let top = height / 6;
        let bottom = (height * 5 / 6).min(height);
        let left = width / 6;
        let right = (width * 5 / 6).min(width);
        Self {
            x: left,
            y: top,
            width: right.saturating_sub(left),
            height: bottom.saturating_sub(top),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Anything with pixel dimensions that a classifier can look at.
pub trait VideoFrame {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// Raw classifier answer before it is mapped onto the closed emotion set.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,
    pub confidence: Option<f32>,
}

impl Classification {
    pub fn new(label: impl Into<String>, confidence: Option<f32>) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }

    /// Decodes a DeepFace-style analysis payload: a single object or a list
    /// whose first element is used, carrying `dominant_emotion` and a map of
    /// per-label scores.
    pub fn from_json(body: &str) -> Result<Self> {
        let report: AnalysisReport = serde_json::from_str(body)?;
        let analysis = match report {
            AnalysisReport::Single(analysis) => analysis,
            AnalysisReport::Many(list) => list
                .into_iter()
                .next()
                .ok_or_else(|| MindbeatError::classifier("empty analysis list"))?,
        };

        let label = analysis
            .dominant_emotion
            .ok_or_else(|| MindbeatError::classifier("no dominant emotion in analysis"))?;
        let confidence = analysis
            .emotion
            .as_ref()
            .and_then(|scores| scores.get(&label))
            .copied();

        Ok(Self { label, confidence })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnalysisReport {
    Single(Analysis),
    Many(Vec<Analysis>),
}

#[derive(Deserialize)]
struct Analysis {
    dominant_emotion: Option<String>,
    emotion: Option<std::collections::HashMap<String, f32>>,
}

/// Opaque emotion recognition capability. Implementations must report a
/// missing face as an error rather than panicking.
pub trait EmotionClassifier<F> {
    fn classify(&mut self, frame: &F, region: Region) -> Result<Classification>;
}

/// What happened on a single sampler tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// Still inside the debounce window; nothing was classified.
    Held,
    /// A new reading was adopted.
    Updated(EmotionState),
    /// The classifier was asked but produced nothing usable.
    Failed,
}

/// Debounces classifier calls and holds the latest confident reading.
#[derive(Debug, Clone)]
pub struct EmotionSampler {
    interval: Duration,
    last_update: Option<Instant>,
    state: EmotionState,
}

impl Default for EmotionSampler {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl EmotionSampler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_update: None,
            state: EmotionState::default(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> EmotionState {
        self.state
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    /// True when `now` lies outside the debounce window.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_update {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.interval,
        }
    }

    /// Runs one tick: classifies the central crop of `frame` if the window
    /// has elapsed. A failed classification keeps both the held state and the
    /// window start, so the next tick retries.
    pub fn tick<F, C>(&mut self, now: Instant, frame: &F, classifier: &mut C) -> SampleOutcome
    where
        F: VideoFrame,
        C: EmotionClassifier<F> + ?Sized,
    {
        if !self.is_due(now) {
            return SampleOutcome::Held;
        }

        let region = Region::central(frame.width(), frame.height());
        let classification = match classifier.classify(frame, region) {
            Ok(classification) if !classification.label.trim().is_empty() => classification,
            Ok(_) => {
                tracing::debug!("classifier returned an empty label");
                return SampleOutcome::Failed;
            }
            Err(err) => {
                tracing::debug!(error = %err, "classification failed, holding previous emotion");
                return SampleOutcome::Failed;
            }
        };

        let label = Emotion::parse(&classification.label).unwrap_or_else(|| {
            tracing::debug!(label = %classification.label, "unrecognized label, using neutral");
            Emotion::Neutral
        });
        let confidence = classification
            .confidence
            .filter(|value| value.is_finite())
            .map(|value| value.clamp(0.0, 100.0))
            .unwrap_or(0.0);

        self.state = EmotionState {
            label,
            confidence,
            observed_at: Some(now),
        };
        self.last_update = Some(now);
        tracing::debug!(emotion = %label, confidence, "emotion updated");

        SampleOutcome::Updated(self.state)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use proptest::prelude::*;

    use super::*;

    struct Frame(u32, u32);

    impl VideoFrame for Frame {
        fn width(&self) -> u32 {
            self.0
        }

        fn height(&self) -> u32 {
            self.1
        }
    }

    #[derive(Default)]
    struct Scripted {
        replies: VecDeque<Result<Classification>>,
        regions: Vec<Region>,
    }

    impl Scripted {
        fn reply(mut self, reply: Result<Classification>) -> Self {
            self.replies.push_back(reply);
            self
        }
    }

    impl EmotionClassifier<Frame> for Scripted {
        fn classify(&mut self, _frame: &Frame, region: Region) -> Result<Classification> {
            self.regions.push(region);
            self.replies
                .pop_front()
                .unwrap_or_else(|| Ok(Classification::new("happy", Some(50.0))))
        }
    }

    #[test]
    fn adopts_first_reading_immediately() {
        let mut sampler = EmotionSampler::default();
        let mut classifier =
            Scripted::default().reply(Ok(Classification::new("happy", Some(82.3))));
        let now = Instant::now();

        let outcome = sampler.tick(now, &Frame(640, 480), &mut classifier);

        let state = sampler.state();
        assert_eq!(outcome, SampleOutcome::Updated(state));
        assert_eq!(state.label, Emotion::Happy);
        assert_eq!(state.confidence, 82.3);
        assert_eq!(state.observed_at, Some(now));
    }

    #[test]
    fn crops_away_a_sixth_on_each_side() {
        let mut sampler = EmotionSampler::default();
        let mut classifier = Scripted::default();
        sampler.tick(Instant::now(), &Frame(600, 480), &mut classifier);

        assert_eq!(
            classifier.regions,
            vec![Region {
                x: 100,
                y: 80,
                width: 400,
                height: 320,
            }]
        );
    }

    #[test]
    fn holds_within_the_debounce_window() {
        let mut sampler = EmotionSampler::default();
        let mut classifier = Scripted::default()
            .reply(Ok(Classification::new("sad", Some(40.0))))
            .reply(Ok(Classification::new("angry", Some(90.0))));
        let start = Instant::now();

        sampler.tick(start, &Frame(60, 60), &mut classifier);
        let held = sampler.tick(start + Duration::from_millis(1200), &Frame(60, 60), &mut classifier);

        assert_eq!(held, SampleOutcome::Held);
        assert_eq!(sampler.state().label, Emotion::Sad);
        assert_eq!(classifier.regions.len(), 1);

        let next = sampler.tick(start + Duration::from_millis(1201), &Frame(60, 60), &mut classifier);
        assert!(matches!(next, SampleOutcome::Updated(_)));
        assert_eq!(sampler.state().label, Emotion::Angry);
    }

    #[test]
    fn failure_keeps_previous_state_and_retries_next_tick() {
        let mut sampler = EmotionSampler::default();
        let mut classifier = Scripted::default()
            .reply(Ok(Classification::new("fear", Some(33.0))))
            .reply(Err(MindbeatError::classifier("no face")))
            .reply(Ok(Classification::new("", Some(10.0))))
            .reply(Ok(Classification::new("surprise", None)));
        let start = Instant::now();
        sampler.tick(start, &Frame(60, 60), &mut classifier);
        let before = sampler.state();

        let later = start + Duration::from_secs(2);
        assert_eq!(sampler.tick(later, &Frame(60, 60), &mut classifier), SampleOutcome::Failed);
        assert_eq!(sampler.state(), before);
        assert_eq!(sampler.last_update(), Some(start));

        let retry = later + Duration::from_millis(16);
        assert_eq!(sampler.tick(retry, &Frame(60, 60), &mut classifier), SampleOutcome::Failed);
        assert_eq!(sampler.state(), before);

        let recovered = retry + Duration::from_millis(16);
        sampler.tick(recovered, &Frame(60, 60), &mut classifier);
        assert_eq!(sampler.state().label, Emotion::Surprise);
        assert_eq!(sampler.state().confidence, 0.0);
    }

    #[test]
    fn unknown_labels_become_neutral() {
        let mut sampler = EmotionSampler::default();
        let mut classifier =
            Scripted::default().reply(Ok(Classification::new("Contempt", Some(71.0))));
        sampler.tick(Instant::now(), &Frame(60, 60), &mut classifier);

        assert_eq!(sampler.state().label, Emotion::Neutral);
        assert_eq!(sampler.state().confidence, 71.0);
    }

    #[test]
    fn labels_are_normalized_to_lowercase() {
        let mut sampler = EmotionSampler::default();
        let mut classifier =
            Scripted::default().reply(Ok(Classification::new("DISGUST", Some(55.0))));
        sampler.tick(Instant::now(), &Frame(60, 60), &mut classifier);

        assert_eq!(sampler.state().label, Emotion::Disgust);
    }

    #[test]
    fn decodes_single_analysis_object() {
        let body = r#"{"dominant_emotion":"happy","emotion":{"happy":82.3,"sad":1.2}}"#;
        let classification = Classification::from_json(body).unwrap();
        assert_eq!(classification, Classification::new("happy", Some(82.3)));
    }

    #[test]
    fn decodes_first_element_of_analysis_list() {
        let body = r#"[{"dominant_emotion":"sad"},{"dominant_emotion":"happy"}]"#;
        let classification = Classification::from_json(body).unwrap();
        assert_eq!(classification, Classification::new("sad", None));
    }

    #[test]
    fn rejects_analysis_without_dominant_emotion() {
        assert!(Classification::from_json("[]").is_err());
        assert!(Classification::from_json(r#"{"emotion":{}}"#).is_err());
        assert!(Classification::from_json("not json").is_err());
    }

    #[test]
    fn central_region_degrades_for_tiny_frames() {
        assert_eq!(
            Region::central(2, 2),
            Region {
                x: 0,
                y: 0,
                width: 1,
                height: 1,
            }
        );
        assert!(Region::central(0, 0).is_empty());
    }

    proptest! {
        #[test]
        fn never_updates_twice_within_the_interval(
            gaps in proptest::collection::vec(0_u64..2_500, 1..60),
        ) {
            let mut sampler = EmotionSampler::default();
            let mut classifier = Scripted::default();
            let mut now = Instant::now();
            let mut updates = Vec::new();

            for gap in gaps {
                now += Duration::from_millis(gap);
                if let SampleOutcome::Updated(state) =
                    sampler.tick(now, &Frame(30, 30), &mut classifier)
                {
                    updates.push(state.observed_at.unwrap());
                }
            }

            for pair in updates.windows(2) {
                prop_assert!(pair[1] - pair[0] > DEFAULT_DEBOUNCE);
            }
        }
    }
}
