//! Interactive control loop.
//!
//! One iteration per captured frame: sample the emotion, draw the overlay,
//! poll the keyboard once, and dispatch whatever command the key maps to.
//! Every collaborator is injected, so the loop runs unchanged against real
//! devices or deterministic stubs.

use std::io::Write;
use std::time::{Duration, Instant};

use crate::{
    locate_or_fallback, profile_for, synthesize_profile, AppConfig, AudioOutput, EmotionClassifier,
    EmotionSampler, EmotionState, Location, Locator, Overlay, PlaybackDispatcher,
    ProviderDirectory, Result, VideoFrame,
};

const KEY_ESCAPE: i32 = 27;

/// User commands bound to single keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `q` or Escape.
    Quit,
    /// `g`: synthesize and play a session for the current emotion.
    PlaySession,
    /// `d`: look up care providers around a freshly resolved location.
    FindProviders,
}

impl Command {
    /// Maps a raw key code (only the low byte is significant).
    pub fn from_key(code: i32) -> Option<Self> {
        match code & 0xFF {
            KEY_ESCAPE => Some(Command::Quit),
            code => match u8::try_from(code).map(char::from) {
                Ok('q') => Some(Command::Quit),
                Ok('g') => Some(Command::PlaySession),
                Ok('d') => Some(Command::FindProviders),
                _ => None,
            },
        }
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Quit,
    CaptureLost,
}

/// Sequential frames from a camera. A failed read is terminal.
pub trait FrameSource {
    type Frame: VideoFrame;

    fn next_frame(&mut self) -> Result<Self::Frame>;
}

/// Preview window and keyboard.
pub trait Display<F> {
    fn render(&mut self, frame: &mut F, overlay: &Overlay) -> Result<()>;

    /// Waits at most `timeout` for a key press.
    fn poll_key(&mut self, timeout: Duration) -> Result<Option<i32>>;
}

/// Loop parameters derived from [`AppConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    pub session_seconds: f64,
    pub sample_rate: u32,
    pub search_radius_m: u32,
    pub fallback_location: Location,
    pub key_poll: Duration,
}

impl LoopSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            session_seconds: config.session.duration_seconds,
            sample_rate: config.session.sample_rate,
            search_radius_m: config.network.search_radius_m,
            fallback_location: config.network.fallback_location.clone(),
            key_poll: config.capture.key_poll(),
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Services the loop calls into besides the camera and window.
pub struct Collaborators<F, O: AudioOutput> {
    pub classifier: Box<dyn EmotionClassifier<F>>,
    pub playback: PlaybackDispatcher<O>,
    pub locator: Box<dyn Locator>,
    pub providers: Box<dyn ProviderDirectory>,
    /// User-facing console output.
    pub console: Box<dyn Write>,
}

pub struct ControlLoop<S: FrameSource, D, O: AudioOutput> {
    source: S,
    display: D,
    sampler: EmotionSampler,
    services: Collaborators<S::Frame, O>,
    settings: LoopSettings,
}

impl<S, D, O> ControlLoop<S, D, O>
where
    S: FrameSource,
    D: Display<S::Frame>,
    O: AudioOutput,
{
    pub fn new(
        source: S,
        display: D,
        sampler: EmotionSampler,
        services: Collaborators<S::Frame, O>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            source,
            display,
            sampler,
            services,
            settings,
        }
    }

    pub fn emotion(&self) -> EmotionState {
        self.sampler.state()
    }

    /// Runs until the user quits or the camera stops delivering frames.
    /// Camera and window are released when the loop is dropped, which
    /// happens on every return path.
    pub fn run(mut self) -> LoopExit {
        let startup = locate_or_fallback(
            &mut *self.services.locator,
            &self.settings.fallback_location,
        );
        tracing::info!(
            city = %startup.city,
            latitude = startup.latitude,
            longitude = startup.longitude,
            "detected location"
        );
        self.say("Controls: g=play binaural, d=find doctors, q=quit");

        loop {
            if let Some(exit) = self.step() {
                tracing::info!(?exit, "control loop finished");
                return exit;
            }
        }
    }

    /// Performs a single iteration. Returns `Some` when the loop must stop.
    pub fn step(&mut self) -> Option<LoopExit> {
        let mut frame = match self.source.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "frame capture failed, stopping");
                return Some(LoopExit::CaptureLost);
            }
        };

        self.sampler
            .tick(Instant::now(), &frame, &mut *self.services.classifier);

        let overlay = Overlay::for_state(&self.sampler.state());
        if let Err(err) = self.display.render(&mut frame, &overlay) {
            tracing::warn!(error = %err, "could not render frame");
        }

        let key = match self.display.poll_key(self.settings.key_poll) {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!(error = %err, "keyboard poll failed");
                None
            }
        };

        match key.and_then(Command::from_key) {
            Some(Command::Quit) => return Some(LoopExit::Quit),
            Some(command) => self.dispatch(command),
            None => {}
        }
        None
    }

    /// Executes a non-quit command against the current emotion snapshot.
    pub fn dispatch(&mut self, command: Command) {
        match command {
            Command::Quit => {}
            Command::PlaySession => {
                let state = self.sampler.state();
                self.play_session(state);
            }
            Command::FindProviders => self.find_providers(),
        }
    }

    fn play_session(&mut self, state: EmotionState) {
        let profile = profile_for(state.label);
        self.say(&format!(
            "Playing binaural: {}, {}Hz beat, {}Hz carrier",
            state.label, profile.beat_hz, profile.carrier_hz
        ));
        tracing::info!(
            emotion = %state.label,
            beat_hz = profile.beat_hz,
            carrier_hz = profile.carrier_hz,
            "starting binaural session"
        );

        match synthesize_profile(
            profile,
            self.settings.session_seconds,
            self.settings.sample_rate,
        ) {
            Ok(buffer) => {
                let dispatch = self.services.playback.play(buffer);
                tracing::debug!(?dispatch, "playback dispatched");
            }
            Err(err) => tracing::warn!(error = %err, "could not synthesize session"),
        }
    }

    fn find_providers(&mut self) {
        let location = locate_or_fallback(
            &mut *self.services.locator,
            &self.settings.fallback_location,
        );
        let radius = self.settings.search_radius_m;

        match self.services.providers.nearby(&location, radius) {
            Ok(listings) if listings.is_empty() => {
                self.say(&format!("No providers found near {}.", location.city));
            }
            Ok(listings) => {
                self.say(&format!(
                    "Location detected: {} ({}, {})",
                    location.city, location.latitude, location.longitude
                ));
                for (index, listing) in listings.iter().enumerate() {
                    self.say(&format!(
                        "{}. {} (Lat: {}, Lon: {})\n   Open in Maps: {}",
                        index + 1,
                        listing.name,
                        listing.latitude,
                        listing.longitude,
                        listing.map_link
                    ));
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "provider lookup failed");
                self.say(&format!(
                    "Provider lookup failed: {err}. No providers found."
                ));
            }
        }
    }

    fn say(&mut self, line: &str) {
        if let Err(err) = writeln!(self.services.console, "{line}") {
            tracing::warn!(error = %err, "console write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::*;
    use crate::{
        ActiveStream, AudioBuffer, Classification, Emotion, MindbeatError, PlaybackPolicy,
        ProviderListing, Region,
    };

    struct Frame;

    impl VideoFrame for Frame {
        fn width(&self) -> u32 {
            640
        }

        fn height(&self) -> u32 {
            480
        }
    }

    struct Camera {
        remaining: usize,
        released: Rc<RefCell<bool>>,
    }

    impl FrameSource for Camera {
        type Frame = Frame;

        fn next_frame(&mut self) -> Result<Frame> {
            if self.remaining == 0 {
                return Err(MindbeatError::device("camera unplugged"));
            }
            self.remaining -= 1;
            Ok(Frame)
        }
    }

    impl Drop for Camera {
        fn drop(&mut self) {
            *self.released.borrow_mut() = true;
        }
    }

    #[derive(Default)]
    struct Window {
        keys: VecDeque<Option<i32>>,
        overlays: Rc<RefCell<Vec<String>>>,
    }

    impl Display<Frame> for Window {
        fn render(&mut self, _frame: &mut Frame, overlay: &Overlay) -> Result<()> {
            self.overlays.borrow_mut().push(overlay.text.clone());
            Ok(())
        }

        fn poll_key(&mut self, _timeout: Duration) -> Result<Option<i32>> {
            Ok(self.keys.pop_front().flatten())
        }
    }

    struct Classifier(VecDeque<Result<Classification>>);

    impl EmotionClassifier<Frame> for Classifier {
        fn classify(&mut self, _frame: &Frame, _region: Region) -> Result<Classification> {
            self.0
                .pop_front()
                .unwrap_or_else(|| Err(MindbeatError::classifier("no face")))
        }
    }

    struct Stream;

    impl ActiveStream for Stream {
        fn is_finished(&self) -> bool {
            false
        }

        fn stop(&mut self) {}
    }

    #[derive(Default, Clone)]
    struct Speaker(Rc<RefCell<Vec<AudioBuffer>>>);

    impl AudioOutput for Speaker {
        type Stream = Stream;

        fn start(&mut self, buffer: AudioBuffer) -> Result<Stream> {
            self.0.borrow_mut().push(buffer);
            Ok(Stream)
        }
    }

    struct Geo(Result<Location>, Rc<RefCell<usize>>);

    impl Locator for Geo {
        fn locate(&mut self) -> Result<Location> {
            *self.1.borrow_mut() += 1;
            match &self.0 {
                Ok(location) => Ok(location.clone()),
                Err(_) => Err(MindbeatError::network("timed out")),
            }
        }
    }

    struct Directory {
        listings: Option<Vec<ProviderListing>>,
        queries: Rc<RefCell<Vec<(Location, u32)>>>,
    }

    impl ProviderDirectory for Directory {
        fn nearby(&mut self, center: &Location, radius_m: u32) -> Result<Vec<ProviderListing>> {
            self.queries.borrow_mut().push((center.clone(), radius_m));
            self.listings
                .clone()
                .ok_or_else(|| MindbeatError::network("overpass unavailable"))
        }
    }

    #[derive(Clone, Default)]
    struct Console(Rc<RefCell<Vec<u8>>>);

    impl Write for Console {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Console {
        fn text(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    struct Harness {
        released: Rc<RefCell<bool>>,
        overlays: Rc<RefCell<Vec<String>>>,
        played: Rc<RefCell<Vec<AudioBuffer>>>,
        lookups: Rc<RefCell<usize>>,
        queries: Rc<RefCell<Vec<(Location, u32)>>>,
        console: Console,
    }

    struct Script {
        frames: usize,
        keys: Vec<Option<i32>>,
        readings: Vec<Result<Classification>>,
        location: Result<Location>,
        listings: Option<Vec<ProviderListing>>,
    }

    impl Default for Script {
        fn default() -> Self {
            Self {
                frames: 1,
                keys: Vec::new(),
                readings: Vec::new(),
                location: Ok(Location::new("Pune", 18.52, 73.85)),
                listings: Some(Vec::new()),
            }
        }
    }

    fn build(script: Script) -> (ControlLoop<Camera, Window, Speaker>, Harness) {
        let harness = Harness {
            released: Rc::default(),
            overlays: Rc::default(),
            played: Rc::default(),
            lookups: Rc::default(),
            queries: Rc::default(),
            console: Console::default(),
        };

        let camera = Camera {
            remaining: script.frames,
            released: harness.released.clone(),
        };
        let window = Window {
            keys: script.keys.into(),
            overlays: harness.overlays.clone(),
        };
        let services = Collaborators {
            classifier: Box::new(Classifier(script.readings.into())) as Box<dyn EmotionClassifier<Frame>>,
            playback: PlaybackDispatcher::new(
                Speaker(harness.played.clone()),
                PlaybackPolicy::Overlap,
            ),
            locator: Box::new(Geo(script.location, harness.lookups.clone())),
            providers: Box::new(Directory {
                listings: script.listings,
                queries: harness.queries.clone(),
            }),
            console: Box::new(harness.console.clone()),
        };

        let control = ControlLoop::new(
            camera,
            window,
            EmotionSampler::default(),
            services,
            LoopSettings::default(),
        );
        (control, harness)
    }

    fn key(c: char) -> Option<i32> {
        Some(c as i32)
    }

    #[test]
    fn maps_keys_to_commands() {
        assert_eq!(Command::from_key('q' as i32), Some(Command::Quit));
        assert_eq!(Command::from_key(27), Some(Command::Quit));
        assert_eq!(Command::from_key('g' as i32), Some(Command::PlaySession));
        assert_eq!(Command::from_key('d' as i32), Some(Command::FindProviders));
        assert_eq!(Command::from_key(0x100 | 'g' as i32), Some(Command::PlaySession));
        assert_eq!(Command::from_key('x' as i32), None);
        assert_eq!(Command::from_key('Q' as i32), None);
    }

    #[test]
    fn happy_reading_plays_one_minute_alpha_session() {
        let (control, harness) = build(Script {
            frames: 3,
            keys: vec![None, key('g'), key('q')],
            readings: vec![Ok(Classification::new("happy", Some(82.3)))],
            ..Script::default()
        });

        assert_eq!(control.run(), LoopExit::Quit);

        let played = harness.played.borrow();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].len(), 2_646_000);
        assert_eq!(played[0].sample_rate(), 44_100);
        assert_eq!(
            harness.overlays.borrow().first().map(String::as_str),
            Some("Emotion: happy (82.3)")
        );
        assert!(harness
            .console
            .text()
            .contains("Playing binaural: happy, 10Hz beat, 440Hz carrier"));
        assert!(*harness.released.borrow());
    }

    #[test]
    fn disgust_reading_selects_its_profile() {
        let (mut control, harness) = build(Script {
            readings: vec![Ok(Classification::new("disgust", Some(55.0)))],
            ..Script::default()
        });

        assert_eq!(control.step(), None);
        assert_eq!(control.emotion().label, Emotion::Disgust);
        assert_eq!(profile_for(control.emotion().label).beat_hz, 6.0);
        assert_eq!(profile_for(control.emotion().label).carrier_hz, 330.0);
        drop(control);
        assert!(*harness.released.borrow());
    }

    #[test]
    fn capture_failure_ends_loop_and_releases_devices() {
        let (control, harness) = build(Script {
            frames: 2,
            ..Script::default()
        });

        assert_eq!(control.run(), LoopExit::CaptureLost);
        assert_eq!(harness.overlays.borrow().len(), 2);
        assert!(*harness.released.borrow());
    }

    #[test]
    fn classifier_failure_keeps_previous_emotion() {
        let (mut control, _harness) = build(Script {
            frames: 2,
            readings: vec![
                Ok(Classification::new("sad", Some(61.0))),
                Err(MindbeatError::classifier("no face")),
            ],
            ..Script::default()
        });

        control.step();
        let before = control.emotion();
        control.step();
        assert_eq!(control.emotion(), before);
    }

    #[test]
    fn escape_quits() {
        let (control, harness) = build(Script {
            frames: 10,
            keys: vec![Some(27)],
            ..Script::default()
        });

        assert_eq!(control.run(), LoopExit::Quit);
        assert_eq!(harness.overlays.borrow().len(), 1);
    }

    #[test]
    fn provider_search_uses_fresh_location_and_fixed_radius() {
        let (mut control, harness) = build(Script {
            frames: 2,
            keys: vec![key('d'), key('d')],
            listings: Some(vec![
                ProviderListing::new("City Clinic", 18.53, 73.86),
                ProviderListing::new("Unknown", 18.54, 73.87),
            ]),
            ..Script::default()
        });

        control.step();
        control.step();

        assert_eq!(*harness.lookups.borrow(), 2);
        let queries = harness.queries.borrow();
        assert_eq!(queries.len(), 2);
        assert!(queries.iter().all(|(_, radius)| *radius == 1000));

        let text = harness.console.text();
        assert!(text.contains("Location detected: Pune (18.52, 73.85)"));
        let first = text.find("1. City Clinic (Lat: 18.53, Lon: 73.86)").unwrap();
        let second = text.find("2. Unknown").unwrap();
        assert!(first < second);
        assert!(text.contains("Open in Maps: https://www.google.com/maps?q=18.53,73.86"));
    }

    #[test]
    fn geolocation_timeout_searches_around_fallback() {
        let (mut control, harness) = build(Script {
            keys: vec![key('d')],
            location: Err(MindbeatError::network("timed out")),
            ..Script::default()
        });

        assert_eq!(control.step(), None);

        let queries = harness.queries.borrow();
        assert_eq!(queries[0].0.latitude, 28.6139);
        assert_eq!(queries[0].0.longitude, 77.2090);
    }

    #[test]
    fn empty_results_are_reported_and_loop_continues() {
        let (mut control, harness) = build(Script {
            frames: 2,
            keys: vec![key('d'), None],
            ..Script::default()
        });

        assert_eq!(control.step(), None);
        assert_eq!(control.step(), None);
        assert!(harness.console.text().contains("No providers found near Pune."));
    }

    #[test]
    fn lookup_errors_are_reported_not_fatal() {
        let (mut control, harness) = build(Script {
            keys: vec![key('d')],
            listings: None,
            ..Script::default()
        });

        assert_eq!(control.step(), None);
        let text = harness.console.text();
        assert!(text.contains("Provider lookup failed"));
        assert!(text.contains("No providers found"));
    }

    #[test]
    fn other_keys_do_nothing() {
        let (mut control, harness) = build(Script {
            keys: vec![key('x')],
            readings: vec![Ok(Classification::new("fear", Some(20.0)))],
            ..Script::default()
        });

        let before_lookups = *harness.lookups.borrow();
        assert_eq!(control.step(), None);
        assert!(harness.played.borrow().is_empty());
        assert_eq!(*harness.lookups.borrow(), before_lookups);
        assert_eq!(control.emotion().label, Emotion::Fear);
    }
}
