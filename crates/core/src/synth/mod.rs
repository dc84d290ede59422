use std::f64::consts::TAU;

use crate::{AcousticProfile, MindbeatError, Result};

/// Fade length in seconds applied at both ends of a session.
const FADE_SECONDS: f64 = 0.02;
/// Keeps the fades from swallowing very short buffers.
const MAX_FADE_FRACTION: usize = 10;
/// Guards normalization against silent buffers.
const NORMALIZE_EPSILON: f64 = 1e-9;
/// Products this close to a whole frame count are binary rounding noise.
const FRAME_SNAP: f64 = 1e-6;

/// Stereo sample buffer produced by [`synthesize`] and consumed once by
/// playback.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    frames: Vec<[f32; 2]>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, frames: Vec<[f32; 2]>) -> Self {
        Self {
            sample_rate,
            frames,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// `[left, right]` pairs in playback order.
    pub fn frames(&self) -> &[[f32; 2]] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames.len() as f64 / self.sample_rate.max(1) as f64
    }

    pub fn left(&self) -> impl Iterator<Item = f32> + '_ {
        self.frames.iter().map(|frame| frame[0])
    }

    pub fn right(&self) -> impl Iterator<Item = f32> + '_ {
        self.frames.iter().map(|frame| frame[1])
    }

    /// Largest absolute amplitude across both channels.
    pub fn peak(&self) -> f32 {
        self.frames
            .iter()
            .flat_map(|frame| frame.iter())
            .fold(0.0_f32, |peak, sample| peak.max(sample.abs()))
    }

    /// Flattens the buffer into `L R L R ...` order for output devices.
    pub fn into_interleaved(self) -> Vec<f32> {
        self.frames.into_iter().flatten().collect()
    }
}

/// Linear fade-in/fade-out gain curve over a buffer of `len` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeEnvelope {
    len: usize,
    fade_len: usize,
}

impl FadeEnvelope {
    /// Fade covers 20 ms of audio, capped at a tenth of the buffer.
    pub fn for_buffer(len: usize, sample_rate: u32) -> Self {
        let by_time = (FADE_SECONDS * sample_rate as f64).floor() as usize;
        Self {
            len,
            fade_len: by_time.min(len / MAX_FADE_FRACTION),
        }
    }

    pub fn fade_len(&self) -> usize {
        self.fade_len
    }

    /// Gain in `[0, 1]` at frame `index`. The first and last frames of a
    /// faded buffer are silent.
    pub fn gain(&self, index: usize) -> f64 {
        if self.fade_len == 0 || index >= self.len {
            return if index < self.len { 1.0 } else { 0.0 };
        }

        if index < self.fade_len {
            ramp(index, self.fade_len)
        } else if index >= self.len - self.fade_len {
            let from_end = self.len - 1 - index;
            ramp(from_end, self.fade_len)
        } else {
            1.0
        }
    }
}

/// `floor(duration * sample_rate)` taken on the decimal value, so `2.3 s` at
/// 44.1 kHz is 101 430 frames even though the binary product falls just short.
fn frame_count(duration: f64, sample_rate: u32) -> usize {
    let product = duration * sample_rate as f64;
    let nearest = product.round();
    if (product - nearest).abs() <= FRAME_SNAP {
        nearest as usize
    } else {
        product.floor() as usize
    }
}

/// `k`-th point of an inclusive linear ramp from 0 to 1 over `len` points.
fn ramp(k: usize, len: usize) -> f64 {
    if len <= 1 {
        0.0
    } else {
        k as f64 / (len - 1) as f64
    }
}

/// Renders a binaural session: the left ear hears `carrier_hz`, the right
/// ear `carrier_hz + beat_hz`. The result is faded at both ends and
/// normalized so the joint peak does not exceed 1.
///
/// The output holds exactly `floor(duration_seconds * sample_rate)` frames and
/// is a pure function of its inputs.
pub fn synthesize(
    duration_seconds: f64,
    beat_hz: f32,
    carrier_hz: f32,
    sample_rate: u32,
) -> Result<AudioBuffer> {
    if !(duration_seconds > 0.0) || !duration_seconds.is_finite() {
        return Err(MindbeatError::InvalidInput(
            "session duration must be a positive number of seconds",
        ));
    }
    if sample_rate == 0 {
        return Err(MindbeatError::InvalidInput("sample rate must be positive"));
    }
    if !(carrier_hz > 0.0) || !carrier_hz.is_finite() {
        return Err(MindbeatError::InvalidInput("carrier frequency must be positive"));
    }
    if !(beat_hz >= 0.0) || !beat_hz.is_finite() {
        return Err(MindbeatError::InvalidInput("beat frequency must not be negative"));
    }

    let len = frame_count(duration_seconds, sample_rate);
    let envelope = FadeEnvelope::for_buffer(len, sample_rate);
    let left_hz = carrier_hz as f64;
    let right_hz = left_hz + beat_hz as f64;
    let step = if len == 0 { 0.0 } else { duration_seconds / len as f64 };

    let mut raw = Vec::with_capacity(len);
    let mut peak = 0.0_f64;
    for index in 0..len {
        let t = index as f64 * step;
        let gain = envelope.gain(index);
        let left = (TAU * left_hz * t).sin() * gain;
        let right = (TAU * right_hz * t).sin() * gain;
        peak = peak.max(left.abs()).max(right.abs());
        raw.push((left, right));
    }

    let scale = peak + NORMALIZE_EPSILON;
    let frames = raw
        .into_iter()
        .map(|(left, right)| [(left / scale) as f32, (right / scale) as f32])
        .collect();

    Ok(AudioBuffer::new(sample_rate, frames))
}

/// Convenience wrapper that renders a session for a table profile.
pub fn synthesize_profile(
    profile: AcousticProfile,
    duration_seconds: f64,
    sample_rate: u32,
) -> Result<AudioBuffer> {
    synthesize(
        duration_seconds,
        profile.beat_hz,
        profile.carrier_hz,
        sample_rate,
    )
}
