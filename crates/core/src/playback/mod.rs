use serde::{Deserialize, Serialize};

use crate::{AudioBuffer, Result};

/// What to do when a session is requested while another is still sounding.
///
/// `Overlap` is the historic behaviour, where every `g` press started an
/// independent stream. `Replace` is the default so sessions never stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPolicy {
    /// Stop the current stream, then start the new one.
    #[default]
    Replace,
    /// Let streams overlap acoustically (historic behaviour).
    Overlap,
    /// Ignore the request until the current stream finishes.
    RejectWhileActive,
}

/// A stream that is (or was) sounding on the output device.
pub trait ActiveStream {
    /// True once every sample has been handed to the device.
    fn is_finished(&self) -> bool;
    /// Halts output. Dropping a stream must also halt it.
    fn stop(&mut self);
}

/// Output device capable of starting asynchronous stereo playback.
pub trait AudioOutput {
    type Stream: ActiveStream;

    /// Begins playing `buffer` and returns without waiting for completion.
    fn start(&mut self, buffer: AudioBuffer) -> Result<Self::Stream>;
}

/// Result of a [`PlaybackDispatcher::play`] request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Started,
    /// The previous session was stopped to make room.
    Replaced,
    /// A session was already active and the policy rejects new ones.
    Rejected,
    /// The device refused the stream; the error has been logged.
    DeviceUnavailable,
}

/// Fire-and-forget front end for an [`AudioOutput`]. Device failures are
/// logged and never surface to the caller.
pub struct PlaybackDispatcher<O: AudioOutput> {
    output: O,
    policy: PlaybackPolicy,
    active: Vec<O::Stream>,
}

impl<O: AudioOutput> PlaybackDispatcher<O> {
    pub fn new(output: O, policy: PlaybackPolicy) -> Self {
        Self {
            output,
            policy,
            active: Vec::new(),
        }
    }

    pub fn policy(&self) -> PlaybackPolicy {
        self.policy
    }

    /// Number of streams that are still sounding.
    pub fn active_streams(&mut self) -> usize {
        self.prune();
        self.active.len()
    }

    pub fn play(&mut self, buffer: AudioBuffer) -> Dispatch {
        self.prune();

        let mut replaced = false;
        match self.policy {
            PlaybackPolicy::RejectWhileActive if !self.active.is_empty() => {
                tracing::info!("session already playing, ignoring request");
                return Dispatch::Rejected;
            }
            PlaybackPolicy::Replace => {
                for mut stream in self.active.drain(..) {
                    stream.stop();
                    replaced = true;
                }
            }
            _ => {}
        }

        let frames = buffer.len();
        let sample_rate = buffer.sample_rate();
        match self.output.start(buffer) {
            Ok(stream) => {
                tracing::debug!(frames, sample_rate, replaced, "playback started");
                self.active.push(stream);
                if replaced {
                    Dispatch::Replaced
                } else {
                    Dispatch::Started
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "audio output unavailable");
                Dispatch::DeviceUnavailable
            }
        }
    }

    /// Stops every active stream.
    pub fn stop_all(&mut self) {
        for mut stream in self.active.drain(..) {
            stream.stop();
        }
    }

    fn prune(&mut self) {
        self.active.retain(|stream| !stream.is_finished());
    }
}

impl<O: AudioOutput> Drop for PlaybackDispatcher<O> {
    fn drop(&mut self) {
        self.stop_all();
    }
}
