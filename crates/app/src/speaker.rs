//! Stereo output through the default cpal device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig, StreamError};
use mindbeat_core::{ActiveStream, AudioBuffer, AudioOutput, MindbeatError, Result};

const CHANNELS: u16 = 2;

/// Opens a fresh output stream on the default device for every session.
#[derive(Debug, Default)]
pub struct Speaker;

impl AudioOutput for Speaker {
    type Stream = SpeakerStream;

    fn start(&mut self, buffer: AudioBuffer) -> Result<SpeakerStream> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| MindbeatError::device("no output device"))?;
        let config = StreamConfig {
            channels: CHANNELS,
            sample_rate: cpal::SampleRate(buffer.sample_rate()),
            buffer_size: cpal::BufferSize::Default,
        };

        let samples = buffer.into_interleaved();
        let finished = Arc::new(AtomicBool::new(samples.is_empty()));
        let done = finished.clone();
        let mut cursor = 0_usize;

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for slot in data.iter_mut() {
                        *slot = samples.get(cursor).copied().unwrap_or(0.0);
                        cursor += 1;
                    }
                    if cursor >= samples.len() {
                        done.store(true, Ordering::Release);
                    }
                },
                log_stream_error,
                None,
            )
            .map_err(|err| MindbeatError::device(err.to_string()))?;
        stream
            .play()
            .map_err(|err| MindbeatError::device(err.to_string()))?;

        Ok(SpeakerStream {
            stream: Some(stream),
            finished,
        })
    }
}

/// Handle to a sounding session. Dropping it halts output.
pub struct SpeakerStream {
    stream: Option<Stream>,
    finished: Arc<AtomicBool>,
}

impl ActiveStream for SpeakerStream {
    fn is_finished(&self) -> bool {
        self.stream.is_none() || self.finished.load(Ordering::Acquire)
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                tracing::debug!(error = %err, "could not pause stream before dropping it");
            }
        }
    }
}

fn log_stream_error(error: StreamError) {
    tracing::warn!(%error, "audio stream error");
}
