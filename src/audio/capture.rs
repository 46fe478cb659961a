//! Microphone capture using CPAL.
//!
//! `MicCapture` opens the default input device and streams frames into a
//! [`SharedAudioBuffer`]: each callback's samples are downmixed to mono,
//! converted to i16, and appended as one [`AudioChunk`]. Encoding happens
//! later, at finalize time; capture only accumulates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};

use super::buffer::{AudioChunk, SharedAudioBuffer};

/// Errors that can occur while setting up audio capture.
#[derive(Debug, Clone)]
pub enum CaptureError {
    NoInputDevice,
    NoSupportedConfig,
    StreamCreationFailed(String),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::NoInputDevice => write!(f, "No audio input device found"),
            CaptureError::NoSupportedConfig => write!(f, "No supported audio configuration"),
            CaptureError::StreamCreationFailed(e) => {
                write!(f, "Failed to create audio stream: {}", e)
            }
        }
    }
}

impl std::error::Error for CaptureError {}

/// Handle to an active capture stream.
///
/// Dropping the handle stops the stream; the accumulated audio stays in the
/// shared buffer the capture was started with.
pub struct CaptureHandle {
    _stream: Stream,
    is_capturing: Arc<AtomicBool>,
    buffer: SharedAudioBuffer,
}

impl CaptureHandle {
    /// Stop capturing. Frames already delivered remain in the buffer.
    pub fn stop(self) {
        self.is_capturing.store(false, Ordering::SeqCst);
        log::info!(
            "Capture stopped: {} ms buffered",
            self.buffer.duration_ms()
        );
    }
}

/// Microphone capture source bound to the default input device.
pub struct MicCapture {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
}

impl MicCapture {
    /// Create a capture source using the default input device.
    pub fn new() -> Result<Self, CaptureError> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or(CaptureError::NoInputDevice)?;

        log::info!("Using audio input device: {:?}", device.name());

        let supported_config = device
            .default_input_config()
            .map_err(|_| CaptureError::NoSupportedConfig)?;

        log::info!(
            "Audio config: {} Hz, {} channels, {:?}",
            supported_config.sample_rate().0,
            supported_config.channels(),
            supported_config.sample_format()
        );

        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config.into();

        Ok(Self {
            device,
            config,
            sample_format,
        })
    }

    /// Sample rate frames will carry.
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Start streaming frames into `buffer`.
    pub fn start(&self, buffer: SharedAudioBuffer) -> Result<CaptureHandle, CaptureError> {
        let is_capturing = Arc::new(AtomicBool::new(true));

        let stream = self.build_stream(buffer.clone(), is_capturing.clone())?;

        stream.play().map_err(|e| {
            CaptureError::StreamCreationFailed(format!("Failed to start stream: {}", e))
        })?;

        log::info!("Capture started at {} Hz", self.sample_rate());

        Ok(CaptureHandle {
            _stream: stream,
            is_capturing,
            buffer,
        })
    }

    fn build_stream(
        &self,
        buffer: SharedAudioBuffer,
        is_capturing: Arc<AtomicBool>,
    ) -> Result<Stream, CaptureError> {
        let err_fn = |err| log::error!("Audio stream error: {}", err);

        match self.sample_format {
            SampleFormat::I16 => self.build_stream_typed::<i16>(buffer, is_capturing, err_fn),
            SampleFormat::U16 => self.build_stream_typed::<u16>(buffer, is_capturing, err_fn),
            SampleFormat::F32 => self.build_stream_typed::<f32>(buffer, is_capturing, err_fn),
            _ => Err(CaptureError::NoSupportedConfig),
        }
    }

    fn build_stream_typed<T>(
        &self,
        buffer: SharedAudioBuffer,
        is_capturing: Arc<AtomicBool>,
        err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
    ) -> Result<Stream, CaptureError>
    where
        T: SizedSample + Send + 'static,
        f32: FromSample<T>,
    {
        let channels = self.config.channels.max(1) as usize;
        let sample_rate = self.config.sample_rate.0;
        let config = self.config.clone();

        let stream = self
            .device
            .build_input_stream(
                &config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    if !is_capturing.load(Ordering::SeqCst) {
                        return;
                    }

                    let mono = downmix_to_mono_i16(data, channels);
                    if mono.is_empty() {
                        return;
                    }

                    if let Err(e) = buffer.append(AudioChunk::new(mono, sample_rate)) {
                        // Can only happen if the buffer was reused across
                        // sessions with different device rates.
                        log::warn!("Dropping capture frame: {}", e);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| CaptureError::StreamCreationFailed(e.to_string()))?;

        Ok(stream)
    }
}

/// Fold interleaved frames down to mono i16.
fn downmix_to_mono_i16<T>(data: &[T], channels: usize) -> Vec<i16>
where
    T: Sample,
    f32: FromSample<T>,
{
    data.chunks(channels)
        .map(|frame| {
            let sum: f32 = frame.iter().map(|&s| f32::from_sample(s)).sum();
            let mean = sum / frame.len() as f32;
            sample_to_i16(mean)
        })
        .collect()
}

/// Convert a float sample to i16, clamping to [-1.0, 1.0].
fn sample_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    (clamped * i16::MAX as f32) as i16
}
