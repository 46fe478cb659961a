//! WAV finalization.
//!
//! Both capture sources end here: a session's [`AudioBuffer`] or an uploaded
//! blob becomes one canonical WAV temp file (1 channel, 16 bits/sample,
//! declared sample rate) that is fully written and closed before anything
//! reads it.

use std::io::{Cursor, Read};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use super::buffer::AudioBuffer;
use super::decode;
use super::scoped::ScopedWavFile;

/// Errors that can occur while producing a canonical WAV file.
#[derive(Debug)]
pub enum FinalizeError {
    /// Recording session produced no samples; nothing to transcribe.
    EmptyBuffer,
    /// Uploaded blob was empty; nothing to transcribe.
    EmptyUpload,
    /// Uploaded blob could not be decoded into PCM audio.
    UnsupportedFormat(String),
    /// Filesystem failure while writing the temp file.
    Io(String),
}

impl std::fmt::Display for FinalizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinalizeError::EmptyBuffer => write!(f, "No audio captured"),
            FinalizeError::EmptyUpload => write!(f, "Uploaded file is empty"),
            FinalizeError::UnsupportedFormat(e) => {
                write!(f, "Unsupported audio format: {}", e)
            }
            FinalizeError::Io(e) => write!(f, "Failed to write audio file: {}", e),
        }
    }
}

impl std::error::Error for FinalizeError {}

/// Finalize a recording session's buffer into a canonical WAV temp file.
///
/// Chunks are concatenated in arrival order and written with the session's
/// sample rate, or `target_rate` after a single downsampling pass when one is
/// configured. Fails with [`FinalizeError::EmptyBuffer`] before any file is
/// created when the buffer holds no samples.
pub fn finalize_buffer_to_wav(
    buffer: &AudioBuffer,
    target_rate: Option<u32>,
) -> Result<ScopedWavFile, FinalizeError> {
    if buffer.is_empty() {
        return Err(FinalizeError::EmptyBuffer);
    }
    let source_rate = buffer.sample_rate().ok_or(FinalizeError::EmptyBuffer)?;

    let samples = buffer.concat();
    let (samples, rate) = apply_target_rate(samples, source_rate, target_rate);

    log::info!(
        "Finalizing recording: {} samples at {} Hz",
        samples.len(),
        rate
    );
    write_canonical_wav(&samples, rate)
}

/// Finalize an uploaded blob into a canonical WAV temp file.
///
/// Blobs that are already mono PCM16 WAV pass through byte-for-byte. Other
/// WAV shapes (stereo, float, other widths) are re-encoded with the fixed
/// channel/width policy. Anything else is handed to the decoder; a blob that
/// cannot be decoded fails with [`FinalizeError::UnsupportedFormat`].
pub fn finalize_upload_to_wav(
    blob: &[u8],
    target_rate: Option<u32>,
) -> Result<ScopedWavFile, FinalizeError> {
    if blob.is_empty() {
        return Err(FinalizeError::EmptyUpload);
    }

    if let Ok(reader) = WavReader::new(Cursor::new(blob)) {
        let spec = reader.spec();
        let canonical = spec.channels == 1
            && spec.bits_per_sample == 16
            && spec.sample_format == SampleFormat::Int;
        let rate_ok = target_rate.map(|t| t == spec.sample_rate).unwrap_or(true);

        if canonical && rate_ok {
            log::info!(
                "Upload already canonical WAV ({} Hz), writing through",
                spec.sample_rate
            );
            return write_raw_bytes(blob);
        }

        let (samples, rate) = reencode_wav(reader)?;
        let (samples, rate) = apply_target_rate(samples, rate, target_rate);
        log::info!(
            "Re-encoded WAV upload: {} samples at {} Hz (was {} ch, {} bit)",
            samples.len(),
            rate,
            spec.channels,
            spec.bits_per_sample
        );
        return write_canonical_wav(&samples, rate);
    }

    // Not a WAV container; try the compressed-format decoder.
    let (samples, rate) =
        decode::decode_to_mono_i16(blob).map_err(FinalizeError::UnsupportedFormat)?;
    let (samples, rate) = apply_target_rate(samples, rate, target_rate);
    log::info!(
        "Decoded compressed upload: {} samples at {} Hz",
        samples.len(),
        rate
    );
    write_canonical_wav(&samples, rate)
}

/// Downsample `samples` to `target` if one is configured and differs from the
/// source rate. Resampling happens at most once, here at finalize time.
fn apply_target_rate(
    samples: Vec<i16>,
    source_rate: u32,
    target_rate: Option<u32>,
) -> (Vec<i16>, u32) {
    match target_rate {
        Some(target) if target != source_rate => {
            let resampled = downsample(&samples, source_rate, target);
            if resampled.len() == samples.len() {
                // Ratio unsupported; keep the source rate.
                (samples, source_rate)
            } else {
                (resampled, target)
            }
        }
        _ => (samples, source_rate),
    }
}

/// Downsample audio using integer-ratio averaging.
///
/// Only whole-number ratios are supported (e.g. 48 kHz -> 16 kHz). Other
/// ratios return the input unchanged with a warning.
pub fn downsample(samples: &[i16], source_rate: u32, target_rate: u32) -> Vec<i16> {
    if target_rate == 0 || source_rate == 0 {
        log::warn!(
            "Invalid sample rate (source: {}, target: {}), keeping original",
            source_rate,
            target_rate
        );
        return samples.to_vec();
    }

    if source_rate == target_rate {
        return samples.to_vec();
    }

    if source_rate % target_rate != 0 {
        log::warn!(
            "Unsupported resample ratio {}:{}, keeping original",
            source_rate,
            target_rate
        );
        return samples.to_vec();
    }

    let ratio = (source_rate / target_rate) as usize;

    samples
        .chunks(ratio)
        .map(|chunk| {
            let sum: i64 = chunk.iter().map(|&s| s as i64).sum();
            (sum / chunk.len() as i64) as i16
        })
        .collect()
}

/// Read a non-canonical WAV and fold it down to mono i16.
fn reencode_wav<R: Read>(mut reader: WavReader<R>) -> Result<(Vec<i16>, u32), FinalizeError> {
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, bits) if bits <= 32 => {
            let shift = 16i32 - bits as i32;
            reader
                .samples::<i32>()
                .map(|s| {
                    s.map(|v| {
                        let scaled = if shift >= 0 { v << shift } else { v >> -shift };
                        scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
                    })
                })
                .collect::<Result<_, _>>()
                .map_err(|e| FinalizeError::UnsupportedFormat(e.to_string()))?
        }
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|s| s.map(float_to_i16))
            .collect::<Result<_, _>>()
            .map_err(|e| FinalizeError::UnsupportedFormat(e.to_string()))?,
        (format, bits) => {
            return Err(FinalizeError::UnsupportedFormat(format!(
                "WAV with {:?} samples at {} bits",
                format, bits
            )));
        }
    };

    let mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / frame.len() as i32) as i16
            })
            .collect()
    };

    Ok((mono, spec.sample_rate))
}

/// Convert a float sample to i16, clamping to [-1.0, 1.0].
fn float_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    (clamped * i16::MAX as f32) as i16
}

/// Write mono i16 samples as a canonical WAV into a fresh scoped temp file.
///
/// The writer is finalized and closed before the handle is returned, so any
/// reader that opens the path sees a complete file.
fn write_canonical_wav(samples: &[i16], sample_rate: u32) -> Result<ScopedWavFile, FinalizeError> {
    let file = ScopedWavFile::allocate().map_err(|e| FinalizeError::Io(e.to_string()))?;

    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer =
        WavWriter::create(file.path(), spec).map_err(|e| FinalizeError::Io(e.to_string()))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| FinalizeError::Io(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| FinalizeError::Io(e.to_string()))?;

    Ok(file)
}

/// Write already-canonical WAV bytes into a fresh scoped temp file.
fn write_raw_bytes(blob: &[u8]) -> Result<ScopedWavFile, FinalizeError> {
    let file = ScopedWavFile::allocate().map_err(|e| FinalizeError::Io(e.to_string()))?;
    std::fs::write(file.path(), blob).map_err(|e| FinalizeError::Io(e.to_string()))?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::AudioChunk;

    fn buffer_with(chunks: &[Vec<i16>], rate: u32) -> AudioBuffer {
        let mut buffer = AudioBuffer::new();
        for samples in chunks {
            buffer.append(AudioChunk::new(samples.clone(), rate)).unwrap();
        }
        buffer
    }

    fn wav_bytes_i16(spec: WavSpec, samples: &[i16]) -> Vec<u8> {
        let mut bytes = Vec::new();
        let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
        bytes
    }

    fn wav_bytes_f32(spec: WavSpec, samples: &[f32]) -> Vec<u8> {
        let mut bytes = Vec::new();
        let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
        bytes
    }

    #[test]
    fn test_finalize_round_trips_samples_in_order() {
        let buffer = buffer_with(&[vec![1, 2, 3], vec![4, 5], vec![6]], 16000);
        let file = finalize_buffer_to_wav(&buffer, None).unwrap();

        let mut reader = WavReader::open(file.path()).unwrap();
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_finalize_empty_buffer_fails() {
        let buffer = AudioBuffer::new();
        let err = finalize_buffer_to_wav(&buffer, None).unwrap_err();
        assert!(matches!(err, FinalizeError::EmptyBuffer));
    }

    #[test]
    fn test_finalize_header_fields() {
        // Three chunks of 8000 mono samples at 16 kHz: header must declare
        // 1 channel, 16 bits, 16000 Hz, and 48000 data bytes.
        let buffer = buffer_with(&[vec![0; 8000], vec![0; 8000], vec![0; 8000]], 16000);
        let file = finalize_buffer_to_wav(&buffer, None).unwrap();

        let reader = WavReader::open(file.path()).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(reader.len() as usize * 2, 48000);
    }

    #[test]
    fn test_finalize_with_target_rate_downsamples_once() {
        let buffer = buffer_with(&[vec![100; 4800]], 48000);
        let file = finalize_buffer_to_wav(&buffer, Some(16000)).unwrap();

        let reader = WavReader::open(file.path()).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.len(), 1600);
    }

    #[test]
    fn test_upload_empty_blob() {
        let err = finalize_upload_to_wav(&[], None).unwrap_err();
        assert!(matches!(err, FinalizeError::EmptyUpload));
    }

    #[test]
    fn test_upload_canonical_wav_passes_through() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let samples: Vec<i16> = (0..100).collect();
        let blob = wav_bytes_i16(spec, &samples);

        let file = finalize_upload_to_wav(&blob, None).unwrap();
        let bytes = std::fs::read(file.path()).unwrap();
        assert_eq!(bytes, blob);
    }

    #[test]
    fn test_upload_stereo_wav_is_downmixed() {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        // Left 100, right 300 -> mono 200.
        let mut interleaved = Vec::new();
        for _ in 0..50 {
            interleaved.push(100i16);
            interleaved.push(300i16);
        }
        let blob = wav_bytes_i16(spec, &interleaved);

        let file = finalize_upload_to_wav(&blob, None).unwrap();
        let mut reader = WavReader::open(file.path()).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);

        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded.len(), 50);
        assert!(decoded.iter().all(|&s| s == 200));
    }

    #[test]
    fn test_upload_float_wav_is_reencoded() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let blob = wav_bytes_f32(spec, &[0.5f32; 100]);

        let file = finalize_upload_to_wav(&blob, None).unwrap();
        let mut reader = WavReader::open(file.path()).unwrap();
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.spec().sample_format, SampleFormat::Int);

        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        let expected = (0.5 * i16::MAX as f32) as i16;
        assert!(decoded.iter().all(|&s| (s - expected).abs() <= 1));
    }

    #[test]
    fn test_upload_garbage_is_unsupported() {
        let err = finalize_upload_to_wav(b"not audio at all", None).unwrap_err();
        assert!(matches!(err, FinalizeError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_downsample_integer_ratio() {
        let input = vec![100i16, 200, 300, 400, 500, 600];
        let output = downsample(&input, 48000, 16000);
        assert_eq!(output, vec![200, 500]);
    }

    #[test]
    fn test_downsample_same_rate_and_bad_ratio() {
        let input = vec![100i16, 200, 300];
        assert_eq!(downsample(&input, 16000, 16000), input);
        assert_eq!(downsample(&input, 44100, 16000), input);
        assert_eq!(downsample(&input, 0, 16000), input);
    }

    #[test]
    fn test_float_to_i16_clamps() {
        assert_eq!(float_to_i16(0.0), 0);
        assert_eq!(float_to_i16(1.0), i16::MAX);
        assert_eq!(float_to_i16(-1.0), -i16::MAX);
        assert_eq!(float_to_i16(2.0), i16::MAX);
    }
}
