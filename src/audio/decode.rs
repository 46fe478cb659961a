//! Compressed upload decoding.
//!
//! Uploads that are not already WAV/PCM go through symphonia: probe the
//! container, decode the first audio track, downmix to mono i16.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decode an in-memory blob (MP3, M4A, non-PCM WAV, ...) to mono i16 samples
/// at the source's native rate.
pub fn decode_to_mono_i16(blob: &[u8]) -> Result<(Vec<i16>, u32), String> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(blob.to_vec())), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| format!("Unrecognized container: {}", e))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| "No decodable audio track".to_string())?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| format!("Unsupported codec: {}", e))?;

    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);
    let mut interleaved: Vec<i16> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(format!("Demux error: {}", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count();

                let mut sample_buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                sample_buf.copy_interleaved_ref(decoded);
                interleaved.extend_from_slice(sample_buf.samples());
            }
            // Recoverable per-packet corruption: skip the packet, keep going.
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping corrupt packet: {}", e);
                continue;
            }
            Err(e) => return Err(format!("Decode error: {}", e)),
        }
    }

    if interleaved.is_empty() || sample_rate == 0 {
        return Err("No audio frames decoded".to_string());
    }

    let mono = if channels <= 1 {
        interleaved
    } else {
        downmix_interleaved(&interleaved, channels)
    };

    log::debug!(
        "Decoded upload: {} samples, {} Hz, {} channel(s) downmixed to mono",
        mono.len(),
        sample_rate,
        channels
    );

    Ok((mono, sample_rate))
}

/// Average interleaved channel frames down to mono.
fn downmix_interleaved(interleaved: &[i16], channels: usize) -> Vec<i16> {
    interleaved
        .chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / frame.len() as i32) as i16
        })
        .collect()
}
