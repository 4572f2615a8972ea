use super::buffer::{AmplitudeEnvelope, PcmBuffer, ENVELOPE_BUCKETS};
use super::decode::decode_audio;
use crate::error::DecodeError;

/// Decode `bytes` and reduce the result to an amplitude envelope.
pub fn extract(
    bytes: Vec<u8>,
    extension: Option<&str>,
) -> Result<(PcmBuffer, AmplitudeEnvelope), DecodeError> {
    let pcm = decode_audio(bytes, extension)?;
    let envelope = amplitude_envelope(&pcm, ENVELOPE_BUCKETS);
    let peak = envelope.as_slice().iter().copied().fold(0.0f32, f32::max);
    log::debug!("Amplitude envelope: {} buckets, peak {:.3}", envelope.len(), peak);
    Ok((pcm, envelope))
}

/// Mean absolute amplitude of channel 0 over `buckets` equal blocks.
///
/// `block = frame_count / buckets` (floored). Samples past `buckets * block`
/// are not visited. A buffer shorter than `buckets` frames yields all zeros.
pub fn amplitude_envelope(pcm: &PcmBuffer, buckets: usize) -> AmplitudeEnvelope {
    let samples = pcm.channel(0);
    let block = samples.len() / buckets;

    if block == 0 {
        return AmplitudeEnvelope::from_buckets(vec![0.0; buckets]);
    }

    let values = samples
        .chunks_exact(block)
        .take(buckets)
        .map(|chunk| {
            let sum: f32 = chunk.iter().map(|s| s.abs()).sum();
            // float sources may overshoot full scale
            (sum / block as f32).min(1.0)
        })
        .collect();

    AmplitudeEnvelope::from_buckets(values)
}
