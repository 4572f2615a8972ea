use super::buffer::PcmBuffer;
use crate::error::SerializationError;

const HEADER_LEN: usize = 44;
const BITS_PER_SAMPLE: u16 = 16;

/// Serialize `pcm` as a canonical 16-bit little-endian PCM WAV container.
///
/// Output length is exactly `44 + frames * channels * 2`.
pub fn serialize(pcm: &PcmBuffer) -> Result<Vec<u8>, SerializationError> {
    let channels = pcm.channel_count();
    let frames = pcm.frame_count();
    let data_len = frames as u64 * channels as u64 * 2;

    if data_len + HEADER_LEN as u64 - 8 > u32::MAX as u64 {
        return Err(SerializationError::TooLarge(data_len));
    }

    let too_large = || SerializationError::TooLarge(data_len);
    let channel_count = u16::try_from(channels).map_err(|_| too_large())?;
    let block_align = channel_count.checked_mul(2).ok_or_else(too_large)?;
    let byte_rate = pcm
        .sample_rate()
        .checked_mul(block_align as u32)
        .ok_or_else(too_large)?;

    let mut out = Vec::with_capacity(HEADER_LEN + data_len as usize);

    // RIFF header
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&((data_len as u32) + HEADER_LEN as u32 - 8).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    // fmt chunk
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channel_count.to_le_bytes());
    out.extend_from_slice(&pcm.sample_rate().to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data chunk
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data_len as u32).to_le_bytes());

    let planes = pcm.channels();
    for frame in 0..frames {
        for plane in planes {
            out.extend_from_slice(&sample_to_i16(plane[frame]).to_le_bytes());
        }
    }

    debug_assert_eq!(out.len(), HEADER_LEN + data_len as usize);
    Ok(out)
}

/// Clamp to `[-1, 1]`, scale asymmetrically onto the i16 range, truncate.
pub fn sample_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    let scaled = if s < 0.0 { s * 32768.0 } else { s * 32767.0 };
    scaled as i16
}
