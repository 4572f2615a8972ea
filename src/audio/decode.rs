use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::buffer::PcmBuffer;
use crate::error::DecodeError;

/// Decode a compressed audio byte stream into planar float PCM.
///
/// No resampling and no downmix: the buffer keeps the source's sample rate and
/// channel layout. `extension` is only a probing hint.
pub fn decode_audio(bytes: Vec<u8>, extension: Option<&str>) -> Result<PcmBuffer, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DecodeError::Probe(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;

    let track_id = track.id;
    let channel_count = track.codec_params.channels.map_or(1, |c| c.count());
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(DecodeError::UnknownSampleRate)?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Codec(e.to_string()))?;

    let mut channels: Vec<Vec<f32>> = vec![Vec::new(); channel_count];

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(DecodeError::Stream(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(DecodeError::Stream(e.to_string())),
        };

        let spec = *decoded.spec();
        if spec.channels.count() != channel_count {
            return Err(DecodeError::Stream(format!(
                "channel count changed mid-stream ({} -> {})",
                channel_count,
                spec.channels.count()
            )));
        }

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        for frame in sample_buf.samples().chunks(channel_count) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }
    }

    let pcm = PcmBuffer::new(sample_rate, channels).map_err(|e| DecodeError::Stream(e.to_string()))?;

    log::info!(
        "Decoded audio: {} frames x {} channels, {}Hz, {:.1}s",
        pcm.frame_count(),
        pcm.channel_count(),
        pcm.sample_rate(),
        pcm.duration()
    );

    Ok(pcm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::wav;

    #[test]
    fn decodes_wav_without_downmix() {
        let left: Vec<f32> = (0..1000).map(|i| (i as f32 / 1000.0) - 0.5).collect();
        let right: Vec<f32> = left.iter().map(|s| -s).collect();
        let source = PcmBuffer::new(22050, vec![left.clone(), right.clone()]).unwrap();
        let bytes = wav::serialize(&source).unwrap();

        let pcm = decode_audio(bytes, Some("wav")).unwrap();
        assert_eq!(pcm.sample_rate(), 22050);
        assert_eq!(pcm.channel_count(), 2);
        assert_eq!(pcm.frame_count(), 1000);
        for (got, want) in pcm.channel(1).iter().zip(&right) {
            assert!((got - want).abs() < 2.0 / 32768.0);
        }
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = decode_audio(b"definitely not audio".to_vec(), None).unwrap_err();
        assert!(matches!(err, DecodeError::Probe(_)));
    }
}
