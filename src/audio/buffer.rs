use crate::error::SerializationError;

/// Number of buckets in an [`AmplitudeEnvelope`].
pub const ENVELOPE_BUCKETS: usize = 200;

/// Decoded, planar float PCM at the source's native rate and channel layout.
///
/// Deliberately not `Clone`: the buffer moves between execution contexts by
/// value and the sender keeps nothing.
#[derive(Debug, PartialEq)]
pub struct PcmBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl PcmBuffer {
    /// Build a buffer from per-channel sample arrays. Every channel must have
    /// the same length.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self, SerializationError> {
        let expected = channels.first().ok_or(SerializationError::NoChannels)?.len();
        for (channel, samples) in channels.iter().enumerate() {
            if samples.len() != expected {
                return Err(SerializationError::RaggedChannels {
                    channel,
                    expected,
                    actual: samples.len(),
                });
            }
        }
        if sample_rate == 0 {
            return Err(SerializationError::ZeroSampleRate);
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    #[cfg(test)]
    pub fn silent(channel_count: usize, sample_rate: u32, frame_count: usize) -> Self {
        Self {
            sample_rate,
            channels: vec![vec![0.0; frame_count]; channel_count.max(1)],
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frame_count(&self) -> usize {
        self.channels[0].len()
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }
}

/// Per-bucket mean absolute amplitude of channel 0, each value in `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct AmplitudeEnvelope {
    buckets: Vec<f32>,
}

impl AmplitudeEnvelope {
    pub(crate) fn from_buckets(buckets: Vec<f32>) -> Self {
        debug_assert!(!buckets.is_empty());
        Self { buckets }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.buckets
    }

    /// Bucket at `index`, wrapping around the end.
    pub fn cyclic(&self, index: usize) -> f32 {
        self.buckets[index % self.buckets.len()]
    }
}
