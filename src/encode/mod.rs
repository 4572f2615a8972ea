pub mod ffmpeg;
pub mod job;

use crate::error::EncodeError;

/// One progress block reported by the encoder while it runs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EncoderProgress {
    /// Media time written so far, in seconds.
    pub out_time_secs: f64,
    /// Video frames written so far.
    pub frame: u64,
    /// Set on the final block.
    pub done: bool,
}

/// An external muxer driven through a private working filesystem.
///
/// Inputs are written under plain file names, `run` receives an
/// ffmpeg-style argument list referring to those names, and outputs are read
/// back by name.
pub trait MuxEncoder: Send {
    /// Prepare the encoder for use. Calling it again is a no-op.
    fn load(&mut self) -> Result<(), EncodeError>;

    fn write_input(&mut self, name: &str, bytes: &[u8]) -> Result<(), EncodeError>;

    fn run(
        &mut self,
        args: &[String],
        on_progress: &mut dyn FnMut(EncoderProgress),
    ) -> Result<(), EncodeError>;

    fn read_output(&mut self, name: &str) -> Result<Vec<u8>, EncodeError>;
}

/// Codec choices passed to the encoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodeSettings {
    pub video_codec: String,
    pub pix_fmt: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    /// Quality for the video codec; the codec default when `None`.
    pub crf: Option<u32>,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx264".into(),
            pix_fmt: "yuv420p".into(),
            audio_codec: "aac".into(),
            audio_bitrate: "192k".into(),
            crf: None,
        }
    }
}

/// Reject anything that is not a plain file name.
pub(crate) fn validate_name(name: &str) -> Result<(), EncodeError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        Err(EncodeError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_must_be_plain() {
        assert!(validate_name("frame_00001.png").is_ok());
        for bad in ["", ".", "..", "../x", "a/b", "a\\b"] {
            assert!(validate_name(bad).is_err(), "{bad}");
        }
    }
}
