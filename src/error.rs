use thiserror::Error;

/// The audio byte stream could not be turned into PCM.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to probe audio format: {0}")]
    Probe(String),
    #[error("no decodable audio track found")]
    NoTrack,
    #[error("unknown sample rate")]
    UnknownSampleRate,
    #[error("failed to create audio decoder: {0}")]
    Codec(String),
    #[error("audio stream is malformed: {0}")]
    Stream(String),
}

/// Malformed user-facing parameter. Aspect-ratio variants are recovered with a
/// fallback; palette variants are reported at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("aspect ratio '{0}' is missing ':'")]
    AspectMissingSeparator(String),
    #[error("aspect ratio '{0}' has non-numeric parts")]
    AspectNotNumeric(String),
    #[error("aspect ratio '{0}' has non-positive parts")]
    AspectNotPositive(String),
    #[error("aspect ratio '{0}' gives a canvas taller than {max} pixels", max = crate::render::canvas::MAX_CANVAS_SIDE)]
    AspectOutOfRange(String),
    #[error("invalid color '{0}', expected #rgb, #rrggbb or #rrggbbaa")]
    Color(String),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to decode album art: {0}")]
    AlbumArt(String),
    #[error("failed to load font: {0}")]
    Font(String),
    #[error("canvas {width}x{height} is outside the supported size")]
    CanvasSize { width: u32, height: u32 },
    #[error("frame {index} panicked: {message}")]
    Panicked { index: usize, message: String },
}

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("channel {channel} has {actual} frames, expected {expected}")]
    RaggedChannels {
        channel: usize,
        expected: usize,
        actual: usize,
    },
    #[error("pcm buffer has no channels")]
    NoChannels,
    #[error("sample rate must be positive")]
    ZeroSampleRate,
    #[error("pcm data of {0} bytes does not fit a 32-bit container")]
    TooLarge(u64),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("encoder unavailable: {0}")]
    Unavailable(String),
    #[error("invalid encoder file name '{0}'")]
    InvalidName(String),
    #[error("encoder i/o failed on '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("there are no frames to encode")]
    NoFrames,
    #[error("failed to encode frame {index} as png: {message}")]
    Materialize { index: usize, message: String },
    #[error("encoder exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("encoder produced an empty output")]
    EmptyOutput,
    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

/// Terminal failure of a generation job.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("render failed: {0}")]
    Render(String),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("{0} worker exited without reporting a result")]
    WorkerLost(&'static str),
    #[error("illegal job transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: crate::pipeline::JobState,
        to: crate::pipeline::JobState,
    },
}
