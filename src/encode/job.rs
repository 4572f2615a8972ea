use std::io;
use std::thread;

use crossbeam_channel::Sender;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder};

use super::{EncodeSettings, EncoderProgress, MuxEncoder};
use crate::audio::buffer::PcmBuffer;
use crate::audio::wav;
use crate::error::EncodeError;
use crate::render::frame::{Frame, FrameSet};
use crate::transfer::{percent, report, EncodeEvent, EncodePhase, Worker, YIELD_EVERY};

pub const AUDIO_INPUT: &str = "audio.wav";
pub const VIDEO_OUTPUT: &str = "output.mp4";

/// Minimum digits in materialized frame names.
const MIN_INDEX_DIGITS: usize = 5;

/// Rendered frames plus the PCM they were rendered from.
#[derive(Debug)]
pub struct EncodeJob {
    pub frames: FrameSet,
    pub pcm: PcmBuffer,
    pub fps: u32,
}

impl EncodeJob {
    pub fn new(frames: FrameSet, pcm: PcmBuffer, fps: u32) -> Self {
        Self { frames, pcm, fps }
    }
}

/// The muxed container (H.264 video + AAC audio).
#[derive(Debug, PartialEq, Eq)]
pub struct MuxedOutput {
    bytes: Vec<u8>,
}

impl MuxedOutput {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Zero-padded width wide enough that lexicographic order of the names is
/// the frame order.
pub fn index_digits(frame_count: usize) -> usize {
    let last = frame_count.saturating_sub(1);
    last.to_string().len().max(MIN_INDEX_DIGITS)
}

pub fn frame_name(index: usize, digits: usize) -> String {
    format!("frame_{:0width$}.png", index, width = digits)
}

/// Full argument list for the encoder, input pattern first.
pub fn encoder_args(settings: &EncodeSettings, fps: u32, digits: usize) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-framerate".into(), fps.to_string(),
        "-i".into(), format!("frame_%0{}d.png", digits),
        "-i".into(), AUDIO_INPUT.into(),
        "-c:v".into(), settings.video_codec.clone(),
    ];
    if let Some(crf) = settings.crf {
        args.extend(["-crf".to_string(), crf.to_string()]);
    }
    args.extend([
        "-c:a".into(), settings.audio_codec.clone(),
        "-b:a".into(), settings.audio_bitrate.clone(),
        "-pix_fmt".into(), settings.pix_fmt.clone(),
        "-shortest".into(),
        VIDEO_OUTPUT.into(),
    ]);
    args
}

fn encode_png(index: usize, frame: Frame) -> Result<Vec<u8>, EncodeError> {
    let (width, height) = (frame.width(), frame.height());
    let mut png = Vec::new();
    PngEncoder::new_with_quality(&mut png, CompressionType::Fast, FilterType::Adaptive)
        .write_image(frame.pixels(), width, height, ExtendedColorType::Rgba8)
        .map_err(|e| EncodeError::Materialize {
            index,
            message: e.to_string(),
        })?;
    Ok(png)
}

/// Serialize, materialize, mux and read back one job.
///
/// Frames are written strictly in index order and each raster is dropped as
/// soon as its PNG is written. Nothing is returned unless every step
/// succeeded and the output is non-empty.
pub fn encode(
    job: EncodeJob,
    encoder: &mut dyn MuxEncoder,
    settings: &EncodeSettings,
    on_event: &mut dyn FnMut(EncodeEvent),
) -> Result<MuxedOutput, EncodeError> {
    let EncodeJob { frames, pcm, fps } = job;

    if frames.is_empty() {
        return Err(EncodeError::NoFrames);
    }

    encoder.load()?;

    let container = wav::serialize(&pcm)?;
    let audio_secs = pcm.duration();
    drop(pcm);
    encoder.write_input(AUDIO_INPUT, &container)?;
    drop(container);

    let total = frames.len();
    let digits = index_digits(total);
    log::info!(
        "Materializing {} frames ({}x{}) for the encoder",
        total,
        frames.width(),
        frames.height()
    );

    for (index, frame) in frames.into_frames().into_iter().enumerate() {
        let png = encode_png(index, frame)?;
        encoder.write_input(&frame_name(index, digits), &png)?;

        if index % YIELD_EVERY == 0 || index + 1 == total {
            on_event(EncodeEvent::Progress {
                phase: EncodePhase::Materialize,
                percent: percent(index + 1, total),
            });
            thread::yield_now();
        }
    }

    // -shortest: the output ends with whichever stream ends first
    let expected_secs = (total as f64 / fps as f64).min(audio_secs);
    let args = encoder_args(settings, fps, digits);
    log::info!(
        "Starting encoder: {} frames @ {}fps, expected {:.2}s",
        total,
        fps,
        expected_secs
    );

    encoder.run(&args, &mut |progress: EncoderProgress| {
        let pct = if progress.done || expected_secs <= 0.0 {
            100.0
        } else {
            (progress.out_time_secs / expected_secs * 100.0).clamp(0.0, 100.0) as f32
        };
        on_event(EncodeEvent::Progress {
            phase: EncodePhase::Mux,
            percent: pct,
        });
        on_event(EncodeEvent::Encoder(progress));
    })?;

    let output = MuxedOutput {
        bytes: encoder.read_output(VIDEO_OUTPUT)?,
    };
    if output.is_empty() {
        return Err(EncodeError::EmptyOutput);
    }
    log::info!("Encoder produced {} bytes", output.len());
    Ok(output)
}

/// Run [`encode`] in its own execution context. The encoder moves into the
/// worker and is dropped with it.
pub fn spawn(
    job: EncodeJob,
    mut encoder: Box<dyn MuxEncoder>,
    settings: EncodeSettings,
) -> io::Result<Worker<EncodeEvent>> {
    Worker::spawn("encode-worker", EncodeEvent::Failed, move |tx: &Sender<EncodeEvent>| {
        let mut forward = |event| report(tx, event);
        match encode(job, encoder.as_mut(), &settings, &mut forward) {
            Ok(output) => EncodeEvent::Complete(output),
            Err(e) => EncodeEvent::Failed(e.to_string()),
        }
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    /// In-memory encoder that records what it was given.
    #[derive(Clone, Default)]
    pub(crate) struct FakeEncoder {
        pub(crate) state: Arc<Mutex<FakeState>>,
        pub(crate) fail_run: bool,
        pub(crate) empty_output: bool,
    }

    #[derive(Default)]
    pub(crate) struct FakeState {
        pub(crate) loads: usize,
        pub(crate) writes: Vec<String>,
        pub(crate) files: BTreeMap<String, Vec<u8>>,
        pub(crate) args: Vec<String>,
    }

    impl MuxEncoder for FakeEncoder {
        fn load(&mut self) -> Result<(), EncodeError> {
            self.state.lock().unwrap().loads += 1;
            Ok(())
        }

        fn write_input(&mut self, name: &str, bytes: &[u8]) -> Result<(), EncodeError> {
            crate::encode::validate_name(name)?;
            let mut state = self.state.lock().unwrap();
            state.writes.push(name.to_string());
            state.files.insert(name.to_string(), bytes.to_vec());
            Ok(())
        }

        fn run(
            &mut self,
            args: &[String],
            on_progress: &mut dyn FnMut(EncoderProgress),
        ) -> Result<(), EncodeError> {
            self.state.lock().unwrap().args = args.to_vec();
            if self.fail_run {
                return Err(EncodeError::Failed {
                    status: "exit status: 1".into(),
                    stderr: "Unknown encoder 'libx264'".into(),
                });
            }
            on_progress(EncoderProgress {
                out_time_secs: 0.5,
                frame: 15,
                done: false,
            });
            on_progress(EncoderProgress {
                out_time_secs: 1.0,
                frame: 30,
                done: true,
            });
            let output = if self.empty_output { Vec::new() } else { b"mp4!".to_vec() };
            self.state
                .lock()
                .unwrap()
                .files
                .insert(VIDEO_OUTPUT.to_string(), output);
            Ok(())
        }

        fn read_output(&mut self, name: &str) -> Result<Vec<u8>, EncodeError> {
            self.state
                .lock()
                .unwrap()
                .files
                .get(name)
                .cloned()
                .ok_or_else(|| EncodeError::Io {
                    name: name.to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })
        }
    }

    fn tiny_frames(count: usize) -> FrameSet {
        let frames = (0..count)
            .map(|i| {
                let shade = (i % 256) as u8;
                crate::render::frame::tests::tiny_frame(4, 2, [shade, 0, 0, 255])
            })
            .collect();
        FrameSet::new(4, 2, frames)
    }

    fn job(count: usize) -> EncodeJob {
        EncodeJob::new(tiny_frames(count), PcmBuffer::silent(2, 8000, 8000), 30)
    }

    #[test]
    fn zero_padded_names_sort_in_frame_order() {
        assert_eq!(index_digits(1), 5);
        assert_eq!(index_digits(100_000), 5);
        assert_eq!(index_digits(100_001), 6);
        assert_eq!(frame_name(7, 5), "frame_00007.png");

        let digits = index_digits(250_000);
        let mut names: Vec<_> = [99_999, 100_000, 5, 123_456]
            .iter()
            .map(|&i| frame_name(i, digits))
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "frame_000005.png",
                "frame_099999.png",
                "frame_100000.png",
                "frame_123456.png"
            ]
        );
    }

    #[test]
    fn default_arguments() {
        let args = encoder_args(&EncodeSettings::default(), 30, 5);
        assert_eq!(
            args.join(" "),
            "-framerate 30 -i frame_%05d.png -i audio.wav -c:v libx264 \
             -c:a aac -b:a 192k -pix_fmt yuv420p -shortest output.mp4"
        );

        let settings = EncodeSettings {
            crf: Some(18),
            ..EncodeSettings::default()
        };
        assert!(encoder_args(&settings, 24, 6)
            .join(" ")
            .contains("-i frame_%06d.png -i audio.wav -c:v libx264 -crf 18"));
    }

    #[test]
    fn writes_audio_then_frames_in_order() {
        let mut fake = FakeEncoder::default();
        let mut events = Vec::new();
        let output = encode(job(23), &mut fake, &EncodeSettings::default(), &mut |e| events.push(e)).unwrap();
        assert_eq!(output.as_bytes(), b"mp4!");

        let state = fake.state.lock().unwrap();
        assert_eq!(state.loads, 1);
        assert_eq!(state.writes[0], AUDIO_INPUT);
        let frame_writes = &state.writes[1..];
        assert_eq!(frame_writes.len(), 23);
        let mut sorted = frame_writes.to_vec();
        sorted.sort();
        assert_eq!(frame_writes, sorted.as_slice());
        assert_eq!(frame_writes[22], "frame_00022.png");

        // audio container is the serialized pcm
        assert_eq!(state.files[AUDIO_INPUT].len(), 44 + 8000 * 2 * 2);
        // frames are decodable pngs of the right size
        let png = image::load_from_memory(&state.files["frame_00003.png"]).unwrap();
        assert_eq!((png.width(), png.height()), (4, 2));
        assert_eq!(png.to_rgba8().get_pixel(0, 0).0, [3, 0, 0, 255]);
    }

    #[test]
    fn progress_is_bounded_and_reaches_completion() {
        let mut fake = FakeEncoder::default();
        let mut events = Vec::new();
        encode(job(30), &mut fake, &EncodeSettings::default(), &mut |e| events.push(e)).unwrap();

        let materialize: Vec<f32> = events
            .iter()
            .filter_map(|e| match e {
                EncodeEvent::Progress {
                    phase: EncodePhase::Materialize,
                    percent,
                } => Some(*percent),
                _ => None,
            })
            .collect();
        assert!(materialize.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(materialize.last(), Some(&100.0));

        let mux: Vec<f32> = events
            .iter()
            .filter_map(|e| match e {
                EncodeEvent::Progress {
                    phase: EncodePhase::Mux,
                    percent,
                } => Some(*percent),
                _ => None,
            })
            .collect();
        // 30 frames at 30fps vs 1s of audio: 0.5s written is half way
        assert_eq!(mux, vec![50.0, 100.0]);
        assert!(events.iter().any(|e| matches!(e, EncodeEvent::Encoder(p) if p.done)));
    }

    #[test]
    fn encoder_failure_carries_its_message() {
        let mut fake = FakeEncoder {
            fail_run: true,
            ..FakeEncoder::default()
        };
        let err = encode(job(3), &mut fake, &EncodeSettings::default(), &mut |_| {}).unwrap_err();
        assert!(err.to_string().contains("Unknown encoder"));
    }

    #[test]
    fn empty_output_is_an_error() {
        let mut fake = FakeEncoder {
            empty_output: true,
            ..FakeEncoder::default()
        };
        let err = encode(job(3), &mut fake, &EncodeSettings::default(), &mut |_| {}).unwrap_err();
        assert!(matches!(err, EncodeError::EmptyOutput));
    }

    #[test]
    fn no_frames_is_an_error() {
        let mut fake = FakeEncoder::default();
        let err = encode(job(0), &mut fake, &EncodeSettings::default(), &mut |_| {}).unwrap_err();
        assert!(matches!(err, EncodeError::NoFrames));
        assert_eq!(fake.state.lock().unwrap().loads, 0);
    }

    #[test]
    fn worker_reports_single_terminal_event() {
        let fake = FakeEncoder::default();
        let worker = spawn(job(12), Box::new(fake), EncodeSettings::default()).unwrap();
        let mut terminals = 0;
        let mut output = None;
        while let Some(event) = worker.recv() {
            match event {
                EncodeEvent::Complete(out) => {
                    terminals += 1;
                    output = Some(out);
                }
                EncodeEvent::Failed(_) => terminals += 1,
                _ => {}
            }
        }
        worker.join();
        assert_eq!(terminals, 1);
        assert_eq!(output.unwrap().as_bytes(), b"mp4!");
    }
}
