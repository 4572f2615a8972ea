use crate::audio::envelope;
use crate::encode::job::{self as encoding, EncodeJob, MuxedOutput};
use crate::encode::{EncodeSettings, MuxEncoder};
use crate::error::PipelineError;
use crate::render::canvas::AspectRatio;
use crate::render::frame::RenderRequest;
use crate::render::palette::Palette;
use crate::render::text::Typography;
use crate::render::worker;
use crate::transfer::{EncodeEvent, EncodePhase, RenderEvent};

/// Lifecycle of one generation job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Rendering,
    Encoding,
    Complete,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed)
    }

    /// Forward one step, or to `Failed` from any live state.
    pub fn can_advance_to(self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Pending, Rendering) | (Rendering, Encoding) | (Encoding, Complete) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct Job {
    state: JobState,
}

impl Default for Job {
    fn default() -> Self {
        Self {
            state: JobState::Pending,
        }
    }
}

impl Job {
    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn advance(&mut self, to: JobState) -> Result<(), PipelineError> {
        if !self.state.can_advance_to(to) {
            return Err(PipelineError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        log::debug!("Job {:?} -> {:?}", self.state, to);
        self.state = to;
        Ok(())
    }

    fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = JobState::Failed;
        }
    }
}

/// Progress forwarded to the caller. Render and encode percentages are
/// independent streams, each in `[0, 100]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Progress {
    Render(f32),
    Encode { phase: EncodePhase, percent: f32 },
}

/// Inputs of one generation job as the user supplied them.
#[derive(Debug)]
pub struct GenerateRequest {
    /// Encoded audio file contents.
    pub audio: Vec<u8>,
    /// File extension of the audio, used as a format hint.
    pub audio_extension: Option<String>,
    pub album_art: Vec<u8>,
    pub title: String,
    pub lyrics: String,
    pub palette: Palette,
    pub aspect_ratio: String,
    pub fps: u32,
    pub typography: Option<Typography>,
}

/// Decode the audio, extract its envelope and size the canvas.
pub fn prepare(request: GenerateRequest) -> Result<RenderRequest, PipelineError> {
    let GenerateRequest {
        audio,
        audio_extension,
        album_art,
        title,
        lyrics,
        palette,
        aspect_ratio,
        fps,
        typography,
    } = request;

    let (pcm, envelope) = envelope::extract(audio, audio_extension.as_deref())?;
    let (canvas_width, canvas_height) = AspectRatio::parse_or_fallback(&aspect_ratio).canvas_size();
    log::info!(
        "Canvas {}x{} for aspect ratio {}",
        canvas_width,
        canvas_height,
        aspect_ratio
    );

    Ok(RenderRequest {
        canvas_width,
        canvas_height,
        pcm,
        envelope,
        album_art,
        title,
        lyrics,
        palette,
        aspect_ratio,
        fps,
        typography,
    })
}

/// Run one job to completion: decode, render in the render context, then
/// encode in the encode context.
pub fn generate(
    request: GenerateRequest,
    encoder: Box<dyn MuxEncoder>,
    settings: EncodeSettings,
    on_progress: &mut dyn FnMut(Progress),
) -> Result<MuxedOutput, PipelineError> {
    let mut job = Job::default();
    match drive(&mut job, request, encoder, settings, on_progress) {
        Ok(output) => {
            job.advance(JobState::Complete)?;
            Ok(output)
        }
        Err(e) => {
            log::error!("Job failed while {:?}: {}", job.state(), e);
            job.fail();
            Err(e)
        }
    }
}

fn drive(
    job: &mut Job,
    request: GenerateRequest,
    encoder: Box<dyn MuxEncoder>,
    settings: EncodeSettings,
    on_progress: &mut dyn FnMut(Progress),
) -> Result<MuxedOutput, PipelineError> {
    let render_request = prepare(request)?;
    let fps = render_request.fps;

    job.advance(JobState::Rendering)?;
    let render = worker::spawn(render_request).map_err(|e| PipelineError::Render(e.to_string()))?;
    let name = render.name();
    let mut outcome = None;
    while let Some(event) = render.recv() {
        match event {
            RenderEvent::Progress(percent) => on_progress(Progress::Render(percent)),
            RenderEvent::Complete { frames, pcm } => outcome = Some(Ok((frames, pcm))),
            RenderEvent::Failed(message) => outcome = Some(Err(PipelineError::Render(message))),
        }
    }
    render.join();
    let (frames, pcm) = outcome.unwrap_or(Err(PipelineError::WorkerLost(name)))?;
    log::info!("Rendered {} frames", frames.len());

    job.advance(JobState::Encoding)?;
    let encode = encoding::spawn(EncodeJob::new(frames, pcm, fps), encoder, settings)
        .map_err(|e| PipelineError::Encode(e.to_string()))?;
    let name = encode.name();
    let mut outcome = None;
    while let Some(event) = encode.recv() {
        match event {
            EncodeEvent::Progress { phase, percent } => on_progress(Progress::Encode { phase, percent }),
            EncodeEvent::Encoder(progress) => {
                log::debug!(
                    "Encoder at frame {} ({:.2}s)",
                    progress.frame,
                    progress.out_time_secs
                );
            }
            EncodeEvent::Complete(output) => outcome = Some(Ok(output)),
            EncodeEvent::Failed(message) => outcome = Some(Err(PipelineError::Encode(message))),
        }
    }
    encode.join();
    outcome.unwrap_or(Err(PipelineError::WorkerLost(name)))
}
