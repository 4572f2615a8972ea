use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam_channel::Sender;

use super::frame::{FrameRenderer, FrameSet, RenderRequest};
use crate::audio::buffer::PcmBuffer;
use crate::error::RenderError;
use crate::transfer::{panic_message, percent, report, RenderEvent, Worker, YIELD_EVERY};

/// Render every frame of `request`, reporting progress through `on_progress`.
///
/// On success the PCM buffer is handed back alongside the frames. On failure
/// nothing is returned; frames rendered so far are dropped.
pub fn render_all(
    request: RenderRequest,
    on_progress: &mut dyn FnMut(f32),
) -> Result<(FrameSet, PcmBuffer), RenderError> {
    let total = request.total_frames();
    let (width, height) = (request.canvas_width, request.canvas_height);
    log::info!(
        "Rendering {} frames at {}x{} ({}) @ {}fps",
        total,
        width,
        height,
        request.aspect_ratio,
        request.fps
    );

    let renderer = FrameRenderer::new(&request)?;
    let mut frames = Vec::with_capacity(total);

    for index in 0..total {
        let frame = panic::catch_unwind(AssertUnwindSafe(|| renderer.render(index))).map_err(|payload| {
            RenderError::Panicked {
                index,
                message: panic_message(payload.as_ref()),
            }
        })?;
        frames.push(frame);

        if index % YIELD_EVERY == 0 {
            on_progress(percent(index + 1, total));
            thread::yield_now();
        }
    }
    on_progress(100.0);

    drop(renderer);
    let RenderRequest { pcm, .. } = request;
    Ok((FrameSet::new(width, height, frames), pcm))
}

/// Run [`render_all`] in its own execution context.
pub fn spawn(request: RenderRequest) -> io::Result<Worker<RenderEvent>> {
    Worker::spawn("render-worker", RenderEvent::Failed, move |tx: &Sender<RenderEvent>| {
        let mut forward = |pct| report(tx, RenderEvent::Progress(pct));
        match render_all(request, &mut forward) {
            Ok((frames, pcm)) => RenderEvent::Complete { frames, pcm },
            Err(e) => RenderEvent::Failed(e.to_string()),
        }
    })
}
