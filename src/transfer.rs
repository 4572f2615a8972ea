//! Messages and worker plumbing between the control surface and the two
//! execution contexts (render, encode).
//!
//! Each context is one named thread. It reports through an unbounded channel:
//! any number of progress events followed by exactly one terminal event.
//! Payloads (`FrameSet`, `PcmBuffer`, `MuxedOutput`) are moved through the
//! channel, never cloned; once sent, the sender has no handle left to them.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::audio::buffer::PcmBuffer;
use crate::encode::job::MuxedOutput;
use crate::encode::EncoderProgress;
use crate::render::frame::FrameSet;

/// Units of work between two progress reports / scheduler yields.
pub const YIELD_EVERY: usize = 10;

#[derive(Debug)]
pub enum RenderEvent {
    /// Percentage of frames rendered, in `[0, 100]`.
    Progress(f32),
    /// The PCM buffer comes back with the frames so it can move on into the
    /// encode job.
    Complete { frames: FrameSet, pcm: PcmBuffer },
    Failed(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncodePhase {
    /// Writing frames and audio into the encoder's working filesystem.
    Materialize,
    /// The encoder itself is running.
    Mux,
}

#[derive(Debug)]
pub enum EncodeEvent {
    Progress { phase: EncodePhase, percent: f32 },
    /// Raw progress block as reported by the encoder.
    Encoder(EncoderProgress),
    Complete(MuxedOutput),
    Failed(String),
}

pub trait Terminal {
    fn is_terminal(&self) -> bool;
}

impl Terminal for RenderEvent {
    fn is_terminal(&self) -> bool {
        !matches!(self, RenderEvent::Progress(_))
    }
}

impl Terminal for EncodeEvent {
    fn is_terminal(&self) -> bool {
        matches!(self, EncodeEvent::Complete(_) | EncodeEvent::Failed(_))
    }
}

/// Handle to a running execution context.
pub struct Worker<E> {
    name: &'static str,
    events: Receiver<E>,
    handle: Option<JoinHandle<()>>,
}

impl<E: Terminal + Send + 'static> Worker<E> {
    /// Start `job` on its own thread. The job reports progress through the
    /// sender and returns its terminal event; a panic inside it becomes
    /// `failed(message)`.
    pub fn spawn<F>(name: &'static str, failed: fn(String) -> E, job: F) -> io::Result<Self>
    where
        F: FnOnce(&Sender<E>) -> E + Send + 'static,
    {
        let (tx, events) = unbounded();
        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            let terminal = match panic::catch_unwind(AssertUnwindSafe(|| job(&tx))) {
                Ok(event) => event,
                Err(payload) => failed(panic_message(payload.as_ref())),
            };
            debug_assert!(terminal.is_terminal());
            // the receiver may already be gone; nothing left to report to
            let _ = tx.send(terminal);
        })?;

        log::debug!("Spawned {}", name);
        Ok(Self {
            name,
            events,
            handle: Some(handle),
        })
    }
}

impl<E> Worker<E> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Next event, or `None` once the worker has exited and the channel is
    /// drained.
    pub fn recv(&self) -> Option<E> {
        self.events.recv().ok()
    }

    /// Wait for the thread to exit.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("{} exited by panic", self.name);
            }
        }
    }
}

/// Send a non-terminal event; a vanished receiver is ignored.
pub fn report<E>(tx: &Sender<E>, event: E) {
    let _ = tx.send(event);
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Percentage of `done` out of `total`, `100` for an empty run.
pub fn percent(done: usize, total: usize) -> f32 {
    if total == 0 {
        100.0
    } else {
        (done as f32 / total as f32 * 100.0).clamp(0.0, 100.0)
    }
}
