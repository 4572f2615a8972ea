use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tempfile::TempDir;

use super::{validate_name, EncoderProgress, MuxEncoder};
use crate::error::EncodeError;

/// `ffmpeg` run as a subprocess inside a private temporary directory.
pub struct FfmpegEncoder {
    binary: PathBuf,
    workdir: Option<TempDir>,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            workdir: None,
        }
    }

    fn workdir(&self) -> Result<&TempDir, EncodeError> {
        self.workdir
            .as_ref()
            .ok_or_else(|| EncodeError::Unavailable("encoder used before load()".into()))
    }

    fn io_error(name: &str) -> impl FnOnce(std::io::Error) -> EncodeError + '_ {
        move |source| EncodeError::Io {
            name: name.to_string(),
            source,
        }
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl MuxEncoder for FfmpegEncoder {
    fn load(&mut self) -> Result<(), EncodeError> {
        if self.workdir.is_some() {
            return Ok(());
        }

        let status = Command::new(&self.binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| {
                EncodeError::Unavailable(format!(
                    "failed to run {}: {}. Is ffmpeg installed?",
                    self.binary.display(),
                    e
                ))
            })?;
        if !status.success() {
            return Err(EncodeError::Unavailable(format!(
                "{} -version exited with {}",
                self.binary.display(),
                status
            )));
        }

        let dir = tempfile::Builder::new()
            .prefix("albumviz-")
            .tempdir()
            .map_err(Self::io_error("<workdir>"))?;
        log::debug!("FFmpeg working directory: {}", dir.path().display());
        self.workdir = Some(dir);
        Ok(())
    }

    fn write_input(&mut self, name: &str, bytes: &[u8]) -> Result<(), EncodeError> {
        validate_name(name)?;
        let path = self.workdir()?.path().join(name);
        std::fs::write(path, bytes).map_err(Self::io_error(name))
    }

    fn run(
        &mut self,
        args: &[String],
        on_progress: &mut dyn FnMut(EncoderProgress),
    ) -> Result<(), EncodeError> {
        let cwd = self.workdir()?.path().to_path_buf();
        log::debug!("Running {} {}", self.binary.display(), args.join(" "));

        let mut child = Command::new(&self.binary)
            .current_dir(&cwd)
            .args(["-y", "-hide_banner", "-loglevel", "error", "-nostats", "-progress", "pipe:1"])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EncodeError::Unavailable(format!("failed to spawn ffmpeg: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EncodeError::Unavailable("ffmpeg stdout not available".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| EncodeError::Unavailable("ffmpeg stderr not available".into()))?;

        // A full stderr pipe would stall ffmpeg while we block on stdout.
        let stderr_task = std::thread::spawn(move || {
            let mut output = String::new();
            let _ = stderr.read_to_string(&mut output);
            output
        });

        if let Err(e) = read_progress(BufReader::new(stdout), on_progress) {
            let _ = child.kill();
            let _ = child.wait();
            let _ = stderr_task.join();
            return Err(Self::io_error("<progress>")(e));
        }

        let status = child.wait().map_err(Self::io_error("<ffmpeg>"))?;
        let stderr = stderr_task
            .join()
            .unwrap_or_else(|_| "<failed to read ffmpeg stderr>".to_string());

        if !status.success() {
            return Err(EncodeError::Failed {
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        log::info!("FFmpeg encoding complete");
        Ok(())
    }

    fn read_output(&mut self, name: &str) -> Result<Vec<u8>, EncodeError> {
        validate_name(name)?;
        let path = self.workdir()?.path().join(name);
        std::fs::read(path).map_err(Self::io_error(name))
    }
}

/// Report every complete `-progress` block read from `reader`.
fn read_progress(
    reader: impl BufRead,
    on_progress: &mut dyn FnMut(EncoderProgress),
) -> std::io::Result<()> {
    let mut state = EncoderProgress::default();
    for line in reader.lines() {
        let line = line?;
        if let Some((key, value)) = line.trim().split_once('=') {
            if update_progress(&mut state, key, value) {
                on_progress(state.clone());
            }
        }
    }
    Ok(())
}

/// Fold one `key=value` line of `-progress` output into `state`. Returns
/// `true` when a block is complete.
fn update_progress(state: &mut EncoderProgress, key: &str, value: &str) -> bool {
    match key {
        // both keys carry microseconds
        "out_time_us" | "out_time_ms" => {
            if let Ok(us) = value.parse::<f64>() {
                state.out_time_secs = us / 1_000_000.0;
            }
            false
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                state.frame = frame;
            }
            false
        }
        "progress" => {
            state.done = value == "end";
            true
        }
        _ => false,
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_blocks() {
        let mut state = EncoderProgress::default();
        let lines = [
            "frame=12",
            "fps=0.00",
            "out_time_us=400000",
            "out_time_ms=400000",
            "progress=continue",
            "frame=60",
            "out_time_us=2000000",
            "progress=end",
        ];
        let mut blocks = Vec::new();
        for line in lines {
            let (k, v) = line.split_once('=').unwrap();
            if update_progress(&mut state, k, v) {
                blocks.push(state.clone());
            }
        }
        assert_eq!(
            blocks,
            vec![
                EncoderProgress {
                    out_time_secs: 0.4,
                    frame: 12,
                    done: false
                },
                EncoderProgress {
                    out_time_secs: 2.0,
                    frame: 60,
                    done: true
                },
            ]
        );
    }

    /// Yields `data` once, then fails.
    struct BrokenPipe {
        data: Option<&'static [u8]>,
    }

    impl Read for BrokenPipe {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.data.take() {
                Some(data) => {
                    buf[..data.len()].copy_from_slice(data);
                    Ok(data.len())
                }
                None => Err(std::io::Error::other("pipe closed")),
            }
        }
    }

    #[test]
    fn read_error_stops_progress_and_propagates() {
        let pipe = BrokenPipe {
            data: Some(b"frame=3\nout_time_us=100000\nprogress=continue\nframe=4\n"),
        };
        let mut blocks = Vec::new();
        let err = read_progress(BufReader::new(pipe), &mut |p| blocks.push(p)).unwrap_err();
        assert_eq!(err.to_string(), "pipe closed");
        assert_eq!(
            blocks,
            vec![EncoderProgress {
                out_time_secs: 0.1,
                frame: 3,
                done: false
            }]
        );
    }

    #[test]
    fn use_before_load_is_rejected() {
        let mut encoder = FfmpegEncoder::default();
        assert!(matches!(
            encoder.write_input("audio.wav", b""),
            Err(EncodeError::Unavailable(_))
        ));
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let mut encoder = FfmpegEncoder::new("/nonexistent/ffmpeg-binary");
        assert!(matches!(encoder.load(), Err(EncodeError::Unavailable(_))));
    }

    #[test]
    fn load_is_idempotent_and_round_trips_files() {
        if !is_ffmpeg_on_path() {
            return;
        }
        let mut encoder = FfmpegEncoder::default();
        encoder.load().unwrap();
        encoder.write_input("hello.txt", b"hi").unwrap();
        encoder.load().unwrap();
        assert_eq!(encoder.read_output("hello.txt").unwrap(), b"hi");
        assert!(matches!(
            encoder.write_input("../escape", b""),
            Err(EncodeError::InvalidName(_))
        ));
    }
}
