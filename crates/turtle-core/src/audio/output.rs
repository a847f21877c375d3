//! Audio outputs - where a decoded narration buffer is played
//!
//! An output starts playback immediately and hands back a transport handle
//! plus a completion signal. The signal fires once the stream ends, whether
//! it ran out or was stopped; the playback controller decides which of the
//! two it was.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{AudioBuffer, NarrationError, encode_wav};

/// Transport control over one playing stream
pub trait OutputHandle: Send {
    fn pause(&mut self) -> Result<(), NarrationError>;
    fn resume(&mut self) -> Result<(), NarrationError>;
    /// Halt output and release the device. Errors if already stopped.
    fn stop(&mut self) -> Result<(), NarrationError>;
}

/// A stream that has started playing
pub struct ActivePlayback {
    pub handle: Box<dyn OutputHandle>,
    pub finished: oneshot::Receiver<()>,
}

/// Something that can play a decoded buffer
pub trait AudioOutput: Send {
    fn play(&mut self, buffer: AudioBuffer) -> Result<ActivePlayback, NarrationError>;
    fn name(&self) -> &str;
}

/// Which output narration goes to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Write a WAV file and play it out in real time
    #[default]
    Wav,
    /// Default sound device (requires the `speaker` feature)
    Speaker,
}

/// Build the configured output
pub fn create_output(kind: OutputKind, wav_dir: &Path) -> Result<Box<dyn AudioOutput>> {
    match kind {
        OutputKind::Wav => Ok(Box::new(WavFileOutput::new(wav_dir))),
        #[cfg(feature = "speaker")]
        OutputKind::Speaker => Ok(Box::new(speaker::SpeakerOutput::new())),
        #[cfg(not(feature = "speaker"))]
        OutputKind::Speaker => Err(anyhow::anyhow!(
            "speaker output requested but turtle was built without the `speaker` feature"
        )),
    }
}

/// Writes each narration to a WAV file and keeps a wall-clock transport
/// running for the buffer's duration, so pause/resume/stop behave as on a
/// real device.
pub struct WavFileOutput {
    dir: PathBuf,
    last_file: Option<PathBuf>,
}

impl WavFileOutput {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last_file: None,
        }
    }

    /// Path of the most recently written narration
    pub fn last_file(&self) -> Option<&Path> {
        self.last_file.as_deref()
    }
}

impl AudioOutput for WavFileOutput {
    fn play(&mut self, buffer: AudioBuffer) -> Result<ActivePlayback, NarrationError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| NarrationError::Device(format!("no async runtime: {}", e)))?;

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| NarrationError::Device(format!("{}: {}", self.dir.display(), e)))?;
        let path = self.dir.join(format!(
            "narration-{}.wav",
            chrono::Local::now().format("%Y%m%d-%H%M%S%.3f")
        ));
        std::fs::write(&path, encode_wav(&buffer))
            .map_err(|e| NarrationError::Device(format!("{}: {}", path.display(), e)))?;
        info!(
            "Narration written to {} ({:.1}s)",
            path.display(),
            buffer.duration().as_secs_f64()
        );

        let (paused_tx, paused_rx) = watch::channel(false);
        let (finished_tx, finished_rx) = oneshot::channel();
        let stop = CancellationToken::new();
        runtime.spawn(run_clock(buffer.duration(), paused_rx, stop.clone(), finished_tx));

        self.last_file = Some(path);
        Ok(ActivePlayback {
            handle: Box::new(ClockHandle {
                paused: paused_tx,
                stop,
            }),
            finished: finished_rx,
        })
    }

    fn name(&self) -> &str {
        "wav"
    }
}

struct ClockHandle {
    paused: watch::Sender<bool>,
    stop: CancellationToken,
}

impl ClockHandle {
    fn ensure_running(&self) -> Result<(), NarrationError> {
        if self.stop.is_cancelled() {
            return Err(NarrationError::Device("stream already stopped".into()));
        }
        Ok(())
    }
}

impl OutputHandle for ClockHandle {
    fn pause(&mut self) -> Result<(), NarrationError> {
        self.ensure_running()?;
        self.paused.send_replace(true);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), NarrationError> {
        self.ensure_running()?;
        self.paused.send_replace(false);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), NarrationError> {
        self.ensure_running()?;
        self.stop.cancel();
        Ok(())
    }
}

/// Counts down `total` of unpaused time, then signals `finished`
async fn run_clock(
    total: Duration,
    mut paused: watch::Receiver<bool>,
    stop: CancellationToken,
    finished: oneshot::Sender<()>,
) {
    let mut remaining = total;
    loop {
        if *paused.borrow_and_update() {
            tokio::select! {
                _ = stop.cancelled() => break,
                changed = paused.changed() => if changed.is_err() { break },
            }
            continue;
        }

        let started = Instant::now();
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(remaining) => {
                debug!("Narration clock ran out");
                break;
            }
            changed = paused.changed() => {
                remaining = remaining.saturating_sub(started.elapsed());
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    let _ = finished.send(());
}

#[cfg(feature = "speaker")]
mod speaker {
    use std::sync::Arc;

    use rodio::buffer::SamplesBuffer;
    use rodio::{OutputStream, Sink};
    use tokio::sync::oneshot;
    use tracing::info;

    use super::{ActivePlayback, AudioOutput, OutputHandle};
    use crate::audio::{AudioBuffer, NarrationError};

    /// Default output device via rodio.
    ///
    /// rodio's `OutputStream` is not `Send`, so each stream lives on its own
    /// thread for the length of the narration.
    pub struct SpeakerOutput;

    impl SpeakerOutput {
        pub fn new() -> Self {
            Self
        }
    }

    impl AudioOutput for SpeakerOutput {
        fn play(&mut self, buffer: AudioBuffer) -> Result<ActivePlayback, NarrationError> {
            let (ready_tx, ready_rx) = std::sync::mpsc::channel();
            let (finished_tx, finished_rx) = oneshot::channel();
            let channels = buffer.channel_count();
            let sample_rate = buffer.sample_rate;
            let samples = buffer.interleaved();

            std::thread::Builder::new()
                .name("narration-output".to_string())
                .spawn(move || {
                    let (_stream, stream_handle) = match OutputStream::try_default() {
                        Ok(s) => s,
                        Err(e) => {
                            let _ = ready_tx.send(Err(NarrationError::Device(e.to_string())));
                            return;
                        }
                    };
                    let sink = match Sink::try_new(&stream_handle) {
                        Ok(s) => Arc::new(s),
                        Err(e) => {
                            let _ = ready_tx.send(Err(NarrationError::Device(e.to_string())));
                            return;
                        }
                    };
                    sink.append(SamplesBuffer::new(channels, sample_rate, samples));
                    if ready_tx.send(Ok(Arc::clone(&sink))).is_err() {
                        return;
                    }
                    sink.sleep_until_end();
                    let _ = finished_tx.send(());
                })
                .map_err(|e| NarrationError::Device(e.to_string()))?;

            let sink = ready_rx
                .recv()
                .map_err(|_| NarrationError::Device("output thread exited early".into()))??;
            info!("Narration playing on default output device");

            Ok(ActivePlayback {
                handle: Box::new(SpeakerHandle {
                    sink,
                    stopped: false,
                }),
                finished: finished_rx,
            })
        }

        fn name(&self) -> &str {
            "speaker"
        }
    }

    struct SpeakerHandle {
        sink: Arc<Sink>,
        stopped: bool,
    }

    impl OutputHandle for SpeakerHandle {
        fn pause(&mut self) -> Result<(), NarrationError> {
            if self.stopped {
                return Err(NarrationError::Device("stream already stopped".into()));
            }
            self.sink.pause();
            Ok(())
        }

        fn resume(&mut self) -> Result<(), NarrationError> {
            if self.stopped {
                return Err(NarrationError::Device("stream already stopped".into()));
            }
            self.sink.play();
            Ok(())
        }

        fn stop(&mut self) -> Result<(), NarrationError> {
            if self.stopped {
                return Err(NarrationError::Device("stream already stopped".into()));
            }
            self.stopped = true;
            self.sink.stop();
            Ok(())
        }
    }
}
