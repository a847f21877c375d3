//! Ritual voice playback controller
//!
//! Sequences one narration at a time: request speech, decode it, play it,
//! and report the start and end of playback through the caller's callbacks.
//!
//! ```text
//! Idle --start--> Requesting --audio--> Playing <--pause/resume--> Paused
//!                     |                    |                          |
//!                     +--no audio/error----+--ended / stop------------+--> Idle
//! ```
//!
//! Completions from the synthesis request and the output device come back
//! over an internal channel tagged with the session id they belong to. The
//! owner drives them with [`PlaybackController::next_event`] (or
//! [`PlaybackController::drain_events`]); anything tagged with a superseded
//! session is dropped.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::decoder::decode_pcm16;
use super::output::{ActivePlayback, AudioOutput, OutputHandle};
use super::tts::{SpeechSynthesizer, Voice};
use super::{AudioBuffer, NARRATION_CHANNELS, NARRATION_SAMPLE_RATE, NarrationError};

/// Lifecycle callback
pub type Callback = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Requesting,
    Playing,
    Paused,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Requesting => write!(f, "requesting"),
            Self::Playing => write!(f, "playing"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

#[derive(Debug)]
enum SessionEvent {
    Synthesized {
        session: u64,
        result: Result<AudioBuffer, NarrationError>,
    },
    Finished {
        session: u64,
    },
}

struct Session {
    id: u64,
    cancel: CancellationToken,
    on_start: Option<Callback>,
    on_end: Option<Callback>,
    handle: Option<Box<dyn OutputHandle>>,
}

/// Owns the single narration session
pub struct PlaybackController {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    output: Box<dyn AudioOutput>,
    state: PlaybackState,
    session: Option<Session>,
    next_session: u64,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    diagnostics: Option<mpsc::UnboundedSender<NarrationError>>,
}

impl PlaybackController {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, output: Box<dyn AudioOutput>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            synthesizer,
            output,
            state: PlaybackState::Idle,
            session: None,
            next_session: 0,
            events_tx,
            events_rx,
            diagnostics: None,
        }
    }

    /// Also deliver every narration failure to `sink`
    pub fn with_diagnostics(mut self, sink: mpsc::UnboundedSender<NarrationError>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Id of the live session, if any
    pub fn session_id(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Begin narrating `text`. Any live session is stopped first.
    ///
    /// `on_start` fires when sound actually starts; `on_end` fires when the
    /// session ends on its own, successfully or not. Neither fires for a
    /// session ended by [`stop`](Self::stop). Must be called inside a Tokio
    /// runtime.
    pub fn start<S, E>(&mut self, text: impl Into<String>, voice: Voice, on_start: S, on_end: E)
    where
        S: FnOnce() + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        self.stop();

        self.next_session += 1;
        let id = self.next_session;
        let cancel = CancellationToken::new();
        self.session = Some(Session {
            id,
            cancel: cancel.clone(),
            on_start: Some(Box::new(on_start)),
            on_end: Some(Box::new(on_end)),
            handle: None,
        });
        self.state = PlaybackState::Requesting;

        let text = text.into();
        info!(
            "Narration session {} requesting speech ({} chars, voice {}, via {})",
            id,
            text.chars().count(),
            voice,
            self.synthesizer.name()
        );

        let synthesizer = Arc::clone(&self.synthesizer);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let reply = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Narration session {} cancelled while requesting", id);
                    return;
                }
                reply = synthesizer.synthesize(&text, voice) => reply,
            };
            let result = match reply {
                Ok(Some(payload)) if !payload.trim().is_empty() => {
                    decode_pcm16(&payload, NARRATION_SAMPLE_RATE, NARRATION_CHANNELS)
                }
                Ok(_) => Err(NarrationError::NoAudio),
                Err(e) => Err(NarrationError::Gateway(format!("{:#}", e))),
            };
            let _ = events.send(SessionEvent::Synthesized {
                session: id,
                result,
            });
        });
    }

    /// Suspend output. True only if the session was playing.
    pub fn pause(&mut self) -> bool {
        if self.state != PlaybackState::Playing {
            return false;
        }
        let Some(handle) = self.session.as_mut().and_then(|s| s.handle.as_mut()) else {
            return false;
        };
        match handle.pause() {
            Ok(()) => {
                self.state = PlaybackState::Paused;
                debug!("Narration paused");
                true
            }
            Err(e) => {
                self.report(e);
                false
            }
        }
    }

    /// Continue a paused session. True only if the session was paused.
    pub fn resume(&mut self) -> bool {
        if self.state != PlaybackState::Paused {
            return false;
        }
        let Some(handle) = self.session.as_mut().and_then(|s| s.handle.as_mut()) else {
            return false;
        };
        match handle.resume() {
            Ok(()) => {
                self.state = PlaybackState::Playing;
                debug!("Narration resumed");
                true
            }
            Err(e) => {
                self.report(e);
                false
            }
        }
    }

    /// Halt and release the live session without firing its callbacks.
    /// No-op when idle.
    pub fn stop(&mut self) {
        self.state = PlaybackState::Idle;
        let Some(mut session) = self.session.take() else {
            return;
        };
        info!("Stopping narration session {}", session.id);
        session.cancel.cancel();
        if let Some(mut handle) = session.handle.take() {
            // may race the stream ending by itself
            if let Err(e) = handle.stop() {
                debug!("Ignoring error stopping session {}: {}", session.id, e);
                self.report(e);
            }
        }
    }

    /// Wait for the next completion and apply it; returns the resulting state
    pub async fn next_event(&mut self) -> PlaybackState {
        if let Some(event) = self.events_rx.recv().await {
            self.handle_event(event);
        }
        self.state
    }

    /// Apply every completion that has already arrived
    pub fn drain_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            applied += 1;
        }
        applied
    }

    /// Drive completions until the controller is idle
    pub async fn run_until_idle(&mut self) {
        while self.state != PlaybackState::Idle {
            self.next_event().await;
        }
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Synthesized { session, result } => self.on_synthesized(session, result),
            SessionEvent::Finished { session } => self.on_finished(session),
        }
    }

    fn is_current(&self, id: u64) -> bool {
        self.session.as_ref().is_some_and(|s| s.id == id)
    }

    fn on_synthesized(&mut self, id: u64, result: Result<AudioBuffer, NarrationError>) {
        if !self.is_current(id) || self.state != PlaybackState::Requesting {
            debug!("Discarding speech for superseded session {}", id);
            return;
        }

        let buffer = match result {
            Ok(buffer) if !buffer.is_empty() => buffer,
            Ok(_) => return self.fail(NarrationError::NoAudio),
            Err(e) => return self.fail(e),
        };
        let duration = buffer.duration();

        let ActivePlayback { handle, finished } = match self.output.play(buffer) {
            Ok(playback) => playback,
            Err(e) => return self.fail(e),
        };

        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.handle = Some(handle);
        let on_start = session.on_start.take();
        let cancel = session.cancel.clone();
        self.state = PlaybackState::Playing;

        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = finished => {
                    let _ = events.send(SessionEvent::Finished { session: id });
                }
            }
        });

        info!(
            "Narration session {} playing {:.1}s on {}",
            id,
            duration.as_secs_f64(),
            self.output.name()
        );
        if let Some(callback) = on_start {
            callback();
        }
    }

    fn on_finished(&mut self, id: u64) {
        if !self.is_current(id)
            || !matches!(self.state, PlaybackState::Playing | PlaybackState::Paused)
        {
            debug!("Discarding end of playback for superseded session {}", id);
            return;
        }
        info!("Narration session {} finished", id);
        self.end_session();
    }

    fn fail(&mut self, error: NarrationError) {
        self.report(error);
        self.end_session();
    }

    /// Release the live session and fire its `on_end`
    fn end_session(&mut self) {
        self.state = PlaybackState::Idle;
        if let Some(mut session) = self.session.take() {
            session.cancel.cancel();
            session.handle = None;
            if let Some(callback) = session.on_end.take() {
                callback();
            }
        }
    }

    fn report(&self, error: NarrationError) {
        warn!("Narration: {}", error);
        if let Some(sink) = &self.diagnostics {
            let _ = sink.send(error);
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop();
    }
}
