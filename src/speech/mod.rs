pub mod output;
pub mod piper;
pub mod voices;

use std::{path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::session::Command;

pub use output::{AudioOutput, SilentOutput};
pub use piper::PiperSynthesizer;
pub use voices::{VoiceInfo, VoiceLibrary};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpeechError {
    #[error("voice '{0}' not found")]
    VoiceNotFound(String),
    #[error("failed to launch speech synthesiser: {0}")]
    Spawn(String),
    #[error("speech synthesiser exited with status {status}: {stderr}")]
    ProcessFailed { status: i32, stderr: String },
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("failed to open audio file: {0}")]
    Io(String),
    #[error("audio file is corrupt: {0}")]
    Decode(String),
    #[error("no playback device found")]
    Device,
    #[error("playback interrupted: {0}")]
    Interrupted(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: Option<String>,
}

/// Audio produced for one sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub path: PathBuf,
    pub synthesis_time: Duration,
}

#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn synthesize(&self, request: SpeechRequest) -> Result<AudioClip, SpeechError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RequestTicket(u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechState {
    #[default]
    Idle,
    Requesting,
    Playing,
}

/// How the session should react to a playback completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Superseded or cancelled; nothing to do.
    Stale,
    /// Finished naturally; advance one sentence and speak it.
    Completed,
    /// Playback failed; the adapter is idle again.
    Failed,
}

pub struct SpeechAdapter {
    backend: Arc<dyn SpeechBackend>,
    output: Arc<dyn AudioOutput>,
    voice: Option<String>,
    enabled: bool,
    state: SpeechState,
    next_ticket: u64,
    active: Option<RequestTicket>,
    task: Option<JoinHandle<()>>,
    last_error: Option<String>,
}

impl SpeechAdapter {
    pub fn new(
        backend: Arc<dyn SpeechBackend>,
        output: Arc<dyn AudioOutput>,
        voice: Option<String>,
    ) -> Self {
        Self {
            backend,
            output,
            voice,
            enabled: false,
            state: SpeechState::Idle,
            next_ticket: 0,
            active: None,
            task: None,
            last_error: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> SpeechState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn active_ticket(&self) -> Option<RequestTicket> {
        self.active
    }

    /// Turns speech on and requests `sentence`. With nothing to read the
    /// adapter stays idle.
    pub(crate) fn enable(
        &mut self,
        sentence: Option<String>,
        commands: &mpsc::UnboundedSender<Command>,
    ) {
        self.enabled = true;
        self.last_error = None;
        self.speak(sentence, commands);
    }

    /// Stops playback and forgets any in-flight request. Position is left
    /// alone.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.cancel();
        debug!("speech disabled");
    }

    /// Submits `sentence`, superseding whatever was in flight.
    pub(crate) fn speak(
        &mut self,
        sentence: Option<String>,
        commands: &mpsc::UnboundedSender<Command>,
    ) {
        self.cancel();
        let Some(text) = sentence else {
            debug!("speech has nothing left to read");
            self.enabled = false;
            return;
        };

        self.next_ticket += 1;
        let ticket = RequestTicket(self.next_ticket);
        let request = SpeechRequest {
            text,
            voice: self.voice.clone(),
        };
        debug!("speech request {ticket:?}: {:?}", request.text);

        let backend = Arc::clone(&self.backend);
        let commands = commands.clone();
        self.task = Some(tokio::spawn(async move {
            let result = backend.synthesize(request).await;
            let _ = commands.send(Command::SpeechFetched { ticket, result });
        }));
        self.active = Some(ticket);
        self.state = SpeechState::Requesting;
    }

    /// Handles a synthesis result. Returns `false` when it was stale.
    pub(crate) fn on_fetched(
        &mut self,
        ticket: RequestTicket,
        result: Result<AudioClip, SpeechError>,
        commands: &mpsc::UnboundedSender<Command>,
    ) -> bool {
        if self.active != Some(ticket) || self.state != SpeechState::Requesting {
            debug!("discarding superseded speech result {ticket:?}");
            return false;
        }

        match result {
            Ok(clip) => {
                debug!(
                    "speech clip {ticket:?} ready in {:?}",
                    clip.synthesis_time
                );
                let output = Arc::clone(&self.output);
                let commands = commands.clone();
                self.task = Some(tokio::spawn(async move {
                    let result = output.play(clip).await;
                    let _ = commands.send(Command::PlaybackFinished { ticket, result });
                }));
                self.state = SpeechState::Playing;
            }
            Err(err) => {
                warn!("Speech synthesis failed: {err}");
                self.fail(err.to_string());
            }
        }
        true
    }

    pub(crate) fn on_playback_finished(
        &mut self,
        ticket: RequestTicket,
        result: Result<(), AudioError>,
    ) -> PlaybackOutcome {
        if self.active != Some(ticket) || self.state != SpeechState::Playing {
            debug!("discarding superseded playback completion {ticket:?}");
            return PlaybackOutcome::Stale;
        }
        self.task = None;
        match result {
            Ok(()) => PlaybackOutcome::Completed,
            Err(err) => {
                warn!("Audio playback failed: {err}");
                self.fail(err.to_string());
                PlaybackOutcome::Failed
            }
        }
    }

    /// Called when the document has no further sentence.
    pub(crate) fn finish(&mut self) {
        info!("speech reached the end of the document");
        self.enabled = false;
        self.active = None;
        self.task = None;
        self.state = SpeechState::Idle;
    }

    fn fail(&mut self, message: String) {
        self.enabled = false;
        self.active = None;
        self.task = None;
        self.state = SpeechState::Idle;
        self.last_error = Some(message);
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if self.state == SpeechState::Playing {
            self.output.stop();
        }
        self.active = None;
        self.state = SpeechState::Idle;
    }
}

impl Drop for SpeechAdapter {
    fn drop(&mut self) {
        self.cancel();
    }
}
