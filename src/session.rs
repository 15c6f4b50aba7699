use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

use crate::{
    autoscroll::{Autoscroll, WordsPerMinute},
    document::{Document, DocumentId},
    navigation::Navigator,
    notify::{ChangeCause, Notifier, PositionObserver},
    position::Position,
    segment::Segmenter,
    speech::{
        AudioClip, AudioError, AudioOutput, PlaybackOutcome, RequestTicket, SilentOutput,
        SpeechAdapter, SpeechBackend, SpeechError, SpeechRequest, SpeechState,
    },
};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("the reading session has shut down")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    NextWord,
    PrevWord,
    NextSentence,
    PrevSentence,
    NextParagraph,
    PrevParagraph,
}

pub(crate) enum Command {
    Navigate {
        op: Navigation,
        reply: oneshot::Sender<Position>,
    },
    JumpTo {
        target: Position,
        reply: oneshot::Sender<Position>,
    },
    Load {
        document: Document,
        reply: oneshot::Sender<Position>,
    },
    SetAutoscroll {
        enabled: bool,
        reply: oneshot::Sender<SessionStatus>,
    },
    SetWordsPerMinute {
        wpm: WordsPerMinute,
        reply: oneshot::Sender<SessionStatus>,
    },
    SetSpeech {
        enabled: bool,
        reply: oneshot::Sender<SessionStatus>,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
    Shutdown {
        reply: Option<oneshot::Sender<()>>,
    },
    AutoscrollTick {
        generation: u64,
    },
    SpeechFetched {
        ticket: RequestTicket,
        result: Result<AudioClip, SpeechError>,
    },
    PlaybackFinished {
        ticket: RequestTicket,
        result: Result<(), AudioError>,
    },
}

/// Snapshot of the session, refreshed after every command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub document_id: DocumentId,
    pub position: Position,
    pub at_end: bool,
    pub autoscroll: bool,
    pub words_per_minute: WordsPerMinute,
    pub speech_enabled: bool,
    pub speech: SpeechState,
    pub speech_error: Option<String>,
}

/// Backend used when none is configured; every request fails.
struct UnavailableBackend;

#[async_trait]
impl SpeechBackend for UnavailableBackend {
    async fn synthesize(&self, _request: SpeechRequest) -> Result<AudioClip, SpeechError> {
        Err(SpeechError::Other("no speech backend configured".into()))
    }
}

pub struct SessionBuilder {
    document: Document,
    segmenter: Arc<Segmenter>,
    words_per_minute: WordsPerMinute,
    backend: Arc<dyn SpeechBackend>,
    output: Arc<dyn AudioOutput>,
    voice: Option<String>,
    observers: Vec<Box<dyn PositionObserver>>,
    resume_at: Option<Position>,
}

impl SessionBuilder {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            segmenter: Arc::new(Segmenter::default()),
            words_per_minute: WordsPerMinute::DEFAULT,
            backend: Arc::new(UnavailableBackend),
            output: Arc::new(SilentOutput::default()),
            voice: None,
            observers: Vec::new(),
            resume_at: None,
        }
    }

    pub fn segmenter(mut self, segmenter: Segmenter) -> Self {
        self.segmenter = Arc::new(segmenter);
        self
    }

    pub fn words_per_minute(mut self, wpm: WordsPerMinute) -> Self {
        self.words_per_minute = wpm;
        self
    }

    pub fn speech(mut self, backend: Arc<dyn SpeechBackend>, output: Arc<dyn AudioOutput>) -> Self {
        self.backend = backend;
        self.output = output;
        self
    }

    pub fn voice(mut self, voice: Option<String>) -> Self {
        self.voice = voice;
        self
    }

    pub fn observer(mut self, observer: impl PositionObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Position to restore right after loading; clamped like any jump.
    pub fn resume_at(mut self, position: Position) -> Self {
        self.resume_at = Some(position);
        self
    }

    /// Spawns the session task on the current tokio runtime.
    pub fn spawn(self) -> SessionHandle {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(placeholder_status());
        let mut notifier = Notifier::default();
        for observer in self.observers {
            notifier.subscribe(observer);
        }

        let mut session = Session {
            navigator: Navigator::new(self.document, self.segmenter),
            notifier,
            autoscroll: Autoscroll::new(self.words_per_minute),
            speech: SpeechAdapter::new(self.backend, self.output, self.voice),
            commands: commands.clone(),
            status: status_tx,
        };
        if let Some(target) = self.resume_at {
            if let Some(position) = session.navigator.jump_to(target) {
                info!("resuming {} at {position}", session.navigator.document_id());
                session.publish(position, ChangeCause::Jump);
            }
        }
        session.refresh_status();

        tokio::spawn(session.run(receiver));
        SessionHandle {
            inner: Arc::new(HandleInner { commands, status }),
        }
    }
}

fn placeholder_status() -> SessionStatus {
    SessionStatus {
        document_id: DocumentId::new(""),
        position: Position::START,
        at_end: true,
        autoscroll: false,
        words_per_minute: WordsPerMinute::DEFAULT,
        speech_enabled: false,
        speech: SpeechState::Idle,
        speech_error: None,
    }
}

// Sole owner of the position. Commands are handled one at a time.
struct Session {
    navigator: Navigator,
    notifier: Notifier,
    autoscroll: Autoscroll,
    speech: SpeechAdapter,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Sender<SessionStatus>,
}

impl Session {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Command>) {
        debug!("session started for {}", self.navigator.document_id());
        while let Some(command) = receiver.recv().await {
            let keep_running = self.handle(command);
            self.refresh_status();
            if !keep_running {
                break;
            }
        }
        self.autoscroll.disable();
        self.speech.disable();
        debug!("session stopped for {}", self.navigator.document_id());
    }

    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Navigate { op, reply } => {
                let previous = self.navigator.position();
                let moved = match op {
                    Navigation::NextWord => self.navigator.move_next_word(),
                    Navigation::PrevWord => self.navigator.move_prev_word(),
                    Navigation::NextSentence => self.navigator.move_next_sentence(),
                    Navigation::PrevSentence => self.navigator.move_prev_sentence(),
                    Navigation::NextParagraph => self.navigator.move_next_paragraph(),
                    Navigation::PrevParagraph => self.navigator.move_prev_paragraph(),
                };
                if let Some(position) = moved {
                    self.publish(position, ChangeCause::Navigation);
                    self.follow_manual_move(previous);
                }
                let _ = reply.send(self.navigator.position());
            }
            Command::JumpTo { target, reply } => {
                let previous = self.navigator.position();
                if let Some(position) = self.navigator.jump_to(target) {
                    self.publish(position, ChangeCause::Jump);
                    self.follow_manual_move(previous);
                }
                let _ = reply.send(self.navigator.position());
            }
            Command::Load { document, reply } => {
                let position = self.navigator.load(document);
                self.publish(position, ChangeCause::Load);
                if self.speech.is_enabled() {
                    let sentence = self.navigator.current_sentence_text();
                    self.speech.speak(sentence, &self.commands);
                }
                let _ = reply.send(position);
            }
            Command::SetAutoscroll { enabled, reply } => {
                if enabled {
                    if self.speech.is_enabled() {
                        info!("autoscroll takes over from speech");
                        self.speech.disable();
                    }
                    self.autoscroll.enable(&self.commands);
                } else {
                    self.autoscroll.disable();
                }
                let _ = reply.send(self.snapshot());
            }
            Command::SetWordsPerMinute { wpm, reply } => {
                self.autoscroll.set_words_per_minute(wpm, &self.commands);
                let _ = reply.send(self.snapshot());
            }
            Command::SetSpeech { enabled, reply } => {
                if enabled && !self.speech.is_enabled() {
                    if self.autoscroll.disable() {
                        info!("speech takes over from autoscroll");
                    }
                    let sentence = self.navigator.current_sentence_text();
                    self.speech.enable(sentence, &self.commands);
                } else if !enabled {
                    self.speech.disable();
                }
                let _ = reply.send(self.snapshot());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown { reply } => {
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
                return false;
            }
            Command::AutoscrollTick { generation } => {
                if !self.autoscroll.accepts(generation) {
                    debug!("dropping stale autoscroll tick generation={generation}");
                } else if let Some(position) = self.navigator.move_next_word() {
                    self.publish(position, ChangeCause::Autoscroll);
                }
            }
            Command::SpeechFetched { ticket, result } => {
                self.speech.on_fetched(ticket, result, &self.commands);
            }
            Command::PlaybackFinished { ticket, result } => {
                if self.speech.on_playback_finished(ticket, result) == PlaybackOutcome::Completed {
                    self.advance_speech();
                }
            }
        }
        true
    }

    fn advance_speech(&mut self) {
        match self.navigator.move_next_sentence() {
            Some(position) => {
                self.publish(position, ChangeCause::Speech);
                let sentence = self.navigator.current_sentence_text();
                self.speech.speak(sentence, &self.commands);
            }
            None => self.speech.finish(),
        }
    }

    /// Keeps speech on the sentence the reader moved to.
    fn follow_manual_move(&mut self, previous: Position) {
        if self.speech.is_enabled() && !previous.same_sentence(&self.navigator.position()) {
            let sentence = self.navigator.current_sentence_text();
            self.speech.speak(sentence, &self.commands);
        }
    }

    fn publish(&mut self, position: Position, cause: ChangeCause) {
        let document_id = self.navigator.document_id().clone();
        self.notifier.publish(&document_id, position, cause);
    }

    fn snapshot(&mut self) -> SessionStatus {
        SessionStatus {
            document_id: self.navigator.document_id().clone(),
            position: self.navigator.position(),
            at_end: self.navigator.is_at_end(),
            autoscroll: self.autoscroll.is_enabled(),
            words_per_minute: self.autoscroll.words_per_minute(),
            speech_enabled: self.speech.is_enabled(),
            speech: self.speech.state(),
            speech_error: self.speech.last_error().map(str::to_string),
        }
    }

    fn refresh_status(&mut self) {
        let snapshot = self.snapshot();
        self.status.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }
}

struct HandleInner {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SessionStatus>,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown { reply: None });
    }
}

/// Cheap to clone; the session stops when the last handle is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.inner
            .commands
            .send(build(reply))
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)
    }

    pub async fn navigate(&self, op: Navigation) -> Result<Position, SessionError> {
        self.request(|reply| Command::Navigate { op, reply }).await
    }

    pub async fn next_word(&self) -> Result<Position, SessionError> {
        self.navigate(Navigation::NextWord).await
    }

    pub async fn prev_word(&self) -> Result<Position, SessionError> {
        self.navigate(Navigation::PrevWord).await
    }

    pub async fn next_sentence(&self) -> Result<Position, SessionError> {
        self.navigate(Navigation::NextSentence).await
    }

    pub async fn prev_sentence(&self) -> Result<Position, SessionError> {
        self.navigate(Navigation::PrevSentence).await
    }

    pub async fn next_paragraph(&self) -> Result<Position, SessionError> {
        self.navigate(Navigation::NextParagraph).await
    }

    pub async fn prev_paragraph(&self) -> Result<Position, SessionError> {
        self.navigate(Navigation::PrevParagraph).await
    }

    /// Pointer-driven navigation; out-of-range targets are clamped.
    pub async fn jump_to(&self, target: Position) -> Result<Position, SessionError> {
        self.request(|reply| Command::JumpTo { target, reply }).await
    }

    pub async fn load(&self, document: Document) -> Result<Position, SessionError> {
        self.request(|reply| Command::Load { document, reply }).await
    }

    pub async fn set_autoscroll(&self, enabled: bool) -> Result<SessionStatus, SessionError> {
        self.request(|reply| Command::SetAutoscroll { enabled, reply })
            .await
    }

    pub async fn set_words_per_minute(
        &self,
        wpm: WordsPerMinute,
    ) -> Result<SessionStatus, SessionError> {
        self.request(|reply| Command::SetWordsPerMinute { wpm, reply })
            .await
    }

    pub async fn set_speech(&self, enabled: bool) -> Result<SessionStatus, SessionError> {
        self.request(|reply| Command::SetSpeech { enabled, reply })
            .await
    }

    pub async fn position(&self) -> Result<Position, SessionError> {
        Ok(self.refresh().await?.position)
    }

    /// Status after every command queued so far has been processed.
    pub async fn refresh(&self) -> Result<SessionStatus, SessionError> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Last published status, without waiting for the queue.
    pub fn status(&self) -> SessionStatus {
        self.inner.status.borrow().clone()
    }

    /// Receiver that is marked changed whenever the published status differs.
    pub fn status_updates(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.clone()
    }

    /// Resolves with the first published status matching `done`.
    pub async fn wait_for(
        &self,
        done: impl FnMut(&SessionStatus) -> bool,
    ) -> Result<SessionStatus, SessionError> {
        let mut updates = self.status_updates();
        let status = updates
            .wait_for(done)
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(status.clone())
    }

    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Shutdown { reply: Some(reply) })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::{
        sync::Semaphore,
        time::{sleep, Instant},
    };

    use super::*;
    use crate::notify::PositionChange;

    type Log = Arc<Mutex<Vec<(Position, ChangeCause, Instant)>>>;

    fn recorder() -> (Log, impl PositionObserver + 'static) {
        let log: Log = Arc::default();
        let sink = Arc::clone(&log);
        let observer = move |change: &PositionChange| {
            sink.lock()
                .push((change.position, change.cause, Instant::now()));
        };
        (log, observer)
    }

    fn positions(log: &Log) -> Vec<Position> {
        log.lock().iter().map(|(position, _, _)| *position).collect()
    }

    fn wpm(value: u32) -> WordsPerMinute {
        WordsPerMinute::new(value).unwrap()
    }

    fn assert_millis(actual: Duration, expected: u64) {
        let actual = actual.as_millis() as u64;
        assert!(
            actual.abs_diff(expected) <= 2,
            "expected ~{expected}ms, got {actual}ms"
        );
    }

    const STORY: &str = "The quick brown fox jumps. Over the lazy dog.\n\nAnd then it ran away. Far away.";

    /// Records requests and answers instantly.
    #[derive(Default)]
    struct EchoBackend {
        requests: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechBackend for EchoBackend {
        async fn synthesize(&self, request: SpeechRequest) -> Result<AudioClip, SpeechError> {
            self.requests.lock().push(request.text);
            Ok(AudioClip {
                path: "clip.wav".into(),
                synthesis_time: Duration::ZERO,
            })
        }
    }

    /// Answers only after the test releases a permit.
    struct GatedBackend {
        gate: Semaphore,
        requests: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechBackend for GatedBackend {
        async fn synthesize(&self, request: SpeechRequest) -> Result<AudioClip, SpeechError> {
            self.requests.lock().push(request.text);
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|err| SpeechError::Other(err.to_string()))?;
            Ok(AudioClip {
                path: "late.wav".into(),
                synthesis_time: Duration::ZERO,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn autoscroll_cadence_follows_words_per_minute() {
        let (log, observer) = recorder();
        let session = SessionBuilder::new(Document::from_text("story", STORY))
            .words_per_minute(wpm(120))
            .observer(observer)
            .spawn();

        let started = Instant::now();
        session.set_autoscroll(true).await.unwrap();
        sleep(Duration::from_millis(1_600)).await;
        assert_eq!(log.lock().len(), 3);

        let status = session.set_words_per_minute(wpm(240)).await.unwrap();
        assert!(status.autoscroll);
        sleep(Duration::from_millis(800)).await;

        let ticks: Vec<Duration> = log
            .lock()
            .iter()
            .map(|(_, cause, at)| {
                assert_eq!(*cause, ChangeCause::Autoscroll);
                *at - started
            })
            .collect();
        assert_eq!(ticks.len(), 6, "ticks: {ticks:?}");
        for (tick, expected) in ticks.iter().zip([500, 1_000, 1_500, 1_850, 2_100, 2_350]) {
            assert_millis(*tick, expected);
        }
        assert_millis(ticks[5] - ticks[4], 250);
        assert_eq!(session.status().position, Position::new(0, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn autoscroll_keeps_running_at_document_end() {
        let (log, observer) = recorder();
        let session = SessionBuilder::new(Document::from_text("short", "Two words."))
            .words_per_minute(wpm(600))
            .observer(observer)
            .spawn();

        session.set_autoscroll(true).await.unwrap();
        sleep(Duration::from_millis(1_000)).await;

        let status = session.refresh().await.unwrap();
        assert_eq!(positions(&log), vec![Position::new(0, 0, 1)]);
        assert!(status.at_end);
        assert!(status.autoscroll);

        let status = session.set_autoscroll(false).await.unwrap();
        assert!(!status.autoscroll);
    }

    #[tokio::test]
    async fn notifies_once_per_accepted_transition() {
        let (log, observer) = recorder();
        let session = SessionBuilder::new(Document::from_text("story", STORY))
            .observer(observer)
            .spawn();

        assert_eq!(session.prev_word().await.unwrap(), Position::START);
        assert_eq!(session.next_word().await.unwrap(), Position::new(0, 0, 1));
        assert_eq!(session.next_sentence().await.unwrap(), Position::new(0, 1, 0));
        assert_eq!(session.next_paragraph().await.unwrap(), Position::new(1, 0, 0));
        assert_eq!(session.next_paragraph().await.unwrap(), Position::new(1, 0, 0));
        assert_eq!(session.prev_sentence().await.unwrap(), Position::new(0, 1, 0));
        assert_eq!(session.prev_paragraph().await.unwrap(), Position::new(0, 1, 0));
        assert_eq!(
            session.jump_to(Position::new(9_999, 0, 0)).await.unwrap(),
            Position::new(1, 0, 0)
        );
        assert_eq!(
            session.jump_to(Position::new(1, 0, 0)).await.unwrap(),
            Position::new(1, 0, 0)
        );

        let causes: Vec<ChangeCause> = log.lock().iter().map(|(_, cause, _)| *cause).collect();
        assert_eq!(
            causes,
            vec![
                ChangeCause::Navigation,
                ChangeCause::Navigation,
                ChangeCause::Navigation,
                ChangeCause::Navigation,
                ChangeCause::Jump,
            ]
        );
        assert_eq!(session.status().position, Position::new(1, 0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn speech_reads_sentence_by_sentence_until_the_end() {
        let (log, observer) = recorder();
        let backend = Arc::new(EchoBackend::default());
        let session = SessionBuilder::new(Document::from_text("story", STORY))
            .speech(
                backend.clone(),
                Arc::new(SilentOutput::new(Duration::from_millis(100))),
            )
            .observer(observer)
            .spawn();

        let status = session.set_speech(true).await.unwrap();
        assert!(status.speech_enabled);
        assert_eq!(status.speech, SpeechState::Requesting);
        sleep(Duration::from_secs(2)).await;

        assert_eq!(
            *backend.requests.lock(),
            vec![
                "The quick brown fox jumps.",
                "Over the lazy dog.",
                "And then it ran away.",
                "Far away."
            ]
        );
        assert_eq!(
            positions(&log),
            vec![
                Position::new(0, 1, 0),
                Position::new(1, 0, 0),
                Position::new(1, 1, 0)
            ]
        );
        assert!(log
            .lock()
            .iter()
            .all(|(_, cause, _)| *cause == ChangeCause::Speech));

        let status = session.refresh().await.unwrap();
        assert_eq!(status.speech, SpeechState::Idle);
        assert!(!status.speech_enabled);
        assert_eq!(status.speech_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_speech_discards_the_outstanding_request() {
        let (log, observer) = recorder();
        let backend = Arc::new(GatedBackend {
            gate: Semaphore::new(0),
            requests: Mutex::default(),
        });
        let session = SessionBuilder::new(Document::from_text("story", STORY))
            .speech(backend.clone(), Arc::new(SilentOutput::new(Duration::ZERO)))
            .observer(observer)
            .spawn();

        session.set_speech(true).await.unwrap();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(backend.requests.lock().len(), 1);
        assert_eq!(session.status().speech, SpeechState::Requesting);

        let status = session.set_speech(false).await.unwrap();
        assert_eq!(status.speech, SpeechState::Idle);

        backend.gate.add_permits(10);
        sleep(Duration::from_millis(500)).await;

        let status = session.refresh().await.unwrap();
        assert_eq!(status.position, Position::START);
        assert_eq!(status.speech, SpeechState::Idle);
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_only_shows_in_status() {
        let session = SessionBuilder::new(Document::from_text("story", STORY)).spawn();
        session.set_speech(true).await.unwrap();

        let mut status = session.refresh().await.unwrap();
        for _ in 0..10 {
            if status.speech_error.is_some() {
                break;
            }
            tokio::task::yield_now().await;
            status = session.refresh().await.unwrap();
        }
        assert_eq!(status.speech, SpeechState::Idle);
        assert!(!status.speech_enabled);
        assert_eq!(
            status.speech_error.as_deref(),
            Some("no speech backend configured")
        );
        assert_eq!(status.position, Position::START);
    }

    #[tokio::test(start_paused = true)]
    async fn drivers_are_mutually_exclusive() {
        let backend = Arc::new(GatedBackend {
            gate: Semaphore::new(0),
            requests: Mutex::default(),
        });
        let session = SessionBuilder::new(Document::from_text("story", STORY))
            .words_per_minute(wpm(120))
            .speech(backend, Arc::new(SilentOutput::new(Duration::ZERO)))
            .spawn();

        let status = session.set_autoscroll(true).await.unwrap();
        assert!(status.autoscroll && !status.speech_enabled);

        let status = session.set_speech(true).await.unwrap();
        assert!(!status.autoscroll && status.speech_enabled);
        sleep(Duration::from_secs(2)).await;
        assert_eq!(session.position().await.unwrap(), Position::START);

        let status = session.set_autoscroll(true).await.unwrap();
        assert!(status.autoscroll && !status.speech_enabled);
        assert_eq!(status.speech, SpeechState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_move_restarts_speech_at_the_new_sentence() {
        let backend = Arc::new(EchoBackend::default());
        let session = SessionBuilder::new(Document::from_text("story", STORY))
            .speech(
                backend.clone(),
                Arc::new(SilentOutput::new(Duration::from_secs(60))),
            )
            .spawn();

        session.set_speech(true).await.unwrap();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(session.status().speech, SpeechState::Playing);

        session.next_word().await.unwrap();
        session.next_paragraph().await.unwrap();
        sleep(Duration::from_millis(10)).await;

        assert_eq!(
            *backend.requests.lock(),
            vec!["The quick brown fox jumps.", "And then it ran away."]
        );
        assert_eq!(session.refresh().await.unwrap().speech, SpeechState::Playing);
    }

    #[tokio::test]
    async fn load_resets_to_the_start_of_the_new_document() {
        let (log, observer) = recorder();
        let session = SessionBuilder::new(Document::from_text("story", STORY))
            .observer(observer)
            .spawn();

        session.jump_to(Position::new(1, 1, 1)).await.unwrap();
        let position = session
            .load(Document::from_text("next", "A new book."))
            .await
            .unwrap();
        assert_eq!(position, Position::START);

        let last = log.lock().last().map(|(position, cause, _)| (*position, *cause));
        assert_eq!(last, Some((Position::START, ChangeCause::Load)));
        assert_eq!(session.refresh().await.unwrap().document_id.as_str(), "next");
    }

    #[tokio::test]
    async fn resume_position_is_clamped() {
        let session = SessionBuilder::new(Document::from_text("story", STORY))
            .resume_at(Position::new(1, 7, 7))
            .spawn();
        assert_eq!(session.position().await.unwrap(), Position::new(1, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_resolves_when_autoscroll_reaches_the_end() {
        let session = SessionBuilder::new(Document::from_text("short", "Three small words."))
            .words_per_minute(wpm(600))
            .spawn();
        let started = Instant::now();
        session.set_autoscroll(true).await.unwrap();

        let status = session.wait_for(|status| status.at_end).await.unwrap();
        assert_eq!(status.position, Position::new(0, 0, 2));
        assert_millis(started.elapsed(), 200);
    }

    #[tokio::test]
    async fn wait_for_fails_once_the_session_is_gone() {
        let session = SessionBuilder::new(Document::from_text("story", STORY)).spawn();
        session.shutdown().await.unwrap();
        assert_eq!(
            session.wait_for(|status| status.at_end).await,
            Err(SessionError::Closed)
        );
    }

    #[tokio::test]
    async fn handle_reports_closed_after_shutdown() {
        let session = SessionBuilder::new(Document::from_text("story", STORY)).spawn();
        let clone = session.clone();
        session.shutdown().await.unwrap();
        assert_eq!(clone.next_word().await, Err(SessionError::Closed));
    }
}
