use std::time::Duration;

use async_trait::async_trait;

use super::{AudioClip, AudioError};

/// `play` resolves when the clip has finished on its own; `stop` cuts the
/// current clip short, including one that has not started yet.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    async fn play(&self, clip: AudioClip) -> Result<(), AudioError>;
    fn stop(&self);
}

/// Pretends to play each clip for a fixed time. Used for headless runs.
#[derive(Debug, Clone)]
pub struct SilentOutput {
    pause: Duration,
}

impl SilentOutput {
    pub fn new(pause: Duration) -> Self {
        Self { pause }
    }
}

impl Default for SilentOutput {
    fn default() -> Self {
        Self::new(Duration::from_millis(400))
    }
}

#[async_trait]
impl AudioOutput for SilentOutput {
    async fn play(&self, _clip: AudioClip) -> Result<(), AudioError> {
        tokio::time::sleep(self.pause).await;
        Ok(())
    }

    fn stop(&self) {}
}

#[cfg(any(test, feature = "playback"))]
pub(crate) use slot::PlaybackSlot;

#[cfg(any(test, feature = "playback"))]
mod slot {
    use parking_lot::Mutex;

    #[derive(Debug)]
    struct SlotState<S> {
        /// Clip allowed to play; 0 after a stop.
        clip: u64,
        next_clip: u64,
        sink: Option<S>,
    }

    /// The one clip a blocking playback thread may start.
    ///
    /// `begin` claims the slot for a new clip, `attach` starts the clip only if
    /// nobody stopped or replaced it in the meantime, and `release` clears the
    /// slot only while it still belongs to that clip.
    #[derive(Debug)]
    pub(crate) struct PlaybackSlot<S> {
        state: Mutex<SlotState<S>>,
    }

    impl<S> Default for PlaybackSlot<S> {
        fn default() -> Self {
            Self {
                state: Mutex::new(SlotState {
                    clip: 0,
                    next_clip: 0,
                    sink: None,
                }),
            }
        }
    }

    impl<S> PlaybackSlot<S> {
        /// Claims the slot for a new clip; returns its id and the sink of the
        /// clip it replaces.
        pub(crate) fn begin(&self) -> (u64, Option<S>) {
            let mut state = self.state.lock();
            state.next_clip += 1;
            state.clip = state.next_clip;
            (state.clip, state.sink.take())
        }

        /// Runs `start` and keeps `sink` when `clip` still owns the slot.
        pub(crate) fn attach(&self, clip: u64, sink: S, start: impl FnOnce(&S)) -> bool {
            let mut state = self.state.lock();
            if state.clip != clip {
                return false;
            }
            start(&sink);
            state.sink = Some(sink);
            true
        }

        pub(crate) fn release(&self, clip: u64) {
            let mut state = self.state.lock();
            if state.clip == clip {
                state.sink = None;
            }
        }

        /// Cancels whatever clip owns the slot and hands back its sink.
        pub(crate) fn stop(&self) -> Option<S> {
            let mut state = self.state.lock();
            state.clip = 0;
            state.sink.take()
        }
    }
}

#[cfg(feature = "playback")]
pub use rodio_output::RodioOutput;

#[cfg(feature = "playback")]
mod rodio_output {
    use std::{fs::File, io::BufReader, sync::Arc};

    use async_trait::async_trait;
    use log::debug;
    use rodio::{Decoder, OutputStream, Sink};

    use super::{AudioOutput, PlaybackSlot};
    use crate::speech::{AudioClip, AudioError};

    /// Plays WAV clips on the default output device.
    #[derive(Default)]
    pub struct RodioOutput {
        slot: Arc<PlaybackSlot<Arc<Sink>>>,
    }

    impl RodioOutput {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl AudioOutput for RodioOutput {
        async fn play(&self, clip: AudioClip) -> Result<(), AudioError> {
            let slot = Arc::clone(&self.slot);
            let (id, replaced) = slot.begin();
            if let Some(sink) = replaced {
                sink.stop();
            }
            tokio::task::spawn_blocking(move || {
                let file = File::open(&clip.path).map_err(|err| AudioError::Io(err.to_string()))?;
                let decoder = Decoder::new(BufReader::new(file))
                    .map_err(|err| AudioError::Decode(err.to_string()))?;

                // The stream must stay on this thread and alive until the end.
                let (_stream, handle) =
                    OutputStream::try_default().map_err(|_| AudioError::Device)?;
                let sink =
                    Arc::new(Sink::try_new(&handle).map_err(|err| AudioError::Io(err.to_string()))?);
                let started = slot.attach(id, Arc::clone(&sink), |sink| {
                    sink.append(decoder);
                    sink.play();
                });
                if !started {
                    debug!("skipping {}: stopped before playback", clip.path.display());
                    return Err(AudioError::Interrupted("stopped before playback".into()));
                }
                debug!("playing {}", clip.path.display());

                sink.sleep_until_end();
                slot.release(id);
                Ok(())
            })
            .await
            .map_err(|err| AudioError::Interrupted(err.to_string()))?
        }

        fn stop(&self) {
            if let Some(sink) = self.slot.stop() {
                sink.stop();
            }
        }
    }
}
