use std::{fmt, time::Duration};

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{config::ConfigError, session::Command};

/// Reading speed. Any positive value is accepted; the UI offers
/// [`WordsPerMinute::UI_MIN`]..=[`WordsPerMinute::UI_MAX`] in steps of
/// [`WordsPerMinute::UI_STEP`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct WordsPerMinute(u32);

impl WordsPerMinute {
    pub const UI_MIN: u32 = 100;
    pub const UI_MAX: u32 = 500;
    pub const UI_STEP: u32 = 10;
    pub const DEFAULT: WordsPerMinute = WordsPerMinute(250);

    pub fn new(wpm: u32) -> Result<Self, ConfigError> {
        if wpm == 0 {
            return Err(ConfigError::InvalidWordsPerMinute(wpm));
        }
        Ok(Self(wpm))
    }

    /// Snaps an arbitrary value onto the UI slider.
    pub fn clamp_to_ui_range(wpm: u32) -> Self {
        let clamped = wpm.clamp(Self::UI_MIN, Self::UI_MAX);
        let stepped = (clamped + Self::UI_STEP / 2) / Self::UI_STEP * Self::UI_STEP;
        Self(stepped.min(Self::UI_MAX))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Delay between two words: `60000 / wpm` milliseconds.
    pub fn word_delay(self) -> Duration {
        Duration::from_millis(60_000 / u64::from(self.0))
    }
}

impl Default for WordsPerMinute {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for WordsPerMinute {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WordsPerMinute> for u32 {
    fn from(value: WordsPerMinute) -> Self {
        value.0
    }
}

impl fmt::Display for WordsPerMinute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} wpm", self.0)
    }
}

/// Only ticks of the current generation may move the position.
pub struct Autoscroll {
    wpm: WordsPerMinute,
    generation: u64,
    ticker: Option<JoinHandle<()>>,
}

impl Autoscroll {
    pub fn new(wpm: WordsPerMinute) -> Self {
        Self {
            wpm,
            generation: 0,
            ticker: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn words_per_minute(&self) -> WordsPerMinute {
        self.wpm
    }

    /// Starts ticking. Returns `false` when already running.
    pub(crate) fn enable(&mut self, commands: &mpsc::UnboundedSender<Command>) -> bool {
        if self.is_enabled() {
            return false;
        }
        self.start(commands);
        true
    }

    /// Stops ticking. Returns `false` when already stopped.
    pub fn disable(&mut self) -> bool {
        let Some(ticker) = self.ticker.take() else {
            return false;
        };
        ticker.abort();
        self.generation += 1;
        debug!("autoscroll stopped");
        true
    }

    /// Changes the speed; a running cadence restarts from now.
    pub(crate) fn set_words_per_minute(
        &mut self,
        wpm: WordsPerMinute,
        commands: &mpsc::UnboundedSender<Command>,
    ) {
        self.wpm = wpm;
        if self.disable() {
            self.start(commands);
        }
    }

    /// Whether a tick of `generation` may still move the position.
    pub fn accepts(&self, generation: u64) -> bool {
        self.is_enabled() && generation == self.generation
    }

    fn start(&mut self, commands: &mpsc::UnboundedSender<Command>) {
        self.generation += 1;
        let generation = self.generation;
        let delay = self.wpm.word_delay();
        let commands = commands.clone();
        debug!("autoscroll started at {} ({delay:?} per word)", self.wpm);
        self.ticker = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + delay, delay);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                trace!("autoscroll tick generation={generation}");
                if commands
                    .send(Command::AutoscrollTick { generation })
                    .is_err()
                {
                    break;
                }
            }
        }));
    }
}

impl Drop for Autoscroll {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}
