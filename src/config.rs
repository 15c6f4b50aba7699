use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::{autoscroll::WordsPerMinute, segment::ParagraphPolicy};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("words per minute must be a positive integer, got {0}")]
    InvalidWordsPerMinute(u32),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub words_per_minute: WordsPerMinute,
    pub voice: Option<String>,
    pub piper_command: Option<String>,
    pub length_scale: Option<f32>,
    pub runtime_dir: PathBuf,
    pub voices_dir: PathBuf,
    pub output_dir: PathBuf,
    pub progress_file: Option<PathBuf>,
    pub paragraphs: ParagraphPolicy,
    pub extra_abbreviations: Vec<String>,
    pub log_dir: PathBuf,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            words_per_minute: WordsPerMinute::DEFAULT,
            voice: None,
            piper_command: None,
            length_scale: None,
            runtime_dir: PathBuf::from("runtime"),
            voices_dir: PathBuf::from("assets/voices"),
            output_dir: PathBuf::from("runtime/output"),
            progress_file: Some(PathBuf::from("runtime/progress.json")),
            paragraphs: ParagraphPolicy::Drop,
            extra_abbreviations: Vec::new(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl ReaderConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Same as [`ReaderConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("READER_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(value) = lookup("READER_WPM") {
            let wpm = value
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "READER_WPM",
                    value: value.clone(),
                })?;
            config.words_per_minute = WordsPerMinute::new(wpm)?;
        }
        if let Some(voice) = lookup("READER_VOICE") {
            config.voice = Some(voice);
        }
        if let Some(command) = lookup("READER_PIPER_COMMAND") {
            config.piper_command = Some(command);
        }
        if let Some(dir) = lookup("READER_RUNTIME_DIR") {
            config.runtime_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("READER_VOICES_DIR") {
            config.voices_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("READER_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("READER_PROGRESS_FILE") {
            config.progress_file = (!path.trim().is_empty()).then(|| PathBuf::from(path));
        }
        if let Some(policy) = lookup("READER_PARAGRAPHS") {
            config.paragraphs = match policy.trim() {
                "drop" => ParagraphPolicy::Drop,
                "retain" => ParagraphPolicy::Retain,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "READER_PARAGRAPHS",
                        value: policy,
                    }
                    .into())
                }
            };
        }

        Ok(config)
    }
}
