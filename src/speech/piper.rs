use std::{
    ffi::OsString,
    fs,
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

use async_trait::async_trait;
use log::{error, info, warn};
use shlex::Shlex;

use super::{AudioClip, SpeechBackend, SpeechError, SpeechRequest, VoiceLibrary};

/// How to start Piper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PiperCommand {
    /// A full command line, split shell-style.
    CommandLine(String),
    Executable(PathBuf),
    PythonModule,
}

impl PiperCommand {
    /// Explicit command line if given, else the bundled executable under
    /// `runtime_dir`, else `python -m piper`.
    pub fn resolve(command_line: Option<&str>, runtime_dir: &Path) -> Self {
        if let Some(line) = command_line.filter(|line| !line.trim().is_empty()) {
            return Self::CommandLine(line.to_string());
        }
        let candidate = runtime_dir
            .join("piper")
            .join(if cfg!(windows) { "piper.exe" } else { "piper" });
        if candidate.exists() {
            return Self::Executable(candidate);
        }
        Self::PythonModule
    }

    fn program_and_args(&self) -> Result<(OsString, Vec<OsString>), SpeechError> {
        match self {
            Self::CommandLine(line) => {
                let mut parts = Shlex::new(line).map(OsString::from);
                let program = parts
                    .next()
                    .ok_or_else(|| SpeechError::Other("Piper command line is empty".into()))?;
                Ok((program, parts.collect()))
            }
            Self::Executable(path) => Ok((path.as_os_str().into(), Vec::new())),
            Self::PythonModule => Ok(("python".into(), vec!["-m".into(), "piper".into()])),
        }
    }
}

/// Output files are reused round-robin, so at most this many clips exist.
pub const DEFAULT_CLIP_SLOTS: u64 = 8;

#[derive(Debug, Clone, Default)]
pub struct PiperOptions {
    pub speaker: Option<String>,
    pub length_scale: Option<f32>,
}

pub struct PiperSynthesizer {
    command: PiperCommand,
    voices: Arc<VoiceLibrary>,
    output_dir: PathBuf,
    options: PiperOptions,
    clip_slots: u64,
    counter: AtomicU64,
}

impl PiperSynthesizer {
    pub fn new(command: PiperCommand, voices: Arc<VoiceLibrary>, output_dir: PathBuf) -> Self {
        Self {
            command,
            voices,
            output_dir,
            options: PiperOptions::default(),
            clip_slots: DEFAULT_CLIP_SLOTS,
            counter: AtomicU64::new(0),
        }
    }

    pub fn with_options(mut self, options: PiperOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_clip_slots(mut self, slots: u64) -> Self {
        self.clip_slots = slots.max(1);
        self
    }

    fn model_for(&self, voice: Option<&str>) -> Result<PathBuf, SpeechError> {
        match voice {
            Some(voice) => self.voices.resolve(voice),
            None => self
                .voices
                .default_voice()
                .map(|info| info.model_path)
                .ok_or_else(|| SpeechError::VoiceNotFound("<default>".into())),
        }
    }

    fn next_output_path(&self) -> PathBuf {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.clip_slots;
        self.output_dir.join(format!("sentence-{index:02}.wav"))
    }
}

struct Invocation {
    command: PiperCommand,
    model_path: PathBuf,
    output_path: PathBuf,
    options: PiperOptions,
    text: String,
}

impl Invocation {
    fn build_command(&self) -> Result<Command, SpeechError> {
        let (program, args) = self.command.program_and_args()?;
        let mut command = Command::new(program);
        command.args(args);
        command.arg("--model").arg(&self.model_path);
        command.arg("--output_file").arg(&self.output_path);
        if let Some(speaker) = &self.options.speaker {
            command.arg("--speaker").arg(speaker);
        }
        if let Some(scale) = self.options.length_scale {
            command.arg("--length_scale").arg(scale.to_string());
        }
        Ok(command)
    }

    fn run(self) -> Result<AudioClip, SpeechError> {
        let start = Instant::now();
        if let Some(parent) = self
            .output_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            fs::create_dir_all(parent).map_err(|err| {
                SpeechError::Other(format!(
                    "Unable to create output directory {}: {err}",
                    parent.display()
                ))
            })?;
        }

        let mut child = self
            .build_command()?
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| SpeechError::Spawn(err.to_string()))?;
        {
            let stdin = child
                .stdin
                .as_mut()
                .ok_or_else(|| SpeechError::Other("Failed to access Piper stdin".into()))?;
            stdin
                .write_all(self.text.as_bytes())
                .map_err(|err| SpeechError::Other(err.to_string()))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|err| SpeechError::Other(err.to_string()))?;
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            let status = output.status.code().unwrap_or_default();
            error!("Piper exited with status {status}: {stderr}");
            return Err(SpeechError::ProcessFailed { status, stderr });
        }
        if !self.output_path.exists() {
            warn!(
                "Piper succeeded but the expected output {} was not created",
                self.output_path.display()
            );
        }

        Ok(AudioClip {
            path: self.output_path,
            synthesis_time: start.elapsed(),
        })
    }
}

#[async_trait]
impl SpeechBackend for PiperSynthesizer {
    async fn synthesize(&self, request: SpeechRequest) -> Result<AudioClip, SpeechError> {
        let model_path = self.model_for(request.voice.as_deref())?;
        let invocation = Invocation {
            command: self.command.clone(),
            model_path,
            output_path: self.next_output_path(),
            options: self.options.clone(),
            text: request.text,
        };
        info!(
            "Invoking Piper for model {} writing to {}",
            invocation.model_path.display(),
            invocation.output_path.display()
        );
        tokio::task::spawn_blocking(move || invocation.run())
            .await
            .map_err(|err| SpeechError::Other(format!("Piper task failed: {err}")))?
    }
}
