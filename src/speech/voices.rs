use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::SpeechError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceInfo {
    pub id: String,
    pub label: String,
    pub language: Option<String>,
    pub quality: Option<String>,
    pub model_path: PathBuf,
}

/// The parts of Piper's model metadata we show.
#[derive(Debug, Default, Deserialize)]
struct ModelMetadata {
    #[serde(default)]
    language: Option<LanguageMetadata>,
    #[serde(default)]
    audio: Option<AudioMetadata>,
}

#[derive(Debug, Deserialize)]
struct LanguageMetadata {
    code: Option<String>,
    name: Option<String>,
    name_native: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AudioMetadata {
    quality: Option<String>,
}

/// Voices found under a directory, keyed by model file stem.
#[derive(Debug, Default)]
pub struct VoiceLibrary {
    base_dir: PathBuf,
    voices: RwLock<BTreeMap<String, VoiceInfo>>,
}

impl VoiceLibrary {
    pub fn new(base_dir: PathBuf) -> Self {
        let library = Self {
            base_dir,
            voices: RwLock::default(),
        };
        library.refresh();
        library
    }

    /// Rescans the base directory. Returns the number of voices found.
    pub fn refresh(&self) -> usize {
        let discovered: BTreeMap<String, VoiceInfo> = WalkDir::new(&self.base_dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file() && is_model(entry.path()))
            .filter_map(|entry| describe_model(entry.path()))
            .map(|info| (info.id.clone(), info))
            .collect();
        debug!(
            "found {} voices under {}",
            discovered.len(),
            self.base_dir.display()
        );
        let count = discovered.len();
        *self.voices.write() = discovered;
        count
    }

    /// All voices, ordered by label.
    pub fn list(&self) -> Vec<VoiceInfo> {
        let mut voices: Vec<VoiceInfo> = self.voices.read().values().cloned().collect();
        voices.sort_by(|a, b| a.label.cmp(&b.label));
        voices
    }

    /// Resolves a voice id, or an existing model path, to a model file.
    pub fn resolve(&self, voice: &str) -> Result<PathBuf, SpeechError> {
        if let Some(info) = self.voices.read().get(voice) {
            return Ok(info.model_path.clone());
        }
        let direct = Path::new(voice);
        if direct.is_file() {
            return Ok(direct.to_path_buf());
        }
        Err(SpeechError::VoiceNotFound(voice.to_string()))
    }

    /// Model used when no voice is requested: the first one by label.
    pub fn default_voice(&self) -> Option<VoiceInfo> {
        self.list().into_iter().next()
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

fn is_model(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("onnx")
}

fn describe_model(path: &Path) -> Option<VoiceInfo> {
    let id = path.file_stem()?.to_string_lossy().into_owned();
    let metadata = read_metadata(&path.with_extension("onnx.json")).unwrap_or_default();

    let (language, language_name) = match metadata.language {
        Some(language) => (language.code, language.name_native.or(language.name)),
        None => (None, None),
    };
    let label = match language_name {
        Some(name) => format!("{name} · {id}"),
        None => id.clone(),
    };

    Some(VoiceInfo {
        label,
        language,
        quality: metadata.audio.and_then(|audio| audio.quality),
        model_path: path.to_path_buf(),
        id,
    })
}

fn read_metadata(path: &Path) -> Option<ModelMetadata> {
    if !path.exists() {
        return None;
    }
    let contents = fs::read_to_string(path)
        .map_err(|err| warn!("Failed to read voice metadata {}: {err}", path.display()))
        .ok()?;
    serde_json::from_str(&contents)
        .map_err(|err| warn!("Failed to parse voice metadata {}: {err}", path.display()))
        .ok()
}
