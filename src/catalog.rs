use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::StartupError;

const MODEL_EXTENSION: &str = "onnx";
const INDEX_EXTENSION: &str = "index";

/// A voice-conversion model bundle discovered under the model root.
#[derive(Debug, Clone)]
pub struct ConvertibleSpeaker {
    /// Directory path relative to the model root.
    pub id: String,
    pub model_path: PathBuf,
    pub index_path: PathBuf,
    /// Model root relative paths, as reported by the detail endpoint.
    pub model_rel: String,
    pub index_rel: String,
    /// Native voice that seeds synthesis before conversion.
    pub base_voice: String,
}

/// The two speaker registries, built once at startup and read-only afterwards.
///
/// Native voices and convertible speakers are disjoint namespaces; a requested
/// name is resolved against convertible speakers first and only such a hit
/// triggers the conversion stage.
pub struct SpeakerCatalog {
    native: Vec<String>,
    convertible: HashMap<String, ConvertibleSpeaker>,
    default_voice: String,
    conversion_enabled: bool,
}

impl SpeakerCatalog {
    /// Scans both configured roots. Every violation of the expected layout is
    /// fatal here; the process must not start on a partial catalog.
    pub fn build(config: &Config) -> Result<Self, StartupError> {
        let native = discover_native_voices(&config.voices_dir)?;
        if native.is_empty() {
            return Err(StartupError::NoNativeVoices(
                config.voices_dir.display().to_string(),
            ));
        }

        let default_voice = match &config.default_voice {
            Some(voice) => {
                if !native.contains(voice) {
                    return Err(StartupError::UnknownDefaultVoice(voice.clone()));
                }
                voice.clone()
            }
            None => native[0].clone(),
        };

        for (speaker, voice) in &config.voice_overrides {
            if !native.contains(voice) {
                return Err(StartupError::UnknownOverrideVoice {
                    speaker: speaker.clone(),
                    voice: voice.clone(),
                });
            }
        }

        let (convertible, conversion_enabled) = match &config.models_dir {
            Some(root) => (
                discover_convertible_speakers(
                    root,
                    &config.voice_overrides,
                    &default_voice,
                )?,
                true,
            ),
            None => (HashMap::new(), false),
        };

        tracing::info!(
            "catalog ready: {} native voices, {} convertible speakers",
            native.len(),
            convertible.len()
        );

        Ok(Self {
            native,
            convertible,
            default_voice,
            conversion_enabled,
        })
    }

    pub fn native_voices(&self) -> &[String] {
        &self.native
    }

    pub fn contains_native(&self, name: &str) -> bool {
        self.native.iter().any(|v| v == name)
    }

    pub fn convertible(&self, name: &str) -> Option<&ConvertibleSpeaker> {
        self.convertible.get(name)
    }

    pub fn convertible_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.convertible.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn filter_native(&self, pattern: &Regex) -> Vec<String> {
        self.native
            .iter()
            .filter(|v| pattern.is_match(v))
            .cloned()
            .collect()
    }

    pub fn filter_convertible(&self, pattern: &Regex) -> Vec<String> {
        let mut ids: Vec<String> = self
            .convertible
            .keys()
            .filter(|id| pattern.is_match(id))
            .cloned()
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn default_voice(&self) -> &str {
        &self.default_voice
    }

    pub fn conversion_enabled(&self) -> bool {
        self.conversion_enabled
    }

    pub fn convertible_count(&self) -> usize {
        self.convertible.len()
    }
}

/// Voice id is the asset's root-relative path with the extension stripped.
fn discover_native_voices(root: &Path) -> Result<Vec<String>, StartupError> {
    let mut voices = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| scan_error(root, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().map(|e| e == MODEL_EXTENSION).unwrap_or(false) {
            let rel = path.strip_prefix(root).unwrap_or(path);
            voices.push(rel.with_extension("").to_string_lossy().into_owned());
        }
    }

    voices.sort_unstable();
    Ok(voices)
}

fn discover_convertible_speakers(
    root: &Path,
    overrides: &HashMap<String, String>,
    default_voice: &str,
) -> Result<HashMap<String, ConvertibleSpeaker>, StartupError> {
    // Group model files by their directory so layout violations surface as
    // one diagnostic per directory.
    let mut models_by_dir: HashMap<PathBuf, Vec<PathBuf>> = HashMap::new();

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| scan_error(root, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !path.extension().map(|e| e == MODEL_EXTENSION).unwrap_or(false) {
            continue;
        }
        let dir = match path.parent() {
            Some(dir) if dir != root => dir.to_path_buf(),
            _ => {
                return Err(StartupError::ModelOutsideSpeakerDir(
                    path.display().to_string(),
                ))
            }
        };
        models_by_dir.entry(dir).or_default().push(path.to_path_buf());
    }

    let mut speakers = HashMap::new();

    for (dir, models) in models_by_dir {
        if models.len() != 1 {
            return Err(StartupError::ModelFileCount {
                dir: dir.display().to_string(),
                count: models.len(),
            });
        }

        let indexes = index_files_in(&dir)?;
        if indexes.len() != 1 {
            return Err(StartupError::IndexFileCount {
                dir: dir.display().to_string(),
                count: indexes.len(),
            });
        }

        let model_path = models.into_iter().next().unwrap();
        let index_path = indexes.into_iter().next().unwrap();
        let id = dir
            .strip_prefix(root)
            .unwrap_or(&dir)
            .to_string_lossy()
            .into_owned();
        let base_voice = overrides
            .get(&id)
            .cloned()
            .unwrap_or_else(|| default_voice.to_string());

        let speaker = ConvertibleSpeaker {
            id: id.clone(),
            model_rel: rel_string(&model_path, root),
            index_rel: rel_string(&index_path, root),
            model_path,
            index_path,
            base_voice,
        };
        speakers.insert(id, speaker);
    }

    Ok(speakers)
}

fn index_files_in(dir: &Path) -> Result<Vec<PathBuf>, StartupError> {
    let entries = std::fs::read_dir(dir).map_err(|e| StartupError::Scan {
        path: dir.display().to_string(),
        source: e,
    })?;

    let mut indexes = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StartupError::Scan {
            path: dir.display().to_string(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_file()
            && path.extension().map(|e| e == INDEX_EXTENSION).unwrap_or(false)
        {
            indexes.push(path);
        }
    }
    indexes.sort_unstable();
    Ok(indexes)
}

fn rel_string(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

fn scan_error(root: &Path, e: walkdir::Error) -> StartupError {
    StartupError::Scan {
        path: root.display().to_string(),
        source: e
            .into_io_error()
            .unwrap_or_else(|| std::io::Error::other("walk error")),
    }
}
