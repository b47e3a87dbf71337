use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::AppError;

/// Per-voice configuration stored next to the model as `<id>.onnx.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    pub audio: AudioConfig,
    pub espeak: Option<EspeakConfig>,
    #[serde(default)]
    pub phoneme_id_map: HashMap<String, Vec<i64>>,
    #[serde(default)]
    pub inference: Option<InferenceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EspeakConfig {
    pub voice: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_noise_scale")]
    pub noise_scale: f32,
    #[serde(default = "default_length_scale")]
    pub length_scale: f32,
    #[serde(default = "default_noise_w")]
    pub noise_w: f32,
}

fn default_noise_scale() -> f32 {
    0.667
}

fn default_length_scale() -> f32 {
    1.0
}

fn default_noise_w() -> f32 {
    0.8
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            noise_scale: default_noise_scale(),
            length_scale: default_length_scale(),
            noise_w: default_noise_w(),
        }
    }
}

/// A native voice's on-disk assets. The id may contain path separators; voices
/// are discovered recursively under the root.
#[derive(Debug)]
pub struct Voice {
    pub config: VoiceConfig,
    pub model_path: PathBuf,
}

impl Voice {
    pub fn load(voices_dir: &Path, voice_id: &str) -> Result<Self, AppError> {
        let model_path = voices_dir.join(format!("{}.onnx", voice_id));
        let config_path = voices_dir.join(format!("{}.onnx.json", voice_id));

        // The catalog vouched for the model file at startup; anything missing
        // now is a server-side asset problem, not a client mistake.
        if !model_path.exists() {
            return Err(AppError::TtsError(format!(
                "voice asset missing for \"{}\"",
                voice_id
            )));
        }
        if !config_path.exists() {
            return Err(AppError::TtsError(format!(
                "voice config missing for \"{}\"",
                voice_id
            )));
        }

        let config: VoiceConfig = serde_json::from_reader(File::open(&config_path)?)?;

        Ok(Self { config, model_path })
    }
}
