use std::collections::HashMap;
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::StartupError;

/// Process configuration, resolved once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Root of the native voice assets (read-only).
    pub voices_dir: PathBuf,
    /// Root of the convertible speaker models. `None` disables conversion.
    pub models_dir: Option<PathBuf>,
    /// Writable directory for per-request TTS scratch files.
    pub scratch_dir: PathBuf,
    /// Writable directory for persisted converted output.
    pub output_dir: PathBuf,
    /// Native voice used when a request names no speaker. Falls back to the
    /// first discovered voice when unset.
    pub default_voice: Option<String>,
    /// Per-speaker base voice assignments, keyed by speaker id.
    pub voice_overrides: HashMap<String, String>,
    /// When set, pins the emotion hint for every request.
    pub fixed_emotion: Option<String>,
    /// When set, pins the speed hint for every request.
    pub fixed_speed: Option<f32>,
    /// Deadline after which an in-flight generation result is discarded.
    pub request_timeout: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self, StartupError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .expect("PORT must be a number");

        let voices_dir =
            PathBuf::from(std::env::var("VOICES_DIR").unwrap_or_else(|_| "./voices".to_string()));

        // A missing model root is a feature-off state, not an error.
        let models_dir_raw =
            PathBuf::from(std::env::var("MODELS_DIR").unwrap_or_else(|_| "./models".to_string()));
        let models_dir = if models_dir_raw.is_dir() {
            Some(models_dir_raw)
        } else {
            tracing::warn!(
                "model directory {} does not exist, voice conversion disabled",
                models_dir_raw.display()
            );
            None
        };

        let scratch_dir = std::env::var("SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());
        let output_dir =
            PathBuf::from(std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "./output".to_string()));

        let default_voice = std::env::var("DEFAULT_VOICE").ok();
        let voice_overrides = match std::env::var("VOICE_OVERRIDES") {
            Ok(path) => load_voice_overrides(&path)?,
            Err(_) => HashMap::new(),
        };

        let fixed_emotion = std::env::var("FIXED_EMOTION").ok();
        let fixed_speed = std::env::var("FIXED_SPEED")
            .ok()
            .map(|s| s.parse().expect("FIXED_SPEED must be a number"));

        let request_timeout = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .map(|s| s.parse().expect("REQUEST_TIMEOUT_SECS must be a number"))
            .map(Duration::from_secs);

        Ok(Self {
            host,
            port,
            voices_dir,
            models_dir,
            scratch_dir,
            output_dir,
            default_voice,
            voice_overrides,
            fixed_emotion,
            fixed_speed,
            request_timeout,
        })
    }
}

/// Reads a JSON object mapping speaker id to base voice id.
fn load_voice_overrides(path: &str) -> Result<HashMap<String, String>, StartupError> {
    let file = File::open(path).map_err(|e| StartupError::OverrideFile {
        path: path.to_string(),
        source: Box::new(e),
    })?;
    serde_json::from_reader(file).map_err(|e| StartupError::OverrideFile {
        path: path.to_string(),
        source: Box::new(e),
    })
}
