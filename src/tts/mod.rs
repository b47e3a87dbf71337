pub mod vits;
pub mod voice;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::audio::{self, AudioBuffer};
use crate::error::AppError;

/// Caller-supplied synthesis hints, after any configured overrides.
#[derive(Debug, Clone)]
pub struct SynthesisHints {
    pub emotion: Option<String>,
    pub speed: f32,
}

impl Default for SynthesisHints {
    fn default() -> Self {
        Self {
            emotion: None,
            speed: 1.0,
        }
    }
}

/// The opaque speech synthesis engine: script + voice in, waveform out.
pub trait SynthesisEngine: Send + Sync {
    fn synthesize(
        &self,
        script: &str,
        voice_id: &str,
        hints: &SynthesisHints,
    ) -> Result<AudioBuffer, AppError>;
}

/// A request-scoped TTS artifact. Each in-flight request owns its own file;
/// the file is removed when the value is dropped.
pub struct ScratchWav {
    path: PathBuf,
}

impl ScratchWav {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchWav {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Wraps the synthesis engine behind the pipeline's call contract:
/// script in, waveform file out.
pub struct TtsAdapter {
    engine: Arc<dyn SynthesisEngine>,
    scratch_dir: PathBuf,
}

impl TtsAdapter {
    pub fn new(engine: Arc<dyn SynthesisEngine>, scratch_dir: PathBuf) -> Self {
        Self {
            engine,
            scratch_dir,
        }
    }

    pub fn synthesize(
        &self,
        script: &str,
        voice_id: &str,
        hints: &SynthesisHints,
    ) -> Result<ScratchWav, AppError> {
        let audio = self.engine.synthesize(script, voice_id, hints)?;

        let path = self
            .scratch_dir
            .join(format!("tts-{}.wav", Uuid::new_v4()));
        fs::write(&path, audio::encode_wav(&audio)?)?;

        Ok(ScratchWav { path })
    }
}
