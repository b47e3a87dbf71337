use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;
use std::sync::{Arc, Mutex, RwLock};

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;

use crate::audio::AudioBuffer;
use crate::error::AppError;
use crate::tts::voice::Voice;
use crate::tts::{SynthesisEngine, SynthesisHints};

/// VITS-style ONNX synthesis over the native voice assets.
///
/// Sessions are loaded lazily and cached per voice id for the process
/// lifetime.
pub struct VitsEngine {
    voices_dir: PathBuf,
    sessions: RwLock<HashMap<String, Arc<VoiceSession>>>,
}

struct VoiceSession {
    session: Mutex<Session>,
    phoneme_id_map: HashMap<String, Vec<i64>>,
    espeak_voice: String,
    sample_rate: u32,
    noise_scale: f32,
    length_scale: f32,
    noise_w: f32,
}

impl VitsEngine {
    pub fn new(voices_dir: PathBuf) -> Self {
        Self {
            voices_dir,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn session_for(&self, voice_id: &str) -> Result<Arc<VoiceSession>, AppError> {
        {
            let sessions = self.sessions.read().unwrap();
            if let Some(session) = sessions.get(voice_id) {
                return Ok(Arc::clone(session));
            }
        }

        let loaded = Arc::new(VoiceSession::load(&self.voices_dir, voice_id)?);

        let mut sessions = self.sessions.write().unwrap();
        Ok(Arc::clone(
            sessions
                .entry(voice_id.to_string())
                .or_insert(loaded),
        ))
    }
}

impl SynthesisEngine for VitsEngine {
    fn synthesize(
        &self,
        script: &str,
        voice_id: &str,
        hints: &SynthesisHints,
    ) -> Result<AudioBuffer, AppError> {
        let voice = self.session_for(voice_id)?;

        if let Some(emotion) = &hints.emotion {
            // VITS voices carry no emotion embedding; the hint is surfaced
            // rather than silently replaced with a constant.
            tracing::debug!("emotion hint \"{}\" not supported by voice {}", emotion, voice_id);
        }

        let phonemes = phonemize(script, &voice.espeak_voice)?;
        let ids = phonemes_to_ids(&phonemes, &voice.phoneme_id_map);
        let samples = voice.run(&ids, hints.speed)?;

        Ok(AudioBuffer::mono(samples, voice.sample_rate))
    }
}

impl VoiceSession {
    fn load(voices_dir: &std::path::Path, voice_id: &str) -> Result<Self, AppError> {
        let voice = Voice::load(voices_dir, voice_id)?;

        let session = Session::builder()
            .map_err(|e| AppError::TtsError(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| AppError::TtsError(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(4)
            .map_err(|e| AppError::TtsError(format!("Failed to set threads: {}", e)))?
            .commit_from_file(&voice.model_path)
            .map_err(|e| AppError::TtsError(format!("Failed to load model: {}", e)))?;

        let inference = voice.config.inference.clone().unwrap_or_default();
        let espeak_voice = voice
            .config
            .espeak
            .as_ref()
            .map(|e| e.voice.clone())
            .unwrap_or_else(|| "en".to_string());

        Ok(Self {
            session: Mutex::new(session),
            phoneme_id_map: voice.config.phoneme_id_map,
            espeak_voice,
            sample_rate: voice.config.audio.sample_rate,
            noise_scale: inference.noise_scale,
            length_scale: inference.length_scale,
            noise_w: inference.noise_w,
        })
    }

    fn run(&self, phoneme_ids: &[i64], speed: f32) -> Result<Vec<f32>, AppError> {
        if phoneme_ids.is_empty() {
            return Ok(Vec::new());
        }

        let input_len = phoneme_ids.len();

        // input: [batch, sequence] = [1, phoneme_count]
        let input_value = Value::from_array((vec![1, input_len], phoneme_ids.to_vec()))
            .map_err(|e| AppError::TtsError(format!("Failed to create input tensor: {}", e)))?;

        // input_lengths: [batch] = [1]
        let lengths_value = Value::from_array((vec![1], vec![input_len as i64]))
            .map_err(|e| AppError::TtsError(format!("Failed to create lengths tensor: {}", e)))?;

        // The speed hint stretches or compresses the voice's length scale.
        let scales_value = Value::from_array((vec![3], vec![
            self.noise_scale,
            self.length_scale / speed,
            self.noise_w,
        ]))
            .map_err(|e| AppError::TtsError(format!("Failed to create scales tensor: {}", e)))?;

        let mut session = self.session.lock().unwrap();
        let outputs = session
            .run(ort::inputs![input_value, lengths_value, scales_value])
            .map_err(|e| AppError::TtsError(format!("Inference failed: {}", e)))?;

        let output = outputs
            .get("output")
            .or_else(|| outputs.get("audio"))
            .ok_or_else(|| AppError::TtsError("Missing output tensor".to_string()))?;

        let output_view = output
            .try_extract_tensor::<f32>()
            .map_err(|e| AppError::TtsError(format!("Failed to extract output tensor: {}", e)))?;

        Ok(output_view.1.iter().copied().collect())
    }
}

/// Convert text to phonemes using espeak-ng
pub fn phonemize(text: &str, voice: &str) -> Result<String, AppError> {
    if text.is_empty() {
        return Ok(String::new());
    }

    let output = Command::new("espeak-ng")
        .args(["--ipa", "-q", "-v", voice, text])
        .output()
        .map_err(|e| {
            AppError::TtsError(format!(
                "Failed to run espeak-ng (is it installed?): {}",
                e
            ))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::TtsError(format!("espeak-ng failed: {}", stderr)));
    }

    let phonemes = String::from_utf8_lossy(&output.stdout)
        .trim()
        .to_string();

    Ok(phonemes)
}

/// Convert phonemes to IDs using the voice's phoneme map
pub fn phonemes_to_ids(phonemes: &str, id_map: &HashMap<String, Vec<i64>>) -> Vec<i64> {
    let mut ids = Vec::new();

    // BOS marker
    if let Some(bos) = id_map.get("^") {
        ids.extend(bos);
    } else {
        ids.push(0);
    }

    for ch in phonemes.chars() {
        let ch_str = ch.to_string();
        if let Some(mapped) = id_map.get(&ch_str) {
            ids.extend(mapped);
        }
        // Padding between phonemes if the map defines it
        if let Some(pad) = id_map.get("_") {
            ids.extend(pad);
        }
    }

    // EOS marker
    if let Some(eos) = id_map.get("$") {
        ids.extend(eos);
    } else {
        ids.push(0);
    }

    ids
}
