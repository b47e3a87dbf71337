use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;

use crate::audio::{self, AudioBuffer};
use crate::catalog::ConvertibleSpeaker;
use crate::error::AppError;
use crate::vc::ConversionEngine;

/// RVC-style exports emit at a fixed rate regardless of the source waveform.
const OUTPUT_SAMPLE_RATE: u32 = 48_000;

/// Retrieval-based voice conversion over per-speaker ONNX bundles.
///
/// A speaker's model and retrieval features load on first use and stay cached
/// for the process lifetime. Loading is single-flight per speaker id: under
/// concurrent first use, one request loads while the rest wait on the slot.
pub struct RvcEngine {
    slots: Mutex<HashMap<String, Arc<ModelSlot>>>,
}

#[derive(Default)]
struct ModelSlot {
    model: OnceLock<Arc<SpeakerModel>>,
    init: Mutex<()>,
}

struct SpeakerModel {
    session: Mutex<Session>,
    /// Speaker retrieval features from the companion index file
    /// (raw little-endian f32).
    features: Vec<f32>,
}

impl RvcEngine {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn model_for(&self, speaker: &ConvertibleSpeaker) -> Result<Arc<SpeakerModel>, AppError> {
        let slot = {
            let mut slots = self.slots.lock().unwrap();
            Arc::clone(slots.entry(speaker.id.clone()).or_default())
        };

        if let Some(model) = slot.model.get() {
            return Ok(Arc::clone(model));
        }

        // First use: one loader per speaker, everyone else waits here.
        let _init = slot.init.lock().unwrap();
        if let Some(model) = slot.model.get() {
            return Ok(Arc::clone(model));
        }

        let loaded = Arc::new(SpeakerModel::load(speaker)?);
        let _ = slot.model.set(Arc::clone(&loaded));
        tracing::info!("loaded conversion model for speaker {}", speaker.id);
        Ok(loaded)
    }
}

impl Default for RvcEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionEngine for RvcEngine {
    fn convert(
        &self,
        source: &Path,
        speaker: &ConvertibleSpeaker,
    ) -> Result<AudioBuffer, AppError> {
        let model = self.model_for(speaker)?;
        let input = audio::read_wav(source)?;
        let samples = downmix(input);

        let converted = model.run(&samples)?;
        if converted.is_empty() {
            return Err(AppError::ConversionError(format!(
                "engine returned an empty waveform for speaker \"{}\"",
                speaker.id
            )));
        }

        Ok(AudioBuffer::mono(converted, OUTPUT_SAMPLE_RATE))
    }
}

impl SpeakerModel {
    fn load(speaker: &ConvertibleSpeaker) -> Result<Self, AppError> {
        let session = Session::builder()
            .map_err(|e| AppError::ConversionError(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| AppError::ConversionError(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(4)
            .map_err(|e| AppError::ConversionError(format!("Failed to set threads: {}", e)))?
            .commit_from_file(&speaker.model_path)
            .map_err(|e| {
                AppError::ConversionError(format!(
                    "Failed to load model for \"{}\": {}",
                    speaker.id, e
                ))
            })?;

        let index_bytes = std::fs::read(&speaker.index_path)?;
        let features = parse_features(&index_bytes).map_err(|e| {
            AppError::ConversionError(format!(
                "Malformed index file for \"{}\": {}",
                speaker.id, e
            ))
        })?;

        Ok(Self {
            session: Mutex::new(session),
            features,
        })
    }

    fn run(&self, samples: &[f32]) -> Result<Vec<f32>, AppError> {
        let source_value = Value::from_array((vec![1, samples.len()], samples.to_vec()))
            .map_err(|e| AppError::ConversionError(format!("Failed to create source tensor: {}", e)))?;

        let features_value =
            Value::from_array((vec![self.features.len()], self.features.clone())).map_err(|e| {
                AppError::ConversionError(format!("Failed to create feature tensor: {}", e))
            })?;

        let mut session = self.session.lock().unwrap();
        let outputs = session
            .run(ort::inputs![source_value, features_value])
            .map_err(|e| AppError::ConversionError(format!("Inference failed: {}", e)))?;

        let output = outputs
            .get("output")
            .or_else(|| outputs.get("audio"))
            .ok_or_else(|| AppError::ConversionError("Missing output tensor".to_string()))?;

        let output_view = output
            .try_extract_tensor::<f32>()
            .map_err(|e| AppError::ConversionError(format!("Failed to extract output tensor: {}", e)))?;

        Ok(output_view.1.iter().copied().collect())
    }
}

/// Average interleaved channels down to mono.
fn downmix(audio: AudioBuffer) -> Vec<f32> {
    if audio.channels <= 1 {
        return audio.samples;
    }
    let channels = audio.channels as usize;
    audio
        .samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

fn parse_features(bytes: &[u8]) -> Result<Vec<f32>, String> {
    if bytes.len() % 4 != 0 {
        return Err(format!("{} bytes is not a whole number of f32 values", bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
