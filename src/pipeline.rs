use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::audio;
use crate::catalog::{ConvertibleSpeaker, SpeakerCatalog};
use crate::error::AppError;
use crate::output::OutputAllocator;
use crate::text;
use crate::tts::{ScratchWav, SynthesisHints, TtsAdapter};
use crate::vc::ConversionEngine;

fn default_speed() -> f32 {
    1.0
}

#[derive(Debug, Deserialize)]
pub struct GenerationRequest {
    #[serde(default)]
    pub speaker_name: Option<String>,
    pub input_text: String,
    #[serde(default)]
    pub emotion: Option<String>,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default)]
    pub output_name: Option<String>,
}

/// Outcome of one generation request. The variant decides how the HTTP layer
/// answers: converted audio streams from memory, unconverted audio is served
/// from its scratch file.
pub enum GenerationResult {
    Converted {
        wav: Vec<u8>,
        sample_rate: u32,
        channels: u16,
        output_path: PathBuf,
    },
    RawFile(ScratchWav),
}

/// Process-wide hint substitutions. When set, they replace the caller's
/// emotion/speed for every request.
#[derive(Debug, Default, Clone)]
pub struct HintOverrides {
    pub emotion: Option<String>,
    pub speed: Option<f32>,
}

enum Resolution<'a> {
    /// Synthesize with this native voice, skip conversion.
    Native(&'a str),
    /// Synthesize with the speaker's base voice, then convert.
    Convert(&'a ConvertibleSpeaker),
}

/// Orchestrates one request end to end:
/// resolve -> synthesize -> convert -> persist.
pub struct GenerationPipeline {
    catalog: Arc<SpeakerCatalog>,
    tts: TtsAdapter,
    converter: Arc<dyn ConversionEngine>,
    output: OutputAllocator,
    overrides: HintOverrides,
}

impl GenerationPipeline {
    pub fn new(
        catalog: Arc<SpeakerCatalog>,
        tts: TtsAdapter,
        converter: Arc<dyn ConversionEngine>,
        output: OutputAllocator,
        overrides: HintOverrides,
    ) -> Self {
        Self {
            catalog,
            tts,
            converter,
            output,
            overrides,
        }
    }

    pub fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, AppError> {
        if !request.speed.is_finite() || request.speed <= 0.0 {
            return Err(AppError::BadRequest(format!(
                "speed must be a positive number, got {}",
                request.speed
            )));
        }

        // 1. Resolve the requested speaker
        let resolution = self.resolve(request.speaker_name.as_deref())?;

        // 2. Normalize text
        let script = text::normalize(&request.input_text)?;

        // 3. Synthesize with the base voice
        let hints = self.hints(request);
        let voice = match &resolution {
            Resolution::Native(voice) => voice,
            Resolution::Convert(speaker) => speaker.base_voice.as_str(),
        };
        let scratch = self.tts.synthesize(&script, voice, &hints)?;

        // 4. Convert and persist, or hand back the unconverted artifact
        match resolution {
            Resolution::Native(_) => Ok(GenerationResult::RawFile(scratch)),
            Resolution::Convert(speaker) => {
                let converted = self.converter.convert(scratch.path(), speaker)?;
                let wav = audio::encode_wav(&converted)?;

                let output_path = self.output.allocate(request.output_name.as_deref())?;
                std::fs::write(&output_path, &wav)?;
                tracing::info!(
                    "persisted converted audio for {} at {}",
                    speaker.id,
                    output_path.display()
                );

                Ok(GenerationResult::Converted {
                    wav,
                    sample_rate: converted.sample_rate,
                    channels: converted.channels,
                    output_path,
                })
            }
        }
    }

    /// Convertible speakers shadow nothing: the two catalogs are disjoint, and
    /// only a convertible hit triggers the conversion stage.
    fn resolve<'a>(&'a self, speaker_name: Option<&'a str>) -> Result<Resolution<'a>, AppError> {
        match speaker_name {
            None => Ok(Resolution::Native(self.catalog.default_voice())),
            Some(name) => {
                if let Some(speaker) = self.catalog.convertible(name) {
                    return Ok(Resolution::Convert(speaker));
                }
                if self.catalog.contains_native(name) {
                    return Ok(Resolution::Native(name));
                }
                Err(AppError::SpeakerNotFound(name.to_string()))
            }
        }
    }

    fn hints(&self, request: &GenerationRequest) -> SynthesisHints {
        SynthesisHints {
            emotion: self
                .overrides
                .emotion
                .clone()
                .or_else(|| request.emotion.clone()),
            speed: self.overrides.speed.unwrap_or(request.speed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioBuffer;
    use crate::config::Config;
    use crate::tts::SynthesisEngine;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Fixture {
        pipeline: GenerationPipeline,
        scratch_dir: TempDir,
        output_dir: TempDir,
        synth: Arc<RecordingSynth>,
        _voices_dir: TempDir,
        _models_dir: TempDir,
    }

    #[derive(Default)]
    struct RecordingSynth {
        last_hints: Mutex<Option<SynthesisHints>>,
        last_voice: Mutex<Option<String>>,
    }

    impl SynthesisEngine for RecordingSynth {
        fn synthesize(
            &self,
            _script: &str,
            voice_id: &str,
            hints: &SynthesisHints,
        ) -> Result<AudioBuffer, AppError> {
            *self.last_hints.lock().unwrap() = Some(hints.clone());
            *self.last_voice.lock().unwrap() = Some(voice_id.to_string());
            Ok(AudioBuffer::mono(vec![0.0, 0.1, -0.1, 0.2], 22050))
        }
    }

    struct FakeConverter {
        fail: bool,
    }

    impl ConversionEngine for FakeConverter {
        fn convert(
            &self,
            source: &Path,
            _speaker: &ConvertibleSpeaker,
        ) -> Result<AudioBuffer, AppError> {
            if self.fail {
                return Err(AppError::ConversionError("engine reported failure".into()));
            }
            // The source artifact must exist when conversion runs.
            assert!(source.exists());
            Ok(AudioBuffer::mono(vec![0.3, -0.3], 48_000))
        }
    }

    fn fixture(overrides: HintOverrides, converter_fails: bool) -> Fixture {
        let voices_dir = TempDir::new().unwrap();
        std::fs::write(voices_dir.path().join("alba.onnx"), b"").unwrap();

        let models_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(models_dir.path().join("speaker3")).unwrap();
        std::fs::write(models_dir.path().join("speaker3/model.onnx"), b"").unwrap();
        std::fs::write(models_dir.path().join("speaker3/features.index"), b"").unwrap();

        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            voices_dir: voices_dir.path().to_path_buf(),
            models_dir: Some(models_dir.path().to_path_buf()),
            scratch_dir: std::env::temp_dir(),
            output_dir: std::env::temp_dir(),
            default_voice: None,
            voice_overrides: HashMap::new(),
            fixed_emotion: None,
            fixed_speed: None,
            request_timeout: None,
        };
        let catalog = Arc::new(SpeakerCatalog::build(&config).unwrap());

        let scratch_dir = TempDir::new().unwrap();
        let output_dir = TempDir::new().unwrap();
        let synth = Arc::new(RecordingSynth::default());

        let pipeline = GenerationPipeline::new(
            Arc::clone(&catalog),
            TtsAdapter::new(
                Arc::clone(&synth) as Arc<dyn SynthesisEngine>,
                scratch_dir.path().to_path_buf(),
            ),
            Arc::new(FakeConverter {
                fail: converter_fails,
            }),
            OutputAllocator::new(output_dir.path().to_path_buf()),
            overrides,
        );

        Fixture {
            pipeline,
            scratch_dir,
            output_dir,
            synth,
            _voices_dir: voices_dir,
            _models_dir: models_dir,
        }
    }

    fn request(speaker: Option<&str>, text: &str) -> GenerationRequest {
        GenerationRequest {
            speaker_name: speaker.map(String::from),
            input_text: text.to_string(),
            emotion: None,
            speed: 1.0,
            output_name: None,
        }
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn no_speaker_yields_raw_file_with_default_voice() {
        let fx = fixture(HintOverrides::default(), false);

        let result = fx
            .pipeline
            .generate(&request(None, "Hello, everyone."))
            .unwrap();

        match result {
            GenerationResult::RawFile(scratch) => assert!(scratch.path().exists()),
            GenerationResult::Converted { .. } => panic!("expected an unconverted artifact"),
        }
        assert_eq!(fx.synth.last_voice.lock().unwrap().as_deref(), Some("alba"));
        // Nothing is added to the persisted output sequence.
        assert!(dir_entries(fx.output_dir.path()).is_empty());
    }

    #[test]
    fn convertible_speaker_yields_converted_bytes_and_persisted_file() {
        let fx = fixture(HintOverrides::default(), false);

        let result = fx
            .pipeline
            .generate(&request(Some("speaker3"), "Are you mad?"))
            .unwrap();

        match result {
            GenerationResult::Converted {
                wav,
                sample_rate,
                channels,
                output_path,
            } => {
                assert!(wav.starts_with(b"RIFF"));
                assert_eq!(sample_rate, 48_000);
                assert_eq!(channels, 1);
                assert!(output_path.exists());
                assert_eq!(std::fs::read(&output_path).unwrap(), wav);
            }
            GenerationResult::RawFile(_) => panic!("expected converted audio"),
        }

        // Synthesis ran with the speaker's base voice.
        assert_eq!(fx.synth.last_voice.lock().unwrap().as_deref(), Some("alba"));
        assert_eq!(dir_entries(fx.output_dir.path()), vec!["output.wav"]);
        // The scratch artifact was released once conversion finished.
        assert!(dir_entries(fx.scratch_dir.path()).is_empty());
    }

    #[test]
    fn requested_native_voice_skips_conversion() {
        let fx = fixture(HintOverrides::default(), false);

        let result = fx
            .pipeline
            .generate(&request(Some("alba"), "Plain voice."))
            .unwrap();

        assert!(matches!(result, GenerationResult::RawFile(_)));
        assert!(dir_entries(fx.output_dir.path()).is_empty());
    }

    #[test]
    fn unknown_speaker_fails_without_touching_disk() {
        let fx = fixture(HintOverrides::default(), false);

        let err = fx
            .pipeline
            .generate(&request(Some("nonexistent"), "Hello."))
            .unwrap_err();

        match err {
            AppError::SpeakerNotFound(name) => assert_eq!(name, "nonexistent"),
            other => panic!("expected SpeakerNotFound, got {:?}", other),
        }
        assert!(dir_entries(fx.scratch_dir.path()).is_empty());
        assert!(dir_entries(fx.output_dir.path()).is_empty());
    }

    #[test]
    fn empty_text_is_a_client_error() {
        let fx = fixture(HintOverrides::default(), false);

        let err = fx.pipeline.generate(&request(None, "   ")).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(dir_entries(fx.scratch_dir.path()).is_empty());
    }

    #[test]
    fn non_positive_speed_is_a_client_error() {
        let fx = fixture(HintOverrides::default(), false);

        let mut req = request(None, "Hello.");
        req.speed = 0.0;
        assert!(matches!(
            fx.pipeline.generate(&req),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn conversion_failure_is_a_server_error_with_no_fallback() {
        let fx = fixture(HintOverrides::default(), true);

        let err = fx
            .pipeline
            .generate(&request(Some("speaker3"), "Hello."))
            .unwrap_err();

        assert!(matches!(err, AppError::ConversionError(_)));
        // No partial output is persisted on failure.
        assert!(dir_entries(fx.output_dir.path()).is_empty());
        assert!(dir_entries(fx.scratch_dir.path()).is_empty());
    }

    #[test]
    fn requested_output_name_is_honored() {
        let fx = fixture(HintOverrides::default(), false);

        let mut req = request(Some("speaker3"), "Hello.");
        req.output_name = Some("greeting".to_string());

        match fx.pipeline.generate(&req).unwrap() {
            GenerationResult::Converted { output_path, .. } => {
                assert_eq!(output_path.file_name().unwrap(), "greeting.wav");
            }
            GenerationResult::RawFile(_) => panic!("expected converted audio"),
        }
    }

    #[test]
    fn configured_overrides_pin_request_hints() {
        let fx = fixture(
            HintOverrides {
                emotion: Some("neutral".to_string()),
                speed: Some(0.8),
            },
            false,
        );

        let mut req = request(None, "Hello.");
        req.emotion = Some("angry".to_string());
        req.speed = 2.0;
        fx.pipeline.generate(&req).unwrap();

        let hints = fx.synth.last_hints.lock().unwrap().clone().unwrap();
        assert_eq!(hints.emotion.as_deref(), Some("neutral"));
        assert_eq!(hints.speed, 0.8);
    }

    #[test]
    fn request_hints_pass_through_without_overrides() {
        let fx = fixture(HintOverrides::default(), false);

        let mut req = request(None, "Hello.");
        req.emotion = Some("cheerful".to_string());
        req.speed = 1.5;
        fx.pipeline.generate(&req).unwrap();

        let hints = fx.synth.last_hints.lock().unwrap().clone().unwrap();
        assert_eq!(hints.emotion.as_deref(), Some("cheerful"));
        assert_eq!(hints.speed, 1.5);
    }
}
