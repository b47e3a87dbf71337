pub mod rvc;

use std::path::Path;

use crate::audio::AudioBuffer;
use crate::catalog::ConvertibleSpeaker;
use crate::error::AppError;

/// The opaque voice conversion engine: a source waveform file plus a speaker's
/// model bundle in, the retargeted waveform out.
///
/// A conversion failure is an engine error; the pipeline never falls back to
/// the unconverted audio, since returning the wrong speaker's voice silently
/// would break the request contract.
pub trait ConversionEngine: Send + Sync {
    fn convert(
        &self,
        source: &Path,
        speaker: &ConvertibleSpeaker,
    ) -> Result<AudioBuffer, AppError>;
}
