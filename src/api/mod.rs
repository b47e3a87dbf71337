pub mod handlers;
pub mod routes;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SpeakersQuery {
    /// Native voice filter (unanchored regex).
    pub v: Option<String>,
    /// Convertible speaker filter (unanchored regex).
    pub c: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SpeakersResponse {
    pub native: Vec<String>,
    pub convertible: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SpeakerDetailResponse {
    pub id: String,
    pub base_voice: String,
    pub model: String,
    pub index: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub native_voices: usize,
    pub convertible_speakers: usize,
    pub conversion_enabled: bool,
}
