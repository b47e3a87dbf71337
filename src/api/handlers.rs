use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use std::sync::Arc;

use super::{HealthResponse, SpeakerDetailResponse, SpeakersQuery, SpeakersResponse};
use crate::api::routes::AppState;
use crate::error::AppError;
use crate::pipeline::{GenerationRequest, GenerationResult};

pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerationRequest>,
) -> Result<Response, AppError> {
    if request.input_text.is_empty() {
        return Err(AppError::BadRequest("input_text cannot be empty".into()));
    }

    if request.input_text.len() > 10000 {
        return Err(AppError::BadRequest(
            "input_text too long (max 10000 chars)".into(),
        ));
    }

    // Inference is CPU/GPU-bound and must stay off the connection path.
    let pipeline = Arc::clone(&state.pipeline);
    let task = tokio::task::spawn_blocking(move || pipeline.generate(&request));

    let joined = match state.request_timeout {
        Some(limit) => tokio::time::timeout(limit, task)
            .await
            .map_err(|_| AppError::DeadlineExceeded)?,
        None => task.await,
    };
    let result = joined
        .map_err(|e| AppError::TtsError(format!("generation task failed: {}", e)))??;

    match result {
        GenerationResult::Converted { wav, .. } => Ok(wav_response(wav)),
        GenerationResult::RawFile(scratch) => {
            let bytes = tokio::fs::read(scratch.path()).await?;
            Ok(wav_response(bytes))
        }
    }
}

fn wav_response(bytes: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "audio/wav")],
        bytes,
    )
        .into_response()
}

pub async fn list_speakers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SpeakersQuery>,
) -> Result<Json<SpeakersResponse>, AppError> {
    // No filters means everything from both registries.
    let no_filters = query.v.is_none() && query.c.is_none();

    let mut native = Vec::new();
    if let Some(pattern) = query.v.as_deref().or(no_filters.then_some(".*")) {
        native = state.catalog.filter_native(&compile_filter(pattern)?);
        if native.is_empty() && query.v.is_some() {
            return Err(AppError::BadRequest(format!(
                "no native voices matched \"{}\"",
                pattern
            )));
        }
    }

    let mut convertible = Vec::new();
    if state.catalog.conversion_enabled() {
        if let Some(pattern) = query.c.as_deref().or(no_filters.then_some(".*")) {
            convertible = state.catalog.filter_convertible(&compile_filter(pattern)?);
            if convertible.is_empty() && query.c.is_some() {
                return Err(AppError::BadRequest(format!(
                    "no convertible speakers matched \"{}\"",
                    pattern
                )));
            }
        }
    }

    Ok(Json(SpeakersResponse {
        native,
        convertible,
    }))
}

fn compile_filter(pattern: &str) -> Result<Regex, AppError> {
    Regex::new(pattern).map_err(|e| AppError::BadRequest(format!("invalid filter pattern: {}", e)))
}

pub async fn speaker_detail(
    State(state): State<Arc<AppState>>,
    Path(speaker_id): Path<String>,
) -> Result<Json<SpeakerDetailResponse>, AppError> {
    let speaker = state
        .catalog
        .convertible(&speaker_id)
        .ok_or_else(|| AppError::SpeakerNotFound(speaker_id.clone()))?;

    Ok(Json(SpeakerDetailResponse {
        id: speaker.id.clone(),
        base_voice: speaker.base_voice.clone(),
        model: speaker.model_rel.clone(),
        index: speaker.index_rel.clone(),
    }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        native_voices: state.catalog.native_voices().len(),
        convertible_speakers: state.catalog.convertible_count(),
        conversion_enabled: state.catalog.conversion_enabled(),
    })
}
