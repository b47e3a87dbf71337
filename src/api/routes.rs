use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use crate::catalog::SpeakerCatalog;
use crate::pipeline::GenerationPipeline;

pub struct AppState {
    pub catalog: Arc<SpeakerCatalog>,
    pub pipeline: Arc<GenerationPipeline>,
    pub request_timeout: Option<Duration>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/generate", post(handlers::generate))
        .route("/speakers", get(handlers::list_speakers))
        // Speaker ids may contain path separators, so match the full tail.
        .route("/speakers/*id", get(handlers::speaker_detail))
        .route("/health", get(handlers::health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioBuffer;
    use crate::catalog::ConvertibleSpeaker;
    use crate::config::Config;
    use crate::error::AppError;
    use crate::output::OutputAllocator;
    use crate::pipeline::HintOverrides;
    use crate::tts::{SynthesisEngine, SynthesisHints, TtsAdapter};
    use crate::vc::ConversionEngine;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct FakeSynth;

    impl SynthesisEngine for FakeSynth {
        fn synthesize(
            &self,
            _script: &str,
            _voice_id: &str,
            _hints: &SynthesisHints,
        ) -> Result<AudioBuffer, AppError> {
            Ok(AudioBuffer::mono(vec![0.0, 0.2, -0.2], 22050))
        }
    }

    struct FakeConverter;

    impl ConversionEngine for FakeConverter {
        fn convert(
            &self,
            _source: &Path,
            _speaker: &ConvertibleSpeaker,
        ) -> Result<AudioBuffer, AppError> {
            Ok(AudioBuffer::mono(vec![0.4, -0.4], 48_000))
        }
    }

    struct TestServer {
        router: Router,
        output_dir: TempDir,
        _scratch_dir: TempDir,
        _voices_dir: TempDir,
        _models_dir: TempDir,
    }

    fn test_server() -> TestServer {
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

        let pipeline = Arc::new(GenerationPipeline::new(
            Arc::clone(&catalog),
            TtsAdapter::new(Arc::new(FakeSynth), scratch_dir.path().to_path_buf()),
            Arc::new(FakeConverter),
            OutputAllocator::new(output_dir.path().to_path_buf()),
            HintOverrides::default(),
        ));

        let state = Arc::new(AppState {
            catalog,
            pipeline,
            request_timeout: None,
        });

        TestServer {
            router: create_router(state),
            output_dir,
            _scratch_dir: scratch_dir,
            _voices_dir: voices_dir,
            _models_dir: models_dir,
        }
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec()
    }

    #[tokio::test]
    async fn health_reports_catalog_sizes() {
        let server = test_server();
        let response = server.router.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["native_voices"], 1);
        assert_eq!(body["convertible_speakers"], 1);
        assert_eq!(body["conversion_enabled"], true);
    }

    #[tokio::test]
    async fn speakers_lists_both_registries() {
        let server = test_server();
        let response = server.router.oneshot(get("/speakers")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["native"], serde_json::json!(["alba"]));
        assert_eq!(body["convertible"], serde_json::json!(["speaker3"]));
    }

    #[tokio::test]
    async fn speaker_filter_with_no_match_is_a_client_error() {
        let server = test_server();
        let response = server
            .router
            .oneshot(get("/speakers?v=nothing"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn speaker_detail_returns_bundle_metadata() {
        let server = test_server();
        let response = server
            .router
            .oneshot(get("/speakers/speaker3"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["id"], "speaker3");
        assert_eq!(body["base_voice"], "alba");
        assert_eq!(body["index"], "speaker3/features.index");
    }

    #[tokio::test]
    async fn unknown_speaker_detail_is_not_found() {
        let server = test_server();
        let response = server.router.oneshot(get("/speakers/ghost")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn generate_without_speaker_streams_unconverted_audio() {
        let server = test_server();
        let response = server
            .router
            .oneshot(post_json("/generate", r#"{"input_text": "Hello, everyone."}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "audio/wav"
        );
        assert!(body_bytes(response).await.starts_with(b"RIFF"));
    }

    #[tokio::test]
    async fn generate_with_convertible_speaker_persists_output() {
        let server = test_server();
        let response = server
            .router
            .clone()
            .oneshot(post_json(
                "/generate",
                r#"{"speaker_name": "speaker3", "input_text": "Are you mad?"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_bytes(response).await.starts_with(b"RIFF"));
        assert!(server.output_dir.path().join("output.wav").exists());
    }

    #[tokio::test]
    async fn generate_with_unknown_speaker_names_the_identifier() {
        let server = test_server();
        let response = server
            .router
            .oneshot(post_json(
                "/generate",
                r#"{"speaker_name": "nonexistent", "input_text": "Hello."}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert!(body["error"].as_str().unwrap().contains("nonexistent"));
    }

    #[tokio::test]
    async fn generate_with_empty_text_is_a_client_error() {
        let server = test_server();
        let response = server
            .router
            .oneshot(post_json("/generate", r#"{"input_text": ""}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
