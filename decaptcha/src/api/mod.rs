mod dto;
mod extractors;
mod handlers;
mod routes;
mod state;

pub use dto::{HealthData, SolveRequest, SolveResponse};
pub use routes::create_router;
pub use state::AppState;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use super::*;
    use crate::config::{Config, LogFormat, OcrConfig, ServerConfig, SolverConfig};
    use crate::error::Result;
    use crate::ocr::{EngineFactory, EngineProvider, PageSegMode, RecognitionEngine, RecognitionResult};
    use crate::pipeline::{ImageLimits, ValidityPolicy};
    use crate::services::SolverService;

    struct EchoEngine;

    impl RecognitionEngine for EchoEngine {
        fn recognize(
            &mut self,
            image: &[u8],
            _whitelist: &str,
            _mode: PageSegMode,
        ) -> Result<RecognitionResult> {
            Ok(RecognitionResult {
                text: String::from_utf8_lossy(image).into_owned(),
                confidence: 75.0,
                ..Default::default()
            })
        }
    }

    struct EchoFactory;

    impl EngineFactory for EchoFactory {
        fn create(&self) -> Result<Box<dyn RecognitionEngine>> {
            Ok(Box::new(EchoEngine))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn test_state(max_body_bytes: usize) -> AppState {
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                max_body_bytes,
            },
            ocr: OcrConfig::default(),
            solver: SolverConfig {
                timeout_secs: 5,
                strategies_path: None,
                corrections: Vec::new(),
                policy: ValidityPolicy::default(),
                image_limits: ImageLimits::default(),
            },
            log_format: LogFormat::Text,
        };
        let engines = EngineProvider::new(Arc::new(EchoFactory), false);
        let solver = SolverService::from_config(&config.solver, engines).unwrap();
        AppState::new(config, solver)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn solve_routes_return_solution() {
        // the echo engine reads the decoded payload back as text
        for uri in ["/", "/solve"] {
            let app = create_router(test_state(1024));
            let response = app
                .oneshot(post(uri, r#"{"captcha":"QVRMSw=="}"#))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_json(response).await["solution"], "ATLK");
        }
    }

    #[tokio::test]
    async fn data_uri_prefix_is_accepted() {
        let app = create_router(test_state(1024));
        let response = app
            .oneshot(post(
                "/solve",
                r#"{"captcha":"data:image/png;base64,QVRMSw=="}"#,
            ))
            .await
            .unwrap();

        assert_eq!(body_json(response).await["solution"], "ATLK");
    }

    #[tokio::test]
    async fn bad_requests_answer_empty_solution() {
        let bodies = [
            "{not json",
            "{}",
            r#"{"captcha": null}"#,
            r#"{"captcha": 42}"#,
            r#"{"captcha": ""}"#,
            r#"{"captcha": "***"}"#,
            "[]",
        ];

        for body in bodies {
            let app = create_router(test_state(1024));
            let response = app.oneshot(post("/solve", body)).await.unwrap();

            assert_eq!(response.status(), StatusCode::OK, "body {body}");
            let json = body_json(response).await;
            assert_eq!(json, serde_json::json!({"solution": ""}), "body {body}");
        }
    }

    #[tokio::test]
    async fn missing_content_type_answers_empty_solution() {
        let app = create_router(test_state(1024));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/solve")
                    .body(Body::from(r#"{"captcha":"QVRMSw=="}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["solution"], "");
    }

    #[tokio::test]
    async fn oversized_body_answers_empty_solution() {
        let app = create_router(test_state(64));
        let payload = format!(r#"{{"captcha":"{}"}}"#, "A".repeat(256));
        let response = app.oneshot(post("/solve", &payload)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["solution"], "");
    }

    #[tokio::test]
    async fn health_reports_engine_and_table() {
        let app = create_router(test_state(1024));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["engine"], "available");
        assert_eq!(json["table_version"], 1);
        assert_eq!(json["strategies"], 8);
    }
}
