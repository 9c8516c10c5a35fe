//! HTTP trigger: one request per device message.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use partrelay_protocol::ExportMessage;
use partrelay_transfer::{Ingestor, StagingStore};
use tracing::Instrument;

use crate::config::Config;

/// Runs the HTTP trigger until Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let dirs = config.dirs();
    tracing::info!(
        staging = %dirs.staging.display(),
        upload = %dirs.upload.display(),
        quarantine = %dirs.quarantine.display(),
        exclusive_reassembly = config.exclusive_reassembly,
        "storage layout"
    );

    let ingestor = Arc::new(Ingestor::new(config.staging_store(), config.ingest_config()));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "HTTP trigger listening");

    axum::serve(listener, router(ingestor))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn router<S: StagingStore + 'static>(ingestor: Arc<Ingestor<S>>) -> Router {
    Router::new()
        .route("/api/upload", post(upload::<S>))
        .route("/health", get(health))
        .with_state(ingestor)
}

async fn health() -> &'static str {
    "ok"
}

/// `200` with an empty body on success, `500` with the failure message
/// otherwise.
async fn upload<S: StagingStore + 'static>(
    State(ingestor): State<Arc<Ingestor<S>>>,
    body: Bytes,
) -> Response {
    let invocation = uuid::Uuid::new_v4();
    let span = tracing::info_span!("invocation", id = %invocation);

    async move {
        let export: ExportMessage = match serde_json::from_slice(&body) {
            Ok(export) => export,
            Err(e) => {
                tracing::warn!(error = %e, "malformed request body");
                return failure(format!("Invalid request body: {e}"));
            }
        };

        // Staging and reassembly are blocking disk I/O.
        let span = tracing::Span::current();
        let result = tokio::task::spawn_blocking(move || {
            let _enter = span.enter();
            ingestor.handle_export(export)
        })
        .await;

        match result {
            Ok(outcome) if outcome.is_success() => StatusCode::OK.into_response(),
            Ok(outcome) => failure(outcome.message),
            Err(e) => {
                tracing::error!("ingest task failed: {e}");
                failure("ingest task failed".into())
            }
        }
    }
    .instrument(span)
    .await
}

fn failure(message: String) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("SIGINT received, shutting down"),
        Err(e) => {
            tracing::error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use partrelay_transfer::{IngestConfig, MemoryStagingStore, Sleeper};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&self, _: Duration) {}
    }

    fn app(root: &std::path::Path) -> (Router, Arc<Ingestor<MemoryStagingStore>>) {
        let ingestor = Arc::new(Ingestor::with_sleeper(
            MemoryStagingStore::new(),
            IngestConfig::new(root.join("file-uploads")),
            Box::new(NoSleep),
        ));
        (router(Arc::clone(&ingestor)), ingestor)
    }

    async fn post_json(app: &Router, body: &Value) -> (StatusCode, String) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn chunk(part: u32, data: &[u8]) -> Value {
        json!({
            "deviceId": "D1",
            "messageProperties": {
                "id": "T1",
                "filepath": "myDevice/video/clip.bin",
                "part": part.to_string()
            },
            "telemetry": { "data": STANDARD.encode(data) }
        })
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let (app, _) = app(tmp.path());
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn upload_reassembles_over_http() {
        let tmp = tempfile::tempdir().unwrap();
        let (app, ingestor) = app(tmp.path());

        assert_eq!(post_json(&app, &chunk(2, b"world")).await, (StatusCode::OK, String::new()));
        assert_eq!(post_json(&app, &chunk(1, b"hello ")).await, (StatusCode::OK, String::new()));

        let confirm = json!({
            "deviceId": "D1",
            "messageProperties": {
                "id": "T1",
                "filepath": "myDevice/video/clip.bin",
                "part": 2,
                "maxPart": 2,
                "compression": "none"
            }
        });
        assert_eq!(post_json(&app, &confirm).await.0, StatusCode::OK);

        let artifact = tmp.path().join("file-uploads/myDevice/video/clip.bin");
        assert_eq!(std::fs::read(artifact).unwrap(), b"hello world");
        assert!(ingestor.store().list_entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_device_id_is_a_server_error() {
        let tmp = tempfile::tempdir().unwrap();
        let (app, ingestor) = app(tmp.path());
        let mut body = chunk(1, b"x");
        body.as_object_mut().unwrap().remove("deviceId");

        let (status, message) = post_json(&app, &body).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "Missing body property: deviceId");
        assert!(ingestor.store().list_entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_json_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let (app, _) = app(tmp.path());
        let request = Request::builder()
            .method("POST")
            .uri("/api/upload")
            .body(Body::from("{not json"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
