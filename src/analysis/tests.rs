use super::*;
use crate::blob::ImageBlob;
use crate::error::AnalysisError;
use crate::prediction::{Expression, Provenance};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct ReceivedPart {
    name: Option<String>,
    file_name: Option<String>,
    content_type: Option<String>,
    len: usize,
}

#[derive(Clone, Default)]
struct Received {
    parts: Arc<Mutex<Vec<ReceivedPart>>>,
}

async fn record_parts(received: &Received, mut multipart: Multipart) {
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.unwrap();
        received.parts.lock().push(ReceivedPart {
            name,
            file_name,
            content_type,
            len: data.len(),
        });
    }
}

async fn spawn_server(reply: (StatusCode, String), received: Received) -> String {
    let app = Router::new()
        .route(
            "/predict/",
            post(
                move |State(received): State<Received>, multipart: Multipart| {
                    let reply = reply.clone();
                    async move {
                        record_parts(&received, multipart).await;
                        reply
                    }
                },
            ),
        )
        .layer(DefaultBodyLimit::disable())
        .with_state(received);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/predict/", addr)
}

fn jpeg_blob(size: usize) -> ImageBlob {
    ImageBlob::from_upload("face.jpg", "image/jpeg", vec![0xABu8; size])
}

#[tokio::test]
async fn test_successful_prediction() {
    let received = Received::default();
    let endpoint = spawn_server(
        (
            StatusCode::OK,
            json!({"expression": "Happy", "confidence": 0.87}).to_string(),
        ),
        received.clone(),
    )
    .await;

    let client = AnalysisClient::new(endpoint).unwrap();
    let result = client.analyze(&jpeg_blob(2 * 1024 * 1024)).await.unwrap();

    assert_eq!(result.expression(), Expression::Happy);
    assert_eq!(result.confidence_percent(), 87);
    assert_eq!(result.provenance(), Provenance::Service);

    let parts = received.parts.lock().clone();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].name.as_deref(), Some("file"));
    assert_eq!(parts[0].file_name.as_deref(), Some("face.jpg"));
    assert_eq!(parts[0].content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(parts[0].len, 2 * 1024 * 1024);
}

#[tokio::test]
async fn test_server_error_is_failure() {
    let endpoint = spawn_server(
        (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string()),
        Received::default(),
    )
    .await;

    let client = AnalysisClient::new(endpoint).unwrap();
    assert_eq!(
        client.analyze(&jpeg_blob(16)).await,
        Err(AnalysisError::Status { status: 500 })
    );
}

#[tokio::test]
async fn test_malformed_body_is_failure() {
    let endpoint = spawn_server(
        (StatusCode::OK, "<html>not json</html>".to_string()),
        Received::default(),
    )
    .await;

    let client = AnalysisClient::new(endpoint).unwrap();
    assert!(matches!(
        client.analyze(&jpeg_blob(16)).await,
        Err(AnalysisError::MalformedResponse { .. })
    ));
}

#[tokio::test]
async fn test_missing_field_is_failure() {
    let endpoint = spawn_server(
        (StatusCode::OK, json!({"expression": "Sad"}).to_string()),
        Received::default(),
    )
    .await;

    let client = AnalysisClient::new(endpoint).unwrap();
    assert!(matches!(
        client.analyze(&jpeg_blob(16)).await,
        Err(AnalysisError::MalformedResponse { .. })
    ));
}

#[tokio::test]
async fn test_unknown_label_and_bad_confidence_are_failures() {
    for body in [
        json!({"expression": "Bored", "confidence": 0.5}),
        json!({"expression": "Fear", "confidence": 1.5}),
        json!({"expression": "Fear", "confidence": "high"}),
    ] {
        let endpoint = spawn_server((StatusCode::OK, body.to_string()), Received::default()).await;
        let client = AnalysisClient::new(endpoint).unwrap();

        assert!(
            matches!(
                client.analyze(&jpeg_blob(16)).await,
                Err(AnalysisError::MalformedResponse { .. })
            ),
            "body {} should be rejected",
            body
        );
    }
}

#[tokio::test]
async fn test_connection_refused_is_transport_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = AnalysisClient::new(format!("http://{}/predict/", addr)).unwrap();
    assert!(matches!(
        client.analyze(&jpeg_blob(16)).await,
        Err(AnalysisError::Transport { .. })
    ));
}

#[tokio::test]
async fn test_single_request_per_call() {
    let received = Received::default();
    let endpoint = spawn_server(
        (StatusCode::SERVICE_UNAVAILABLE, String::new()),
        received.clone(),
    )
    .await;

    let client = AnalysisClient::new(endpoint).unwrap();
    let _ = client.analyze(&jpeg_blob(16)).await;

    assert_eq!(received.parts.lock().len(), 1);
}

#[test]
fn test_client_from_config() {
    let config = crate::config::MoodcamConfig::default();
    let client = AnalysisClient::from_config(&config.analysis).unwrap();
    assert_eq!(client.endpoint(), "http://localhost:8000/predict/");
}
