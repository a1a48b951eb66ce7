//! Router tests over in-memory backends.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use vfetch_api::{create_router, ApiConfig, AppState};
use vfetch_models::{JobId, JobSnapshot, JobState};
use vfetch_queue::{InMemoryBroker, InMemoryStatusStore, JobBroker, JobClient, QueueJob, StatusStore};

const BOUNDARY: &str = "vfetch-test-boundary";

struct TestApp {
    router: Router,
    broker: Arc<InMemoryBroker>,
    store: Arc<InMemoryStatusStore>,
    upload_dir: PathBuf,
    _dir: TempDir,
}

impl TestApp {
    fn new() -> Self {
        Self::with_config(ApiConfig::default())
    }

    fn with_config(config: ApiConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let upload_dir = dir.path().join("uploads");
        let config = ApiConfig {
            upload_dir: upload_dir.clone(),
            ..config
        };

        let broker = Arc::new(InMemoryBroker::new());
        let store = Arc::new(InMemoryStatusStore::new());
        let state = AppState::new(config, JobClient::new(broker.clone(), store.clone()));

        Self {
            router: create_router(state, None),
            broker,
            store,
            upload_dir,
            _dir: dir,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn upload(&self, filename: &str, fields: &[(&str, &str)]) -> (StatusCode, Value) {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: video/mp4\r\n\r\n",
                b = BOUNDARY,
                f = filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"fake video bytes");
        body.extend_from_slice(b"\r\n");
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{b}\r\nContent-Disposition: form-data; name=\"{n}\"\r\n\r\n{v}\r\n",
                    b = BOUNDARY,
                    n = name,
                    v = value
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        self.send(
            Request::builder()
                .method("POST")
                .uri("/api/v1/scene-detection/detect")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    /// Play the worker: pop the queued job and record a terminal state.
    async fn complete_next(&self, outcome: Result<Value, &str>) -> QueueJob {
        let delivery = self
            .broker
            .consume("test", 10, 1)
            .await
            .unwrap()
            .pop()
            .expect("a queued job");
        let job = delivery.job.clone();

        let mut snapshot = self.store.get(job.job_id()).await.unwrap().unwrap();
        snapshot.start_attempt();
        match outcome {
            Ok(result) => snapshot.succeed(result),
            Err(error) => snapshot.fail(error),
        };
        self.store.put(&snapshot).await.unwrap();
        self.broker.ack(&delivery.id).await.unwrap();
        job
    }
}

#[tokio::test]
async fn test_health_and_root() {
    let app = TestApp::new();

    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["health"], "/health");

    let (status, body) = app.get("/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["broker"]["status"], "ok");
}

#[tokio::test]
async fn test_security_headers_and_request_id() {
    let app = TestApp::new();
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("X-Request-ID", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-request-id"], "req-123");
}

#[tokio::test]
async fn test_download_submit_and_poll() {
    let app = TestApp::new();

    let (status, body) = app
        .post_json(
            "/api/v1/download",
            json!({"url": "https://www.youtube.com/watch?v=abc", "format": "best"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "PENDING");
    let job_id = body["jobId"].as_str().unwrap().to_string();
    assert_eq!(app.broker.len().await.unwrap(), 1);

    let (status, body) = app.get(&format!("/api/v1/download/status/{}", job_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "PENDING");
    assert_eq!(body["progress"]["current"], 0);

    app.complete_next(Ok(json!({"status": "success", "videoInfo": {"title": "t"}})))
        .await;

    let (_, first) = app.get(&format!("/api/v1/download/status/{}", job_id)).await;
    let (_, second) = app.get(&format!("/api/v1/jobs/{}", job_id)).await;
    assert_eq!(first["state"], "SUCCESS");
    assert_eq!(first["result"]["videoInfo"]["title"], "t");
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_validation_errors_create_no_job() {
    let app = TestApp::new();

    let (status, body) = app.post_json("/api/v1/download", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("URL is required"));

    let (status, _) = app
        .post_json("/api/v1/download", json!({"url": "ftp://example.com/v"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post_json("/api/v1/download/batch", json!({"urls": []}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post_json(
            "/api/v1/download/batch",
            json!({"urls": ["https://youtu.be/a", "nope"]}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("urls[1]"));

    let (status, _) = app
        .post_json("/api/v1/search", json!({"mode": "manual", "query": "  "}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.post_json("/api/v1/download/video-info", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(app.broker.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_search_submit_modes() {
    let app = TestApp::new();

    let (status, body) = app
        .post_json(
            "/api/v1/search",
            json!({
                "mode": "manual",
                "query": "gols do flamengo",
                "sortBy": "date",
                "timeRange": "week",
                "maxDurationMinutes": 10
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "PENDING");

    let (status, _) = app.post_json("/api/v1/search", json!({"mode": "auto"})).await;
    assert_eq!(status, StatusCode::OK);

    let job = app
        .complete_next(Ok(json!({"status": "success", "totalVideos": 0, "videos": []})))
        .await;
    match job {
        QueueJob::Search(search) => {
            assert_eq!(search.request.query.as_deref(), Some("gols do flamengo"));
            assert_eq!(search.request.max_duration_seconds(), Some(600));
        }
        other => panic!("unexpected job {:?}", other),
    }
}

#[tokio::test]
async fn test_batch_and_lookup_jobs_are_queued() {
    let app = TestApp::new();

    let (status, body) = app
        .post_json(
            "/api/v1/download/batch",
            json!({"urls": ["https://youtu.be/a", "https://youtu.be/b"]}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains('2'));

    let (status, _) = app
        .post_json("/api/v1/download/video-info", json!({"url": "https://youtu.be/a"}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post_json("/api/v1/download/formats", json!({"url": "https://youtu.be/a"}))
        .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(app.broker.len().await.unwrap(), 3);
}

#[tokio::test]
async fn test_job_id_validation_and_unknown_handles() {
    let app = TestApp::new();

    let (status, _) = app.get("/api/v1/jobs/bad_id!").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown = JobId::new();
    let (status, body) = app.get(&format!("/api/v1/jobs/{}", unknown)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "PENDING");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_upload_is_staged_with_unique_names() {
    let app = TestApp::new();

    let (status, body) = app.upload("my video.mp4", &[("method", "content")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "processing");
    assert_eq!(body["originalFilename"], "my video.mp4");
    assert!(app.upload_dir.join("my_video.mp4").exists());

    let (status, _) = app.upload("my video.mp4", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.upload_dir.join("my_video_1.mp4").exists());

    let job = app.complete_next(Ok(json!({"status": "success"}))).await;
    match job {
        QueueJob::SceneDetection(j) => {
            assert_eq!(j.method, "content");
            assert!(j.video_path.ends_with("my_video.mp4"));
        }
        other => panic!("unexpected job {:?}", other),
    }
}

#[tokio::test]
async fn test_upload_rejects_bad_form() {
    let app = TestApp::new();

    let (status, _) = app
        .upload("clip.mp4", &[("adaptiveThreshold", "lots")])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.broker.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_successful_detection_cleans_up_upload() {
    let app = TestApp::new();

    let (_, body) = app.upload("match.mp4", &[]).await;
    let job_id = body["jobId"].as_str().unwrap().to_string();
    let staged = app.upload_dir.join("match.mp4");
    assert!(staged.exists());

    app.complete_next(Ok(json!({
        "status": "success",
        "scenesCount": 1,
        "scenes": [{"startSeconds": 0.0, "endSeconds": 2.0}],
        "videoPath": staged.to_string_lossy(),
    })))
    .await;

    let uri = format!("/api/v1/scene-detection/status/{}", job_id);
    let (status, first) = app.get(&uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["state"], "SUCCESS");
    assert_eq!(first["result"]["scenesCount"], 1);
    assert!(first["result"].get("videoPath").is_none());
    assert!(!staged.exists());

    let (_, second) = app.get(&uri).await;
    assert_eq!(first["result"], second["result"]);
}

#[tokio::test]
async fn test_detection_path_hidden_on_every_status_endpoint() {
    for prefix in ["/api/v1/download/status", "/api/v1/search/status"] {
        let app = TestApp::new();

        let (_, body) = app.upload("leak.mp4", &[]).await;
        let job_id = body["jobId"].as_str().unwrap().to_string();
        let staged = app.upload_dir.join("leak.mp4");
        assert!(staged.exists());

        app.complete_next(Ok(json!({
            "status": "success",
            "scenesCount": 0,
            "scenes": [],
            "videoPath": staged.to_string_lossy(),
        })))
        .await;

        let (status, body) = app.get(&format!("{}/{}", prefix, job_id)).await;
        assert_eq!(status, StatusCode::OK, "{}", prefix);
        assert_eq!(body["state"], "SUCCESS");
        assert!(body["result"].get("videoPath").is_none(), "{}", prefix);
        assert!(!staged.exists(), "{}", prefix);
    }
}

#[tokio::test]
async fn test_failed_detection_keeps_upload() {
    let app = TestApp::new();

    let (_, body) = app.upload("broken.mp4", &[("method", "histogram")]).await;
    let job_id = body["jobId"].as_str().unwrap().to_string();

    app.complete_next(Err("Unknown detection method: histogram")).await;

    let (status, body) = app
        .get(&format!("/api/v1/scene-detection/status/{}", job_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "FAILURE");
    assert!(body["error"].as_str().unwrap().contains("histogram"));
    assert!(body["message"].is_string());
    assert!(app.upload_dir.join("broken.mp4").exists());
}

#[tokio::test]
async fn test_store_terminal_state_is_stable() {
    let app = TestApp::new();
    let (_, body) = app
        .post_json("/api/v1/download/formats", json!({"url": "https://youtu.be/a"}))
        .await;
    let job_id = JobId::from_string(body["jobId"].as_str().unwrap());

    app.complete_next(Err("boom")).await;

    // A late write from a stale worker is refused
    let mut late = JobSnapshot::new(job_id.clone(), vfetch_models::JobKind::Formats);
    late.start_attempt();
    assert!(!app.store.put(&late).await.unwrap());

    let (_, body) = app.get(&format!("/api/v1/jobs/{}", job_id)).await;
    assert_eq!(body["state"], JobState::Failure.as_str());
    assert_eq!(body["error"], "boom");
}

#[tokio::test]
async fn test_rate_limit_by_forwarded_ip() {
    let app = TestApp::with_config(ApiConfig {
        rate_limit_rps: 1,
        rate_limit_burst: 1,
        ..Default::default()
    });

    let request = || {
        Request::builder()
            .uri("/api/v1/jobs/abc12345")
            .header("X-Forwarded-For", "203.0.113.9")
            .body(Body::empty())
            .unwrap()
    };

    let (first, _) = app.send(request()).await;
    let (second, body) = app.send(request()).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["detail"], "Rate limited");

    // Health checks are not rate limited
    let (status, _) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
}
