#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use semi_api::config::{JobLimits, ServerConfig};
use semi_api::engine::JobManager;
use semi_api::router::build_app_router;
use semi_api::state::AppState;
use semi_core::processing_config::{PreviewOptions, ProcessingConfig};
use semi_core::types::JobId;
use semi_pipeline::{EngineError, ProcessError, ProcessingEngine};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

/// Build a test `ServerConfig` rooted at `work_dir`.
///
/// Two concurrent jobs, a one-minute TTL and a 30-second request timeout.
pub fn test_config(work_dir: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:8765".to_string()],
        request_timeout_secs: 30,
        limits: JobLimits {
            work_dir: work_dir.to_path_buf(),
            max_concurrent_jobs: 2,
            job_ttl: Duration::from_secs(60),
            ..JobLimits::default()
        },
    }
}

/// A router plus direct access to the job manager behind it.
pub struct TestApp {
    pub router: Router,
    pub jobs: JobManager,
    pub config: ServerConfig,
    pub work_dir: TempDir,
}

impl TestApp {
    pub fn app(&self) -> Router {
        self.router.clone()
    }

    /// Job workspaces currently on disk.
    pub fn workspaces(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.work_dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .is_some_and(|name| name.to_string_lossy().starts_with("semi_web_job_"))
            })
            .collect()
    }
}

/// Build the full application router with all middleware layers.
///
/// This mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack that production uses.
pub fn build_test_app(engine: Arc<dyn ProcessingEngine>) -> TestApp {
    build_test_app_with(engine, |_| {})
}

/// Like [`build_test_app`] with adjusted job limits.
pub fn build_test_app_with(
    engine: Arc<dyn ProcessingEngine>,
    adjust: impl FnOnce(&mut JobLimits),
) -> TestApp {
    let work_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(work_dir.path());
    adjust(&mut config.limits);

    let jobs = JobManager::new(engine, config.limits.clone());
    let state = AppState { jobs: jobs.clone() };
    let router = build_app_router(state, &config);

    TestApp {
        router,
        jobs,
        config,
        work_dir,
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn post(app: Router, uri: &str) -> Response<Body> {
    send(
        app,
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(
        app,
        Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

// ---------------------------------------------------------------------------
// Multipart submissions
// ---------------------------------------------------------------------------

const BOUNDARY: &str = "semi-test-boundary";

/// Hand-built `multipart/form-data` body.
#[derive(Default)]
pub struct MultipartBody {
    bytes: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, name: &str, data: &[u8]) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; \
                 filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.bytes.extend_from_slice(data);
        self.bytes.extend_from_slice(b"\r\n");
        self
    }

    pub fn text(mut self, key: &str, value: &str) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{key}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    /// One small JPEG per name.
    pub fn images(self, names: &[&str]) -> Self {
        let jpeg = jpeg_bytes(16, 12);
        names.iter().fold(self, |body, name| body.file(name, &jpeg))
    }

    pub fn into_request(mut self) -> Request<Body> {
        self.bytes
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method(Method::POST)
            .uri("/api/process")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(self.bytes))
            .unwrap()
    }
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 120, 40]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Jpeg).unwrap();
    out.into_inner()
}

/// Submit images and return the new job id.
pub async fn submit(app: Router, names: &[&str]) -> String {
    let response = send(app, MultipartBody::new().images(names).into_request()).await;
    assert_eq!(response.status(), 202, "submission rejected");
    body_json(response).await["data"]["job_id"]
        .as_str()
        .unwrap()
        .to_string()
}

/// Poll the job until `done` holds for its view.
pub async fn wait_for(app: &Router, id: &str, mut done: impl FnMut(&Value) -> bool) -> Value {
    for _ in 0..500 {
        let view = body_json(get(app.clone(), &format!("/api/jobs/{id}")).await).await["data"].clone();
        if done(&view) {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never reached the expected state");
}

pub async fn wait_terminal(app: &Router, id: &str) -> Value {
    wait_for(app, id, |view| {
        matches!(view["status"].as_str(), Some("done" | "cancelled" | "error"))
    })
    .await
}

/// Wait until nothing holds a lease on the job. The runner keeps one while
/// it builds the bundle, past the point where the job turns terminal.
pub async fn wait_unleased(jobs: &JobManager, id: &str) {
    let id: JobId = id.parse().unwrap();
    for _ in 0..3000 {
        let entry = jobs.store().get(id).expect("job still stored");
        if entry.lock().leases == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} still leased");
}

// ---------------------------------------------------------------------------
// Scripted engine
// ---------------------------------------------------------------------------

/// Engine whose inputs each wait for a permit released by the test.
///
/// Outputs are copies of the inputs. Names registered with
/// [`GatedEngine::failing`] produce a per-input failure, names registered
/// with [`GatedEngine::faulting`] an engine fault.
pub struct GatedEngine {
    permits: Mutex<usize>,
    gate: Condvar,
    started: AtomicUsize,
    failing: Vec<String>,
    faulting: Vec<String>,
}

/// How long an input waits for a permit before faulting, so a broken test
/// fails instead of hanging.
const GATE_TIMEOUT: Duration = Duration::from_secs(10);

impl GatedEngine {
    /// No permits: every input blocks until [`GatedEngine::release`].
    pub fn closed() -> Self {
        Self::with_permits(0)
    }

    /// Inputs never block.
    pub fn opened() -> Self {
        Self::with_permits(usize::MAX)
    }

    fn with_permits(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            gate: Condvar::new(),
            started: AtomicUsize::new(0),
            failing: Vec::new(),
            faulting: Vec::new(),
        }
    }

    pub fn failing(mut self, name: &str) -> Self {
        self.failing.push(name.to_string());
        self
    }

    pub fn faulting(mut self, name: &str) -> Self {
        self.faulting.push(name.to_string());
        self
    }

    /// Let `n` more inputs finish.
    pub fn release(&self, n: usize) {
        let mut permits = self.permits.lock().unwrap();
        *permits = permits.saturating_add(n);
        self.gate.notify_all();
    }

    /// Number of inputs the engine has started.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub async fn wait_started(&self, n: usize) {
        for _ in 0..500 {
            if self.started() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("engine started {} inputs, expected {n}", self.started());
    }
}

impl ProcessingEngine for GatedEngine {
    fn process_one(
        &self,
        input: &Path,
        _config: &ProcessingConfig,
        output_dir: &Path,
        _preview: Option<&PreviewOptions>,
    ) -> Result<PathBuf, ProcessError> {
        self.started.fetch_add(1, Ordering::SeqCst);

        let mut permits = self.permits.lock().unwrap();
        while *permits == 0 {
            let (guard, timeout) = self.gate.wait_timeout(permits, GATE_TIMEOUT).unwrap();
            permits = guard;
            if timeout.timed_out() && *permits == 0 {
                return Err(EngineError::Fault("gate timed out".into()).into());
            }
        }
        if *permits != usize::MAX {
            *permits -= 1;
        }
        drop(permits);

        let name = input.file_name().unwrap().to_string_lossy().to_string();
        if self.faulting.contains(&name) {
            return Err(EngineError::Fault(format!("cannot continue at {name}")).into());
        }
        if self.failing.contains(&name) {
            return Err(ProcessError::input("cannot decode"));
        }

        let output = output_dir.join(&name);
        std::fs::copy(input, &output).map_err(EngineError::from)?;
        Ok(output)
    }
}
