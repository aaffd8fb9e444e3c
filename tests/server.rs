//! HTTP server tests against a real listener on an ephemeral port.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use code_eval::analyzer::{AnalyzerPolicy, ChunkAnalyzer};
use code_eval::cache::FsResultStore;
use code_eval::chunk::Chunker;
use code_eval::config::{ChunkingConfig, ReposConfig, WalkConfig};
use code_eval::error::ServiceError;
use code_eval::mode::AnalysisMode;
use code_eval::orchestrator::Orchestrator;
use code_eval::reasoning::ReasoningService;
use code_eval::server::router;
use code_eval::walk::FileWalker;

/// Describes chunks by their first line; rejects chunks mentioning
/// `forbidden` with a 401.
struct Describer {
    calls: AtomicUsize,
}

#[async_trait]
impl ReasoningService for Describer {
    fn name(&self) -> &str {
        "describer"
    }

    async fn complete(
        &self,
        _instruction: &str,
        content: &str,
        _mode: AnalysisMode,
    ) -> Result<Value, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if content.contains("forbidden") {
            return Err(ServiceError::Http {
                status: 401,
                body: "invalid api key".into(),
            });
        }
        let first = content.lines().next().unwrap_or_default();
        Ok(json!({ "description": first }))
    }
}

struct TestServer {
    base: String,
    tmp: TempDir,
    service: Arc<Describer>,
    client: reqwest::Client,
}

impl TestServer {
    async fn post(&self, route: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(format!("{}{}", self.base, route))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }
}

async fn start() -> TestServer {
    let tmp = TempDir::new().unwrap();
    let service = Arc::new(Describer {
        calls: AtomicUsize::new(0),
    });
    let orchestrator = Orchestrator::new(
        Arc::new(FsResultStore::new(tmp.path().join("cache"))),
        Chunker::new(&ChunkingConfig::default()),
        ChunkAnalyzer::new(service.clone(), AnalyzerPolicy::immediate(2)),
        FileWalker::new(&WalkConfig::default()).unwrap(),
        ReposConfig {
            clone_dir: tmp.path().join("clones"),
            ..ReposConfig::default()
        },
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(Arc::new(orchestrator)))
            .await
            .unwrap();
    });

    TestServer {
        base: format!("http://{}", addr),
        tmp,
        service,
        client: reqwest::Client::new(),
    }
}

#[tokio::test]
async fn test_health() {
    let server = start().await;
    let resp = server
        .client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_file_description_then_cached() {
    let server = start().await;
    let file = server.tmp.path().join("reader.rs");
    fs::write(&file, "// parses CSV input\nfn read() {}\n").unwrap();
    let path = file.to_string_lossy().to_string();

    let (status, body) = server
        .post("/file_description", json!({ "path": path }))
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["path"], path);
    assert_eq!(body["analysis_type"], "description");
    assert_eq!(body["descriptions"], json!(["// parses CSV input"]));
    assert_eq!(body["cached"], false);

    let (_, body) = server
        .post("/file_description", json!({ "path": path }))
        .await;
    assert_eq!(body["cached"], true);
    assert_eq!(server.service.calls.load(Ordering::SeqCst), 1);

    let (_, body) = server
        .post(
            "/file_description",
            json!({ "path": path, "force_recompute": true }),
        )
        .await;
    assert_eq!(body["cached"], false);
    assert_eq!(server.service.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_folder_reports_failed_children() {
    let server = start().await;
    let dir = server.tmp.path().join("project");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("a.py"), "# ok\n").unwrap();
    fs::write(dir.join("b.py"), "# forbidden\n").unwrap();

    let (status, body) = server
        .post(
            "/folder_description",
            json!({ "path": dir.to_string_lossy() }),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["descriptions"], json!(["# ok"]));
    assert_eq!(body["failures"].as_array().unwrap().len(), 1);
    assert!(body["failures"][0]["path"]
        .as_str()
        .unwrap()
        .ends_with("b.py"));
}

#[tokio::test]
async fn test_error_contract() {
    let server = start().await;

    let missing = server.tmp.path().join("missing");
    let (status, body) = server
        .post(
            "/folder_sec_analysis",
            json!({ "path": missing.to_string_lossy() }),
        )
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, body) = server
        .post(
            "/file_cqual_analysis",
            json!({ "path": server.tmp.path().to_string_lossy() }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = server.post("/file_description", json!({ "nope": 1 })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let file = server.tmp.path().join("secret.py");
    fs::write(&file, "# forbidden\n").unwrap();
    let (status, body) = server
        .post("/file_description", json!({ "path": file.to_string_lossy() }))
        .await;
    assert_eq!(status, 502);
    assert_eq!(body["error"]["code"], "analysis_failed");

    let (status, body) = server.post("/init", json!({ "url": "  " })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_cache_flush() {
    let server = start().await;
    let file = server.tmp.path().join("x.js");
    fs::write(&file, "// x\n").unwrap();
    let path = file.to_string_lossy().to_string();

    server
        .post("/file_description", json!({ "path": path }))
        .await;
    let (status, body) = server.post("/cache/flush", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["flushed"], true);

    let (_, body) = server
        .post("/file_description", json!({ "path": path }))
        .await;
    assert_eq!(body["cached"], false);
}
