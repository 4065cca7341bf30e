use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conform_check::{Analyzer, Orchestrator, OrchestratorSettings, RepositoryCollaborator};
use conform_core::{
    secrets_for, ConformError, Issue, IssueKind, ModelHealth, ModelStatus, Severity,
    SpecDocument,
};
use conform_repo::PublishRequest;
use conform_review::AnalysisReport;
use conform_server::{router, AppState};
use serde_json::{json, Map, Value};
use tempfile::TempDir;

const API_KEY: &str = "test-key";

struct LocalRepo {
    root: TempDir,
}

#[async_trait]
impl RepositoryCollaborator for LocalRepo {
    async fn clone_repo(
        &self,
        url: &str,
        _branch: &str,
        key: &str,
    ) -> Result<PathBuf, ConformError> {
        if url.contains("missing") {
            return Err(ConformError::CloneFailed("repository not found".into()));
        }
        let dir = self.workspace_for(key)?;
        std::fs::create_dir_all(dir.join("spec"))?;
        std::fs::write(dir.join("spec/api.md"), "FR-1: Log every request")?;
        Ok(dir)
    }

    async fn publish_file(&self, _request: &PublishRequest) -> Result<(), ConformError> {
        Ok(())
    }

    fn release_workspace(&self, path: &Path) -> Result<(), ConformError> {
        if path.exists() {
            std::fs::remove_dir_all(path)?;
        }
        Ok(())
    }

    fn workspace_for(&self, key: &str) -> Result<PathBuf, ConformError> {
        Ok(self.root.path().join("repos").join(key))
    }

    fn head_commit(&self, _path: &Path) -> Option<String> {
        None
    }

    fn secrets(&self, url: &str) -> Vec<String> {
        secrets_for(url, None)
    }
}

struct OneIssue;

#[async_trait]
impl Analyzer for OneIssue {
    async fn analyze(
        &self,
        _repo: &Path,
        specs: &[SpecDocument],
        _target_paths: Option<&[String]>,
        _options: &Map<String, Value>,
    ) -> Result<AnalysisReport, ConformError> {
        let mut report = AnalysisReport {
            issues: vec![Issue::new(
                Severity::High,
                IssueKind::MissingImplementation,
                "Requirement FR-1 may not be implemented",
                "No evidence of logging implementation found in code",
                "Implement logging as described in the specification",
            )],
            ..AnalysisReport::default()
        };
        report.stats.specs_checked = specs.len();
        Ok(report)
    }

    async fn model_health(&self) -> ModelHealth {
        ModelHealth::unavailable(ModelStatus::Disconnected, "stub-model", "offline")
    }

    fn model_name(&self) -> &str {
        "stub-model"
    }
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    _dir: TempDir,
}

impl TestServer {
    async fn start(api_key: Option<&str>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalRepo {
            root: tempfile::tempdir().unwrap(),
        };
        let orchestrator = Orchestrator::new(
            Arc::new(repo),
            Arc::new(OneIssue),
            OrchestratorSettings {
                max_concurrent_checks: 3,
                publish: None,
            },
        );
        let state = AppState::new(
            orchestrator,
            api_key.map(str::to_string),
            dir.path().join("workspace"),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        Self {
            base: format!("http://{addr}/api/v1"),
            client: reqwest::Client::new(),
            _dir: dir,
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{path}", self.base))
            .bearer_auth(API_KEY)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{path}", self.base))
            .bearer_auth(API_KEY)
    }

    fn delete(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .delete(format!("{}{path}", self.base))
            .bearer_auth(API_KEY)
    }

    async fn wait_finished(&self, id: &str) -> Value {
        for _ in 0..500 {
            let body: Value = self
                .get(&format!("/compliance/check/{id}"))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            if body["status"] == "completed" || body["status"] == "failed" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("check {id} did not finish");
    }
}

async fn error_code(resp: reqwest::Response) -> (u16, String, String) {
    let status = resp.status().as_u16();
    let body: Value = resp.json().await.unwrap();
    (
        status,
        body["error"]["code"].as_str().unwrap_or_default().to_string(),
        body["error"]["message"].as_str().unwrap_or_default().to_string(),
    )
}

#[tokio::test]
async fn health_needs_no_auth() {
    let server = TestServer::start(Some(API_KEY)).await;
    let resp = server
        .client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["modelBackendStatus"], "disconnected");
    assert_eq!(body["modelName"], "stub-model");
    assert_eq!(body["maxConcurrentChecks"], 3);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn auth_is_enforced() {
    let server = TestServer::start(Some(API_KEY)).await;
    let url = format!("{}/compliance/checks", server.base);

    let missing = server.client.get(&url).send().await.unwrap();
    assert_eq!(error_code(missing).await.0, 401);

    let wrong = server.client.get(&url).bearer_auth("nope").send().await.unwrap();
    let (status, code, _) = error_code(wrong).await;
    assert_eq!(status, 401);
    assert_eq!(code, "UNAUTHORIZED");

    let ok = server.get("/compliance/checks").send().await.unwrap();
    assert_eq!(ok.status(), 200);
}

#[tokio::test]
async fn unset_api_key_is_configuration_error() {
    let server = TestServer::start(None).await;
    let resp = server.get("/compliance/checks").send().await.unwrap();
    let (status, code, _) = error_code(resp).await;
    assert_eq!(status, 500);
    assert_eq!(code, "CONFIGURATION_ERROR");
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let server = TestServer::start(Some(API_KEY)).await;
    let cases = [
        (json!({}), "Request body is required"),
        (json!({"branch": "main"}), "Field 'repository_url' is required"),
        (
            json!({"repository_url": "ftp://example.com/repo"}),
            "Invalid repository URL format",
        ),
        (
            json!({"repository_url": "https://github.com/org/repo", "branch": ""}),
            "Branch must be a non-empty string",
        ),
        (
            json!({"repository_url": "https://github.com/org/repo", "spec_files": "a.md"}),
            "spec_files must be an array",
        ),
        (
            json!({"repository_url": "https://github.com/org/repo", "options": []}),
            "options must be an object",
        ),
    ];
    for (body, message) in cases {
        let resp = server.post("/compliance/check").json(&body).send().await.unwrap();
        let (status, code, msg) = error_code(resp).await;
        assert_eq!(status, 400, "{body}");
        assert_eq!(code, "INVALID_REQUEST");
        assert_eq!(msg, message);
    }

    let empty = server.post("/compliance/check").send().await.unwrap();
    assert_eq!(error_code(empty).await.2, "Request body is required");
}

#[tokio::test]
async fn check_lifecycle() {
    let server = TestServer::start(Some(API_KEY)).await;
    let resp = server
        .post("/compliance/check")
        .json(&json!({"repository_url": "https://github.com/org/widget.git"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    let started: Value = resp.json().await.unwrap();
    assert_eq!(started["status"], "started");
    assert_eq!(started["progress"], 0);
    assert_eq!(started["branch"], "main");
    let id = started["checkId"].as_str().unwrap().to_string();
    assert!(id.starts_with("chk_"));

    let done = server.wait_finished(&id).await;
    assert_eq!(done["status"], "completed");
    assert_eq!(done["progress"], 100);
    assert_eq!(done["results"]["totalIssues"], 1);
    assert_eq!(done["results"]["high"], 1);
    assert_eq!(done["results"]["specsChecked"], 1);
    assert!(done["results"]["todoFileUrl"].is_null());

    let todo = server
        .get(&format!("/compliance/check/{id}/todo"))
        .send()
        .await
        .unwrap();
    assert_eq!(todo.status(), 200);
    assert!(todo.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/markdown"));
    let markdown = todo.text().await.unwrap();
    assert!(markdown.contains("- [ ] **Requirement FR-1 may not be implemented**"));

    let list: Value = server
        .get("/compliance/checks?repository=widget")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["total"], 1);
    assert_eq!(list["checks"][0]["checkId"], id.as_str());

    let deleted = server
        .delete(&format!("/compliance/check/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 200);
    let body: Value = deleted.json().await.unwrap();
    assert_eq!(body["checkId"], id.as_str());

    let again = server
        .delete(&format!("/compliance/check/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(error_code(again).await.0, 404);

    let gone = server
        .get(&format!("/compliance/check/{id}"))
        .send()
        .await
        .unwrap();
    let (status, code, _) = error_code(gone).await;
    assert_eq!(status, 404);
    assert_eq!(code, "NOT_FOUND");
}

#[tokio::test]
async fn failed_check_has_no_report() {
    let server = TestServer::start(Some(API_KEY)).await;
    let started: Value = server
        .post("/compliance/check")
        .json(&json!({"repository_url": "https://github.com/org/missing.git"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = started["checkId"].as_str().unwrap().to_string();

    let done = server.wait_finished(&id).await;
    assert_eq!(done["status"], "failed");
    assert!(done["error"].as_str().unwrap().contains("repository not found"));
    assert!(done.get("results").is_none());

    let todo = server
        .get(&format!("/compliance/check/{id}/todo"))
        .send()
        .await
        .unwrap();
    let (status, code, message) = error_code(todo).await;
    assert_eq!(status, 400);
    assert_eq!(code, "INVALID_REQUEST");
    assert_eq!(message, "Check has not completed yet");
}

#[tokio::test]
async fn list_rejects_bad_query() {
    let server = TestServer::start(Some(API_KEY)).await;
    for query in ["?status=paused", "?limit=abc", "?offset=-2"] {
        let resp = server
            .get(&format!("/compliance/checks{query}"))
            .send()
            .await
            .unwrap();
        assert_eq!(error_code(resp).await.0, 400, "{query}");
    }
    let unknown = server
        .get("/compliance/check/chk_unknown/todo")
        .send()
        .await
        .unwrap();
    assert_eq!(error_code(unknown).await.0, 404);
}
