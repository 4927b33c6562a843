use actix_web::{http::StatusCode, test, web, App};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use k6_runner::api::configure_routes;
use k6_runner::container::{ContainerRuntime, ContainerSpec};
use k6_runner::state::AppState;
use k6_runner::{Config, LoadTestRunner, RunnerResult};

/// Runtime that "runs" k6 by writing a canned summary into the bound workspace.
struct ScriptedRuntime {
    exit_code: i64,
    summary: Option<&'static str>,
    bind: Mutex<Option<String>>,
    removed: Mutex<Vec<String>>,
}

impl ScriptedRuntime {
    fn new(exit_code: i64, summary: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            exit_code,
            summary,
            bind: Mutex::new(None),
            removed: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    async fn image_exists(&self, _image: &str) -> RunnerResult<bool> {
        Ok(true)
    }

    async fn pull_image(&self, _image: &str) -> RunnerResult<()> {
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> RunnerResult<String> {
        *self.bind.lock().unwrap() = Some(spec.binds[0].host_path.clone());
        Ok("k6-container".to_string())
    }

    async fn start_container(&self, _container_id: &str) -> RunnerResult<()> {
        Ok(())
    }

    async fn wait_container(&self, _container_id: &str) -> RunnerResult<i64> {
        if let Some(summary) = self.summary {
            let dir = PathBuf::from(self.bind.lock().unwrap().clone().unwrap());
            std::fs::write(dir.join("results.json"), summary).unwrap();
        }
        Ok(self.exit_code)
    }

    fn stream_logs<'a>(&'a self, _container_id: &'a str) -> BoxStream<'a, RunnerResult<Bytes>> {
        stream::iter(vec![Ok(Bytes::from_static(b"level=error msg=\"request failed\"\n"))]).boxed()
    }

    async fn remove_container(&self, container_id: &str) -> RunnerResult<()> {
        self.removed.lock().unwrap().push(container_id.to_string());
        Ok(())
    }

    async fn health_check(&self) -> RunnerResult<String> {
        Ok("Docker test".to_string())
    }
}

fn state(runtime: Arc<ScriptedRuntime>, base: &std::path::Path) -> web::Data<AppState> {
    let config = Config {
        base_dir: base.to_path_buf(),
        ..Default::default()
    };
    web::Data::new(AppState::new(LoadTestRunner::from_config(runtime, &config)))
}

fn run_request() -> serde_json::Value {
    serde_json::json!({
        "targetUrl": "http://localhost:8080/api/test/hello",
        "virtualUsers": 10,
        "duration": 30,
        "method": "GET"
    })
}

#[actix_web::test]
async fn test_run_returns_summary_as_plain_text() {
    let base = tempfile::tempdir().unwrap();
    let runtime = ScriptedRuntime::new(0, Some(r#"{"metrics":{"http_reqs":{"count":300}}}"#));
    let app = test::init_service(
        App::new()
            .app_data(state(runtime.clone(), base.path()))
            .configure(|cfg| configure_routes(cfg, true)),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/k6/run")
        .set_json(run_request())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body = test::read_body(resp).await;
    assert_eq!(body, r#"{"metrics":{"http_reqs":{"count":300}}}"#);
    assert_eq!(*runtime.removed.lock().unwrap(), vec!["k6-container"]);

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let health: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(health["active_runs"], 0);
    assert_eq!(health["total_runs"], 1);
    assert_eq!(health["successful_runs"], 1);
}

#[actix_web::test]
async fn test_failed_run_is_server_error() {
    let base = tempfile::tempdir().unwrap();
    let runtime = ScriptedRuntime::new(99, None);
    let app = test::init_service(
        App::new()
            .app_data(state(runtime.clone(), base.path()))
            .configure(|cfg| configure_routes(cfg, true)),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/k6/run")
        .set_json(run_request())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "TestExecutionFailed");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("status code 99"));
    assert_eq!(runtime.removed.lock().unwrap().len(), 1);
}

#[actix_web::test]
async fn test_out_of_range_request_is_rejected() {
    let base = tempfile::tempdir().unwrap();
    let runtime = ScriptedRuntime::new(0, None);
    let app = test::init_service(
        App::new()
            .app_data(state(runtime.clone(), base.path()))
            .configure(|cfg| configure_routes(cfg, true)),
    )
    .await;

    let mut request = run_request();
    request["virtualUsers"] = serde_json::json!(5000);

    let req = test::TestRequest::post()
        .uri("/k6/run")
        .set_json(request)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(runtime.bind.lock().unwrap().is_none());
}

#[actix_web::test]
async fn test_controller_can_be_disabled() {
    let base = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(state(ScriptedRuntime::new(0, None), base.path()))
            .configure(|cfg| configure_routes(cfg, false)),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/k6/run")
        .set_json(run_request())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["docker_status"], "Docker test");
}
