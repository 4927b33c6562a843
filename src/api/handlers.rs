use actix_web::{http::header::ContentType, web, HttpResponse, ResponseError, Result};
use tracing::{error, info};
use validator::Validate;

use crate::error::RunnerError;
use crate::models::{HealthResponse, RunSpec};
use crate::state::AppState;

pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    let stats = state.get_stats().await;

    let docker_status = match state.runner.runtime().health_check().await {
        Ok(version) => version,
        Err(e) => format!("Error: {}", e),
    };

    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        active_runs: stats.active_runs,
        total_runs: stats.total_runs,
        successful_runs: stats.successful_runs,
        failed_runs: stats.failed_runs,
        docker_status,
    };

    Ok(HttpResponse::Ok().json(response))
}

pub async fn run_k6_test(
    state: web::Data<AppState>,
    request: web::Json<RunSpec>,
) -> Result<HttpResponse> {
    if let Err(e) = request.validate() {
        error!("Invalid run request: {}", e);
        return Ok(RunnerError::InvalidInput(e.to_string()).error_response());
    }

    info!(
        "Received k6 run request: {} {} ({} vus, {}s)",
        request.method, request.target_url, request.virtual_users, request.duration
    );

    let guard = state.begin_run().await;
    let result = state.runner.run_load_test(request.into_inner()).await;
    guard.finish(result.is_ok());

    match result {
        Ok(outcome) => Ok(HttpResponse::Ok()
            .content_type(ContentType::plaintext())
            .body(outcome.into_payload())),
        Err(e) => {
            error!("k6 run error: {}", e.kind());
            Ok(e.error_response())
        }
    }
}
