use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    // Infrastructure errors
    #[error("Container engine unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Workspace I/O failed: {0}")]
    WorkspaceIo(String),

    #[error("Container lifecycle failed: {0}")]
    ContainerLifecycle(String),

    #[error("Failed to cleanup container: {0}")]
    CleanupFailed(String),

    // Test outcome
    #[error("k6 test failed with status code {exit_code}. Logs:\n{logs}")]
    TestExecutionFailed { exit_code: i64, logs: String },

    #[error("Load test run was cancelled")]
    Cancelled,

    // Caller and setup errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RunnerError {
    /// Stable identifier used in error response bodies and audit entries.
    pub fn kind(&self) -> &'static str {
        match self {
            RunnerError::DependencyUnavailable(_) => "DependencyUnavailable",
            RunnerError::WorkspaceIo(_) => "WorkspaceIo",
            RunnerError::ContainerLifecycle(_) => "ContainerLifecycle",
            RunnerError::CleanupFailed(_) => "CleanupFailed",
            RunnerError::TestExecutionFailed { .. } => "TestExecutionFailed",
            RunnerError::Cancelled => "Cancelled",
            RunnerError::InvalidInput(_) => "InvalidInput",
            RunnerError::Configuration(_) => "Configuration",
        }
    }
}

impl ResponseError for RunnerError {
    fn status_code(&self) -> StatusCode {
        match self {
            RunnerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RunnerError::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.kind(),
            "message": format!("Error running k6 test: {}", self),
        }))
    }
}

impl From<bollard::errors::Error> for RunnerError {
    fn from(err: bollard::errors::Error) -> Self {
        RunnerError::DependencyUnavailable(err.to_string())
    }
}

impl From<std::io::Error> for RunnerError {
    fn from(err: std::io::Error) -> Self {
        RunnerError::WorkspaceIo(err.to_string())
    }
}

pub type RunnerResult<T> = Result<T, RunnerError>;
