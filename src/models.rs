use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Only POST and PUT requests carry a payload.
    pub fn accepts_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(format!("Unsupported HTTP method: {}", s)),
        }
    }
}

impl TryFrom<String> for HttpMethod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HttpMethod> for String {
    fn from(method: HttpMethod) -> Self {
        method.as_str().to_string()
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of one load test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RunSpec {
    #[validate(url)]
    pub target_url: String,

    #[validate(range(min = 1, max = 1000))]
    pub virtual_users: u32,

    #[validate(range(min = 1, max = 3600))]
    pub duration: u32, // seconds

    pub method: HttpMethod,

    #[serde(default)]
    pub body: Option<String>,
}

impl RunSpec {
    pub fn new(target_url: impl Into<String>, virtual_users: u32, duration: u32) -> Self {
        Self {
            target_url: target_url.into(),
            virtual_users,
            duration,
            method: HttpMethod::Get,
            body: None,
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// The body that is actually sent: present only for POST/PUT with a
    /// non-blank body.
    pub fn effective_body(&self) -> Option<&str> {
        if !self.method.accepts_body() {
            return None;
        }
        self.body.as_deref().filter(|b| !b.trim().is_empty())
    }
}

/// Per-invocation state owned by the runner.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub id: Uuid,
    pub spec: RunSpec,
    /// Workspace directory as the service sees it.
    pub workspace_dir: PathBuf,
    /// Workspace directory as the Docker daemon sees it.
    pub bind_source: PathBuf,
    pub mount_dir: String,
    pub created_at: DateTime<Utc>,
}

impl RunContext {
    pub fn script_in_container(&self) -> String {
        format!("{}/{}", self.mount_dir, crate::workspace::SCRIPT_FILE)
    }

    pub fn results_in_container(&self) -> String {
        format!("{}/{}", self.mount_dir, crate::workspace::RESULTS_FILE)
    }
}

/// Lifecycle phases of a run, used for progress logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    ImageReady,
    WorkspaceReady,
    Created,
    Started,
    Exited,
    ResultRead,
    Cleaned,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Init => "init",
            RunPhase::ImageReady => "image_ready",
            RunPhase::WorkspaceReady => "workspace_ready",
            RunPhase::Created => "created",
            RunPhase::Started => "started",
            RunPhase::Exited => "exited",
            RunPhase::ResultRead => "result_read",
            RunPhase::Cleaned => "cleaned",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

pub const NO_RESULT_FILE_MESSAGE: &str =
    "Test completed successfully, but no result file was generated.";

/// Successful outcome of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Raw content of the k6 summary export.
    Metrics(String),
    /// The runner exited cleanly without writing a summary.
    NoResultFile { logs: String, logs_complete: bool },
}

impl RunOutcome {
    pub fn has_metrics(&self) -> bool {
        matches!(self, RunOutcome::Metrics(_))
    }

    pub fn into_payload(self) -> String {
        match self {
            RunOutcome::Metrics(content) => content,
            RunOutcome::NoResultFile {
                logs,
                logs_complete,
            } => serde_json::json!({
                "message": NO_RESULT_FILE_MESSAGE,
                "resultFile": false,
                "logs": logs,
                "logsComplete": logs_complete,
            })
            .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_runs: usize,
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub docker_status: String,
}
