use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::error;

use crate::error::RunnerError;
use crate::models::{RunContext, RunOutcome};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: String,
    pub run_id: String,
    pub event_type: AuditEventType,
    pub target_url: String,
    pub method: String,
    pub virtual_users: u32,
    pub duration_secs: u32,
    pub exit_code: Option<i64>,
    pub has_metrics: Option<bool>,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    RunStart,
    RunComplete,
    RunError,
}

/// Append-only JSON-lines record of runs.
pub struct AuditLogger {
    log_file: Mutex<std::fs::File>,
}

impl AuditLogger {
    pub fn new(log_path: &str) -> Result<Self, std::io::Error> {
        if let Some(parent) = Path::new(log_path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            log_file: Mutex::new(file),
        })
    }

    pub async fn log_run_start(&self, ctx: &RunContext) {
        let entry = Self::entry(ctx, AuditEventType::RunStart, true);
        self.write_log_entry(entry).await;
    }

    pub async fn log_run_complete(&self, ctx: &RunContext, outcome: &RunOutcome) {
        let mut entry = Self::entry(ctx, AuditEventType::RunComplete, true);
        entry.exit_code = Some(0);
        entry.has_metrics = Some(outcome.has_metrics());
        self.write_log_entry(entry).await;
    }

    pub async fn log_run_error(&self, ctx: &RunContext, err: &RunnerError) {
        let mut entry = Self::entry(ctx, AuditEventType::RunError, false);
        if let RunnerError::TestExecutionFailed { exit_code, .. } = err {
            entry.exit_code = Some(*exit_code);
        }
        entry.error = Some(err.kind().to_string());
        self.write_log_entry(entry).await;
    }

    fn entry(ctx: &RunContext, event_type: AuditEventType, success: bool) -> AuditLogEntry {
        AuditLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id: ctx.id.to_string(),
            event_type,
            target_url: ctx.spec.target_url.clone(),
            method: ctx.spec.method.to_string(),
            virtual_users: ctx.spec.virtual_users,
            duration_secs: ctx.spec.duration,
            exit_code: None,
            has_metrics: None,
            success,
            error: None,
        }
    }

    async fn write_log_entry(&self, entry: AuditLogEntry) {
        if let Ok(json) = serde_json::to_string(&entry) {
            let mut file = self.log_file.lock().await;
            if let Err(e) = writeln!(file, "{}", json) {
                error!("Failed to write audit log: {}", e);
            }
            let _ = file.flush();
        }
    }
}
