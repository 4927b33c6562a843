use chrono::Utc;
use futures::StreamExt;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::container::{BindMount, ContainerRuntime, ContainerSpec};
use crate::error::{RunnerError, RunnerResult};
use crate::executor::audit::AuditLogger;
use crate::models::{RunContext, RunOutcome, RunPhase, RunSpec};
use crate::script::generate_script;
use crate::workspace::Workspace;

pub const RUN_ID_LABEL: &str = "k6-runner.run-id";

/// Settings resolved once when the runner is built.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub image: String,
    pub base_dir: PathBuf,
    pub bind_base_dir: PathBuf,
    pub mount_dir: String,
    pub gateway_alias: String,
    pub container_user: Option<String>,
    pub log_timeout: Duration,
    pub cleanup_workspace: bool,
}

impl RunnerSettings {
    pub fn from_config(config: &Config) -> Self {
        let user = config.container_user.trim();

        Self {
            image: config.runner_image.clone(),
            base_dir: config.base_dir.clone(),
            bind_base_dir: config.bind_base_dir().to_path_buf(),
            mount_dir: config.container_mount_dir.trim_end_matches('/').to_string(),
            gateway_alias: config.gateway_alias.clone(),
            container_user: (!user.is_empty()).then(|| user.to_string()),
            log_timeout: Duration::from_secs(config.log_timeout_secs),
            cleanup_workspace: config.cleanup_workspace,
        }
    }
}

/// Captured container output.
#[derive(Debug, Clone)]
struct CollectedLogs {
    text: String,
    complete: bool,
}

/// Runs one k6 load test per call in a fresh container.
pub struct LoadTestRunner {
    runtime: Arc<dyn ContainerRuntime>,
    settings: RunnerSettings,
    audit_logger: Option<AuditLogger>,
}

impl LoadTestRunner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, settings: RunnerSettings) -> Self {
        Self {
            runtime,
            settings,
            audit_logger: None,
        }
    }

    pub fn from_config(runtime: Arc<dyn ContainerRuntime>, config: &Config) -> Self {
        let mut runner = Self::new(runtime, RunnerSettings::from_config(config));

        if config.enable_audit_log {
            match AuditLogger::new(&config.audit_log_path) {
                Ok(logger) => runner.audit_logger = Some(logger),
                Err(e) => error!("Failed to initialize audit logger: {}", e),
            }
        }

        runner
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub async fn run_load_test(&self, spec: RunSpec) -> RunnerResult<RunOutcome> {
        self.run_load_test_with_cancel(spec, CancellationToken::new())
            .await
    }

    /// Like [`run_load_test`](Self::run_load_test), aborting the blocking
    /// phases once `cancel` fires. The container is removed either way.
    pub async fn run_load_test_with_cancel(
        &self,
        spec: RunSpec,
        cancel: CancellationToken,
    ) -> RunnerResult<RunOutcome> {
        self.ensure_image(&cancel).await?;

        let ctx = self.new_context(spec);
        info!(
            "Starting k6 run {} against {} ({} vus, {}s)",
            ctx.id, ctx.spec.target_url, ctx.spec.virtual_users, ctx.spec.duration
        );
        enter(&ctx, RunPhase::ImageReady);

        if let Some(ref logger) = self.audit_logger {
            logger.log_run_start(&ctx).await;
        }

        let result = self.execute_in_workspace(&ctx, &cancel).await;

        match &result {
            Ok(outcome) => {
                info!(
                    "k6 run {} finished (metrics: {})",
                    ctx.id,
                    outcome.has_metrics()
                );
                if let Some(ref logger) = self.audit_logger {
                    logger.log_run_complete(&ctx, outcome).await;
                }
            }
            Err(e) => {
                enter(&ctx, RunPhase::Failed);
                error!("k6 run {} failed: {}", ctx.id, e.kind());
                if let Some(ref logger) = self.audit_logger {
                    logger.log_run_error(&ctx, e).await;
                }
            }
        }

        result
    }

    async fn ensure_image(&self, cancel: &CancellationToken) -> RunnerResult<()> {
        let image = &self.settings.image;

        if self.runtime.image_exists(image).await? {
            debug!("{} image already exists locally", image);
            return Ok(());
        }

        info!("{} image not found locally, pulling", image);
        until_cancelled(cancel, self.runtime.pull_image(image)).await?;
        info!("{} image pulled successfully", image);
        Ok(())
    }

    fn new_context(&self, spec: RunSpec) -> RunContext {
        let id = Uuid::new_v4();
        let run_dir = id.to_string();

        RunContext {
            id,
            spec,
            workspace_dir: self.settings.base_dir.join(&run_dir),
            bind_source: self.settings.bind_base_dir.join(&run_dir),
            mount_dir: self.settings.mount_dir.clone(),
            created_at: Utc::now(),
        }
    }

    async fn execute_in_workspace(
        &self,
        ctx: &RunContext,
        cancel: &CancellationToken,
    ) -> RunnerResult<RunOutcome> {
        let workspace = Workspace::prepare(&self.settings.base_dir, &ctx.id.to_string()).await?;

        let result = async {
            let script = generate_script(&ctx.spec, &self.settings.gateway_alias);
            workspace.write_script(&script).await?;
            enter(ctx, RunPhase::WorkspaceReady);

            if cancel.is_cancelled() {
                return Err(RunnerError::Cancelled);
            }

            let container_spec = self.container_spec(ctx);
            let container_id = match self.runtime.create_container(&container_spec).await {
                Ok(id) => id,
                Err(e) => {
                    // The daemon may have created it even though the call failed.
                    if let Some(ref name) = container_spec.name {
                        remove_logged(self.runtime.as_ref(), name).await;
                    }
                    return Err(e);
                }
            };
            enter(ctx, RunPhase::Created);

            let lease = ContainerLease::new(self.runtime.clone(), container_id);
            let outcome = self
                .drive_container(ctx, lease.id(), &workspace, cancel)
                .await;
            lease.release().await;

            outcome
        }
        .await;

        if self.settings.cleanup_workspace {
            workspace.teardown().await;
        }
        enter(ctx, RunPhase::Cleaned);

        result
    }

    async fn drive_container(
        &self,
        ctx: &RunContext,
        container_id: &str,
        workspace: &Workspace,
        cancel: &CancellationToken,
    ) -> RunnerResult<RunOutcome> {
        self.runtime.start_container(container_id).await?;
        enter(ctx, RunPhase::Started);

        let exit_code = until_cancelled(cancel, self.runtime.wait_container(container_id)).await?;
        info!(
            "k6 container {} finished with status code: {}",
            container_id, exit_code
        );
        enter(ctx, RunPhase::Exited);

        if exit_code != 0 {
            let logs = self.collect_logs(container_id, cancel).await;
            return Err(RunnerError::TestExecutionFailed {
                exit_code,
                logs: logs.into_report(),
            });
        }

        let outcome = match workspace.read_results().await? {
            Some(content) => RunOutcome::Metrics(content),
            None => {
                warn!(
                    "k6 run {} exited cleanly without writing {}",
                    ctx.id,
                    workspace.results_path.display()
                );
                let logs = self.collect_logs(container_id, cancel).await;
                RunOutcome::NoResultFile {
                    logs: logs.text,
                    logs_complete: logs.complete,
                }
            }
        };
        enter(ctx, RunPhase::ResultRead);

        Ok(outcome)
    }

    fn container_spec(&self, ctx: &RunContext) -> ContainerSpec {
        let mut labels = HashMap::new();
        labels.insert(RUN_ID_LABEL.to_string(), ctx.id.to_string());

        ContainerSpec {
            name: Some(format!("k6-run-{}", ctx.id)),
            image: self.settings.image.clone(),
            cmd: vec![
                "run".to_string(),
                ctx.script_in_container(),
                format!("--summary-export={}", ctx.results_in_container()),
            ],
            user: self.settings.container_user.clone(),
            binds: vec![BindMount {
                host_path: ctx.bind_source.display().to_string(),
                container_path: ctx.mount_dir.clone(),
            }],
            extra_hosts: vec![format!("{}:host-gateway", self.settings.gateway_alias)],
            labels,
        }
    }

    /// Drain the log stream for at most `log_timeout`; a timeout, stream
    /// error or cancellation yields whatever was captured so far.
    async fn collect_logs(&self, container_id: &str, cancel: &CancellationToken) -> CollectedLogs {
        let mut buffer: Vec<u8> = Vec::new();
        let mut stream = self.runtime.stream_logs(container_id);

        let drain = async {
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => buffer.extend_from_slice(&bytes),
                    Err(e) => {
                        warn!("Error receiving logs for container {}: {}", container_id, e);
                        return false;
                    }
                }
            }
            true
        };

        let complete = tokio::select! {
            drained = tokio::time::timeout(self.settings.log_timeout, drain) => match drained {
                Ok(finished) => finished,
                Err(_) => {
                    warn!("Log collection timed out for container {}", container_id);
                    false
                }
            },
            _ = cancel.cancelled() => {
                warn!("Log collection cancelled for container {}", container_id);
                false
            }
        };

        CollectedLogs {
            text: String::from_utf8_lossy(&buffer).into_owned(),
            complete,
        }
    }
}

impl CollectedLogs {
    fn into_report(self) -> String {
        if self.complete {
            self.text
        } else {
            format!("{}\n[log collection incomplete]", self.text)
        }
    }
}

fn enter(ctx: &RunContext, phase: RunPhase) {
    debug!(run_id = %ctx.id, %phase, "run phase");
}

async fn until_cancelled<T, F>(cancel: &CancellationToken, fut: F) -> RunnerResult<T>
where
    F: Future<Output = RunnerResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RunnerError::Cancelled),
        result = fut => result,
    }
}

async fn remove_logged(runtime: &dyn ContainerRuntime, container_id: &str) {
    if let Err(e) = runtime.remove_container(container_id).await {
        warn!("Cleanup of container {} failed: {}", container_id, e);
    }
}

/// Owns a created container until it is removed.
///
/// Dropping an unreleased lease (the run future was dropped mid-flight)
/// schedules the removal on the current runtime.
struct ContainerLease {
    runtime: Arc<dyn ContainerRuntime>,
    id: String,
    released: bool,
}

impl ContainerLease {
    fn new(runtime: Arc<dyn ContainerRuntime>, id: String) -> Self {
        Self {
            runtime,
            id,
            released: false,
        }
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn release(mut self) {
        remove_logged(self.runtime.as_ref(), &self.id).await;
        self.released = true;
    }
}

impl Drop for ContainerLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let runtime = self.runtime.clone();
        let id = std::mem::take(&mut self.id);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Run interrupted, removing container {} in background", id);
                handle.spawn(async move {
                    remove_logged(runtime.as_ref(), &id).await;
                });
            }
            Err(_) => error!("Run interrupted outside a runtime, container {} leaked", id),
        }
    }
}
