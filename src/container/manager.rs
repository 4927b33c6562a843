use async_trait::async_trait;
use bollard::errors::Error as DockerError;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, CreateImageOptionsBuilder, LogsOptionsBuilder,
    RemoveContainerOptionsBuilder, StartContainerOptions, WaitContainerOptions,
};
use bollard::Docker;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use tracing::{debug, error, info, warn};

use crate::config::Config as AppConfig;
use crate::container::runtime::{ContainerRuntime, ContainerSpec};
use crate::error::{RunnerError, RunnerResult};

/// Docker-backed container runtime.
///
/// `bollard::Docker` pools its connections internally and is cheap to clone,
/// so one manager is shared by every in-flight run.
#[derive(Clone)]
pub struct ContainerManager {
    docker: Docker,
}

impl ContainerManager {
    pub async fn new(config: &AppConfig) -> RunnerResult<Self> {
        let docker = connect(&config.docker_host, config.docker_timeout_secs)
            .map_err(|e| RunnerError::DependencyUnavailable(e.to_string()))?;

        // Verify Docker connection
        match docker.ping().await {
            Ok(_) => info!("✓ Docker connection established"),
            Err(e) => {
                error!("✗ Docker connection failed: {}", e);
                return Err(RunnerError::DependencyUnavailable(e.to_string()));
            }
        }

        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

fn connect(docker_host: &str, timeout_secs: u64) -> Result<Docker, DockerError> {
    let host = docker_host.trim();
    if host.is_empty() {
        Docker::connect_with_local_defaults()
    } else if let Some(path) = host.strip_prefix("unix://") {
        Docker::connect_with_unix(path, timeout_secs, bollard::API_DEFAULT_VERSION)
    } else {
        Docker::connect_with_http(host, timeout_secs, bollard::API_DEFAULT_VERSION)
    }
}

fn is_not_found(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

#[async_trait]
impl ContainerRuntime for ContainerManager {
    async fn image_exists(&self, image: &str) -> RunnerResult<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(RunnerError::DependencyUnavailable(e.to_string())),
        }
    }

    async fn pull_image(&self, image: &str) -> RunnerResult<()> {
        let options = CreateImageOptionsBuilder::default().from_image(image).build();

        self.docker
            .create_image(Some(options), None, None)
            .try_for_each(|progress| {
                if let Some(status) = progress.status {
                    debug!("pull {}: {}", image, status);
                }
                futures::future::ready(Ok(()))
            })
            .await
            .map_err(|e| {
                RunnerError::DependencyUnavailable(format!("Failed to pull {}: {}", image, e))
            })
    }

    async fn create_container(&self, spec: &ContainerSpec) -> RunnerResult<String> {
        let host_config = HostConfig {
            binds: Some(spec.binds.iter().map(|b| b.to_bind_string()).collect()),
            extra_hosts: (!spec.extra_hosts.is_empty()).then(|| spec.extra_hosts.clone()),
            ..Default::default()
        };

        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            cmd: Some(spec.cmd.clone()),
            user: spec.user.clone(),
            labels: Some(spec.labels.clone()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = spec
            .name
            .as_deref()
            .map(|name| CreateContainerOptionsBuilder::default().name(name).build());

        let response = self
            .docker
            .create_container(options, body)
            .await
            .map_err(|e| RunnerError::ContainerLifecycle(format!("create failed: {}", e)))?;

        for warning in response.warnings {
            warn!("Container creation warning: {}", warning);
        }

        info!("✓ Container created: {}", response.id);
        Ok(response.id)
    }

    async fn start_container(&self, container_id: &str) -> RunnerResult<()> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions>)
            .await
            .map_err(|e| RunnerError::ContainerLifecycle(format!("start failed: {}", e)))?;

        info!("✓ Container started: {}", container_id);
        Ok(())
    }

    async fn wait_container(&self, container_id: &str) -> RunnerResult<i64> {
        let waited: Result<Vec<_>, DockerError> = self
            .docker
            .wait_container(container_id, None::<WaitContainerOptions>)
            .try_collect()
            .await;

        match waited {
            Ok(responses) => responses
                .last()
                .map(|r| r.status_code)
                .ok_or_else(|| {
                    RunnerError::ContainerLifecycle(format!(
                        "wait on {} returned no status",
                        container_id
                    ))
                }),
            // bollard reports a non-zero exit as an error; it is still an exit status.
            Err(DockerError::DockerContainerWaitError { code, .. }) => Ok(code),
            Err(e) => Err(RunnerError::ContainerLifecycle(format!("wait failed: {}", e))),
        }
    }

    fn stream_logs<'a>(&'a self, container_id: &'a str) -> BoxStream<'a, RunnerResult<Bytes>> {
        let options = LogsOptionsBuilder::default()
            .stdout(true)
            .stderr(true)
            .build();

        self.docker
            .logs(container_id, Some(options))
            .map(|chunk| {
                chunk
                    .map(|output| output.into_bytes())
                    .map_err(|e| RunnerError::ContainerLifecycle(format!("log stream: {}", e)))
            })
            .boxed()
    }

    async fn remove_container(&self, container_id: &str) -> RunnerResult<()> {
        let options = RemoveContainerOptionsBuilder::default()
            .force(true)
            .v(true)
            .build();

        match self
            .docker
            .remove_container(container_id, Some(options))
            .await
        {
            Ok(()) => {
                info!("✓ Container removed: {}", container_id);
                Ok(())
            }
            Err(e) if is_not_found(&e) => {
                warn!("Container {} was already removed", container_id);
                Ok(())
            }
            Err(e) => Err(RunnerError::CleanupFailed(format!(
                "{}: {}",
                container_id, e
            ))),
        }
    }

    async fn health_check(&self) -> RunnerResult<String> {
        let version = self.docker.version().await?;
        Ok(format!("Docker {}", version.version.unwrap_or_default()))
    }
}
