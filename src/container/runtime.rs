use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::collections::HashMap;

use crate::error::RunnerResult;

/// Host directory bound into a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub host_path: String,
    pub container_path: String,
}

impl BindMount {
    /// Docker `binds` syntax, `host:container`.
    pub fn to_bind_string(&self) -> String {
        format!("{}:{}", self.host_path, self.container_path)
    }
}

/// Everything needed to create one runner container.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub name: Option<String>,
    pub image: String,
    pub cmd: Vec<String>,
    pub user: Option<String>,
    pub binds: Vec<BindMount>,
    pub extra_hosts: Vec<String>,
    pub labels: HashMap<String, String>,
}

/// Container runtime operations the load test runner depends on.
///
/// Implementations must be usable from concurrent runs.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn image_exists(&self, image: &str) -> RunnerResult<bool>;

    /// Blocks until the pull completes.
    async fn pull_image(&self, image: &str) -> RunnerResult<()>;

    async fn create_container(&self, spec: &ContainerSpec) -> RunnerResult<String>;

    async fn start_container(&self, container_id: &str) -> RunnerResult<()>;

    /// Blocks until the container's main process exits and returns its status.
    async fn wait_container(&self, container_id: &str) -> RunnerResult<i64>;

    /// Interleaved stdout/stderr of the container.
    fn stream_logs<'a>(&'a self, container_id: &'a str) -> BoxStream<'a, RunnerResult<Bytes>>;

    /// Force-remove. A container that is already gone is not an error.
    async fn remove_container(&self, container_id: &str) -> RunnerResult<()>;

    async fn health_check(&self) -> RunnerResult<String>;
}
