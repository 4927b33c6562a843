use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{RunnerError, RunnerResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,

    // Docker connection; empty means the platform default socket
    pub docker_host: String,
    pub docker_timeout_secs: u64,

    // Test runner settings
    pub runner_image: String,
    pub gateway_alias: String,
    pub container_user: String,
    pub log_timeout_secs: u64,

    // Workspace paths
    pub base_dir: PathBuf,
    pub host_base_dir: Option<PathBuf>, // as seen by the Docker daemon
    pub container_mount_dir: String,

    // Workspace cleanup policy
    pub cleanup_workspace: bool,

    // HTTP surface
    pub enable_controller: bool,

    // Audit & logging
    pub enable_audit_log: bool,
    pub audit_log_path: String,
}

impl Default for Config {
    fn default() -> Self {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,

            docker_host: String::new(),
            docker_timeout_secs: 120,

            runner_image: "grafana/k6:latest".to_string(),
            gateway_alias: "host.docker.internal".to_string(),
            container_user: "root".to_string(),
            log_timeout_secs: 60,

            base_dir: cwd.join("k6-runs"),
            host_base_dir: None,
            container_mount_dir: "/k6".to_string(),

            cleanup_workspace: false,

            enable_controller: true,

            enable_audit_log: false,
            audit_log_path: "./logs/audit.log".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> RunnerResult<Self> {
        dotenvy::dotenv().ok();

        let mut config = Config::default();

        if let Ok(host) = env::var("K6_RUNNER_HOST") {
            config.host = host;
        }
        if let Some(port) = parse_var("K6_RUNNER_PORT")? {
            config.port = port;
        }

        if let Ok(docker_host) = env::var("DOCKER_HOST") {
            config.docker_host = docker_host;
        }
        if let Some(secs) = parse_var("DOCKER_TIMEOUT_SECS")? {
            config.docker_timeout_secs = secs;
        }

        if let Ok(image) = env::var("K6_IMAGE") {
            config.runner_image = image;
        }
        if let Ok(alias) = env::var("K6_GATEWAY_ALIAS") {
            config.gateway_alias = alias;
        }
        if let Ok(user) = env::var("K6_CONTAINER_USER") {
            config.container_user = user;
        }
        if let Some(secs) = parse_var("K6_LOG_TIMEOUT_SECS")? {
            config.log_timeout_secs = secs;
        }

        if let Ok(dir) = env::var("K6_BASE_DIR") {
            config.base_dir = absolutize(Path::new(&dir));
        }
        if let Ok(dir) = env::var("K6_HOST_BASE_DIR") {
            if !dir.trim().is_empty() {
                config.host_base_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(mount) = env::var("K6_CONTAINER_MOUNT_DIR") {
            config.container_mount_dir = mount;
        }

        if let Some(cleanup) = parse_var("K6_CLEANUP_WORKSPACE")? {
            config.cleanup_workspace = cleanup;
        }

        if let Some(enabled) = parse_var("K6_CONTROLLER_ENABLED")? {
            config.enable_controller = enabled;
        }

        if let Some(audit) = parse_var("ENABLE_AUDIT_LOG")? {
            config.enable_audit_log = audit;
        }
        if let Ok(audit_path) = env::var("AUDIT_LOG_PATH") {
            config.audit_log_path = audit_path;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RunnerResult<()> {
        if self.runner_image.trim().is_empty() {
            return Err(RunnerError::Configuration(
                "runner image must not be empty".to_string(),
            ));
        }
        if !self.container_mount_dir.starts_with('/') {
            return Err(RunnerError::Configuration(format!(
                "container mount dir must be absolute: {}",
                self.container_mount_dir
            )));
        }
        Ok(())
    }

    /// Base directory the Docker daemon binds into the runner container.
    pub fn bind_base_dir(&self) -> &Path {
        self.host_base_dir.as_deref().unwrap_or(&self.base_dir)
    }
}

fn parse_var<T>(name: &str) -> RunnerResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| RunnerError::Configuration(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(None),
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
