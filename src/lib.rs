//! Ad-hoc k6 load test runs in ephemeral Docker containers.
//!
//! [`LoadTestRunner`] drives one run end to end: it makes sure the k6 image is
//! present, renders the script into a fresh per-run workspace, runs the
//! container with the workspace bind-mounted, and returns the summary export.
//! The container is removed on every exit path.

pub mod api;
pub mod config;
pub mod container;
pub mod error;
pub mod executor;
pub mod models;
pub mod script;
pub mod state;
pub mod workspace;

pub use config::Config;
pub use container::{ContainerManager, ContainerRuntime};
pub use error::{RunnerError, RunnerResult};
pub use executor::{LoadTestRunner, RunnerSettings};
pub use models::{HttpMethod, RunOutcome, RunSpec};
