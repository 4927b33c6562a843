pub mod manager;
pub mod runtime;

pub use manager::ContainerManager;
pub use runtime::{BindMount, ContainerRuntime, ContainerSpec};
