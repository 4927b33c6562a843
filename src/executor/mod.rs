pub mod audit;
pub mod runner;

pub use runner::{LoadTestRunner, RunnerSettings};
