//! Shared fixtures and scripted executors for Warden tests.

pub mod executor;
pub mod fixtures;

pub use executor::ScriptedExecutor;
pub use fixtures::{connect, linear_graph, video_node, write_config};
