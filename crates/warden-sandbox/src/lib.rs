//! Fail-closed Docker sandbox executor.
//!
//! [`DockerExecutor`] re-checks governance, routes the node, consults the
//! policy port and applies capability guardrails before describing the
//! container that would run it. Any refusal becomes a failed node result
//! carrying a stable code from [`SandboxRefusal`].

pub mod container;
pub mod executor;
pub mod guardrail;
pub mod refusal;

pub use container::{ContainerSpec, Mount, NetworkMode};
pub use executor::DockerExecutor;
pub use guardrail::Guardrails;
pub use refusal::SandboxRefusal;
