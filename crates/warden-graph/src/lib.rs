//! Graph Execution Engine: build, validate, plan and run capability DAGs.
//!
//! A workflow is an [`ExecutionGraph`](warden_core::graph::ExecutionGraph)
//! of nodes wired output-to-input. The [`GraphEngine`] builds and checks it,
//! the [`Planner`] groups it into stages of mutually independent nodes, and
//! the [`GraphRuntime`] runs those stages in order against an executor.

pub mod engine;
pub mod locality;
pub mod planner;
pub mod runtime;
pub mod state;

pub use engine::GraphEngine;
pub use locality::LocalityPolicy;
pub use planner::{ExecutionPlan, Planner};
pub use runtime::GraphRuntime;
pub use state::{ExecutionSnapshot, NodeRuntimeState, NodeStatus};
