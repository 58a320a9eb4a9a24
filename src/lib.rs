//! Warden kernel: the wiring between governance, graph execution, routing
//! and the sandbox executor, shared by the `warden` binary and its tests.

pub mod kernel;

pub use kernel::Kernel;
