pub mod config;
pub mod error;
pub mod event;
pub mod governance;
pub mod graph;
pub mod policy;
pub mod traits;
pub mod types;
pub mod worker;

pub use config::KernelConfig;
pub use error::{Result, WardenError};
pub use event::EventBus;
pub use graph::*;
pub use types::*;
