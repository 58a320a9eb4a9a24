pub mod registry;
pub mod router;

pub use registry::WorkerRegistry;
pub use router::CapabilityRouter;
