//! Governance state machine and policy port.
//!
//! Every execution in the kernel is gated by a [`GovernanceEngine`]. The
//! engine owns the authoritative state, checks role permissions before each
//! transition, and keeps an append-only audit log of what changed and who
//! changed it.

pub mod engine;
pub mod port;

pub use engine::GovernanceEngine;
