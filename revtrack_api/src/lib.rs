//! Shared revtrack data models consumed by the core engine and backend crates.
//!
//! The structures in this crate are designed to be:
//! - immutable values once produced by the engine
//! - serializable via `serde` for persistence and transport

pub mod change;
pub mod position;
pub mod revision;

pub use change::*;
pub use position::*;
pub use revision::*;
