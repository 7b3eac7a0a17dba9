//! Unique identifier generation for directory entries.
//!
//! Provides:
//! - Time/node based identifiers whose clock state is persisted either in a
//!   directory on disk or in a directory entry
//! - Deterministic name-based derivation used by replication
//! - The canonical `nsUniqueId` text form and its parser

pub mod errors;
pub mod generator;
pub mod id;
pub mod primitive;
pub mod state;

pub use errors::*;
pub use generator::*;
pub use id::*;
pub use primitive::*;
pub use state::*;
