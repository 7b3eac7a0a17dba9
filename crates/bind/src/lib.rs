//! Bind resolution and backend routing.
//!
//! Decides whether a bind is anonymous, a root-identity bind, a referral or
//! a request for a storage backend, and routes it so the backend lock is
//! released exactly once on every path.

pub mod backend;
pub mod context;
pub mod credentials;
pub mod errors;
pub mod resolver;
pub mod router;
pub mod types;

pub use backend::*;
pub use context::*;
pub use credentials::*;
pub use errors::*;
pub use resolver::*;
pub use router::*;
pub use types::*;
