//! Shared directory types.
//!
//! Both the bind path and the uniqueid generator name directory objects by
//! distinguished name, so the normalized [`Dn`] lives here.

pub mod dn;

pub use dn::*;
