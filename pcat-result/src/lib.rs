//! Error types and result definitions for pcat.
//!
//! All pcat crates share a single error enum ([`Error`]) and the [`Result<T>`]
//! alias, so failures propagate across crate boundaries with `?`.
//!
//! Errors are local to the rank that raised them; see [`Error`] for the
//! consequences this has for collective operations.

pub mod error;
pub mod result;

pub use error::Error;
pub use result::Result;
