//! Built-in catalog sources.
//!
//! Every source contributes hard columns on top of the defaults of
//! [`BaseSource`](crate::columns::BaseSource).

pub mod array;
pub mod uniform;

pub use array::ArrayCatalog;
pub use uniform::UniformCatalog;
