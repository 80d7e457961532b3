//! Deferred array computations for pcat catalogs.
//!
//! A [`LazyArray`] is an immutable, reference-counted node of a computation graph
//! with a known length and Arrow data type. Composition (selection, arithmetic,
//! comparison) never evaluates anything; it only builds new nodes. Values are
//! produced by a [`ComputeEngine`], optionally backed by an [`ArrayCache`], and
//! catalogs reach both through a single [`ComputeGateway`].

pub mod cache;
pub mod engine;
pub mod gateway;
pub mod kernels;
pub mod lazy;
mod optimize;
pub mod scalar;

pub use cache::{ArrayCache, CACHE_SIZE, CacheConfig, CacheStats};
pub use engine::{ComputeEngine, EngineOptions};
pub use gateway::{ComputeGateway, Forced};
pub use kernels::{BinaryOp, CompareOp, LogicalOp};
pub use lazy::{LazyArray, Producer};
pub use scalar::ScalarValue;
