//! pcat: particle catalogs as lazily evaluated, rank-partitioned columns.
//!
//! This crate is the entrypoint for the pcat workspace. It re-exports the
//! catalog API together with the compute and communication layers it is built
//! on, so applications depend on a single crate.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use pcat::{BaseSource, Catalog, CatalogOptions, SelfComm};
//!
//! let mut cat = Catalog::new(BaseSource, Arc::new(SelfComm), 4, CatalogOptions::default()).unwrap();
//! cat.set("Mass", vec![1.0, 2.0, 3.0, 4.0]).unwrap();
//! let heavy = cat.column("Mass").unwrap().array()
//!     .compare_scalar(pcat::CompareOp::Gt, 2.0).unwrap();
//! let subset = cat.get(heavy).unwrap().into_catalog().unwrap();
//! assert_eq!(subset.len().unwrap(), 2);
//! ```
//!
//! # Architecture
//!
//! - **Catalogs** (`pcat-catalog`): column tables, overrides, selection, persistence.
//! - **Compute** (`pcat-compute`): lazy array graphs, the engine, and the result cache.
//! - **Communication** (`pcat-comm`): the rank group abstraction used for collective sizes.
//! - **Errors** (`pcat-result`): the shared error enum.

pub mod logging;

pub use logging::setup_logging;

pub use pcat_catalog::{
    ArrayCatalog, AttrValue, Attrs, BaseSource, Catalog, CatalogMesh, CatalogOptions,
    CatalogWriter, ColumnAccessor, ColumnProvider, ColumnTable, ColumnValue, DeferredColumn,
    HardColumns, IpcDirectoryWriter, LocalSize, MemoryWriter, MeshColumns, MeshOptions, RowMask,
    RowSlice, Selected, Selector, UniformCatalog, get_catalog_subset,
};

pub use pcat_comm::{CommRef, Communicator, CurrentComm, SelfComm, ThreadComm};

pub use pcat_compute::{
    BinaryOp, CacheConfig, CompareOp, ComputeEngine, EngineOptions, LazyArray, ScalarValue,
};

pub use pcat_result::{Error, Result};

/// Lower-level building blocks, for code that defines new source types.
pub mod catalog {
    pub use pcat_catalog::*;
}

pub mod compute {
    pub use pcat_compute::*;
}

pub mod comm {
    pub use pcat_comm::*;
}
