//! Catalogs of discrete particles as lazily evaluated, rank-partitioned columns.
//!
//! A [`Catalog`] gives every rank a dict-like view over named columns. Columns
//! come from the source type's static hard-column table ([`ColumnTable`]) or
//! from per-instance overrides assigned with [`Catalog::set`]. Reading a column
//! yields a [`ColumnAccessor`] wrapping a [`LazyArray`](pcat_compute::LazyArray);
//! nothing is computed until the accessor, or the catalog, is asked to compute.
//!
//! Row selections ([`Catalog::get`], [`get_catalog_subset`]) and column subsets
//! build new catalogs from the existing lazy graphs without copying data.

pub mod accessor;
pub mod attrs;
pub mod catalog;
pub mod columns;
pub mod mesh;
pub mod persist;
pub mod selector;
pub mod sources;
pub mod subset;

pub use accessor::ColumnAccessor;
pub use attrs::{AttrValue, Attrs, JSON_PREFIX};
pub use catalog::{Catalog, CatalogOptions, ColumnValue, DeferredColumn, LocalSize};
pub use columns::{
    BaseSource, ColumnDef, ColumnGetter, ColumnProvider, ColumnTable, HardColumns, SELECTION,
    VALUE, WEIGHT,
};
pub use mesh::{CatalogMesh, MeshColumns, MeshOptions, POSITION, WINDOW_METHODS};
pub use persist::{CatalogWriter, IpcDirectoryWriter, MemoryWriter};
pub use selector::{RowSlice, Selected, Selector};
pub use sources::{ArrayCatalog, UniformCatalog};
pub use subset::{RowMask, get_catalog_subset};
