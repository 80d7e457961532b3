//! The catalog: named lazy columns partitioned across ranks.

use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array};
use pcat_comm::{CommRef, CurrentComm};
use pcat_compute::{
    CacheConfig, CacheStats, ComputeEngine, ComputeGateway, EngineOptions, Forced, LazyArray,
    ScalarValue,
};
use pcat_result::{Error, Result};
use rustc_hash::FxHashMap;

use crate::accessor::ColumnAccessor;
use crate::attrs::{AttrValue, Attrs};
use crate::columns::{BaseSource, ColumnProvider, HardColumns};

/// Number of rows a catalog holds on the calling rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalSize {
    Known(usize),
    Unknown,
}

impl LocalSize {
    pub fn known(self) -> Option<usize> {
        match self {
            LocalSize::Known(n) => Some(n),
            LocalSize::Unknown => None,
        }
    }

    pub fn is_known(self) -> bool {
        matches!(self, LocalSize::Known(_))
    }
}

impl From<usize> for LocalSize {
    fn from(n: usize) -> Self {
        LocalSize::Known(n)
    }
}

impl From<Option<usize>> for LocalSize {
    fn from(n: Option<usize>) -> Self {
        n.map_or(LocalSize::Unknown, LocalSize::Known)
    }
}

impl fmt::Display for LocalSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalSize::Known(n) => write!(f, "{n}"),
            LocalSize::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Compute settings of a catalog. Derived views inherit them from their parent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CatalogOptions {
    pub engine: EngineOptions,
    pub cache: CacheConfig,
    pub use_cache: bool,
}

/// Column producer invoked with the owning catalog every time the column is read.
pub type DeferredColumn = Arc<dyn Fn(&Catalog) -> Result<LazyArray> + Send + Sync>;

/// Anything that can be assigned to a column with [`Catalog::set`].
#[derive(Clone, Debug)]
pub enum ColumnValue {
    /// Broadcast to every row; needs a known local size.
    Scalar(ScalarValue),
    Array(LazyArray),
    /// Keeps the accessor's column metadata.
    Accessor(ColumnAccessor),
}

macro_rules! column_value_from_scalar {
    ($($ty:ty),*) => {
        $(impl From<$ty> for ColumnValue {
            fn from(v: $ty) -> Self {
                ColumnValue::Scalar(ScalarValue::from(v))
            }
        })*
    };
}

column_value_from_scalar!(bool, i32, i64, u64, f32, f64, &str, String);

impl From<ScalarValue> for ColumnValue {
    fn from(v: ScalarValue) -> Self {
        ColumnValue::Scalar(v)
    }
}

impl From<LazyArray> for ColumnValue {
    fn from(v: LazyArray) -> Self {
        ColumnValue::Array(v)
    }
}

impl From<ArrayRef> for ColumnValue {
    fn from(v: ArrayRef) -> Self {
        ColumnValue::Array(LazyArray::from_array(v))
    }
}

impl From<Vec<f64>> for ColumnValue {
    fn from(v: Vec<f64>) -> Self {
        ColumnValue::from(Arc::new(Float64Array::from(v)) as ArrayRef)
    }
}

impl From<Vec<i64>> for ColumnValue {
    fn from(v: Vec<i64>) -> Self {
        ColumnValue::from(Arc::new(Int64Array::from(v)) as ArrayRef)
    }
}

impl From<Vec<bool>> for ColumnValue {
    fn from(v: Vec<bool>) -> Self {
        ColumnValue::from(Arc::new(BooleanArray::from(v)) as ArrayRef)
    }
}

impl From<ColumnAccessor> for ColumnValue {
    fn from(v: ColumnAccessor) -> Self {
        ColumnValue::Accessor(v)
    }
}

impl From<&ColumnAccessor> for ColumnValue {
    fn from(v: &ColumnAccessor) -> Self {
        ColumnValue::Accessor(v.clone())
    }
}

#[derive(Clone)]
enum OverrideSource {
    Array(LazyArray),
    Deferred(DeferredColumn),
}

#[derive(Clone)]
struct OverrideColumn {
    source: OverrideSource,
    attrs: Attrs,
}

/// State reachable from column accessors without keeping the catalog alive.
pub(crate) struct CatalogShared {
    pub(crate) type_name: &'static str,
    pub(crate) gateway: ComputeGateway,
    pub(crate) attrs: RwLock<Attrs>,
}

impl CatalogShared {
    pub(crate) fn attr(&self, key: &str) -> Option<AttrValue> {
        self.attrs
            .read()
            .expect("catalog attrs lock poisoned")
            .get(key)
            .cloned()
    }
}

/// A distributed collection of particles as a set of named lazy columns.
///
/// Every rank holds its own `Catalog` value with a local slice of the rows. The
/// column set is the union of the source type's hard columns and the per-instance
/// overrides; an override always shadows a hard column of the same name.
///
/// Constructing a catalog with a known local size, and every operation returning
/// a derived catalog, performs a collective sum of the local sizes: all ranks must
/// make the same calls in the same order.
pub struct Catalog {
    source: Arc<dyn HardColumns>,
    comm: CommRef,
    local_size: LocalSize,
    collective_size: OnceLock<u64>,
    overrides: FxHashMap<String, OverrideColumn>,
    options: CatalogOptions,
    shared: Arc<CatalogShared>,
}

impl Catalog {
    /// Catalog over the hard columns of `source`.
    pub fn new<S: ColumnProvider>(
        source: S,
        comm: CommRef,
        local_size: impl Into<LocalSize>,
        options: CatalogOptions,
    ) -> Result<Self> {
        Self::with_source(Arc::new(source), comm, local_size, options)
    }

    /// Like [`Catalog::new`] for an already type-erased source.
    pub fn with_source(
        source: Arc<dyn HardColumns>,
        comm: CommRef,
        local_size: impl Into<LocalSize>,
        options: CatalogOptions,
    ) -> Result<Self> {
        let shared = Arc::new(CatalogShared {
            type_name: source.type_name(),
            gateway: ComputeGateway::new(
                ComputeEngine::new(options.engine),
                options.cache,
                options.use_cache,
            ),
            attrs: RwLock::new(Attrs::new()),
        });
        let catalog = Self {
            source,
            comm,
            local_size: local_size.into(),
            collective_size: OnceLock::new(),
            overrides: FxHashMap::default(),
            options,
            shared,
        };
        if catalog.local_size.is_known() {
            catalog.update_collective_size()?;
        }
        Ok(catalog)
    }

    /// A catalog with only the default columns, on the process-wide default
    /// communicator.
    pub fn base(local_size: impl Into<LocalSize>) -> Result<Self> {
        Self::new(BaseSource, CurrentComm::get(), local_size, CatalogOptions::default())
    }

    /// Build a plain catalog (default columns only) of `local_size` rows and assign
    /// every given column to it.
    ///
    /// The result has empty attributes and does not depend on whatever produced the
    /// columns.
    pub fn from_columns<I, K, V>(
        local_size: impl Into<LocalSize>,
        comm: CommRef,
        options: CatalogOptions,
        columns: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ColumnValue>,
    {
        let mut catalog = Self::new(BaseSource, comm, local_size, options)?;
        for (name, value) in columns {
            catalog.set(name, value)?;
        }
        Ok(catalog)
    }

    pub fn type_name(&self) -> &'static str {
        self.shared.type_name
    }

    pub fn comm(&self) -> &CommRef {
        &self.comm
    }

    pub fn local_size(&self) -> LocalSize {
        self.local_size
    }

    /// Rows on this rank. Fails while the size is unknown.
    pub fn len(&self) -> Result<usize> {
        self.local_size
            .known()
            .ok_or_else(|| Error::SizeRequired("catalog length is not defined".into()))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Sum of the local sizes over every rank.
    pub fn collective_size(&self) -> Result<u64> {
        self.collective_size.get().copied().ok_or_else(|| {
            Error::SizeRequired("collective size is computed once the local size is known".into())
        })
    }

    /// Compute the collective size with an all-ranks sum. Later calls return the
    /// memoized value without communicating.
    pub fn update_collective_size(&self) -> Result<u64> {
        let local = self.local_size.known().ok_or_else(|| {
            Error::SizeRequired("cannot compute the collective size of a catalog of unknown size".into())
        })?;
        if let Some(&total) = self.collective_size.get() {
            return Ok(total);
        }

        let total = self.comm.allreduce_sum(local as u64)?;
        let total = *self.collective_size.get_or_init(|| total);
        if self.comm.rank() == 0 {
            tracing::debug!(local_size = local, "rank 0, local number of particles");
            tracing::info!(catalog = %self, collective_size = total, "total number of particles");
        }
        Ok(total)
    }

    /// Fix the size of a catalog constructed with [`LocalSize::Unknown`], then
    /// compute the collective size. Collective.
    pub fn resolve_local_size(&mut self, local_size: usize) -> Result<u64> {
        if self.local_size.is_known() {
            return Err(Error::ImmutableAttribute("size".into()));
        }
        for (name, column) in &self.overrides {
            if let OverrideSource::Array(array) = &column.source {
                if array.len() != local_size {
                    return Err(Error::length_mismatch(
                        format!("column '{name}'"),
                        local_size,
                        array.len(),
                    ));
                }
            }
        }
        self.local_size = LocalSize::Known(local_size);
        self.update_collective_size()
    }

    pub fn options(&self) -> CatalogOptions {
        CatalogOptions {
            use_cache: self.use_cache(),
            ..self.options
        }
    }

    pub fn use_cache(&self) -> bool {
        self.shared.gateway.use_cache()
    }

    /// Enabling creates the cache region once; disabling drops it.
    pub fn set_use_cache(&mut self, enabled: bool) {
        self.shared.gateway.set_use_cache(enabled);
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.shared.gateway.cache_stats()
    }

    pub(crate) fn gateway(&self) -> &ComputeGateway {
        &self.shared.gateway
    }

    /// Sorted names of the source type's hard columns.
    pub fn hard_columns(&self) -> Vec<String> {
        self.source.hard_column_names()
    }

    /// Sorted, de-duplicated union of hard columns and overrides.
    pub fn columns(&self) -> Vec<String> {
        let mut names = self.hard_columns();
        names.extend(self.overrides.keys().cloned());
        names.sort();
        names.dedup();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.overrides.contains_key(name) || self.hard_columns().iter().any(|n| n == name)
    }

    /// Column names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = String> {
        self.columns().into_iter()
    }

    fn check_len(&self, name: &str, array: &LazyArray) -> Result<()> {
        match self.local_size {
            LocalSize::Known(n) if array.len() != n => Err(Error::length_mismatch(
                format!("column '{name}'"),
                n,
                array.len(),
            )),
            _ => Ok(()),
        }
    }

    /// Look up one column: overrides first, then the hard columns.
    ///
    /// Every call returns a fresh accessor.
    pub fn column(&self, name: &str) -> Result<ColumnAccessor> {
        let (array, attrs) = match self.overrides.get(name) {
            Some(column) => {
                let array = match &column.source {
                    OverrideSource::Array(array) => array.clone(),
                    OverrideSource::Deferred(producer) => {
                        let array = producer(self)?;
                        self.check_len(name, &array)?;
                        array
                    }
                };
                (array, column.attrs.clone())
            }
            None if self.hard_columns().iter().any(|n| n == name) => {
                let array = self.source.hard_column(name, self)?;
                self.check_len(name, &array)?;
                (array, self.source.hard_column_attrs(name)?)
            }
            None => return Err(Error::unknown_columns([name])),
        };
        Ok(ColumnAccessor::new(
            name,
            array,
            Arc::downgrade(&self.shared),
            attrs,
        ))
    }

    /// Accessors for `names`, in order. Every missing name is reported at once.
    pub fn read<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<ColumnAccessor>> {
        let missing: Vec<&str> = names
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| !self.contains(name))
            .collect();
        if !missing.is_empty() {
            return Err(Error::unknown_columns(missing));
        }
        names.iter().map(|name| self.column(name.as_ref())).collect()
    }

    /// A new catalog holding exactly the named columns, with copied attributes.
    pub fn select_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<Catalog> {
        let columns = self.read(names)?;
        let subset = Self::from_columns(
            self.local_size,
            Arc::clone(&self.comm),
            self.options(),
            columns.into_iter().map(|column| (column.name().to_string(), column)),
        )?;
        subset.update_attrs(self.attrs());
        Ok(subset)
    }

    /// Assign a column, shadowing any hard column or override of the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ColumnValue>) -> Result<()> {
        let name = name.into();
        let (array, attrs) = match value.into() {
            ColumnValue::Scalar(value) => {
                let len = self.local_size.known().ok_or_else(|| {
                    Error::SizeRequired(format!("cannot broadcast a scalar to column '{name}'"))
                })?;
                (LazyArray::constant(value, len), Attrs::new())
            }
            ColumnValue::Array(array) => (array, Attrs::new()),
            ColumnValue::Accessor(column) => {
                let attrs = column.attrs().clone();
                (column.into_array(), attrs)
            }
        };
        self.check_len(&name, &array)?;
        tracing::trace!(column = %name, len = array.len(), "set override column");
        self.overrides.insert(
            name,
            OverrideColumn {
                source: OverrideSource::Array(array),
                attrs,
            },
        );
        Ok(())
    }

    /// Assign a column computed from the catalog every time it is read.
    ///
    /// The produced length is checked on each read.
    pub fn set_deferred<F>(&mut self, name: impl Into<String>, producer: F)
    where
        F: Fn(&Catalog) -> Result<LazyArray> + Send + Sync + 'static,
    {
        self.overrides.insert(
            name.into(),
            OverrideColumn {
                source: OverrideSource::Deferred(Arc::new(producer)),
                attrs: Attrs::new(),
            },
        );
    }

    /// Shallow copy: every visible column by reference, plus copied attributes.
    pub fn copy(&self) -> Result<Catalog> {
        if !self.local_size.is_known() {
            return Err(Error::SizeRequired("cannot copy a catalog of unknown size".into()));
        }
        self.select_columns(self.columns().as_slice())
    }

    /// Force `arrays` together through this catalog's gateway. A single array is
    /// returned unwrapped.
    pub fn compute(&self, arrays: &[LazyArray]) -> Result<Forced> {
        self.shared.gateway.compute(arrays)
    }

    /// Force the named columns in one batch, in order.
    pub fn compute_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<ArrayRef>> {
        let arrays: Vec<LazyArray> = self
            .read(names)?
            .into_iter()
            .map(ColumnAccessor::into_array)
            .collect();
        self.shared.gateway.force(&arrays)
    }

    /// Snapshot of the attributes.
    pub fn attrs(&self) -> Attrs {
        self.shared
            .attrs
            .read()
            .expect("catalog attrs lock poisoned")
            .clone()
    }

    pub fn attr(&self, key: &str) -> Option<AttrValue> {
        self.shared.attr(key)
    }

    pub fn set_attr(&self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.shared
            .attrs
            .write()
            .expect("catalog attrs lock poisoned")
            .insert(key.into(), value.into());
    }

    pub fn update_attrs(&self, attrs: impl IntoIterator<Item = (String, AttrValue)>) {
        self.shared
            .attrs
            .write()
            .expect("catalog attrs lock poisoned")
            .extend(attrs);
    }

    /// Write a named property. Only `use_cache` is writable.
    pub fn set_property(&mut self, name: &str, value: impl Into<AttrValue>) -> Result<()> {
        match name {
            "use_cache" => {
                let value = value.into();
                let enabled = value.as_bool().ok_or_else(|| {
                    Error::type_mismatch("property 'use_cache'", "bool", value.kind())
                })?;
                self.set_use_cache(enabled);
                Ok(())
            }
            "size" | "csize" | "columns" | "hardcolumns" | "attrs" => {
                Err(Error::ImmutableAttribute(name.to_string()))
            }
            other => Err(Error::InvalidArgumentError(format!(
                "catalog has no property '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(size={})", self.type_name(), self.local_size)
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("type_name", &self.type_name())
            .field("rank", &self.comm.rank())
            .field("local_size", &self.local_size)
            .field("collective_size", &self.collective_size.get())
            .field("columns", &self.columns())
            .field("use_cache", &self.use_cache())
            .finish()
    }
}
