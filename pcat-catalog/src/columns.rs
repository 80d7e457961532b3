//! Hard-column resolution.
//!
//! Every concrete catalog source declares a static [`ColumnTable`]: an ordered
//! list of `(name, getter)` pairs where each getter is a pure function of the
//! source state and the owning [`Catalog`]. Ancestor tables are merged in at
//! definition time with [`ColumnTable::inherit`], so a lookup walks the type's own
//! declarations first and its ancestors after, to any depth, without any runtime
//! reflection.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, LazyLock};

use pcat_compute::LazyArray;
use pcat_result::{Error, Result};

use crate::attrs::Attrs;
use crate::catalog::Catalog;

/// Getter of one hard column on source type `S`.
pub type ColumnGetter<S> = Arc<dyn Fn(&S, &Catalog) -> Result<LazyArray> + Send + Sync>;

/// One declared hard column.
pub struct ColumnDef<S> {
    name: String,
    attrs: Attrs,
    getter: ColumnGetter<S>,
}

impl<S> ColumnDef<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Static metadata attached to every accessor of this column.
    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn get(&self, source: &S, catalog: &Catalog) -> Result<LazyArray> {
        (self.getter)(source, catalog)
    }
}

impl<S> Clone for ColumnDef<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            attrs: self.attrs.clone(),
            getter: Arc::clone(&self.getter),
        }
    }
}

/// Static hard-column table of one source type, ancestors included.
pub struct ColumnTable<S> {
    type_name: &'static str,
    declared: Vec<ColumnDef<S>>,
    inherited: Vec<ColumnDef<S>>,
}

impl<S: 'static> ColumnTable<S> {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            declared: Vec::new(),
            inherited: Vec::new(),
        }
    }

    /// Declare a column on this type.
    pub fn column<F>(self, name: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&S, &Catalog) -> Result<LazyArray> + Send + Sync + 'static,
    {
        self.column_with_attrs(name, Attrs::new(), getter)
    }

    pub fn column_with_attrs<F>(mut self, name: impl Into<String>, attrs: Attrs, getter: F) -> Self
    where
        F: Fn(&S, &Catalog) -> Result<LazyArray> + Send + Sync + 'static,
    {
        self.declared.push(ColumnDef {
            name: name.into(),
            attrs,
            getter: Arc::new(getter),
        });
        self
    }

    /// Merge every column of ancestor `P`'s table (itself already merged with its
    /// ancestors). `upcast` reaches the ancestor state embedded in `S`.
    pub fn inherit<P: ColumnProvider>(mut self, upcast: fn(&S) -> &P) -> Self {
        let parent = P::column_table();
        for def in parent.declared.iter().chain(&parent.inherited) {
            let getter = Arc::clone(&def.getter);
            self.inherited.push(ColumnDef {
                name: def.name.clone(),
                attrs: def.attrs.clone(),
                getter: Arc::new(move |source: &S, catalog: &Catalog| {
                    getter(upcast(source), catalog)
                }),
            });
        }
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Sorted, de-duplicated names of every column reachable from this table.
    pub fn names(&self) -> Vec<String> {
        self.declared
            .iter()
            .chain(&self.inherited)
            .map(|def| def.name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// First declaration of `name`, own columns before ancestors'.
    pub fn resolve(&self, name: &str) -> Result<&ColumnDef<S>> {
        self.declared
            .iter()
            .chain(&self.inherited)
            .find(|def| def.name == name)
            .ok_or_else(|| Error::ColumnNotFound {
                name: name.to_string(),
                type_name: self.type_name.to_string(),
            })
    }
}

impl<S> fmt::Debug for ColumnTable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnTable")
            .field("type_name", &self.type_name)
            .field(
                "declared",
                &self.declared.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            )
            .field(
                "inherited",
                &self.inherited.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// A catalog source type with a static hard-column table.
pub trait ColumnProvider: Send + Sync + Sized + 'static {
    fn column_table() -> &'static ColumnTable<Self>;
}

/// Object-safe view of a source's hard columns, used by [`Catalog`].
///
/// Implemented for every [`ColumnProvider`].
pub trait HardColumns: Send + Sync + 'static {
    fn type_name(&self) -> &'static str;

    fn hard_column_names(&self) -> Vec<String>;

    fn hard_column(&self, name: &str, catalog: &Catalog) -> Result<LazyArray>;

    fn hard_column_attrs(&self, name: &str) -> Result<Attrs>;
}

impl<T: ColumnProvider> HardColumns for T {
    fn type_name(&self) -> &'static str {
        T::column_table().type_name()
    }

    fn hard_column_names(&self) -> Vec<String> {
        T::column_table().names()
    }

    fn hard_column(&self, name: &str, catalog: &Catalog) -> Result<LazyArray> {
        T::column_table().resolve(name)?.get(self, catalog)
    }

    fn hard_column_attrs(&self, name: &str) -> Result<Attrs> {
        Ok(T::column_table().resolve(name)?.attrs().clone())
    }
}

/// Default columns every catalog provides.
///
/// All three need a known local size.
#[derive(Clone, Copy, Debug, Default)]
pub struct BaseSource;

pub const SELECTION: &str = "Selection";
pub const WEIGHT: &str = "Weight";
pub const VALUE: &str = "Value";

static BASE_TABLE: LazyLock<ColumnTable<BaseSource>> = LazyLock::new(|| {
    ColumnTable::<BaseSource>::new("CatalogSource")
        .column(SELECTION, |_, catalog| constant_column(catalog, SELECTION, true))
        .column(WEIGHT, |_, catalog| constant_column(catalog, WEIGHT, 1.0))
        .column(VALUE, |_, catalog| constant_column(catalog, VALUE, 1.0))
});

fn constant_column(
    catalog: &Catalog,
    name: &str,
    value: impl Into<pcat_compute::ScalarValue>,
) -> Result<LazyArray> {
    let len = catalog
        .local_size()
        .known()
        .ok_or_else(|| Error::SizeRequired(format!("cannot build default column '{name}'")))?;
    Ok(LazyArray::constant(value, len))
}

impl ColumnProvider for BaseSource {
    fn column_table() -> &'static ColumnTable<Self> {
        &BASE_TABLE
    }
}
