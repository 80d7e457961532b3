//! Column accessors: a lazy array plus a weak link to the catalog it came from.

use std::fmt;
use std::sync::Weak;

use arrow::array::{ArrayRef, BooleanArray};
use arrow::datatypes::DataType;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use pcat_compute::{ComputeEngine, LazyArray};
use pcat_result::{Error, Result};

use crate::attrs::{AttrValue, Attrs};
use crate::catalog::CatalogShared;

/// One column of a catalog, created fresh by every lookup.
///
/// The back-reference never keeps the catalog alive. Once the catalog is gone the
/// accessor still computes, with a default engine and no cache.
#[derive(Clone)]
pub struct ColumnAccessor {
    name: String,
    array: LazyArray,
    catalog: Weak<CatalogShared>,
    attrs: Attrs,
}

impl ColumnAccessor {
    pub(crate) fn new(
        name: impl Into<String>,
        array: LazyArray,
        catalog: Weak<CatalogShared>,
        attrs: Attrs,
    ) -> Self {
        Self {
            name: name.into(),
            array,
            catalog,
            attrs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn array(&self) -> &LazyArray {
        &self.array
    }

    pub fn into_array(self) -> LazyArray {
        self.array
    }

    pub fn len(&self) -> usize {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    pub fn data_type(&self) -> &DataType {
        self.array.data_type()
    }

    /// Per-column metadata, independent of the catalog's attributes.
    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attrs {
        &mut self.attrs
    }

    /// Whether the owning catalog is still alive.
    pub fn is_attached(&self) -> bool {
        self.catalog.strong_count() > 0
    }

    /// An attribute of the owning catalog.
    pub fn catalog_attr(&self, key: &str) -> Option<AttrValue> {
        self.catalog.upgrade().and_then(|shared| shared.attr(key))
    }

    /// Rows where `mask` is true, keeping name, metadata and catalog link.
    pub fn filter(&self, mask: &BooleanArray) -> Result<ColumnAccessor> {
        Ok(Self {
            array: self.array.filter(mask)?,
            ..self.clone()
        })
    }

    fn force(&self, arrays: &[LazyArray]) -> Result<Vec<ArrayRef>> {
        match self.catalog.upgrade() {
            Some(shared) => shared.gateway.force(arrays),
            None => {
                tracing::warn!(
                    column = %self.name,
                    "owning catalog dropped; computing without its cache"
                );
                ComputeEngine::default().force(arrays)
            }
        }
    }

    /// Materialize through the owning catalog's compute policy.
    pub fn compute(&self) -> Result<ArrayRef> {
        self.force(std::slice::from_ref(&self.array))?
            .pop()
            .ok_or_else(|| Error::Internal(format!("column '{}' produced no array", self.name)))
    }

    /// Name, type and length, followed by the first and last values.
    ///
    /// Only those two rows are computed.
    pub fn describe(&self) -> Result<String> {
        let mut out = format!("{}: {} x {}", self.name, self.len(), self.data_type());
        if self.is_empty() {
            return Ok(out);
        }

        let last = self.len() - 1;
        let mut rows = vec![self.array.slice(0, 1)?];
        if last > 0 {
            rows.push(self.array.slice(last, 1)?);
        }
        let forced = self.force(&rows)?;
        let options = FormatOptions::default();
        for (label, array) in ["first", "last"].iter().zip(&forced) {
            let formatter = ArrayFormatter::try_new(array.as_ref(), &options)?;
            out.push_str(&format!(" {label}: {}", formatter.value(0)));
        }
        Ok(out)
    }
}

impl fmt::Debug for ColumnAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnAccessor")
            .field("name", &self.name)
            .field("array", &self.array)
            .field("attached", &self.is_attached())
            .field("attrs", &self.attrs)
            .finish()
    }
}
