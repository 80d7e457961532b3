use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray};
use arrow::datatypes::DataType;
use pcat_compute::LazyArray;
use pcat_result::{Error, Result};

use crate::accessor::ColumnAccessor;
use crate::catalog::Catalog;

/// Row selection index for [`get_catalog_subset`].
#[derive(Clone, Debug)]
pub enum RowMask {
    Concrete(ArrayRef),
    /// Forced through the parent's gateway first.
    Deferred(LazyArray),
}

impl From<ArrayRef> for RowMask {
    fn from(array: ArrayRef) -> Self {
        RowMask::Concrete(array)
    }
}

impl From<BooleanArray> for RowMask {
    fn from(mask: BooleanArray) -> Self {
        RowMask::Concrete(Arc::new(mask))
    }
}

impl From<Vec<bool>> for RowMask {
    fn from(mask: Vec<bool>) -> Self {
        BooleanArray::from(mask).into()
    }
}

impl From<LazyArray> for RowMask {
    fn from(mask: LazyArray) -> Self {
        RowMask::Deferred(mask)
    }
}

impl From<&ColumnAccessor> for RowMask {
    fn from(mask: &ColumnAccessor) -> Self {
        RowMask::Deferred(mask.array().clone())
    }
}

/// A new catalog holding the rows of `parent` where `index` is true.
///
/// Every visible column becomes a lazy selection of the parent's column; no data
/// is copied. The result has `count(index)` rows and a copy of the parent's
/// attributes. Null mask entries drop their row. Collective.
pub fn get_catalog_subset(parent: &Catalog, index: impl Into<RowMask>) -> Result<Catalog> {
    let size = parent
        .local_size()
        .known()
        .ok_or_else(|| Error::SizeRequired("cannot subset a catalog of unknown size".into()))?;
    let index = match index.into() {
        RowMask::Concrete(array) => array,
        RowMask::Deferred(array) => parent.gateway().force_one(&array)?,
    };

    if index.len() != size {
        return Err(Error::length_mismatch("subset index", size, index.len()));
    }
    if index.data_type() != &DataType::Boolean {
        return Err(Error::type_mismatch(
            "subset index",
            DataType::Boolean,
            index.data_type(),
        ));
    }
    let mask = index.as_boolean();
    let new_size = mask.true_count();

    let columns = parent
        .columns()
        .into_iter()
        .map(|name| {
            let column = parent.column(&name)?.filter(mask)?;
            Ok((name, column))
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(
        parent = %parent,
        selected = new_size,
        columns = columns.len(),
        "catalog subset"
    );
    let subset = Catalog::from_columns(
        new_size,
        Arc::clone(parent.comm()),
        parent.options(),
        columns,
    )?;
    subset.update_attrs(parent.attrs());
    Ok(subset)
}
