//! Dict-like and array-like indexing of catalogs.

use std::ops::{Range, RangeFrom, RangeFull, RangeTo};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Int64Type};
use pcat_compute::{LazyArray, ScalarValue};
use pcat_result::{Error, Result};

use crate::accessor::ColumnAccessor;
use crate::catalog::Catalog;
use crate::subset::{RowMask, get_catalog_subset};

/// Rows `start..stop` every `step`, with negative positions counted from the end.
///
/// Out-of-range bounds are clamped to the catalog, as in ordinary slicing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowSlice {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: i64,
}

impl RowSlice {
    pub fn new(start: Option<i64>, stop: Option<i64>, step: i64) -> Self {
        Self { start, stop, step }
    }

    /// Row positions selected from `len` rows, in slice order.
    pub fn positions(&self, len: usize) -> Result<Vec<usize>> {
        if self.step == 0 {
            return Err(Error::InvalidSelector("slice step cannot be zero".into()));
        }
        let len = len as i64;
        let (lower, upper) = if self.step > 0 { (0, len) } else { (-1, len - 1) };
        let clamp = |bound: i64| {
            if bound < 0 {
                (bound + len).max(lower)
            } else {
                bound.min(upper)
            }
        };
        let start = self
            .start
            .map_or(if self.step > 0 { lower } else { upper }, clamp);
        let stop = self
            .stop
            .map_or(if self.step > 0 { upper } else { lower }, clamp);

        let mut out = Vec::new();
        let mut i = start;
        while (self.step > 0 && i < stop) || (self.step < 0 && i > stop) {
            out.push(i as usize);
            i += self.step;
        }
        Ok(out)
    }
}

impl From<Range<usize>> for RowSlice {
    fn from(r: Range<usize>) -> Self {
        RowSlice::new(Some(r.start as i64), Some(r.end as i64), 1)
    }
}

impl From<RangeFrom<usize>> for RowSlice {
    fn from(r: RangeFrom<usize>) -> Self {
        RowSlice::new(Some(r.start as i64), None, 1)
    }
}

impl From<RangeTo<usize>> for RowSlice {
    fn from(r: RangeTo<usize>) -> Self {
        RowSlice::new(None, Some(r.end as i64), 1)
    }
}

impl From<RangeFull> for RowSlice {
    fn from(_: RangeFull) -> Self {
        RowSlice::new(None, None, 1)
    }
}

/// Everything [`Catalog::get`] accepts.
#[derive(Clone, Debug)]
pub enum Selector {
    /// A single column.
    Column(String),
    /// A column subset.
    Columns(Vec<String>),
    Slice(RowSlice),
    /// Row positions; negative positions count from the end.
    Indices(Vec<i64>),
    /// A deferred boolean mask, forced before use.
    Mask(LazyArray),
    /// A concrete boolean mask or integer row positions.
    Array(ArrayRef),
    /// Never a valid selector; kept so callers get [`Error::InvalidSelector`].
    Scalar(ScalarValue),
}

impl From<&str> for Selector {
    fn from(name: &str) -> Self {
        Selector::Column(name.to_string())
    }
}

impl From<String> for Selector {
    fn from(name: String) -> Self {
        Selector::Column(name)
    }
}

impl From<&[&str]> for Selector {
    fn from(names: &[&str]) -> Self {
        Selector::Columns(names.iter().map(|n| n.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Selector {
    fn from(names: [&str; N]) -> Self {
        Selector::Columns(names.iter().map(|n| n.to_string()).collect())
    }
}

impl From<Vec<String>> for Selector {
    fn from(names: Vec<String>) -> Self {
        Selector::Columns(names)
    }
}

impl From<RowSlice> for Selector {
    fn from(slice: RowSlice) -> Self {
        Selector::Slice(slice)
    }
}

impl From<Range<usize>> for Selector {
    fn from(r: Range<usize>) -> Self {
        Selector::Slice(r.into())
    }
}

impl From<RangeFrom<usize>> for Selector {
    fn from(r: RangeFrom<usize>) -> Self {
        Selector::Slice(r.into())
    }
}

impl From<RangeTo<usize>> for Selector {
    fn from(r: RangeTo<usize>) -> Self {
        Selector::Slice(r.into())
    }
}

impl From<RangeFull> for Selector {
    fn from(r: RangeFull) -> Self {
        Selector::Slice(r.into())
    }
}

impl From<Vec<i64>> for Selector {
    fn from(indices: Vec<i64>) -> Self {
        Selector::Indices(indices)
    }
}

impl From<Vec<bool>> for Selector {
    fn from(mask: Vec<bool>) -> Self {
        Selector::Array(Arc::new(BooleanArray::from(mask)))
    }
}

impl From<BooleanArray> for Selector {
    fn from(mask: BooleanArray) -> Self {
        Selector::Array(Arc::new(mask))
    }
}

impl From<ArrayRef> for Selector {
    fn from(array: ArrayRef) -> Self {
        Selector::Array(array)
    }
}

impl From<LazyArray> for Selector {
    fn from(mask: LazyArray) -> Self {
        Selector::Mask(mask)
    }
}

impl From<&ColumnAccessor> for Selector {
    fn from(mask: &ColumnAccessor) -> Self {
        Selector::Mask(mask.array().clone())
    }
}

impl From<ScalarValue> for Selector {
    fn from(value: ScalarValue) -> Self {
        Selector::Scalar(value)
    }
}

/// Result of [`Catalog::get`]: a column for a name, a derived catalog otherwise.
#[derive(Debug)]
pub enum Selected {
    Column(ColumnAccessor),
    Catalog(Catalog),
}

impl Selected {
    pub fn into_column(self) -> Result<ColumnAccessor> {
        match self {
            Selected::Column(column) => Ok(column),
            Selected::Catalog(catalog) => Err(Error::InvalidArgumentError(format!(
                "expected a column, selection produced {catalog}"
            ))),
        }
    }

    pub fn into_catalog(self) -> Result<Catalog> {
        match self {
            Selected::Catalog(catalog) => Ok(catalog),
            Selected::Column(column) => Err(Error::InvalidArgumentError(format!(
                "expected a catalog, selection produced column '{}'",
                column.name()
            ))),
        }
    }
}

/// Boolean mask of `len` rows with the given positions set.
fn positions_to_mask(positions: impl IntoIterator<Item = i64>, len: usize) -> Result<BooleanArray> {
    let mut mask = vec![false; len];
    for position in positions {
        let resolved = if position < 0 {
            position + len as i64
        } else {
            position
        };
        if resolved < 0 || resolved >= len as i64 {
            return Err(Error::InvalidSelector(format!(
                "row index {position} out of bounds for size {len}"
            )));
        }
        mask[resolved as usize] = true;
    }
    Ok(BooleanArray::from(mask))
}

fn is_integer(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

impl Catalog {
    /// Index the catalog.
    ///
    /// - a name yields that column;
    /// - a list of names yields a catalog with exactly those columns;
    /// - a slice or row positions select rows (needs a known size), with
    ///   positions turned into a mask, so order and repeats are not kept;
    /// - a boolean mask, concrete or deferred, selects rows.
    ///
    /// Row selections go through [`get_catalog_subset`] and are collective.
    pub fn get(&self, selector: impl Into<Selector>) -> Result<Selected> {
        match selector.into() {
            Selector::Column(name) => self.column(&name).map(Selected::Column),
            Selector::Columns(names) => self.select_columns(names.as_slice()).map(Selected::Catalog),
            Selector::Slice(slice) => {
                let len = self.selection_len()?;
                let positions = slice.positions(len)?;
                let mask = positions_to_mask(positions.into_iter().map(|p| p as i64), len)?;
                get_catalog_subset(self, mask).map(Selected::Catalog)
            }
            Selector::Indices(indices) => {
                let len = self.selection_len()?;
                let mask = positions_to_mask(indices, len)?;
                get_catalog_subset(self, mask).map(Selected::Catalog)
            }
            Selector::Mask(mask) => {
                get_catalog_subset(self, RowMask::Deferred(mask)).map(Selected::Catalog)
            }
            Selector::Array(array) => self.select_array(array).map(Selected::Catalog),
            Selector::Scalar(value) => Err(Error::InvalidSelector(format!(
                "scalar {value} is not a column name, slice or mask"
            ))),
        }
    }

    fn selection_len(&self) -> Result<usize> {
        self.local_size()
            .known()
            .ok_or_else(|| Error::SizeRequired("cannot select rows of a catalog of unknown size".into()))
    }

    fn select_array(&self, array: ArrayRef) -> Result<Catalog> {
        let data_type = array.data_type();
        if data_type.is_nested() {
            return Err(Error::InvalidSelector(format!(
                "cannot index a catalog with an array of {data_type}"
            )));
        }
        if !is_integer(data_type) {
            return get_catalog_subset(self, RowMask::Concrete(array));
        }

        if array.null_count() > 0 {
            return Err(Error::InvalidSelector("row indices must not contain nulls".into()));
        }
        let len = self.selection_len()?;
        let positions = cast(&array, &DataType::Int64)?;
        if positions.null_count() > 0 {
            return Err(Error::InvalidSelector(format!(
                "row indices of type {data_type} do not fit in 64-bit positions"
            )));
        }
        let mask = positions_to_mask(
            positions.as_primitive::<Int64Type>().values().iter().copied(),
            len,
        )?;
        get_catalog_subset(self, mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_follow_ordinary_slicing_rules() {
        let all = |s: RowSlice| s.positions(5).unwrap();
        assert_eq!(all(RowSlice::from(1..3)), vec![1, 2]);
        assert_eq!(all(RowSlice::from(..)), vec![0, 1, 2, 3, 4]);
        assert_eq!(all(RowSlice::new(None, None, -2)), vec![4, 2, 0]);
        assert_eq!(all(RowSlice::new(Some(-2), None, 1)), vec![3, 4]);
        assert_eq!(all(RowSlice::new(Some(3), Some(100), 1)), vec![3, 4]);
        assert!(all(RowSlice::new(Some(4), Some(1), 1)).is_empty());
        assert!(matches!(
            RowSlice::new(None, None, 0).positions(5),
            Err(Error::InvalidSelector(_))
        ));
    }

    #[test]
    fn positions_become_masks() {
        let mask = positions_to_mask([3, -1, 0], 5).unwrap();
        assert_eq!(
            mask.iter().collect::<Vec<_>>(),
            vec![Some(true), Some(false), Some(false), Some(true), Some(true)]
        );
        assert!(matches!(
            positions_to_mask([5], 5),
            Err(Error::InvalidSelector(_))
        ));
        assert!(matches!(
            positions_to_mask([-6], 5),
            Err(Error::InvalidSelector(_))
        ));
    }
}
