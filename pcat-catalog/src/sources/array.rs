use std::collections::BTreeMap;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef};
use arrow::record_batch::RecordBatch;
use pcat_comm::CommRef;
use pcat_compute::LazyArray;
use pcat_result::{Error, Result};

use crate::attrs::Attrs;
use crate::catalog::{Catalog, CatalogOptions};
use crate::columns::{BaseSource, HardColumns};

/// Adapts named, already materialized Arrow arrays as a catalog.
///
/// The arrays become hard columns; their common length is the local size.
pub struct ArrayCatalog {
    columns: BTreeMap<String, LazyArray>,
}

impl ArrayCatalog {
    /// Catalog over `arrays`. All arrays must have the same length. Collective.
    pub fn from_arrays<I, K>(comm: CommRef, arrays: I, options: CatalogOptions) -> Result<Catalog>
    where
        I: IntoIterator<Item = (K, ArrayRef)>,
        K: Into<String>,
    {
        let mut columns = BTreeMap::new();
        let mut size = None;
        for (name, array) in arrays {
            let name = name.into();
            match size {
                None => size = Some(array.len()),
                Some(expected) if expected != array.len() => {
                    return Err(Error::length_mismatch(
                        format!("array column '{name}'"),
                        expected,
                        array.len(),
                    ));
                }
                Some(_) => {}
            }
            columns.insert(name, LazyArray::from_array(array));
        }
        let size = size.ok_or_else(|| {
            Error::InvalidArgumentError("an array catalog needs at least one column".into())
        })?;

        Catalog::with_source(Arc::new(ArrayCatalog { columns }), comm, size, options)
    }

    /// Catalog with one column per field of `batch`.
    pub fn from_record_batch(
        comm: CommRef,
        batch: &RecordBatch,
        options: CatalogOptions,
    ) -> Result<Catalog> {
        let schema = batch.schema();
        let arrays = schema
            .fields()
            .iter()
            .zip(batch.columns())
            .map(|(field, array)| (field.name().clone(), Arc::clone(array)));
        Self::from_arrays(comm, arrays, options)
    }
}

impl HardColumns for ArrayCatalog {
    fn type_name(&self) -> &'static str {
        "ArrayCatalog"
    }

    fn hard_column_names(&self) -> Vec<String> {
        let mut names = BaseSource.hard_column_names();
        names.extend(self.columns.keys().cloned());
        names.sort();
        names.dedup();
        names
    }

    fn hard_column(&self, name: &str, catalog: &Catalog) -> Result<LazyArray> {
        match self.columns.get(name) {
            Some(array) => Ok(array.clone()),
            None => BaseSource.hard_column(name, catalog),
        }
    }

    fn hard_column_attrs(&self, name: &str) -> Result<Attrs> {
        if self.columns.contains_key(name) {
            Ok(Attrs::new())
        } else {
            BaseSource.hard_column_attrs(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{AsArray, Float64Array, Int64Array};
    use arrow::datatypes::{DataType, Field, Float64Type, Schema};
    use pcat_comm::SelfComm;

    fn mass() -> ArrayRef {
        Arc::new(Float64Array::from(vec![1.0, 2.0, 3.0]))
    }

    #[test]
    fn size_is_inferred_from_the_arrays() {
        let ids: ArrayRef = Arc::new(Int64Array::from(vec![7, 8, 9]));
        let cat = ArrayCatalog::from_arrays(
            Arc::new(SelfComm),
            [("Mass", mass()), ("ID", ids)],
            CatalogOptions::default(),
        )
        .unwrap();
        assert_eq!(cat.len().unwrap(), 3);
        assert_eq!(cat.type_name(), "ArrayCatalog");
        assert_eq!(cat.columns(), vec!["ID", "Mass", "Selection", "Value", "Weight"]);
        assert_eq!(cat.hard_columns(), cat.columns());
        assert_eq!(cat.column("Weight").unwrap().len(), 3);
    }

    #[test]
    fn lengths_must_agree() {
        let short: ArrayRef = Arc::new(Float64Array::from(vec![1.0]));
        let err = ArrayCatalog::from_arrays(
            Arc::new(SelfComm),
            [("Mass", mass()), ("Radius", short)],
            CatalogOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::LengthMismatch { expected: 3, actual: 1, .. }));

        let none: Vec<(String, ArrayRef)> = Vec::new();
        assert!(ArrayCatalog::from_arrays(Arc::new(SelfComm), none, CatalogOptions::default()).is_err());
    }

    #[test]
    fn record_batches_map_fields_to_columns() {
        let schema = Arc::new(Schema::new(vec![Field::new("Mass", DataType::Float64, false)]));
        let batch = RecordBatch::try_new(schema, vec![mass()]).unwrap();
        let cat =
            ArrayCatalog::from_record_batch(Arc::new(SelfComm), &batch, CatalogOptions::default())
                .unwrap();
        let values = cat.column("Mass").unwrap().compute().unwrap();
        assert_eq!(values.as_primitive::<Float64Type>().value(2), 3.0);
    }
}
