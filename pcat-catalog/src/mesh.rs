//! Handoff of a catalog to the gridding layer.

use arrow::array::ArrayRef;
use arrow::datatypes::DataType;
use pcat_compute::LazyArray;
use pcat_result::{Error, Result};

use crate::attrs::AttrValue;
use crate::catalog::Catalog;
use crate::columns::{SELECTION, VALUE, WEIGHT};

/// Interpolation windows understood by the gridding layer.
pub const WINDOW_METHODS: &[&str] = &[
    "cic", "tsc", "nnb", "nearest", "linear", "quadratic", "cubic", "lanczos2", "lanczos3",
    "lanczos4", "lanczos5", "lanczos6", "acg2", "acg3", "acg4", "acg5", "acg6", "db6", "db12",
    "db20", "sym6", "sym12", "sym20",
];

pub const POSITION: &str = "Position";

/// Parameters of [`Catalog::to_mesh`].
///
/// `nmesh` and `box_size` fall back to the `Nmesh` and `BoxSize` catalog
/// attributes when unset.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshOptions {
    pub nmesh: Option<[usize; 3]>,
    pub box_size: Option<[f64; 3]>,
    pub dtype: DataType,
    pub interlaced: bool,
    pub compensated: bool,
    pub window: String,
    pub weight: String,
    pub value: String,
    pub selection: String,
    pub position: String,
}

impl Default for MeshOptions {
    fn default() -> Self {
        Self {
            nmesh: None,
            box_size: None,
            dtype: DataType::Float32,
            interlaced: false,
            compensated: false,
            window: "cic".to_string(),
            weight: WEIGHT.to_string(),
            value: VALUE.to_string(),
            selection: SELECTION.to_string(),
            position: POSITION.to_string(),
        }
    }
}

impl MeshOptions {
    pub fn nmesh(mut self, nmesh: [usize; 3]) -> Self {
        self.nmesh = Some(nmesh);
        self
    }

    pub fn box_size(mut self, box_size: [f64; 3]) -> Self {
        self.box_size = Some(box_size);
        self
    }

    pub fn dtype(mut self, dtype: DataType) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn interlaced(mut self, interlaced: bool) -> Self {
        self.interlaced = interlaced;
        self
    }

    pub fn compensated(mut self, compensated: bool) -> Self {
        self.compensated = compensated;
        self
    }

    pub fn window(mut self, window: impl Into<String>) -> Self {
        self.window = window.into();
        self
    }

    pub fn weight(mut self, column: impl Into<String>) -> Self {
        self.weight = column.into();
        self
    }

    pub fn value(mut self, column: impl Into<String>) -> Self {
        self.value = column.into();
        self
    }

    pub fn selection(mut self, column: impl Into<String>) -> Self {
        self.selection = column.into();
        self
    }

    pub fn position(mut self, column: impl Into<String>) -> Self {
        self.position = column.into();
        self
    }
}

/// Validated view of a catalog for gridding. Borrows the catalog; never mutates it.
#[derive(Debug)]
pub struct CatalogMesh<'a> {
    catalog: &'a Catalog,
    nmesh: [usize; 3],
    box_size: [f64; 3],
    options: MeshOptions,
}

/// Concrete per-rank inputs of a painting step.
#[derive(Clone, Debug)]
pub struct MeshColumns {
    pub position: ArrayRef,
    pub weight: ArrayRef,
    pub value: ArrayRef,
    pub selection: ArrayRef,
}

fn attr_vector(catalog: &Catalog, key: &str) -> Result<Option<[f64; 3]>> {
    match catalog.attr(key) {
        None => Ok(None),
        Some(value) => value.as_f64_array::<3>().map(Some).ok_or_else(|| {
            Error::type_mismatch(format!("attribute '{key}'"), "number or 3 numbers", describe(&value))
        }),
    }
}

fn describe(value: &AttrValue) -> String {
    format!("{} {value}", value.kind())
}

impl<'a> CatalogMesh<'a> {
    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    pub fn nmesh(&self) -> [usize; 3] {
        self.nmesh
    }

    pub fn box_size(&self) -> [f64; 3] {
        self.box_size
    }

    pub fn options(&self) -> &MeshOptions {
        &self.options
    }

    pub fn dtype(&self) -> &DataType {
        &self.options.dtype
    }

    pub fn window(&self) -> &str {
        &self.options.window
    }

    pub fn interlaced(&self) -> bool {
        self.options.interlaced
    }

    pub fn compensated(&self) -> bool {
        self.options.compensated
    }

    /// Look up a column of the underlying catalog.
    pub fn get(&self, name: &str) -> Result<LazyArray> {
        Ok(self.catalog.column(name)?.into_array())
    }

    /// Force position, weight, value and selection in one batch.
    pub fn gather(&self) -> Result<MeshColumns> {
        let o = &self.options;
        let mut arrays = self
            .catalog
            .compute_columns(&[&o.position, &o.weight, &o.value, &o.selection])?
            .into_iter();
        let mut next = || {
            arrays
                .next()
                .ok_or_else(|| Error::Internal("mesh columns forced short".into()))
        };
        Ok(MeshColumns {
            position: next()?,
            weight: next()?,
            value: next()?,
            selection: next()?,
        })
    }
}

impl Catalog {
    /// Validate gridding parameters and wrap the catalog for the gridding layer.
    ///
    /// Checks, in order: weight and selection columns exist, the window is known,
    /// and the box size and mesh resolution come from `options` or the attributes.
    pub fn to_mesh(&self, options: MeshOptions) -> Result<CatalogMesh<'_>> {
        let missing: Vec<&str> = [&options.weight, &options.selection]
            .into_iter()
            .map(String::as_str)
            .filter(|name| !self.contains(name))
            .collect();
        if !missing.is_empty() {
            return Err(Error::unknown_columns(missing));
        }

        if !WINDOW_METHODS.contains(&options.window.as_str()) {
            return Err(Error::InvalidWindow {
                window: options.window.clone(),
                valid: WINDOW_METHODS.iter().map(|w| w.to_string()).collect(),
            });
        }

        let box_size = match options.box_size {
            Some(box_size) => box_size,
            None => attr_vector(self, "BoxSize")?
                .ok_or_else(|| Error::MissingParameter("BoxSize".into()))?,
        };
        let nmesh = match options.nmesh {
            Some(nmesh) => {
                if nmesh.contains(&0) {
                    return Err(Error::InvalidArgumentError(format!(
                        "Nmesh must hold positive integers, got {nmesh:?}"
                    )));
                }
                nmesh
            }
            None => {
                let raw = attr_vector(self, "Nmesh")?
                    .ok_or_else(|| Error::MissingParameter("Nmesh".into()))?;
                let mut nmesh = [0usize; 3];
                for (slot, n) in nmesh.iter_mut().zip(raw) {
                    if n < 1.0 || n.fract() != 0.0 {
                        return Err(Error::InvalidArgumentError(format!(
                            "Nmesh must hold positive integers, got {raw:?}"
                        )));
                    }
                    *slot = n as usize;
                }
                nmesh
            }
        };

        tracing::debug!(?nmesh, ?box_size, window = %options.window, "catalog to mesh");
        Ok(CatalogMesh {
            catalog: self,
            nmesh,
            box_size,
            options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use pcat_comm::SelfComm;

    use crate::catalog::CatalogOptions;
    use crate::columns::BaseSource;

    fn catalog() -> Catalog {
        Catalog::new(BaseSource, Arc::new(SelfComm), 2, CatalogOptions::default()).unwrap()
    }

    #[test]
    fn parameters_fall_back_to_attrs() {
        let cat = catalog();
        assert!(matches!(
            cat.to_mesh(MeshOptions::default()),
            Err(Error::MissingParameter(ref p)) if p == "BoxSize"
        ));

        cat.set_attr("BoxSize", 100.0);
        assert!(matches!(
            cat.to_mesh(MeshOptions::default()),
            Err(Error::MissingParameter(ref p)) if p == "Nmesh"
        ));

        cat.set_attr("Nmesh", vec![8, 8, 16]);
        let mesh = cat.to_mesh(MeshOptions::default()).unwrap();
        assert_eq!(mesh.box_size(), [100.0; 3]);
        assert_eq!(mesh.nmesh(), [8, 8, 16]);
        assert_eq!(mesh.dtype(), &DataType::Float32);

        let explicit = cat.to_mesh(MeshOptions::default().nmesh([4; 3])).unwrap();
        assert_eq!(explicit.nmesh(), [4; 3]);

        cat.set_attr("Nmesh", 0);
        assert!(matches!(
            cat.to_mesh(MeshOptions::default()),
            Err(Error::InvalidArgumentError(_))
        ));
        assert!(matches!(
            cat.to_mesh(MeshOptions::default().nmesh([8, 0, 8])),
            Err(Error::InvalidArgumentError(_))
        ));
    }

    #[test]
    fn columns_and_window_are_validated() {
        let cat = catalog();
        let base = MeshOptions::default().nmesh([4; 3]).box_size([1.0; 3]);
        assert!(matches!(
            cat.to_mesh(base.clone().weight("Mass")),
            Err(Error::UnknownColumn { ref names }) if names == &["Mass"]
        ));
        assert!(matches!(
            cat.to_mesh(base.clone().window("sinc")),
            Err(Error::InvalidWindow { ref window, .. }) if window == "sinc"
        ));
        assert!(cat.to_mesh(base.window("tsc")).is_ok());
    }
}
