use std::sync::{Arc, LazyLock};

use arrow::array::{Array, AsArray};
use arrow::datatypes::Float64Type;

use pcat_catalog::{
    Catalog, CatalogOptions, ColumnProvider, ColumnTable, MeshOptions, UniformCatalog,
};
use pcat_comm::SelfComm;
use pcat_compute::{BinaryOp, LazyArray};
use pcat_result::Error;

/// A uniform catalog with a per-particle mass, two levels below the defaults.
struct MassiveUniform {
    uniform: UniformCatalog,
    mass: f64,
}

fn uniform(source: &MassiveUniform) -> &UniformCatalog {
    &source.uniform
}

static MASSIVE_TABLE: LazyLock<ColumnTable<MassiveUniform>> = LazyLock::new(|| {
    ColumnTable::<MassiveUniform>::new("MassiveUniform")
        .inherit(uniform)
        .column("Mass", |source, catalog| {
            Ok(LazyArray::constant(source.mass, catalog.len()?))
        })
        .column("Weight", |_, catalog| {
            catalog
                .column("Mass")?
                .array()
                .binary_scalar(BinaryOp::Multiply, 2.0)
        })
});

impl ColumnProvider for MassiveUniform {
    fn column_table() -> &'static ColumnTable<Self> {
        &MASSIVE_TABLE
    }
}

fn massive(size: usize) -> Catalog {
    let source = MassiveUniform {
        uniform: UniformCatalog::new(Arc::new(SelfComm), size, [5.0; 3], 3),
        mass: 0.25,
    };
    let comm = Arc::clone(source.uniform.comm());
    Catalog::new(source, comm, size, CatalogOptions::default()).unwrap()
}

#[test]
fn hard_columns_merge_through_every_level() {
    let cat = massive(6);
    assert_eq!(cat.type_name(), "MassiveUniform");
    assert_eq!(
        cat.hard_columns(),
        vec!["Mass", "Position", "Selection", "Value", "Velocity", "Weight"]
    );

    let weight = cat.column("Weight").unwrap().compute().unwrap();
    assert_eq!(weight.as_primitive::<Float64Type>().values().as_ref(), &[0.5; 6]);
    let position = cat.column("Position").unwrap().compute().unwrap();
    assert_eq!(position.len(), 6);
    let selection = cat.column("Selection").unwrap().compute().unwrap();
    assert_eq!(selection.as_boolean().true_count(), 6);
}

#[test]
fn mesh_gathers_inherited_columns() {
    let cat = massive(4);
    cat.set_attr("Nmesh", 8);
    let mesh = cat.to_mesh(MeshOptions::default().box_size([5.0; 3])).unwrap();
    let columns = mesh.gather().unwrap();
    assert_eq!(columns.position.len(), 4);
    assert_eq!(
        columns.weight.as_primitive::<Float64Type>().values().as_ref(),
        &[0.5; 4]
    );
    assert_eq!(columns.selection.as_boolean().true_count(), 4);
    assert_eq!(mesh.get("Mass").unwrap().len(), 4);

    let misnamed = MeshOptions::default().box_size([5.0; 3]).position("Pos");
    assert!(matches!(
        cat.to_mesh(misnamed).unwrap().gather(),
        Err(Error::UnknownColumn { .. })
    ));
}
