use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, Float64Array};
use arrow::datatypes::Float64Type;

use pcat::{
    ArrayCatalog, CatalogOptions, CommRef, Communicator, CompareOp, MemoryWriter, MeshOptions,
    SelfComm, ThreadComm,
};

#[test]
fn select_save_and_grid_through_the_facade() {
    pcat_test_utils::init_tracing_for_tests();
    let comm: CommRef = Arc::new(SelfComm);
    let mut cat = ArrayCatalog::from_arrays(
        comm,
        [(
            "Mass",
            Arc::new(Float64Array::from(vec![2.0, 0.5, 4.0])) as ArrayRef,
        )],
        CatalogOptions::default(),
    )
    .unwrap();
    cat.set("Position", vec![0.0, 1.0, 2.0]).unwrap();
    cat.set_attr("BoxSize", 10.0);
    cat.set_attr("Nmesh", 16);

    let heavy = cat
        .column("Mass")
        .unwrap()
        .array()
        .compare_scalar(CompareOp::Gt, 1.0)
        .unwrap();
    let subset = cat.get(heavy).unwrap().into_catalog().unwrap();
    assert_eq!(subset.collective_size().unwrap(), 2);

    let mut writer = MemoryWriter::new();
    subset.save(&mut writer, &["Mass"], None, "Header").unwrap();
    let (mass, _) = &writer.datasets["Mass"];
    assert_eq!(mass.as_primitive::<Float64Type>().values().as_ref(), &[2.0, 4.0]);

    let mesh = subset.to_mesh(MeshOptions::default()).unwrap();
    assert_eq!(mesh.nmesh(), [16; 3]);
    assert_eq!(mesh.box_size(), [10.0; 3]);
    assert_eq!(mesh.gather().unwrap().position.len(), 2);
}

#[test]
fn thread_groups_are_reachable_from_the_facade() {
    let comms = ThreadComm::group(2).unwrap();
    assert_eq!(comms.len(), 2);
    assert_eq!(comms[1].size(), 2);
}
