use std::collections::BTreeMap;
use std::fs::File;
use std::sync::Arc;

use arrow::array::{AsArray, Float64Array};
use arrow::datatypes::Float64Type;
use arrow::ipc::reader::FileReader;

use pcat_catalog::{
    AttrValue, BaseSource, Catalog, CatalogOptions, IpcDirectoryWriter, MemoryWriter,
};
use pcat_comm::SelfComm;
use pcat_result::Error;

fn catalog() -> Catalog {
    let mut cat = Catalog::new(BaseSource, Arc::new(SelfComm), 3, CatalogOptions::default()).unwrap();
    let mut mass = cat.column("Weight").unwrap();
    mass.attrs_mut().insert("unit".into(), "Msun/h".into());
    cat.set("Mass", mass).unwrap();
    cat.set("Radius", vec![0.1, 0.2, 0.3]).unwrap();

    let mut cosmo = BTreeMap::new();
    cosmo.insert("h".to_string(), AttrValue::Float(0.7));
    cat.set_attr("BoxSize", [100.0, 100.0, 50.0]);
    cat.set_attr("cosmo", cosmo);
    cat.set_attr("label", "run-1");
    cat
}

#[test]
fn memory_writer_receives_columns_and_encoded_attrs() {
    let cat = catalog();
    let mut writer = MemoryWriter::new();
    cat.save(&mut writer, &["Mass", "Radius"], Some(&["m", "r"][..]), "Header")
        .unwrap();

    let header = &writer.headers["Header"];
    assert_eq!(header["BoxSize"], AttrValue::from([100.0, 100.0, 50.0]));
    assert_eq!(header["label"], AttrValue::from("run-1"));
    let encoded = header["cosmo"].as_str().unwrap();
    assert!(encoded.starts_with("json://"));
    assert_eq!(
        AttrValue::decode_fallback(encoded).unwrap(),
        cat.attr("cosmo").unwrap()
    );

    let (mass, attrs) = &writer.datasets["m"];
    assert_eq!(mass.as_primitive::<Float64Type>().values().as_ref(), &[1.0; 3]);
    assert_eq!(attrs["unit"], AttrValue::from("Msun/h"));
    assert!(writer.datasets.contains_key("r"));
}

#[test]
fn dataset_names_must_line_up_with_columns() {
    let cat = catalog();
    let mut writer = MemoryWriter::new();
    let err = cat
        .save(&mut writer, &["Mass", "Radius"], Some(&["m"][..]), "Header")
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgumentError(_)));

    let err = cat
        .save(&mut writer, &["Mass", "Color"], None, "Header")
        .unwrap_err();
    assert!(matches!(err, Error::UnknownColumn { .. }));
    assert!(writer.headers.is_empty());
}

#[test]
fn ipc_directory_holds_one_file_per_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let cat = catalog();
    let mut writer = IpcDirectoryWriter::create(dir.path(), 0).unwrap();
    cat.save(&mut writer, &["Radius", "Mass"], None, "Header").unwrap();

    let header: BTreeMap<String, AttrValue> =
        serde_json::from_reader(File::open(writer.header_path("Header")).unwrap()).unwrap();
    assert_eq!(header["label"], AttrValue::from("run-1"));
    assert_eq!(
        AttrValue::decode_fallback(header["BoxSize"].as_str().unwrap()).unwrap(),
        AttrValue::from([100.0, 100.0, 50.0])
    );

    let file = File::open(writer.dataset_path("Mass")).unwrap();
    let reader = FileReader::try_new(file, None).unwrap();
    let schema = reader.schema();
    assert_eq!(schema.metadata()["unit"], "Msun/h");
    let batches: Vec<_> = reader.collect::<Result<_, _>>().unwrap();
    assert_eq!(batches.len(), 1);
    let mass = batches[0].column(0).as_primitive::<Float64Type>();
    assert_eq!(mass, &Float64Array::from(vec![1.0; 3]));
}
