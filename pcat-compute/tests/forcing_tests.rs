use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array};
use arrow::datatypes::{DataType, Float64Type};

use pcat_compute::{
    BinaryOp, CacheConfig, CompareOp, ComputeEngine, ComputeGateway, EngineOptions, LazyArray,
};
use pcat_result::Error;

fn positions() -> LazyArray {
    LazyArray::from_array(Arc::new(Float64Array::from(vec![0.1, 0.4, 0.9, 0.25, 0.7])))
}

#[test]
fn forcing_twice_is_idempotent() {
    pcat_test_utils::init_tracing_for_tests();
    let x = positions();
    let scaled = x.binary_scalar(BinaryOp::Multiply, 10.0).unwrap();
    let inside = scaled
        .compare_scalar(CompareOp::Lt, 5.0)
        .unwrap()
        .and(&x.compare_scalar(CompareOp::Gt, 0.2).unwrap())
        .unwrap();

    for use_cache in [false, true] {
        let gateway = ComputeGateway::new(ComputeEngine::default(), CacheConfig::default(), use_cache);
        let first = gateway.force(&[scaled.clone(), inside.clone()]).unwrap();
        let second = gateway.force(&[scaled.clone(), inside.clone()]).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first[1].as_boolean().iter().collect::<Vec<_>>(),
            vec![Some(false), Some(true), Some(false), Some(true), Some(false)]
        );
    }
}

#[test]
fn tiny_cache_budget_never_changes_results() {
    let x = positions();
    let graphs: Vec<LazyArray> = (0..8)
        .map(|i| x.binary_scalar(BinaryOp::Add, i as f64).unwrap())
        .collect();

    let uncached = ComputeEngine::default().force(&graphs).unwrap();
    let gateway = ComputeGateway::new(
        ComputeEngine::default(),
        CacheConfig { capacity_bytes: 300 },
        true,
    );
    for _ in 0..3 {
        assert_eq!(gateway.force(&graphs).unwrap(), uncached);
    }
    let stats = gateway.cache_stats().unwrap();
    assert!(stats.evictions > 0 || stats.rejected > 0);
}

#[test]
fn optimized_constant_selection_matches() {
    let mask = BooleanArray::from(vec![true, false, true, false, true]);
    let weights = LazyArray::constant(1.0, 5).filter(&mask).unwrap();
    let engine = ComputeEngine::new(EngineOptions { optimize_graph: true });
    let out = engine.force(&[weights]).unwrap();
    assert_eq!(out[0].as_primitive::<Float64Type>().values().as_ref(), &[1.0, 1.0, 1.0]);
}

#[test]
fn casts_and_negation_compose() {
    let ids = LazyArray::from_array(Arc::new(Int64Array::from(vec![3, 4])) as ArrayRef);
    let as_float = ids.cast(DataType::Float64).unwrap();
    let not_big = as_float.compare_scalar(CompareOp::GtEq, 4.0).unwrap().not().unwrap();
    let out = ComputeEngine::default().force(&[as_float, not_big]).unwrap();
    assert_eq!(out[0].data_type(), &DataType::Float64);
    assert_eq!(out[1].as_boolean().true_count(), 1);

    assert!(matches!(ids.not(), Err(Error::TypeMismatch { .. })));
}
