//! Batch evaluation of lazy arrays.

use arrow::array::{Array, ArrayRef};
use arrow::compute::{cast, filter, take};
use pcat_result::{Error, Result};
use rustc_hash::FxHashMap;

use crate::cache::ArrayCache;
use crate::kernels::{compute_binary, compute_compare, compute_logical, compute_not};
use crate::lazy::{LazyArray, Op};
use crate::optimize::optimize;

/// Knobs for [`ComputeEngine`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Rewrite graphs before evaluating them. Off by default: a naive walk never
    /// re-reads producers more often than the graph asks for.
    pub optimize_graph: bool,
}

/// Evaluates batches of [`LazyArray`]s.
///
/// All handles of one call are evaluated together: a node reachable from several
/// handles is computed once per call.
#[derive(Clone, Copy, Debug, Default)]
pub struct ComputeEngine {
    options: EngineOptions,
}

impl ComputeEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// Evaluate every handle, returning one array per handle in input order.
    pub fn force(&self, arrays: &[LazyArray]) -> Result<Vec<ArrayRef>> {
        self.run(arrays, None)
    }

    /// Like [`ComputeEngine::force`], serving and recording intermediate results
    /// through `cache`.
    pub fn force_cached(&self, arrays: &[LazyArray], cache: &mut ArrayCache) -> Result<Vec<ArrayRef>> {
        self.run(arrays, Some(cache))
    }

    fn run(&self, arrays: &[LazyArray], cache: Option<&mut ArrayCache>) -> Result<Vec<ArrayRef>> {
        let roots = if self.options.optimize_graph {
            optimize(arrays)
        } else {
            arrays.to_vec()
        };

        let mut eval = Evaluation {
            memo: FxHashMap::default(),
            cache,
            computed: 0,
        };
        let out = roots
            .iter()
            .map(|root| eval.eval(root))
            .collect::<Result<Vec<_>>>()?;
        tracing::trace!(
            roots = arrays.len(),
            computed = eval.computed,
            optimized = self.options.optimize_graph,
            "forced batch"
        );
        Ok(out)
    }
}

struct Evaluation<'c> {
    memo: FxHashMap<u64, ArrayRef>,
    cache: Option<&'c mut ArrayCache>,
    computed: usize,
}

fn is_cacheable(op: &Op) -> bool {
    !matches!(op, Op::Constant(_) | Op::Block(_) | Op::Slice { .. })
}

impl Evaluation<'_> {
    fn eval(&mut self, array: &LazyArray) -> Result<ArrayRef> {
        let node = &array.node;
        if let Some(done) = self.memo.get(&node.id) {
            return Ok(done.clone());
        }

        let cacheable = is_cacheable(&node.op);
        if cacheable {
            if let Some(hit) = self.cache.as_deref_mut().and_then(|c| c.get(node.key, array)) {
                tracing::trace!(id = node.id, key = node.key, "cache hit");
                self.memo.insert(node.id, hit.clone());
                return Ok(hit);
            }
        }

        let out: ArrayRef = match &node.op {
            Op::Constant(value) => value.to_array(node.len),
            Op::Block(block) => block.clone(),
            Op::Generate { label, producer } => {
                tracing::debug!(label = %label, len = node.len, "running producer");
                producer()?
            }
            Op::Filter { input, mask } => {
                let input = self.eval(input)?;
                filter(input.as_ref(), mask.as_ref())?
            }
            Op::Take { input, indices } => {
                let input = self.eval(input)?;
                take(input.as_ref(), indices.as_ref(), None)?
            }
            Op::Slice { input, offset } => self.eval(input)?.slice(*offset, node.len),
            Op::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                compute_binary(&lhs, &rhs, *op)?
            }
            Op::Compare { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                compute_compare(&lhs, *op, &rhs)?
            }
            Op::Logical { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                compute_logical(&lhs, *op, &rhs)?
            }
            Op::Not(input) => compute_not(&self.eval(input)?)?,
            Op::Cast(input) => cast(&self.eval(input)?, &node.data_type)?,
        };
        self.computed += 1;

        if out.len() != node.len {
            return Err(Error::length_mismatch(
                format!("evaluating {array:?}"),
                node.len,
                out.len(),
            ));
        }
        if out.data_type() != &node.data_type {
            return Err(Error::type_mismatch(
                format!("evaluating {array:?}"),
                &node.data_type,
                out.data_type(),
            ));
        }

        if cacheable {
            if let Some(cache) = self.cache.as_deref_mut() {
                cache.insert(node.key, array.clone(), out.clone());
            }
        }
        self.memo.insert(node.id, out.clone());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{BinaryOp, CompareOp};
    use arrow::array::{AsArray, BooleanArray, Float64Array, Int64Array};
    use arrow::datatypes::{DataType, Float64Type, Int64Type};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_producer(counter: Arc<AtomicUsize>, values: Vec<f64>) -> LazyArray {
        let len = values.len();
        LazyArray::generate(
            "counting",
            len,
            DataType::Float64,
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(Float64Array::from(values.clone())) as ArrayRef)
            }),
        )
    }

    #[test]
    fn shared_subgraphs_are_evaluated_once_per_batch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let base = counting_producer(Arc::clone(&calls), vec![1.0, 2.0, 3.0]);
        let doubled = base.binary_scalar(BinaryOp::Multiply, 2.0).unwrap();
        let big = base.compare_scalar(CompareOp::Gt, 1.5).unwrap();

        let out = ComputeEngine::default()
            .force(&[doubled, big, base.clone()])
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(out[0].as_primitive::<Float64Type>().values().as_ref(), &[2.0, 4.0, 6.0]);
        assert_eq!(
            out[1].as_boolean().iter().collect::<Vec<_>>(),
            vec![Some(false), Some(true), Some(true)]
        );

        // A second call starts from scratch without a cache.
        ComputeEngine::default().force(&[base]).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn producer_shape_is_checked() {
        let bad = LazyArray::generate(
            "short",
            4,
            DataType::Int64,
            Arc::new(|| Ok(Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef)),
        );
        let err = ComputeEngine::default().force(&[bad]).unwrap_err();
        assert!(matches!(err, Error::LengthMismatch { expected: 4, actual: 2, .. }));

        let wrong_type = LazyArray::generate(
            "floats",
            1,
            DataType::Int64,
            Arc::new(|| Ok(Arc::new(Float64Array::from(vec![1.0])) as ArrayRef)),
        );
        let err = ComputeEngine::default().force(&[wrong_type]).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn selection_ops_evaluate_in_order() {
        let x = LazyArray::from_array(Arc::new(Int64Array::from(vec![10, 20, 30, 40])));
        let picked = x
            .filter(&BooleanArray::from(vec![true, false, true, true]))
            .unwrap()
            .take(&arrow::array::UInt64Array::from(vec![2, 0]))
            .unwrap();
        let out = ComputeEngine::default().force(&[picked]).unwrap();
        assert_eq!(out[0].as_primitive::<Int64Type>().values().as_ref(), &[40, 10]);
    }

    #[test]
    fn cached_results_are_never_served_for_a_colliding_key() {
        let three = LazyArray::constant(1.0, 2)
            .binary(BinaryOp::Add, &LazyArray::constant(2.0, 2))
            .unwrap();
        let half = LazyArray::constant(5.0, 2)
            .binary(BinaryOp::Add, &LazyArray::constant(-4.5, 2))
            .unwrap()
            .rekeyed(three.key());
        assert_eq!(half.key(), three.key());

        let engine = ComputeEngine::default();
        let mut cache = ArrayCache::new(crate::cache::CacheConfig::default());
        let first = engine.force_cached(&[three.clone()], &mut cache).unwrap();
        let second = engine.force_cached(&[half], &mut cache).unwrap();
        assert_eq!(first[0].as_primitive::<Float64Type>().values().as_ref(), &[3.0, 3.0]);
        assert_eq!(second[0].as_primitive::<Float64Type>().values().as_ref(), &[0.5, 0.5]);
        assert_eq!(cache.stats().collisions, 1);

        // The key now holds `half`; `three` recomputes and takes the slot back.
        let again = engine.force_cached(&[three], &mut cache).unwrap();
        assert_eq!(again[0].as_primitive::<Float64Type>().values().as_ref(), &[3.0, 3.0]);
        assert_eq!(cache.stats().collisions, 2);

        let rebuilt = LazyArray::constant(1.0, 2)
            .binary(BinaryOp::Add, &LazyArray::constant(2.0, 2))
            .unwrap();
        engine.force_cached(&[rebuilt], &mut cache).unwrap();
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn optimized_and_naive_evaluation_agree() {
        let x = LazyArray::from_array(Arc::new(Int64Array::from(vec![1, 2, 3, 4, 5, 6])));
        let first = x
            .filter(&BooleanArray::from(vec![true, true, false, true, true, true]))
            .unwrap();
        let second = first
            .filter(&BooleanArray::from(vec![false, true, true, false, true]))
            .unwrap();
        let ones = LazyArray::constant(1.0, 6)
            .filter(&BooleanArray::from(vec![true, false, false, false, false, true]))
            .unwrap();
        let head = x.slice(1, 3).unwrap();

        let naive = ComputeEngine::default()
            .force(&[second.clone(), ones.clone(), head.clone()])
            .unwrap();
        let optimized = ComputeEngine::new(EngineOptions { optimize_graph: true })
            .force(&[second, ones, head])
            .unwrap();
        assert_eq!(naive, optimized);
        assert_eq!(naive[0].as_primitive::<Int64Type>().values().as_ref(), &[2, 4, 6]);
        assert_eq!(naive[1].len(), 2);
    }
}
