//! Lazy array handles.
//!
//! Every [`LazyArray`] wraps an immutable graph node. Nodes record their length and
//! data type up front, so shape checks happen while composing and never during
//! evaluation. Composition always allocates a new node; existing nodes are shared
//! read-only by every handle, accessor and catalog that refers to them.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arrow::array::{Array, ArrayRef, BooleanArray, UInt64Array};
use arrow::compute::can_cast_types;
use arrow::datatypes::DataType;
use pcat_result::{Error, Result};
use rustc_hash::FxHasher;

use crate::kernels::{BinaryOp, CompareOp, LogicalOp, coerced_type, is_numeric};
use crate::scalar::ScalarValue;

/// Deferred source of a block of values, e.g. a reader or a generator.
///
/// Producers run inside the compute engine and must not force arrays through the
/// gateway that is evaluating them.
pub type Producer = Arc<dyn Fn() -> Result<ArrayRef> + Send + Sync>;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

fn next_node_id() -> u64 {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

pub(crate) enum Op {
    Constant(ScalarValue),
    Block(ArrayRef),
    Generate {
        label: String,
        producer: Producer,
    },
    Filter {
        input: LazyArray,
        mask: Arc<BooleanArray>,
    },
    Take {
        input: LazyArray,
        indices: Arc<UInt64Array>,
    },
    Slice {
        input: LazyArray,
        offset: usize,
    },
    Binary {
        op: BinaryOp,
        lhs: LazyArray,
        rhs: LazyArray,
    },
    Compare {
        op: CompareOp,
        lhs: LazyArray,
        rhs: LazyArray,
    },
    Logical {
        op: LogicalOp,
        lhs: LazyArray,
        rhs: LazyArray,
    },
    Not(LazyArray),
    Cast(LazyArray),
}

impl Op {
    fn name(&self) -> &'static str {
        match self {
            Op::Constant(_) => "constant",
            Op::Block(_) => "block",
            Op::Generate { .. } => "generate",
            Op::Filter { .. } => "filter",
            Op::Take { .. } => "take",
            Op::Slice { .. } => "slice",
            Op::Binary { .. } => "binary",
            Op::Compare { .. } => "compare",
            Op::Logical { .. } => "logical",
            Op::Not(_) => "not",
            Op::Cast(_) => "cast",
        }
    }
}

pub(crate) struct Node {
    pub(crate) id: u64,
    pub(crate) key: u64,
    pub(crate) len: usize,
    pub(crate) data_type: DataType,
    pub(crate) op: Op,
}

/// Structural key of a node: equal values give equal keys. Distinct computations
/// may still share a key, see [`LazyArray::same_computation`].
///
/// Leaves without a structural identity (blocks, producers) use their unique node
/// id, so keys never alias across unrelated data even after the nodes are dropped.
fn structural_key(id: u64, len: usize, data_type: &DataType, op: &Op) -> u64 {
    let mut h = FxHasher::default();
    op.name().hash(&mut h);
    len.hash(&mut h);
    data_type.hash(&mut h);
    match op {
        Op::Constant(value) => value.hash(&mut h),
        Op::Block(_) | Op::Generate { .. } => id.hash(&mut h),
        Op::Filter { input, mask } => {
            input.key().hash(&mut h);
            for selected in mask.iter() {
                (selected == Some(true)).hash(&mut h);
            }
        }
        Op::Take { input, indices } => {
            input.key().hash(&mut h);
            indices.values().as_ref().hash(&mut h);
        }
        Op::Slice { input, offset } => {
            input.key().hash(&mut h);
            offset.hash(&mut h);
        }
        Op::Binary { op, lhs, rhs } => {
            op.hash(&mut h);
            lhs.key().hash(&mut h);
            rhs.key().hash(&mut h);
        }
        Op::Compare { op, lhs, rhs } => {
            op.hash(&mut h);
            lhs.key().hash(&mut h);
            rhs.key().hash(&mut h);
        }
        Op::Logical { op, lhs, rhs } => {
            op.hash(&mut h);
            lhs.key().hash(&mut h);
            rhs.key().hash(&mut h);
        }
        Op::Not(input) | Op::Cast(input) => input.key().hash(&mut h),
    }
    h.finish()
}

/// Reference-counted handle to a deferred array computation.
///
/// Cloning a handle is cheap and shares the underlying node.
#[derive(Clone)]
pub struct LazyArray {
    pub(crate) node: Arc<Node>,
}

impl LazyArray {
    pub(crate) fn from_op(op: Op, len: usize, data_type: DataType) -> Self {
        let id = next_node_id();
        let key = structural_key(id, len, &data_type, &op);
        tracing::trace!(id, op = op.name(), len, ?data_type, "lazy node");
        Self {
            node: Arc::new(Node {
                id,
                key,
                len,
                data_type,
                op,
            }),
        }
    }

    /// `len` copies of `value`.
    pub fn constant(value: impl Into<ScalarValue>, len: usize) -> Self {
        let value = value.into();
        let data_type = value.data_type();
        Self::from_op(Op::Constant(value), len, data_type)
    }

    /// Wrap an already materialized, contiguous block of values.
    pub fn from_array(array: ArrayRef) -> Self {
        let len = array.len();
        let data_type = array.data_type().clone();
        Self::from_op(Op::Block(array), len, data_type)
    }

    /// A block produced on demand by `producer`.
    ///
    /// The declared `len` and `data_type` are checked against the produced array at
    /// evaluation time.
    pub fn generate(
        label: impl Into<String>,
        len: usize,
        data_type: DataType,
        producer: Producer,
    ) -> Self {
        Self::from_op(
            Op::Generate {
                label: label.into(),
                producer,
            },
            len,
            data_type,
        )
    }

    /// Length of the leading dimension.
    pub fn len(&self) -> usize {
        self.node.len
    }

    pub fn is_empty(&self) -> bool {
        self.node.len == 0
    }

    pub fn data_type(&self) -> &DataType {
        &self.node.data_type
    }

    /// Unique identity of the underlying node.
    pub fn id(&self) -> u64 {
        self.node.id
    }

    /// Structural key used by the array cache.
    pub fn key(&self) -> u64 {
        self.node.key
    }

    /// Whether both handles describe the same computation: same node kinds, same
    /// constants and selections, same leaves, all the way down.
    ///
    /// Equal keys are necessary but not sufficient; the cache checks this on every
    /// hit.
    pub fn same_computation(&self, other: &LazyArray) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let (a, b) = (&*self.node, &*other.node);
        if a.key != b.key || a.len != b.len || a.data_type != b.data_type {
            return false;
        }
        match (&a.op, &b.op) {
            (Op::Constant(x), Op::Constant(y)) => x.same_bits(y),
            (Op::Block(_), Op::Block(_)) | (Op::Generate { .. }, Op::Generate { .. }) => a.id == b.id,
            (
                Op::Filter { input, mask },
                Op::Filter {
                    input: other_input,
                    mask: other_mask,
                },
            ) => {
                mask.iter()
                    .map(|v| v == Some(true))
                    .eq(other_mask.iter().map(|v| v == Some(true)))
                    && input.same_computation(other_input)
            }
            (
                Op::Take { input, indices },
                Op::Take {
                    input: other_input,
                    indices: other_indices,
                },
            ) => indices == other_indices && input.same_computation(other_input),
            (
                Op::Slice { input, offset },
                Op::Slice {
                    input: other_input,
                    offset: other_offset,
                },
            ) => offset == other_offset && input.same_computation(other_input),
            (
                Op::Binary { op, lhs, rhs },
                Op::Binary {
                    op: other_op,
                    lhs: other_lhs,
                    rhs: other_rhs,
                },
            ) => op == other_op && lhs.same_computation(other_lhs) && rhs.same_computation(other_rhs),
            (
                Op::Compare { op, lhs, rhs },
                Op::Compare {
                    op: other_op,
                    lhs: other_lhs,
                    rhs: other_rhs,
                },
            ) => op == other_op && lhs.same_computation(other_lhs) && rhs.same_computation(other_rhs),
            (
                Op::Logical { op, lhs, rhs },
                Op::Logical {
                    op: other_op,
                    lhs: other_lhs,
                    rhs: other_rhs,
                },
            ) => op == other_op && lhs.same_computation(other_lhs) && rhs.same_computation(other_rhs),
            (Op::Not(input), Op::Not(other_input)) | (Op::Cast(input), Op::Cast(other_input)) => {
                input.same_computation(other_input)
            }
            _ => false,
        }
    }

    /// The same computation filed under `key`, to exercise key collisions.
    #[cfg(test)]
    pub(crate) fn rekeyed(self, key: u64) -> LazyArray {
        match Arc::try_unwrap(self.node) {
            Ok(mut node) => {
                node.key = key;
                LazyArray {
                    node: Arc::new(node),
                }
            }
            Err(node) => LazyArray { node },
        }
    }

    /// Whether both handles share the same node.
    pub fn ptr_eq(&self, other: &LazyArray) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    /// The broadcast value, when this handle is a constant.
    pub fn as_constant(&self) -> Option<&ScalarValue> {
        match &self.node.op {
            Op::Constant(value) => Some(value),
            _ => None,
        }
    }

    /// The wrapped block, when this handle is already materialized.
    pub fn as_block(&self) -> Option<&ArrayRef> {
        match &self.node.op {
            Op::Block(array) => Some(array),
            _ => None,
        }
    }

    /// Keep the rows where `mask` is true. Null mask entries drop the row.
    pub fn filter(&self, mask: &BooleanArray) -> Result<LazyArray> {
        if mask.len() != self.len() {
            return Err(Error::length_mismatch("selection mask", self.len(), mask.len()));
        }
        let len = mask.true_count();
        Ok(Self::from_op(
            Op::Filter {
                input: self.clone(),
                mask: Arc::new(mask.clone()),
            },
            len,
            self.data_type().clone(),
        ))
    }

    /// Gather rows by position, in the order given.
    pub fn take(&self, indices: &UInt64Array) -> Result<LazyArray> {
        if indices.null_count() > 0 {
            return Err(Error::InvalidSelector("row indices must not contain nulls".into()));
        }
        if let Some(&bad) = indices.values().iter().find(|&&i| i as usize >= self.len()) {
            return Err(Error::InvalidSelector(format!(
                "row index {bad} out of bounds for length {}",
                self.len()
            )));
        }
        Ok(Self::from_op(
            Op::Take {
                input: self.clone(),
                indices: Arc::new(indices.clone()),
            },
            indices.len(),
            self.data_type().clone(),
        ))
    }

    /// Contiguous rows `offset..offset + len`.
    pub fn slice(&self, offset: usize, len: usize) -> Result<LazyArray> {
        let end = offset.checked_add(len);
        if end.is_none_or(|end| end > self.len()) {
            return Err(Error::InvalidArgumentError(format!(
                "slice {offset}..{offset}+{len} out of bounds for length {}",
                self.len()
            )));
        }
        Ok(Self::from_op(
            Op::Slice {
                input: self.clone(),
                offset,
            },
            len,
            self.data_type().clone(),
        ))
    }

    fn check_same_len(&self, other: &LazyArray, context: &str) -> Result<()> {
        if self.len() != other.len() {
            return Err(Error::length_mismatch(context, self.len(), other.len()));
        }
        Ok(())
    }

    /// Elementwise arithmetic with another handle of the same length.
    pub fn binary(&self, op: BinaryOp, other: &LazyArray) -> Result<LazyArray> {
        self.check_same_len(other, "elementwise arithmetic operand")?;
        for operand in [self, other] {
            if !is_numeric(operand.data_type()) {
                return Err(Error::type_mismatch(
                    format!("operand of '{op}'"),
                    "numeric array",
                    operand.data_type(),
                ));
            }
        }
        let data_type = coerced_type(self.data_type(), other.data_type());
        Ok(Self::from_op(
            Op::Binary {
                op,
                lhs: self.clone(),
                rhs: other.clone(),
            },
            self.len(),
            data_type,
        ))
    }

    /// Elementwise arithmetic with a broadcast scalar.
    pub fn binary_scalar(&self, op: BinaryOp, value: impl Into<ScalarValue>) -> Result<LazyArray> {
        self.binary(op, &LazyArray::constant(value, self.len()))
    }

    /// Elementwise comparison producing a boolean handle.
    pub fn compare(&self, op: CompareOp, other: &LazyArray) -> Result<LazyArray> {
        self.check_same_len(other, "comparison operand")?;
        let comparable = self.data_type() == other.data_type()
            || (is_numeric(self.data_type()) && is_numeric(other.data_type()));
        if !comparable {
            return Err(Error::type_mismatch(
                "comparison operand",
                self.data_type(),
                other.data_type(),
            ));
        }
        Ok(Self::from_op(
            Op::Compare {
                op,
                lhs: self.clone(),
                rhs: other.clone(),
            },
            self.len(),
            DataType::Boolean,
        ))
    }

    pub fn compare_scalar(&self, op: CompareOp, value: impl Into<ScalarValue>) -> Result<LazyArray> {
        self.compare(op, &LazyArray::constant(value, self.len()))
    }

    fn logical(&self, op: LogicalOp, other: &LazyArray) -> Result<LazyArray> {
        self.check_same_len(other, "logical operand")?;
        for operand in [self, other] {
            if operand.data_type() != &DataType::Boolean {
                return Err(Error::type_mismatch(
                    "logical operand",
                    DataType::Boolean,
                    operand.data_type(),
                ));
            }
        }
        Ok(Self::from_op(
            Op::Logical {
                op,
                lhs: self.clone(),
                rhs: other.clone(),
            },
            self.len(),
            DataType::Boolean,
        ))
    }

    pub fn and(&self, other: &LazyArray) -> Result<LazyArray> {
        self.logical(LogicalOp::And, other)
    }

    pub fn or(&self, other: &LazyArray) -> Result<LazyArray> {
        self.logical(LogicalOp::Or, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(&self) -> Result<LazyArray> {
        if self.data_type() != &DataType::Boolean {
            return Err(Error::type_mismatch(
                "negated operand",
                DataType::Boolean,
                self.data_type(),
            ));
        }
        Ok(Self::from_op(
            Op::Not(self.clone()),
            self.len(),
            DataType::Boolean,
        ))
    }

    /// Convert every element to `to`.
    pub fn cast(&self, to: DataType) -> Result<LazyArray> {
        if self.data_type() == &to {
            return Ok(self.clone());
        }
        if !can_cast_types(self.data_type(), &to) {
            return Err(Error::type_mismatch("cast", to, self.data_type()));
        }
        Ok(Self::from_op(Op::Cast(self.clone()), self.len(), to))
    }
}

impl fmt::Debug for LazyArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("LazyArray");
        s.field("id", &self.node.id)
            .field("op", &self.node.op.name())
            .field("len", &self.node.len)
            .field("data_type", &self.node.data_type);
        if let Op::Generate { label, .. } = &self.node.op {
            s.field("label", label);
        }
        s.finish()
    }
}

impl From<ArrayRef> for LazyArray {
    fn from(array: ArrayRef) -> Self {
        LazyArray::from_array(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array, StringArray};

    fn block(values: Vec<f64>) -> LazyArray {
        LazyArray::from_array(Arc::new(Float64Array::from(values)))
    }

    #[test]
    fn composition_tracks_lengths() {
        let x = block(vec![1.0, 2.0, 3.0, 4.0]);
        let mask = BooleanArray::from(vec![true, false, true, true]);
        let sub = x.filter(&mask).unwrap();
        assert_eq!(sub.len(), 3);

        let taken = x.take(&UInt64Array::from(vec![3, 3, 0])).unwrap();
        assert_eq!(taken.len(), 3);

        let sliced = x.slice(1, 2).unwrap();
        assert_eq!(sliced.len(), 2);
        assert!(x.slice(3, 2).is_err());
    }

    #[test]
    fn mismatched_mask_length_is_rejected() {
        let x = block(vec![1.0, 2.0]);
        let err = x.filter(&BooleanArray::from(vec![true])).unwrap_err();
        assert!(matches!(
            err,
            Error::LengthMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn arithmetic_requires_numeric_operands() {
        let names = LazyArray::from_array(Arc::new(StringArray::from(vec!["a", "b"])));
        let x = block(vec![1.0, 2.0]);
        assert!(matches!(
            x.binary(BinaryOp::Add, &names),
            Err(Error::TypeMismatch { .. })
        ));

        let ints = LazyArray::from_array(Arc::new(Int64Array::from(vec![1, 2])));
        let sum = x.binary(BinaryOp::Add, &ints).unwrap();
        assert_eq!(sum.data_type(), &DataType::Float64);
    }

    #[test]
    fn constant_keys_are_structural() {
        let a = LazyArray::constant(1.0, 10);
        let b = LazyArray::constant(1.0, 10);
        let c = LazyArray::constant(2.0, 10);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());

        let x = block(vec![1.0]);
        let y = block(vec![1.0]);
        assert_ne!(x.key(), y.key());
    }

    #[test]
    fn same_computation_compares_structure_not_keys() {
        let x = block(vec![1.0, 2.0, 3.0]);
        let mask = BooleanArray::from(vec![true, false, true]);
        let a = x.filter(&mask).unwrap().binary_scalar(BinaryOp::Add, 1.0).unwrap();
        let b = x.filter(&mask).unwrap().binary_scalar(BinaryOp::Add, 1.0).unwrap();
        assert!(a.same_computation(&b));

        let other_mask = x
            .filter(&BooleanArray::from(vec![false, true, true]))
            .unwrap()
            .binary_scalar(BinaryOp::Add, 1.0)
            .unwrap();
        assert!(!a.same_computation(&other_mask));

        let lookalike = LazyArray::constant(0.0, 2)
            .binary_scalar(BinaryOp::Add, -0.0)
            .unwrap()
            .rekeyed(a.key());
        assert_eq!(lookalike.key(), a.key());
        assert!(!a.same_computation(&lookalike));
        assert!(!LazyArray::constant(0.0, 1).same_computation(&LazyArray::constant(-0.0, 1)));
    }

    #[test]
    fn out_of_bounds_take_is_an_invalid_selector() {
        let x = block(vec![1.0, 2.0]);
        let err = x.take(&UInt64Array::from(vec![2])).unwrap_err();
        assert!(matches!(err, Error::InvalidSelector(_)));
    }
}
