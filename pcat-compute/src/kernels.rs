use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::kernels::{boolean, cmp};
use arrow::compute::{cast, kernels::numeric};
use arrow::datatypes::DataType;
use pcat_result::{Error, Result};
use std::fmt;
use std::sync::Arc;

/// Elementwise arithmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

/// Elementwise comparison producing a boolean array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// Elementwise boolean combination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sym = match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
        };
        f.write_str(sym)
    }
}

/// Whether elementwise arithmetic is defined for `dt`.
pub fn is_numeric(dt: &DataType) -> bool {
    dt.is_integer() || dt.is_floating()
}

/// Signedness and bit width of an integer type.
fn integer_width(dt: &DataType) -> Option<(bool, u32)> {
    match dt {
        DataType::Int8 => Some((true, 8)),
        DataType::Int16 => Some((true, 16)),
        DataType::Int32 => Some((true, 32)),
        DataType::Int64 => Some((true, 64)),
        DataType::UInt8 => Some((false, 8)),
        DataType::UInt16 => Some((false, 16)),
        DataType::UInt32 => Some((false, 32)),
        DataType::UInt64 => Some((false, 64)),
        _ => None,
    }
}

fn integer_type(signed: bool, bits: u32) -> DataType {
    match (signed, bits) {
        (true, 8) => DataType::Int8,
        (true, 16) => DataType::Int16,
        (true, 32) => DataType::Int32,
        (true, _) => DataType::Int64,
        (false, 8) => DataType::UInt8,
        (false, 16) => DataType::UInt16,
        (false, 32) => DataType::UInt32,
        (false, _) => DataType::UInt64,
    }
}

/// Common type both operands are cast to before an arithmetic or comparison kernel.
///
/// Integers widen to the smallest type holding both ranges; a mix that no integer
/// type holds (`Int64` with `UInt64`), any float, and anything non-integer go to
/// `Float64`.
pub fn coerced_type(lhs: &DataType, rhs: &DataType) -> DataType {
    if lhs == rhs {
        return lhs.clone();
    }

    match (integer_width(lhs), integer_width(rhs)) {
        (Some((ls, lb)), Some((rs, rb))) if ls == rs => integer_type(ls, lb.max(rb)),
        (Some((ls, lb)), Some((_, rb))) => {
            let (signed_bits, unsigned_bits) = if ls { (lb, rb) } else { (rb, lb) };
            if signed_bits > unsigned_bits {
                integer_type(true, signed_bits)
            } else if unsigned_bits < 64 {
                integer_type(true, unsigned_bits * 2)
            } else {
                DataType::Float64
            }
        }
        _ => DataType::Float64,
    }
}

fn coerce_types(lhs: &ArrayRef, rhs: &ArrayRef) -> Result<(ArrayRef, ArrayRef)> {
    let lhs_type = lhs.data_type();
    let rhs_type = rhs.data_type();

    if lhs_type == rhs_type {
        return Ok((lhs.clone(), rhs.clone()));
    }

    let target_type = coerced_type(lhs_type, rhs_type);
    let lhs_casted = cast(lhs, &target_type)?;
    let rhs_casted = cast(rhs, &target_type)?;

    Ok((lhs_casted, rhs_casted))
}

pub fn compute_binary(lhs: &ArrayRef, rhs: &ArrayRef, op: BinaryOp) -> Result<ArrayRef> {
    let (lhs_arr, rhs_arr) = coerce_types(lhs, rhs)?;

    let result_arr: ArrayRef = match op {
        BinaryOp::Add => numeric::add(&lhs_arr, &rhs_arr)?,
        BinaryOp::Subtract => numeric::sub(&lhs_arr, &rhs_arr)?,
        BinaryOp::Multiply => numeric::mul(&lhs_arr, &rhs_arr)?,
        BinaryOp::Divide => numeric::div(&lhs_arr, &rhs_arr)?,
        BinaryOp::Modulo => numeric::rem(&lhs_arr, &rhs_arr)?,
    };

    Ok(result_arr)
}

pub fn compute_compare(lhs: &ArrayRef, op: CompareOp, rhs: &ArrayRef) -> Result<ArrayRef> {
    let (lhs_arr, rhs_arr) = coerce_types(lhs, rhs)?;

    let result_arr: ArrayRef = match op {
        CompareOp::Eq => Arc::new(cmp::eq(&lhs_arr, &rhs_arr)?),
        CompareOp::NotEq => Arc::new(cmp::neq(&lhs_arr, &rhs_arr)?),
        CompareOp::Lt => Arc::new(cmp::lt(&lhs_arr, &rhs_arr)?),
        CompareOp::LtEq => Arc::new(cmp::lt_eq(&lhs_arr, &rhs_arr)?),
        CompareOp::Gt => Arc::new(cmp::gt(&lhs_arr, &rhs_arr)?),
        CompareOp::GtEq => Arc::new(cmp::gt_eq(&lhs_arr, &rhs_arr)?),
    };
    Ok(result_arr)
}

pub fn compute_logical(lhs: &ArrayRef, op: LogicalOp, rhs: &ArrayRef) -> Result<ArrayRef> {
    let lhs_bool = as_boolean(lhs, "logical operand")?;
    let rhs_bool = as_boolean(rhs, "logical operand")?;
    let result = match op {
        LogicalOp::And => boolean::and(lhs_bool, rhs_bool)?,
        LogicalOp::Or => boolean::or(lhs_bool, rhs_bool)?,
    };
    Ok(Arc::new(result))
}

pub fn compute_not(input: &ArrayRef) -> Result<ArrayRef> {
    let input = as_boolean(input, "negated operand")?;
    Ok(Arc::new(boolean::not(input)?))
}

fn as_boolean<'a>(
    array: &'a ArrayRef,
    context: &str,
) -> Result<&'a arrow::array::BooleanArray> {
    array
        .as_boolean_opt()
        .ok_or_else(|| Error::type_mismatch(context, DataType::Boolean, array.data_type()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{BooleanArray, Float64Array, Int32Array, Int64Array};
    use arrow::datatypes::{Float64Type, Int64Type};

    #[test]
    fn mixed_integer_widths_widen() {
        let lhs: ArrayRef = Arc::new(Int32Array::from(vec![1, 2, 3]));
        let rhs: ArrayRef = Arc::new(Int64Array::from(vec![10, 20, 30]));
        let out = compute_binary(&lhs, &rhs, BinaryOp::Add).unwrap();
        assert_eq!(out.data_type(), &DataType::Int64);
        assert_eq!(out.as_primitive::<Int64Type>().values().as_ref(), &[11, 22, 33]);
    }

    #[test]
    fn unsigned_and_signed_widths_coerce() {
        use DataType::*;
        assert_eq!(coerced_type(&UInt8, &UInt32), UInt32);
        assert_eq!(coerced_type(&UInt16, &Int32), Int32);
        assert_eq!(coerced_type(&Int8, &UInt8), Int16);
        assert_eq!(coerced_type(&UInt32, &Int16), Int64);
        assert_eq!(coerced_type(&Int64, &UInt64), Float64);
        assert_eq!(coerced_type(&Float32, &Int8), Float64);
        assert_eq!(coerced_type(&Float32, &Float32), Float32);
    }

    #[test]
    fn int_and_float_promote_to_float() {
        let lhs: ArrayRef = Arc::new(Int64Array::from(vec![1, 2]));
        let rhs: ArrayRef = Arc::new(Float64Array::from(vec![0.5, 0.5]));
        let out = compute_binary(&lhs, &rhs, BinaryOp::Multiply).unwrap();
        assert_eq!(out.as_primitive::<Float64Type>().values().as_ref(), &[0.5, 1.0]);
    }

    #[test]
    fn logical_requires_booleans() {
        let flags: ArrayRef = Arc::new(BooleanArray::from(vec![true, false]));
        let ints: ArrayRef = Arc::new(Int64Array::from(vec![1, 0]));
        let err = compute_logical(&flags, LogicalOp::And, &ints).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }
}
