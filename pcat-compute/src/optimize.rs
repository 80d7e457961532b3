//! Optional graph rewrites applied before evaluation.
//!
//! Rules:
//! - selecting rows of a constant yields a shorter constant;
//! - slicing a materialized block yields a (zero-copy) sliced block;
//! - a filter of a filter collapses into one filter with a composed mask.
//!
//! Untouched subgraphs keep their original nodes, so node ids (per-batch sharing)
//! and structural keys (cache entries) survive the pass.

use arrow::array::{Array, BooleanArray};
use rustc_hash::FxHashMap;

use crate::kernels::LogicalOp;
use crate::lazy::{LazyArray, Op};

pub(crate) fn optimize(roots: &[LazyArray]) -> Vec<LazyArray> {
    let mut rewritten = FxHashMap::default();
    roots
        .iter()
        .map(|root| rewrite(root, &mut rewritten))
        .collect()
}

/// Mask over the rows of the inner filter's input selecting what both masks keep.
fn compose_masks(inner: &BooleanArray, outer: &BooleanArray) -> BooleanArray {
    let mut outer_rows = outer.iter();
    inner
        .iter()
        .map(|kept| {
            if kept == Some(true) {
                Some(outer_rows.next().flatten().unwrap_or(false))
            } else {
                Some(false)
            }
        })
        .collect()
}

fn rewrite(array: &LazyArray, done: &mut FxHashMap<u64, LazyArray>) -> LazyArray {
    if let Some(out) = done.get(&array.id()) {
        return out.clone();
    }

    let node = &array.node;
    let out = match &node.op {
        Op::Constant(_) | Op::Block(_) | Op::Generate { .. } => array.clone(),
        Op::Filter { input, mask } => {
            let new_input = rewrite(input, done);
            match &new_input.node.op {
                Op::Constant(value) => LazyArray::constant(value.clone(), node.len),
                Op::Filter {
                    input: inner_input,
                    mask: inner_mask,
                } => rebuild_filter(inner_input, compose_masks(inner_mask, mask), node.len, array),
                _ if new_input.ptr_eq(input) => array.clone(),
                _ => rebuild_filter(&new_input, mask.as_ref().clone(), node.len, array),
            }
        }
        Op::Take { input, indices } => {
            let new_input = rewrite(input, done);
            match &new_input.node.op {
                Op::Constant(value) => LazyArray::constant(value.clone(), node.len),
                _ if new_input.ptr_eq(input) => array.clone(),
                _ => new_input.take(indices).unwrap_or_else(|_| array.clone()),
            }
        }
        Op::Slice { input, offset } => {
            let new_input = rewrite(input, done);
            match &new_input.node.op {
                Op::Constant(value) => LazyArray::constant(value.clone(), node.len),
                Op::Block(block) => LazyArray::from_array(block.slice(*offset, node.len)),
                _ if new_input.ptr_eq(input) => array.clone(),
                _ => new_input
                    .slice(*offset, node.len)
                    .unwrap_or_else(|_| array.clone()),
            }
        }
        Op::Binary { op, lhs, rhs } => {
            let (l, r) = (rewrite(lhs, done), rewrite(rhs, done));
            if l.ptr_eq(lhs) && r.ptr_eq(rhs) {
                array.clone()
            } else {
                l.binary(*op, &r).unwrap_or_else(|_| array.clone())
            }
        }
        Op::Compare { op, lhs, rhs } => {
            let (l, r) = (rewrite(lhs, done), rewrite(rhs, done));
            if l.ptr_eq(lhs) && r.ptr_eq(rhs) {
                array.clone()
            } else {
                l.compare(*op, &r).unwrap_or_else(|_| array.clone())
            }
        }
        Op::Logical { op, lhs, rhs } => {
            let (l, r) = (rewrite(lhs, done), rewrite(rhs, done));
            if l.ptr_eq(lhs) && r.ptr_eq(rhs) {
                array.clone()
            } else {
                let combined = match op {
                    LogicalOp::And => l.and(&r),
                    LogicalOp::Or => l.or(&r),
                };
                combined.unwrap_or_else(|_| array.clone())
            }
        }
        Op::Not(input) => {
            let new_input = rewrite(input, done);
            if new_input.ptr_eq(input) {
                array.clone()
            } else {
                new_input.not().unwrap_or_else(|_| array.clone())
            }
        }
        Op::Cast(input) => {
            let new_input = rewrite(input, done);
            if new_input.ptr_eq(input) {
                array.clone()
            } else {
                new_input
                    .cast(node.data_type.clone())
                    .unwrap_or_else(|_| array.clone())
            }
        }
    };

    done.insert(array.id(), out.clone());
    out
}

fn rebuild_filter(
    input: &LazyArray,
    mask: BooleanArray,
    expected_len: usize,
    original: &LazyArray,
) -> LazyArray {
    match input.filter(&mask) {
        Ok(out) if out.len() == expected_len => out,
        _ => original.clone(),
    }
}
