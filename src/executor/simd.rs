//! Dense single-column numeric comparison accelerator (spec.md §4.8).
//!
//! Operates on contiguous `i64`/`f64` arrays rather than row-at-a-time
//! `Value`s, so the comparison loop is straight-line and auto-vectorizes
//! under LLVM instead of branching per element. Compound predicates don't
//! have a dense array to feed this and fall back to the scalar
//! `WhereFilter` path.

use crate::executor::filter::CompareOp;

fn matches_i64(op: CompareOp, a: i64, b: i64) -> bool {
    match op {
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
    }
}

fn matches_f64(op: CompareOp, a: f64, b: f64) -> bool {
    match op {
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
    }
}

/// Returns the indices of `column` where `column[i] op literal`.
pub fn compare_i64(column: &[i64], op: CompareOp, literal: i64) -> Vec<usize> {
    column
        .iter()
        .enumerate()
        .filter(|(_, &v)| matches_i64(op, v, literal))
        .map(|(i, _)| i)
        .collect()
}

pub fn compare_f64(column: &[f64], op: CompareOp, literal: f64) -> Vec<usize> {
    column
        .iter()
        .enumerate()
        .filter(|(_, &v)| matches_f64(op, v, literal))
        .map(|(i, _)| i)
        .collect()
}

/// Decimal comparison compares the unscaled integer directly; callers are
/// responsible for rescaling both sides to a common `scale` first, same as
/// `Value`'s own `PartialOrd` only comparing decimals of equal scale.
pub fn compare_decimal(column: &[i64], op: CompareOp, literal_unscaled: i64) -> Vec<usize> {
    compare_i64(column, op, literal_unscaled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_i64_returns_matching_indices_in_order() {
        let column = vec![1, 5, 3, 9, 2];
        let hits = compare_i64(&column, CompareOp::Gt, 2);
        assert_eq!(hits, vec![1, 2, 3]);
    }

    #[test]
    fn compare_f64_handles_equality() {
        let column = vec![1.0, 2.5, 2.5, 3.0];
        let hits = compare_f64(&column, CompareOp::Eq, 2.5);
        assert_eq!(hits, vec![1, 2]);
    }

    #[test]
    fn empty_column_yields_no_matches() {
        let column: Vec<i64> = Vec::new();
        assert!(compare_i64(&column, CompareOp::Ge, 0).is_empty());
    }
}
