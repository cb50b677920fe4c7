//! WHERE filters: a tree form for inspection (range-predicate recognition)
//! and a compiled closure form for fast per-row evaluation, cached on the
//! plan so it's built once per query rather than once per row (spec.md
//! §4.8).

use std::cmp::Ordering;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::common::{ColumnOrdinal, IndexedRow, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
}

impl CompareOp {
    fn matches(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

/// The inspectable form of a WHERE clause. `Compare`/`Between` are the leaf
/// shapes range-predicate recognition and the SIMD accelerator look for;
/// anything under `And`/`Or`/`Not` falls back to the scalar compiled path.
#[derive(Debug, Clone)]
pub enum Predicate {
    Compare {
        column: ColumnOrdinal,
        op: CompareOp,
        literal: Value,
    },
    Between {
        column: ColumnOrdinal,
        lo: Value,
        hi: Value,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

fn eval(predicate: &Predicate, row: &IndexedRow) -> bool {
    match predicate {
        Predicate::Compare { column, op, literal } => match row.get(*column as usize) {
            Some(value) => value.partial_cmp(literal).map(|o| op.matches(o)).unwrap_or(false),
            None => false,
        },
        Predicate::Between { column, lo, hi } => match row.get(*column as usize) {
            Some(value) => {
                value.partial_cmp(lo).map(|o| o != Ordering::Less).unwrap_or(false)
                    && value.partial_cmp(hi).map(|o| o != Ordering::Greater).unwrap_or(false)
            }
            None => false,
        },
        Predicate::And(a, b) => eval(a, row) && eval(b, row),
        Predicate::Or(a, b) => eval(a, row) || eval(b, row),
        Predicate::Not(p) => !eval(p, row),
    }
}

pub type CompiledFilter = Arc<dyn Fn(&IndexedRow) -> bool + Send + Sync>;

/// A WHERE clause paired with its compiled closure, built lazily on first
/// use and then reused for the rest of the plan's lifetime.
#[derive(Clone)]
pub struct WhereFilter {
    tree: Predicate,
    compiled: Arc<OnceCell<CompiledFilter>>,
}

impl std::fmt::Debug for WhereFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhereFilter").field("tree", &self.tree).finish()
    }
}

impl WhereFilter {
    pub fn new(tree: Predicate) -> Self {
        Self {
            tree,
            compiled: Arc::new(OnceCell::new()),
        }
    }

    pub fn tree(&self) -> &Predicate {
        &self.tree
    }

    pub fn evaluate(&self, row: &IndexedRow) -> bool {
        let tree = &self.tree;
        let compiled = self.compiled.get_or_init(|| {
            let tree = tree.clone();
            Arc::new(move |row: &IndexedRow| eval(&tree, row)) as CompiledFilter
        });
        compiled(row)
    }
}

/// An inclusive range extracted from a recognizable single-column
/// predicate, ready to route to a B-tree index lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeProbe {
    pub column: ColumnOrdinal,
    pub lo: Option<Value>,
    pub hi: Option<Value>,
}

/// Attempts to recognize `col BETWEEN lo AND hi` or a single inclusive
/// comparison (`col >= v`, `col <= v`, `col = v`) at the top of the
/// predicate tree, returning the inclusive bound a B-tree index probe
/// needs. `RangeProbe`'s bounds are always inclusive on both sides
/// (matching `Index::find_range`'s contract, spec.md invariant I4), so a
/// strict comparison (`col > v`, `col < v`) is deliberately NOT recognized
/// here — widening it to the matching inclusive bound would route `col >
/// v` through an index probe that also returns rows where `col == v`.
/// Those fall back to a scan, same as `Ne` and compound (`And`/`Or`/`Not`)
/// predicates (spec.md §4.8).
pub fn recognize_range(predicate: &Predicate) -> Option<RangeProbe> {
    match predicate {
        Predicate::Between { column, lo, hi } => Some(RangeProbe {
            column: *column,
            lo: Some(lo.clone()),
            hi: Some(hi.clone()),
        }),
        Predicate::Compare { column, op, literal } => match op {
            CompareOp::Eq => Some(RangeProbe {
                column: *column,
                lo: Some(literal.clone()),
                hi: Some(literal.clone()),
            }),
            CompareOp::Ge => Some(RangeProbe {
                column: *column,
                lo: Some(literal.clone()),
                hi: None,
            }),
            CompareOp::Le => Some(RangeProbe {
                column: *column,
                lo: None,
                hi: Some(literal.clone()),
            }),
            CompareOp::Gt | CompareOp::Lt | CompareOp::Ne => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::build_ordinal_map;

    fn row(values: Vec<Value>) -> IndexedRow {
        let names: Vec<String> = (0..values.len()).map(|i| format!("c{i}")).collect();
        IndexedRow::new(values, build_ordinal_map(&names))
    }

    #[test]
    fn compiled_filter_evaluates_a_comparison() {
        let filter = WhereFilter::new(Predicate::Compare {
            column: 0,
            op: CompareOp::Gt,
            literal: Value::Integer(10),
        });
        assert!(filter.evaluate(&row(vec![Value::Integer(20)])));
        assert!(!filter.evaluate(&row(vec![Value::Integer(5)])));
    }

    #[test]
    fn compiled_closure_is_cached_across_calls() {
        let filter = WhereFilter::new(Predicate::Compare {
            column: 0,
            op: CompareOp::Eq,
            literal: Value::Integer(1),
        });
        filter.evaluate(&row(vec![Value::Integer(1)]));
        assert!(filter.compiled.get().is_some());
    }

    #[test]
    fn between_recognizes_as_an_inclusive_range() {
        let predicate = Predicate::Between {
            column: 2,
            lo: Value::Integer(20),
            hi: Value::Integer(80),
        };
        let probe = recognize_range(&predicate).unwrap();
        assert_eq!(probe.lo, Some(Value::Integer(20)));
        assert_eq!(probe.hi, Some(Value::Integer(80)));
    }

    #[test]
    fn strict_comparisons_are_not_recognized_as_ranges() {
        let gt = Predicate::Compare {
            column: 0,
            op: CompareOp::Gt,
            literal: Value::Integer(10),
        };
        let lt = Predicate::Compare {
            column: 0,
            op: CompareOp::Lt,
            literal: Value::Integer(10),
        };
        assert!(recognize_range(&gt).is_none());
        assert!(recognize_range(&lt).is_none());
    }

    #[test]
    fn inclusive_comparisons_recognize_as_half_open_ranges() {
        let ge = Predicate::Compare {
            column: 0,
            op: CompareOp::Ge,
            literal: Value::Integer(10),
        };
        let probe = recognize_range(&ge).unwrap();
        assert_eq!(probe.lo, Some(Value::Integer(10)));
        assert_eq!(probe.hi, None);

        let le = Predicate::Compare {
            column: 0,
            op: CompareOp::Le,
            literal: Value::Integer(10),
        };
        let probe = recognize_range(&le).unwrap();
        assert_eq!(probe.lo, None);
        assert_eq!(probe.hi, Some(Value::Integer(10)));
    }

    #[test]
    fn compound_predicates_are_not_recognized_as_ranges() {
        let predicate = Predicate::And(
            Box::new(Predicate::Compare {
                column: 0,
                op: CompareOp::Gt,
                literal: Value::Integer(1),
            }),
            Box::new(Predicate::Compare {
                column: 1,
                op: CompareOp::Lt,
                literal: Value::Integer(2),
            }),
        );
        assert!(recognize_range(&predicate).is_none());
    }
}
