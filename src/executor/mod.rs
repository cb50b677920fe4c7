//! Query executor contract: the compiled plan shape the storage layer
//! serves, independent of whatever produces it (spec.md §4.8). There is no
//! SQL text parser here — callers build a `Plan` directly.

pub mod cache;
pub mod filter;
pub mod plan;
pub mod simd;
pub mod subquery;

pub use cache::{CacheStatistics, PlanCache};
pub use filter::{CompareOp, Predicate, RangeProbe, WhereFilter};
pub use plan::{Aggregate, AggregateKind, OrderBySpec, Plan, SortDirection};
pub use subquery::{Subquery, SubqueryCache, SubqueryKind};
