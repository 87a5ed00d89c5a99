//! Graph construction: the merge engine and the accumulator that owns every
//! canonical node of a run.
//!
//! - [`merge`]: reconcile two nodes that share an identity
//! - [`accumulator`]: resolve transformer batches into the deduplicated graph

pub mod accumulator;
pub mod merge;

pub use accumulator::{
    AccumulatorConfig, GraphAccumulator, GraphStats, IngestReport, MalformedPolicy, NodeId,
    SkippedNode,
};
pub use merge::{FieldPolicy, MergeSummary, merge_into, merge_with_policy};
