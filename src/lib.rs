// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # beagle-graph
//!
//! A forensic graph-construction engine: turns heterogeneous event records
//! (packet captures, process-monitor logs, sandbox reports, ...) into a
//! deduplicated, typed property graph of entities connected by
//! attribute-bearing edges.
//!
//! ## Architecture
//!
//! - **Identity model** (`node`): variants declare identity fields; nodes are
//!   equal iff variant and identity values match
//! - **Edge registry** (`edge`): per-node adjacency keyed by edge kind and
//!   target identity, keeping every occurrence
//! - **Merge engine** (`graph::merge`): gap-filling attribute merge plus
//!   edge-history concatenation
//! - **Accumulator** (`graph::accumulator`): resolves transformer batches into
//!   one canonical node per identity
//! - **Transformers** (`transform`) and **pipeline** (`pipeline`): event
//!   records in, node batches out, transformed in parallel and ingested in order
//! - **Export** (`export`): node-link JSON and a `petgraph` view
//!
//! ## Library usage
//!
//! ```no_run
//! use beagle_graph::graph::GraphAccumulator;
//! use beagle_graph::node::{BuiltinVariant, Node, VariantCatalog};
//! use beagle_graph::value::record;
//!
//! let catalog = VariantCatalog::new().unwrap();
//! let ip = catalog.builtin(BuiltinVariant::IpAddress);
//! let dst = Node::new(ip).with("ip_address", "5.6.7.8");
//! let mut src = Node::new(ip).with("ip_address", "1.2.3.4");
//! src.add_edge("connected_to", &dst, record([("port", 80i64)]));
//!
//! let mut graph = GraphAccumulator::new();
//! graph.ingest(vec![src, dst]).unwrap();
//! assert_eq!(graph.len(), 2);
//! ```

pub mod config;
pub mod edge;
pub mod error;
pub mod event;
pub mod export;
pub mod graph;
pub mod node;
pub mod pipeline;
pub mod transform;
pub mod value;
