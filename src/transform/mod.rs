//! Transformers: one event record in, an ordered batch of typed nodes out.
//!
//! Each transformer first parses the flat record into its own closed event
//! enum and then maps the typed event to nodes with edges already wired
//! between them. Edges only ever point at nodes of the same batch (or at
//! nodes the accumulator already holds).

pub mod entities;
pub mod fields;
pub mod generic;
pub mod network;

pub use generic::{GenericEvent, GenericTransformer};
pub use network::{NetworkEvent, NetworkTransformer};

use crate::error::TransformError;
use crate::event::EventRecord;
use crate::node::{Node, VariantCatalog};

/// Names accepted by [`transformer_by_name`].
pub const TRANSFORMERS: [&str; 2] = ["generic", "network"];

/// Maps one event record to nodes.
///
/// `Ok(None)` means the record is irrelevant to this transformer. An error
/// means the record was relevant but could not be mapped; the caller logs it
/// and moves on.
pub trait Transformer: Send + Sync {
    fn name(&self) -> &'static str;

    fn transform(&self, event: &EventRecord) -> Result<Option<Vec<Node>>, TransformError>;
}

/// Construct a reference transformer by name.
pub fn transformer_by_name(
    name: &str,
    catalog: &VariantCatalog,
) -> Result<Box<dyn Transformer>, TransformError> {
    match name.to_ascii_lowercase().as_str() {
        "generic" => Ok(Box::new(GenericTransformer::new(catalog))),
        "network" | "pcap" => Ok(Box::new(NetworkTransformer::new(catalog))),
        _ => Err(TransformError::Unknown {
            name: name.to_string(),
        }),
    }
}
