//! Export of the accumulated graph.
//!
//! [`GraphDocument`] is a node-link JSON document: canonical nodes with their
//! flattened attributes, and links carrying edge occurrences. A document can
//! be turned back into an ingestible node batch, so exports from separate
//! runs can be merged. [`to_digraph`] gives a `petgraph` view for analysis.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::error::ExportError;
use crate::graph::GraphAccumulator;
use crate::node::{Node, VariantCatalog};
use crate::value::Record;

/// Export tuning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Emit one link per `(source, target, kind)` holding every occurrence,
    /// instead of one link per occurrence.
    pub consolidate_edges: bool,
}

/// Exported node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeExport {
    pub id: usize,
    pub properties: Record,
    #[serde(rename = "_node_type")]
    pub node_type: String,
    #[serde(rename = "_display")]
    pub display: String,
    #[serde(rename = "_color")]
    pub color: String,
}

/// Occurrence payload of a link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LinkData {
    /// Consolidated link: every occurrence of the edge.
    Occurrences(Vec<Record>),
    /// One occurrence.
    Occurrence(Record),
    /// Relationship observed without attributes.
    #[default]
    Empty,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkProperties {
    #[serde(default)]
    pub data: LinkData,
}

/// Exported edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkExport {
    pub id: usize,
    pub source: usize,
    pub target: usize,
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: LinkProperties,
}

/// Node-link graph document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub directed: bool,
    pub multigraph: bool,
    #[serde(default)]
    pub metadata: Record,
    pub nodes: Vec<NodeExport>,
    pub links: Vec<LinkExport>,
}

impl GraphDocument {
    /// Export every canonical node and adjacency entry of `graph`.
    pub fn from_graph(graph: &GraphAccumulator, metadata: Record, options: ExportOptions) -> Self {
        let nodes = graph
            .iter()
            .map(|(id, node)| NodeExport {
                id: id.index(),
                properties: node.to_record(),
                node_type: node.variant().name().to_string(),
                display: node.display(),
                color: node.variant().color().to_string(),
            })
            .collect();

        let mut links = Vec::new();
        for (source, node) in graph.iter() {
            for (kind, target, occurrences) in node.edges().iter() {
                let Some(target) = graph.id_of(target) else {
                    tracing::warn!(source = %node, target = %target, "edge target is not canonical");
                    continue;
                };
                let mut push = |data: LinkData| {
                    links.push(LinkExport {
                        id: links.len() + 1,
                        source: source.index(),
                        target: target.index(),
                        kind: kind.to_string(),
                        properties: LinkProperties { data },
                    })
                };
                if options.consolidate_edges {
                    push(LinkData::Occurrences(occurrences.to_vec()));
                } else if occurrences.is_empty() {
                    push(LinkData::Empty);
                } else {
                    for occurrence in occurrences {
                        push(LinkData::Occurrence(occurrence.clone()));
                    }
                }
            }
        }

        tracing::debug!(
            nodes = graph.len(),
            links = links.len(),
            consolidated = options.consolidate_edges,
            "exported graph"
        );
        Self {
            directed: true,
            multigraph: true,
            metadata,
            nodes,
            links,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ExportError> {
        serde_json::from_str(json).map_err(|e| ExportError::Serialization {
            message: e.to_string(),
        })
    }

    pub fn to_json_string(&self) -> Result<String, ExportError> {
        serde_json::to_string_pretty(self).map_err(|e| ExportError::Serialization {
            message: e.to_string(),
        })
    }

    /// Rebuild the nodes of this document as one ingestible batch.
    ///
    /// Node types are resolved against `catalog`. Every link becomes an edge
    /// on its source node; consolidated and per-occurrence links both restore
    /// the original occurrence lists.
    pub fn into_batch(self, catalog: &VariantCatalog) -> Result<Vec<Node>, ExportError> {
        let mut positions = HashMap::with_capacity(self.nodes.len());
        let mut batch = Vec::with_capacity(self.nodes.len());
        for node in self.nodes {
            let variant = catalog.resolve(&node.node_type)?;
            positions.insert(node.id, batch.len());
            batch.push(Node::new(&variant).with_record(node.properties));
        }
        let keys: Vec<_> = batch.iter().map(Node::identity).collect();

        for link in self.links {
            let position = |node: usize| {
                positions.get(&node).copied().ok_or(ExportError::DanglingLink {
                    link: link.id,
                    node,
                })
            };
            let source = position(link.source)?;
            let target = keys[position(link.target)?].clone();
            let node = &mut batch[source];
            match link.properties.data {
                LinkData::Occurrences(occurrences) if !occurrences.is_empty() => {
                    for occurrence in occurrences {
                        node.add_edge_to(link.kind.as_str(), target.clone(), occurrence);
                    }
                }
                LinkData::Occurrence(occurrence) => {
                    node.add_edge_to(link.kind.as_str(), target, occurrence)
                }
                LinkData::Occurrences(_) | LinkData::Empty => {
                    node.connect_to(link.kind.as_str(), target)
                }
            }
        }
        Ok(batch)
    }
}

/// Node weight of the [`to_digraph`] view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub variant: String,
    pub display: String,
    pub properties: Record,
}

/// Edge weight of the [`to_digraph`] view: one per `(source, target, kind)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRecord {
    pub kind: String,
    pub occurrences: Vec<Record>,
}

/// Directed multigraph view of the accumulated graph.
///
/// Node indices follow [`GraphAccumulator::iter`] order.
pub fn to_digraph(graph: &GraphAccumulator) -> DiGraph<NodeRecord, EdgeRecord> {
    let mut view = DiGraph::with_capacity(graph.len(), graph.edge_count());
    let indices: Vec<NodeIndex> = graph
        .all_nodes()
        .iter()
        .map(|node| {
            view.add_node(NodeRecord {
                variant: node.variant().name().to_string(),
                display: node.display(),
                properties: node.to_record(),
            })
        })
        .collect();

    for (source, node) in graph.iter() {
        for (kind, target, occurrences) in node.edges().iter() {
            if let Some(target) = graph.id_of(target) {
                view.add_edge(
                    indices[source.index()],
                    indices[target.index()],
                    EdgeRecord {
                        kind: kind.to_string(),
                        occurrences: occurrences.to_vec(),
                    },
                );
            }
        }
    }
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::BuiltinVariant;
    use crate::value::{Value, record};

    fn sample(catalog: &VariantCatalog) -> GraphAccumulator {
        let ipv = catalog.builtin(BuiltinVariant::IpAddress);
        let dst = Node::new(ipv).with("ip_address", "5.6.7.8");
        let mut src = Node::new(ipv).with("ip_address", "1.2.3.4");
        src.add_edge("connected_to", &dst, record([("port", 80i64)]));
        src.add_edge("connected_to", &dst, record([("port", 443i64)]));
        let mut dom = Node::new(catalog.builtin(BuiltinVariant::Domain)).with("domain", "a.com");
        dom.connect("resolves_to", &dst);

        let mut acc = GraphAccumulator::new();
        acc.ingest(vec![src, dst, dom]).unwrap();
        acc
    }

    #[test]
    fn per_occurrence_links() {
        let catalog = VariantCatalog::new().unwrap();
        let acc = sample(&catalog);
        let doc = GraphDocument::from_graph(&acc, Record::new(), ExportOptions::default());
        assert_eq!(doc.nodes.len(), 3);
        assert_eq!(doc.links.len(), 3);
        assert_eq!(doc.links[0].id, 1);
        assert!(doc.links.iter().any(|l| l.properties.data == LinkData::Empty));
        let ip = doc.nodes.iter().find(|n| n.display == "1.2.3.4").unwrap();
        assert_eq!(ip.node_type, "IPAddress");
        assert_eq!(ip.color, "#87CEFA");
    }

    #[test]
    fn consolidated_links() {
        let catalog = VariantCatalog::new().unwrap();
        let acc = sample(&catalog);
        let doc = GraphDocument::from_graph(
            &acc,
            Record::new(),
            ExportOptions {
                consolidate_edges: true,
            },
        );
        assert_eq!(doc.links.len(), 2);
        let connected = doc.links.iter().find(|l| l.kind == "connected_to").unwrap();
        let LinkData::Occurrences(occ) = &connected.properties.data else {
            panic!("expected consolidated occurrences");
        };
        assert_eq!(occ.len(), 2);
    }

    #[test]
    fn json_shape() {
        let catalog = VariantCatalog::new().unwrap();
        let acc = sample(&catalog);
        let doc = GraphDocument::from_graph(
            &acc,
            record([("source", "test")]),
            ExportOptions::default(),
        );
        let json: serde_json::Value =
            serde_json::from_str(&doc.to_json_string().unwrap()).unwrap();
        assert_eq!(json["directed"], true);
        assert_eq!(json["multigraph"], true);
        assert_eq!(json["metadata"]["source"], "test");
        assert!(json["nodes"][0]["_node_type"].is_string());
        assert!(json["nodes"][0]["_display"].is_string());
        assert!(json["links"][0]["type"].is_string());
        assert!(json["links"][0]["properties"].get("data").is_some());
    }

    #[test]
    fn missing_nodes_or_links_is_rejected() {
        assert!(GraphDocument::from_json_str(r#"{"directed":true,"multigraph":true,"links":[]}"#)
            .is_err());
        assert!(GraphDocument::from_json_str(r#"{"directed":true,"multigraph":true,"nodes":[]}"#)
            .is_err());
    }

    #[test]
    fn round_trip_through_batch() {
        let catalog = VariantCatalog::new().unwrap();
        let acc = sample(&catalog);
        for consolidate_edges in [false, true] {
            let doc =
                GraphDocument::from_graph(&acc, Record::new(), ExportOptions { consolidate_edges });
            let json = doc.to_json_string().unwrap();
            let batch = GraphDocument::from_json_str(&json)
                .unwrap()
                .into_batch(&catalog)
                .unwrap();
            let mut again = GraphAccumulator::new();
            let report = again.ingest(batch).unwrap();
            assert!(report.is_clean());
            assert_eq!(again.len(), acc.len());
            assert_eq!(again.edge_count(), acc.edge_count());
            assert_eq!(again.occurrence_count(), acc.occurrence_count());
        }
    }

    #[test]
    fn dangling_link_is_an_error() {
        let catalog = VariantCatalog::new().unwrap();
        let doc = GraphDocument {
            directed: true,
            multigraph: true,
            metadata: Record::new(),
            nodes: vec![NodeExport {
                id: 0,
                properties: record([("domain", "a.com")]),
                node_type: "Domain".into(),
                display: "a.com".into(),
                color: "#A020F0".into(),
            }],
            links: vec![LinkExport {
                id: 1,
                source: 0,
                target: 9,
                kind: "resolves_to".into(),
                properties: LinkProperties::default(),
            }],
        };
        assert!(matches!(
            doc.into_batch(&catalog),
            Err(ExportError::DanglingLink { link: 1, node: 9 })
        ));
    }

    #[test]
    fn unknown_node_type_is_an_error() {
        let catalog = VariantCatalog::new().unwrap();
        let doc = GraphDocument::from_json_str(
            r##"{"directed":true,"multigraph":true,"nodes":[{"id":0,"properties":{"x":"1"},"_node_type":"Mutex","_display":"1","_color":"#fff"}],"links":[]}"##,
        )
        .unwrap();
        assert!(matches!(
            doc.into_batch(&catalog),
            Err(ExportError::Definition(_))
        ));
    }

    #[test]
    fn digraph_view() {
        let catalog = VariantCatalog::new().unwrap();
        let acc = sample(&catalog);
        let view = to_digraph(&acc);
        assert_eq!(view.node_count(), 3);
        assert_eq!(view.edge_count(), 2);
        let connected = view
            .edge_weights()
            .find(|e| e.kind == "connected_to")
            .unwrap();
        let ports: Vec<&Value> = connected.occurrences.iter().map(|o| &o["port"]).collect();
        assert_eq!(ports, vec![&Value::Int(80), &Value::Int(443)]);
    }
}
