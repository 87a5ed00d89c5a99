//! Graph accumulator: resolves transformer output against every node seen so
//! far and keeps exactly one canonical node per identity.
//!
//! Canonical nodes live in an arena addressed by [`NodeId`]; an index maps
//! [`IdentityKey`] to arena slots. Adjacency tables hold identity keys, so the
//! arena never needs to patch references when a node is merged.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, MalformedReason};
use crate::node::{IdentityKey, Node, Variant};
use crate::value::Value;

use super::merge::{FieldPolicy, merge_with_policy};

/// Stable handle of a canonical node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What to do with a node that cannot be resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Drop the node, report it, and ingest the rest of the batch.
    #[default]
    Skip,
    /// Reject the whole batch on the first malformed node.
    Abort,
}

/// Accumulator policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccumulatorConfig {
    pub on_malformed: MalformedPolicy,
    pub field_policy: FieldPolicy,
}

/// A node dropped under [`MalformedPolicy::Skip`].
#[derive(Debug)]
pub struct SkippedNode {
    /// Position of the node in the ingested batch.
    pub position: usize,
    pub error: GraphError,
}

/// Outcome of one [`GraphAccumulator::ingest`] call.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Nodes that became canonical.
    pub inserted: usize,
    /// Nodes merged into an existing canonical node.
    pub merged: usize,
    pub skipped: Vec<SkippedNode>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Node and edge counts, broken down by variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub occurrences: usize,
    pub by_variant: BTreeMap<String, usize>,
}

impl std::fmt::Display for GraphStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} nodes, {} edges, {} occurrences",
            self.nodes, self.edges, self.occurrences
        )?;
        for (variant, count) in &self.by_variant {
            writeln!(f, "  {variant:<12} {count}")?;
        }
        Ok(())
    }
}

/// The single writer that owns every canonical node of a run.
pub struct GraphAccumulator {
    config: AccumulatorConfig,
    nodes: Vec<Node>,
    index: HashMap<IdentityKey, NodeId>,
}

impl GraphAccumulator {
    pub fn new() -> Self {
        Self::with_config(AccumulatorConfig::default())
    }

    pub fn with_config(config: AccumulatorConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AccumulatorConfig {
        &self.config
    }

    /// Resolve a batch of transformer output into the graph.
    ///
    /// The batch is validated before anything is applied. Edge targets that
    /// are also in the batch are placed before the nodes pointing at them;
    /// nodes sharing an identity are merged in batch order. Under
    /// [`MalformedPolicy::Abort`] the first malformed node is returned as an
    /// error and the graph is left untouched.
    pub fn ingest(&mut self, batch: Vec<Node>) -> Result<IngestReport, GraphError> {
        let mut report = IngestReport::default();
        if batch.is_empty() {
            return Ok(report);
        }

        let keys: Vec<IdentityKey> = batch.iter().map(Node::identity).collect();
        let reasons = self.validate(&batch, &keys);
        let viable: Vec<bool> = reasons.iter().map(Option::is_none).collect();

        for (position, reason) in reasons.into_iter().enumerate() {
            let Some(reason) = reason else {
                continue;
            };
            let error = GraphError::MalformedNode {
                node: keys[position].to_string(),
                reason,
            };
            if self.config.on_malformed == MalformedPolicy::Abort {
                return Err(error);
            }
            tracing::warn!(position, error = %error, "skipping malformed node");
            report.skipped.push(SkippedNode { position, error });
        }

        let order = self.placement_order(&batch, &keys, &viable);
        let mut slots: Vec<Option<Node>> = batch.into_iter().map(Some).collect();
        for position in order {
            let Some(node) = slots[position].take() else {
                continue;
            };
            let key = keys[position].clone();
            if self.place(key, node)? {
                report.inserted += 1;
            } else {
                report.merged += 1;
            }
        }

        tracing::debug!(
            inserted = report.inserted,
            merged = report.merged,
            skipped = report.skipped.len(),
            "ingested batch"
        );
        Ok(report)
    }

    /// Per-position malformed reason, `None` for viable nodes.
    fn validate(&self, batch: &[Node], keys: &[IdentityKey]) -> Vec<Option<MalformedReason>> {
        let mut reasons: Vec<Option<MalformedReason>> = batch
            .iter()
            .zip(keys)
            .map(|(node, key)| incomplete_reason(node, key))
            .collect();

        // Identities provided by viable batch nodes, with multiplicity.
        let mut provided: HashMap<&IdentityKey, usize> = HashMap::new();
        for (key, reason) in keys.iter().zip(&reasons) {
            if reason.is_none() {
                *provided.entry(key).or_default() += 1;
            }
        }

        // Dropping a node can strand edges that pointed at it, so repeat
        // until no further node becomes unresolvable.
        loop {
            let mut changed = false;
            for (position, node) in batch.iter().enumerate() {
                if reasons[position].is_some() {
                    continue;
                }
                let unresolved = node.edges().iter().find(|(_, target, _)| {
                    !self.index.contains_key(*target) && !provided.contains_key(*target)
                });
                if let Some((kind, target, _)) = unresolved {
                    reasons[position] = Some(MalformedReason::UnresolvedTarget {
                        kind: kind.to_string(),
                        target: target.to_string(),
                    });
                    let key = &keys[position];
                    if let Some(count) = provided.get_mut(key) {
                        *count -= 1;
                        if *count == 0 {
                            provided.remove(key);
                        }
                    }
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        reasons
    }

    /// Post-order over edge targets that are not canonical yet.
    ///
    /// A node is marked before its targets are expanded, so cycles within the
    /// batch terminate. Only the first batch node of an identity is pulled
    /// forward; later duplicates keep their batch position.
    fn placement_order(&self, batch: &[Node], keys: &[IdentityKey], viable: &[bool]) -> Vec<usize> {
        let mut first_of: HashMap<&IdentityKey, usize> = HashMap::new();
        for (position, key) in keys.iter().enumerate() {
            if viable[position] {
                first_of.entry(key).or_insert(position);
            }
        }

        let mut marked = vec![false; batch.len()];
        let mut order = Vec::with_capacity(batch.len());
        let mut stack: Vec<(usize, bool)> = Vec::new();

        for root in (0..batch.len()).filter(|&p| viable[p]) {
            stack.push((root, false));
            while let Some((position, expanded)) = stack.pop() {
                if expanded {
                    order.push(position);
                    continue;
                }
                if marked[position] {
                    continue;
                }
                marked[position] = true;
                stack.push((position, true));

                let targets: Vec<usize> = batch[position]
                    .edges()
                    .target_keys()
                    .filter(|target| !self.index.contains_key(*target))
                    .filter_map(|target| first_of.get(target).copied())
                    .filter(|&p| !marked[p])
                    .collect();
                stack.extend(targets.into_iter().rev().map(|p| (p, false)));
            }
        }
        order
    }

    /// Insert `node` as canonical or merge it. Returns `true` on insert.
    fn place(&mut self, key: IdentityKey, node: Node) -> Result<bool, GraphError> {
        match self.index.get(&key) {
            Some(&id) => {
                let summary =
                    merge_with_policy(&mut self.nodes[id.0], node, self.config.field_policy)?;
                tracing::trace!(
                    node = %key,
                    filled = summary.fields_filled,
                    occurrences = summary.occurrences_appended,
                    "merged node"
                );
                Ok(false)
            }
            None => {
                let id = NodeId(self.nodes.len());
                self.nodes.push(node);
                self.index.insert(key, id);
                Ok(true)
            }
        }
    }

    /// Canonical node for `(variant, identity values)`.
    pub fn lookup(&self, variant: &Variant, identity: &[Value]) -> Option<&Node> {
        self.lookup_key(&IdentityKey::new(variant, identity.iter().cloned()))
    }

    pub fn lookup_key(&self, key: &IdentityKey) -> Option<&Node> {
        self.id_of(key).map(|id| &self.nodes[id.0])
    }

    pub fn id_of(&self, key: &IdentityKey) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Canonical nodes in first-seen order.
    pub fn all_nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of `(source, kind, target)` adjacency entries.
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.edges().entry_count()).sum()
    }

    pub fn occurrence_count(&self) -> usize {
        self.nodes.iter().map(|n| n.edges().occurrence_count()).sum()
    }

    pub fn stats(&self) -> GraphStats {
        let mut by_variant = BTreeMap::new();
        for node in &self.nodes {
            *by_variant.entry(node.variant().name().to_string()).or_default() += 1;
        }
        GraphStats {
            nodes: self.len(),
            edges: self.edge_count(),
            occurrences: self.occurrence_count(),
            by_variant,
        }
    }
}

impl Default for GraphAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GraphAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphAccumulator")
            .field("config", &self.config)
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edge_count())
            .finish()
    }
}

fn incomplete_reason(node: &Node, key: &IdentityKey) -> Option<MalformedReason> {
    let missing = key.missing_fields();
    if !missing.is_empty() {
        return Some(MalformedReason::IncompleteIdentity { missing });
    }
    node.edges().iter().find_map(|(kind, target, _)| {
        let missing = target.missing_fields();
        (!missing.is_empty()).then(|| MalformedReason::IncompleteTarget {
            kind: kind.to_string(),
            target: target.to_string(),
            missing,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::EdgeKind;
    use crate::node::{BuiltinVariant, IdentityField, VariantCatalog, VariantSpec};
    use crate::value::{Record, record};

    fn ip(catalog: &VariantCatalog, addr: &str) -> Node {
        Node::new(catalog.builtin(BuiltinVariant::IpAddress)).with("ip_address", addr)
    }

    fn domain(catalog: &VariantCatalog, name: &str) -> Node {
        Node::new(catalog.builtin(BuiltinVariant::Domain)).with("domain", name)
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let mut acc = GraphAccumulator::new();
        let report = acc.ingest(Vec::new()).unwrap();
        assert_eq!(report.inserted, 0);
        assert!(acc.is_empty());
    }

    #[test]
    fn repeated_identity_collapses_to_one_node() {
        let c = VariantCatalog::new().unwrap();
        let mut acc = GraphAccumulator::new();
        for _ in 0..10 {
            acc.ingest(vec![ip(&c, "1.2.3.4")]).unwrap();
        }
        assert_eq!(acc.len(), 1);
        let ipv = c.builtin(BuiltinVariant::IpAddress);
        assert!(acc.lookup(ipv, &[Value::from("1.2.3.4")]).is_some());
        assert!(acc.lookup(ipv, &[Value::from("4.3.2.1")]).is_none());
    }

    #[test]
    fn edge_targets_are_placed_before_sources() {
        let c = VariantCatalog::new().unwrap();
        let dst = ip(&c, "5.6.7.8");
        let mut src = ip(&c, "1.2.3.4");
        src.add_edge("connected_to", &dst, record([("port", 80i64)]));

        let mut acc = GraphAccumulator::new();
        let report = acc.ingest(vec![src, dst.clone()]).unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(acc.all_nodes()[0], dst);
    }

    #[test]
    fn cycles_within_a_batch_terminate() {
        let c = VariantCatalog::new().unwrap();
        let a0 = ip(&c, "1.1.1.1");
        let b0 = ip(&c, "2.2.2.2");
        let mut a = a0.clone();
        let mut b = b0.clone();
        a.add_edge("connected_to", &b0, Record::new());
        b.add_edge("connected_to", &a0, Record::new());

        let mut acc = GraphAccumulator::new();
        let report = acc.ingest(vec![a, b]).unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(acc.edge_count(), 2);
    }

    #[test]
    fn self_loops_resolve() {
        let c = VariantCatalog::new().unwrap();
        let a0 = ip(&c, "1.1.1.1");
        let mut a = a0.clone();
        a.connect("connected_to", &a0);
        let mut acc = GraphAccumulator::new();
        acc.ingest(vec![a]).unwrap();
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.edge_count(), 1);
    }

    #[test]
    fn incomplete_identity_is_skipped() {
        let c = VariantCatalog::new().unwrap();
        let broken = Node::new(c.builtin(BuiltinVariant::Process)).with("process_image", "cmd.exe");
        let mut acc = GraphAccumulator::new();
        let report = acc.ingest(vec![broken, ip(&c, "1.2.3.4")]).unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].position, 0);
        assert!(matches!(
            &report.skipped[0].error,
            GraphError::MalformedNode {
                reason: MalformedReason::IncompleteIdentity { .. },
                ..
            }
        ));
    }

    #[test]
    fn abort_policy_applies_nothing() {
        let c = VariantCatalog::new().unwrap();
        let broken = Node::new(c.builtin(BuiltinVariant::Process)).with("process_id", 4i64);
        let mut acc = GraphAccumulator::with_config(AccumulatorConfig {
            on_malformed: MalformedPolicy::Abort,
            ..Default::default()
        });
        let err = acc.ingest(vec![ip(&c, "1.2.3.4"), broken]).unwrap_err();
        assert!(matches!(err, GraphError::MalformedNode { .. }));
        assert!(acc.is_empty());
    }

    #[test]
    fn unresolved_target_is_malformed_and_never_invented() {
        let c = VariantCatalog::new().unwrap();
        let ghost = ip(&c, "6.6.6.6");
        let mut d = domain(&c, "example.com");
        d.add_edge("resolves_to", &ghost, Record::new());

        let mut acc = GraphAccumulator::new();
        let report = acc.ingest(vec![d]).unwrap();
        assert_eq!(report.inserted, 0);
        assert!(matches!(
            &report.skipped[0].error,
            GraphError::MalformedNode {
                reason: MalformedReason::UnresolvedTarget { .. },
                ..
            }
        ));
        assert!(acc.is_empty());
    }

    #[test]
    fn dropping_a_node_strands_its_referrers() {
        let c = VariantCatalog::new().unwrap();
        let proc0 = Node::new(c.builtin(BuiltinVariant::Process)).with("process_image", "x.exe");
        let mut middle = ip(&c, "1.1.1.1");
        middle.connect("connected_to", &proc0);
        let middle0 = ip(&c, "1.1.1.1");
        let mut top = domain(&c, "a.com");
        top.connect("resolves_to", &middle0);

        let mut acc = GraphAccumulator::new();
        let report = acc.ingest(vec![top, middle]).unwrap();
        // `middle` points at an incomplete identity, `top` points at `middle`.
        assert_eq!(report.skipped.len(), 2);
        assert!(acc.is_empty());
    }

    #[test]
    fn target_canonical_from_earlier_batch_resolves() {
        let c = VariantCatalog::new().unwrap();
        let dst = ip(&c, "5.6.7.8");
        let mut acc = GraphAccumulator::new();
        acc.ingest(vec![dst.clone()]).unwrap();

        let mut src = ip(&c, "1.2.3.4");
        src.add_edge("connected_to", &dst, Record::new());
        let report = acc.ingest(vec![src]).unwrap();
        assert!(report.is_clean());
        assert_eq!(acc.len(), 2);
    }

    #[test]
    fn node_without_identity_values_is_never_placed() {
        let c = VariantCatalog::new().unwrap();
        let user = VariantSpec::new("User")
            .identity(IdentityField::optional("user_name"))
            .identity(IdentityField::optional("sid"))
            .build()
            .unwrap();
        let anonymous = Node::new(&user);
        let mut login = ip(&c, "1.2.3.4");
        login.connect("logged_in_as", &anonymous);

        let mut acc = GraphAccumulator::new();
        let report = acc
            .ingest(vec![anonymous, login, Node::new(&user).with("sid", "S-1")])
            .unwrap();

        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped.len(), 2);
        assert!(matches!(
            report.skipped[0].error,
            GraphError::MalformedNode {
                reason: MalformedReason::IncompleteIdentity { .. },
                ..
            }
        ));
        assert!(matches!(
            report.skipped[1].error,
            GraphError::MalformedNode {
                reason: MalformedReason::IncompleteTarget { .. },
                ..
            }
        ));
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.all_nodes()[0].get_str("sid"), Some("S-1"));
    }

    #[test]
    fn duplicates_merge_in_batch_order() {
        let c = VariantCatalog::new().unwrap();
        let first = ip(&c, "1.2.3.4").with("mac", "aa");
        let second = ip(&c, "1.2.3.4").with("mac", "bb");

        let mut acc = GraphAccumulator::new();
        let report = acc.ingest(vec![first.clone(), second.clone()]).unwrap();
        assert_eq!((report.inserted, report.merged), (1, 1));
        assert_eq!(acc.all_nodes()[0].get_str("mac"), Some("aa"));

        let mut lww = GraphAccumulator::with_config(AccumulatorConfig {
            field_policy: FieldPolicy::LastWriterWins,
            ..Default::default()
        });
        lww.ingest(vec![first, second]).unwrap();
        assert_eq!(lww.all_nodes()[0].get_str("mac"), Some("bb"));
    }

    #[test]
    fn stats_count_by_variant() {
        let c = VariantCatalog::new().unwrap();
        let dst = ip(&c, "5.6.7.8");
        let mut d = domain(&c, "a.com");
        d.add_edge("resolves_to", &dst, Record::new());
        d.add_edge("resolves_to", &dst, Record::new());

        let mut acc = GraphAccumulator::new();
        acc.ingest(vec![d, dst]).unwrap();
        let stats = acc.stats();
        assert_eq!(stats.nodes, 2);
        assert_eq!(stats.edges, 1);
        assert_eq!(stats.occurrences, 2);
        assert_eq!(stats.by_variant["Domain"], 1);
        assert!(stats.to_string().contains("2 nodes"));

        let kind = EdgeKind::from("resolves_to");
        let id = acc.id_of(&ip(&c, "5.6.7.8").identity()).unwrap();
        let dst = acc.node(id).unwrap();
        assert_eq!(dst.display(), "5.6.7.8");
        let d = acc.lookup(c.builtin(BuiltinVariant::Domain), &[Value::from("a.com")]).unwrap();
        assert!(d.has_edge(&kind, dst));
    }
}
