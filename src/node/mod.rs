//! Identity & entity model.
//!
//! A [`Node`] is a typed record: a [`Variant`], a set of attributes, and an
//! [`Adjacency`] table of outgoing edges. Identity is the projection of the
//! attributes onto the variant's identity fields ([`IdentityKey`]); equality
//! and hashing look at nothing else.
//!
//! Nodes are built by transformers with the consuming `with_*` methods and
//! then handed to the [`GraphAccumulator`](crate::graph::GraphAccumulator).
//! After construction, attributes and edges only change through a merge.

pub mod catalog;
pub mod identity;
pub mod variant;

pub use catalog::{BuiltinVariant, VariantCatalog};
pub use identity::IdentityKey;
pub use variant::{IdentityField, Variant, VariantSpec};

use crate::edge::{Adjacency, EdgeKind, Targets};
use crate::value::{Record, Value};

/// Label shown for nodes whose display attribute is unset.
pub const NO_DISPLAY_VALUE: &str = "NO_DISPLAY_VALUE";

/// A typed entity with attributes and outgoing edges.
#[derive(Debug, Clone)]
pub struct Node {
    variant: Variant,
    attributes: Record,
    edges: Adjacency,
}

impl Node {
    pub fn new(variant: &Variant) -> Self {
        Self {
            variant: variant.clone(),
            attributes: Record::new(),
            edges: Adjacency::new(),
        }
    }

    /// Set an attribute. Null values are ignored (the field stays unset).
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        if !value.is_null() {
            self.attributes.insert(field.into(), value);
        }
        self
    }

    /// Set every non-null attribute of `record`.
    pub fn with_record(mut self, record: Record) -> Self {
        self.attributes
            .extend(record.into_iter().filter(|(_, v)| !v.is_null()));
        self
    }

    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    /// Attribute value, `None` when unset.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn attributes(&self) -> &Record {
        &self.attributes
    }

    /// The identity projection, with `null` for unset identity fields.
    pub fn identity(&self) -> IdentityKey {
        IdentityKey::new(
            &self.variant,
            self.variant
                .identity_fields()
                .iter()
                .map(|f| self.attributes.get(&f.name).cloned().unwrap_or_default()),
        )
    }

    /// The identity projection, or the names of the identity fields it lacks.
    pub fn identity_key(&self) -> Result<IdentityKey, Vec<String>> {
        let key = self.identity();
        let missing = key.missing_fields();
        if missing.is_empty() {
            Ok(key)
        } else {
            Err(missing)
        }
    }

    /// Human-readable label taken from the variant's display field.
    pub fn display(&self) -> String {
        self.get(self.variant.display_field())
            .map(ToString::to_string)
            .unwrap_or_else(|| NO_DISPLAY_VALUE.to_string())
    }

    /// Flattened attributes for export. Unset fields are omitted.
    pub fn to_record(&self) -> Record {
        self.attributes
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn edges(&self) -> &Adjacency {
        &self.edges
    }

    /// Record one occurrence of `kind` from this node to `target`.
    pub fn add_edge(&mut self, kind: impl Into<EdgeKind>, target: &Node, occurrence: Record) {
        self.edges.add(kind.into(), target.identity(), occurrence);
    }

    /// Record that `kind` links this node to `target`, with no attributes.
    pub fn connect(&mut self, kind: impl Into<EdgeKind>, target: &Node) {
        self.edges.connect(kind.into(), target.identity());
    }

    /// Like [`add_edge`](Self::add_edge), for a target known only by identity.
    pub fn add_edge_to(&mut self, kind: impl Into<EdgeKind>, target: IdentityKey, occurrence: Record) {
        self.edges.add(kind.into(), target, occurrence);
    }

    /// Like [`connect`](Self::connect), for a target known only by identity.
    pub fn connect_to(&mut self, kind: impl Into<EdgeKind>, target: IdentityKey) {
        self.edges.connect(kind.into(), target);
    }

    pub fn has_edge(&self, kind: &EdgeKind, target: &Node) -> bool {
        self.edges.contains(kind, &target.identity())
    }

    /// Targets of `kind` with their occurrences, in insertion order.
    pub fn edges_of(&self, kind: &EdgeKind) -> Option<&Targets> {
        self.edges.targets(kind)
    }

    pub(crate) fn parts_mut(&mut self) -> (&Variant, &mut Record, &mut Adjacency) {
        (&self.variant, &mut self.attributes, &mut self.edges)
    }

    pub(crate) fn into_parts(self) -> (Record, Adjacency) {
        (self.attributes, self.edges)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.variant == other.variant && self.identity() == other.identity()
    }
}

impl Eq for Node {}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.identity())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::collections::{HashMap, HashSet};
    use std::hash::{Hash, Hasher};

    use super::*;
    use crate::value::record;

    fn catalog() -> VariantCatalog {
        VariantCatalog::new().unwrap()
    }

    fn hash_of(node: &Node) -> u64 {
        let mut h = DefaultHasher::new();
        node.hash(&mut h);
        h.finish()
    }

    fn ip(catalog: &VariantCatalog, addr: &str) -> Node {
        Node::new(catalog.builtin(BuiltinVariant::IpAddress)).with("ip_address", addr)
    }

    #[test]
    fn equality_is_reflexive_and_hash_is_stable() {
        let c = catalog();
        let a = ip(&c, "1.2.3.4");
        assert_eq!(a, a);
        assert_eq!(hash_of(&a), hash_of(&a));
    }

    #[test]
    fn non_identity_attributes_do_not_affect_equality() {
        let c = catalog();
        let a = ip(&c, "1.2.3.4").with("mac", "ab:ab:ab:ab:ab:ab");
        let b = ip(&c, "1.2.3.4").with("mac", "12:12:12:12:12:12");
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let mut map = HashMap::new();
        map.insert(a, 1);
        assert_eq!(map.get(&b), Some(&1));
    }

    #[test]
    fn edges_do_not_affect_equality() {
        let c = catalog();
        let target = ip(&c, "5.6.7.8");
        let mut a = ip(&c, "1.2.3.4");
        a.add_edge("connected_to", &target, record([("port", 80i64)]));
        let b = ip(&c, "1.2.3.4");
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn different_identity_values_are_not_equal() {
        let c = catalog();
        assert_ne!(ip(&c, "1.2.3.4"), ip(&c, "1.2.3.5"));
    }

    #[test]
    fn different_variants_are_never_equal() {
        let c = catalog();
        let a = VariantSpec::new("A")
            .identity(IdentityField::required("x"))
            .build()
            .unwrap();
        let b = VariantSpec::new("B")
            .identity(IdentityField::required("x"))
            .build()
            .unwrap();
        let na = Node::new(&a).with("x", "1");
        let nb = Node::new(&b).with("x", "1");
        assert_ne!(na, nb);

        let domain = Node::new(c.builtin(BuiltinVariant::Domain)).with("domain", "x");
        let uri = Node::new(c.builtin(BuiltinVariant::Uri)).with("uri", "x");
        assert_ne!(domain, uri);

        let set: HashSet<Node> = [na, nb, domain, uri].into_iter().collect();
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn identity_key_reports_missing_required_fields() {
        let c = catalog();
        let proc = Node::new(c.builtin(BuiltinVariant::Process)).with("process_image", "cmd.exe");
        assert_eq!(proc.identity_key().unwrap_err(), vec!["process_id"]);

        let proc = proc.with("process_id", 4i64);
        let key = proc.identity_key().unwrap();
        assert!(key.values()[0].is_null());
    }

    #[test]
    fn to_record_includes_identity_and_omits_unset() {
        let c = catalog();
        let proc = Node::new(c.builtin(BuiltinVariant::Process))
            .with("process_image", "cmd.exe")
            .with("process_id", 4i64)
            .with("command_line", Option::<String>::None);
        let rec = proc.to_record();
        assert_eq!(rec.len(), 2);
        assert_eq!(rec["process_image"], Value::from("cmd.exe"));
        assert!(!rec.contains_key("command_line"));
        assert!(!rec.contains_key("host"));
    }

    #[test]
    fn display_uses_display_field() {
        let c = catalog();
        let proc = Node::new(c.builtin(BuiltinVariant::Process))
            .with("process_image", "cmd.exe")
            .with("process_id", 4i64);
        assert_eq!(proc.display(), "cmd.exe");

        let file = Node::new(c.builtin(BuiltinVariant::File)).with("full_path", "C:\\a.txt");
        assert_eq!(file.display(), NO_DISPLAY_VALUE);
    }

    #[test]
    fn edge_registry_operations() {
        let c = catalog();
        let target = ip(&c, "5.6.7.8");
        let other = ip(&c, "9.9.9.9");
        let mut src = ip(&c, "1.2.3.4");
        let kind = EdgeKind::from("connected_to");

        src.add_edge(kind.clone(), &target, record([("port", 80i64)]));
        src.add_edge(kind.clone(), &target, record([("port", 80i64)]));
        src.connect(kind.clone(), &other);

        assert!(src.has_edge(&kind, &target));
        assert!(!src.has_edge(&EdgeKind::from("resolves_to"), &target));

        let targets = src.edges_of(&kind).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[&target.identity()].len(), 2);
        assert!(targets[&other.identity()].is_empty());
    }
}
