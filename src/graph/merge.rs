//! Merge engine: combine two nodes that share an identity.
//!
//! Attribute reconciliation follows a [`FieldPolicy`]; edge histories are
//! concatenated, canonical occurrences first.

use serde::{Deserialize, Serialize};

use crate::error::MergeError;
use crate::node::Node;

/// How conflicting non-identity attributes are reconciled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldPolicy {
    /// Keep the canonical value; only fill unset fields.
    #[default]
    FirstWriterWins,
    /// Non-null incoming values overwrite the canonical value.
    LastWriterWins,
}

/// What a single merge changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Attributes that were unset on the canonical node and are now set.
    pub fields_filled: usize,
    /// Attributes replaced under [`FieldPolicy::LastWriterWins`].
    pub fields_overwritten: usize,
    /// New `(kind, target)` adjacency entries.
    pub entries_created: usize,
    pub occurrences_appended: usize,
}

/// Merge `incoming` into `canonical` with first-writer-wins attributes.
pub fn merge_into(canonical: &mut Node, incoming: Node) -> Result<MergeSummary, MergeError> {
    merge_with_policy(canonical, incoming, FieldPolicy::FirstWriterWins)
}

/// Merge `incoming` into `canonical`.
///
/// Fails with [`MergeError::IdentityMismatch`] when the nodes are not equal;
/// `canonical` is unchanged in that case. Identity fields are never written.
/// Edge targets on `incoming` are expected to be canonical identities already.
pub fn merge_with_policy(
    canonical: &mut Node,
    incoming: Node,
    policy: FieldPolicy,
) -> Result<MergeSummary, MergeError> {
    if *canonical != incoming {
        return Err(MergeError::IdentityMismatch {
            canonical: canonical.identity().to_string(),
            incoming: incoming.identity().to_string(),
        });
    }

    let mut summary = MergeSummary::default();
    let (variant, attributes, edges) = canonical.parts_mut();
    let (incoming_attributes, incoming_edges) = incoming.into_parts();

    for (field, value) in incoming_attributes {
        if value.is_null() || variant.is_identity_field(&field) {
            continue;
        }
        match attributes.get_mut(&field) {
            Some(current) if !current.is_null() => {
                if policy == FieldPolicy::LastWriterWins && *current != value {
                    *current = value;
                    summary.fields_overwritten += 1;
                }
            }
            Some(current) => {
                *current = value;
                summary.fields_filled += 1;
            }
            None => {
                attributes.insert(field, value);
                summary.fields_filled += 1;
            }
        }
    }

    let appended = edges.append_from(incoming_edges);
    summary.entries_created = appended.entries_created;
    summary.occurrences_appended = appended.occurrences_appended;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::EdgeKind;
    use crate::node::{BuiltinVariant, VariantCatalog};
    use crate::value::{Value, record};

    fn ip(catalog: &VariantCatalog, addr: &str) -> Node {
        Node::new(catalog.builtin(BuiltinVariant::IpAddress)).with("ip_address", addr)
    }

    #[test]
    fn fills_gaps_without_overwriting() {
        let c = VariantCatalog::new().unwrap();
        let mut canonical = ip(&c, "1.2.3.4").with("mac", "aa");
        let incoming = ip(&c, "1.2.3.4").with("mac", "bb").with("asn", 15169i64);

        let summary = merge_into(&mut canonical, incoming).unwrap();
        assert_eq!(summary.fields_filled, 1);
        assert_eq!(summary.fields_overwritten, 0);
        assert_eq!(canonical.get("mac"), Some(&Value::from("aa")));
        assert_eq!(canonical.get("asn"), Some(&Value::Int(15169)));
    }

    #[test]
    fn last_writer_wins_overwrites_set_fields() {
        let c = VariantCatalog::new().unwrap();
        let mut canonical = ip(&c, "1.2.3.4").with("mac", "aa");
        let incoming = ip(&c, "1.2.3.4").with("mac", "bb");

        let summary =
            merge_with_policy(&mut canonical, incoming, FieldPolicy::LastWriterWins).unwrap();
        assert_eq!(summary.fields_overwritten, 1);
        assert_eq!(canonical.get("mac"), Some(&Value::from("bb")));
    }

    #[test]
    fn accumulates_edge_occurrences_in_order() {
        let c = VariantCatalog::new().unwrap();
        let dst = ip(&c, "5.6.7.8");
        let kind = EdgeKind::from("connected_to");

        let mut canonical = ip(&c, "1.2.3.4");
        canonical.add_edge(kind.clone(), &dst, record([("port", 80i64)]));
        assert_eq!(canonical.edges().occurrence_count(), 1);

        let mut incoming = ip(&c, "1.2.3.4");
        incoming.add_edge(kind.clone(), &dst, record([("port", 443i64)]));

        let summary = merge_into(&mut canonical, incoming).unwrap();
        assert_eq!(summary.entries_created, 0);
        assert_eq!(summary.occurrences_appended, 1);

        let ports: Vec<i64> = canonical
            .edges()
            .occurrences(&kind, &dst.identity())
            .unwrap()
            .iter()
            .filter_map(|o| o["port"].as_int())
            .collect();
        assert_eq!(ports, vec![80, 443]);
    }

    #[test]
    fn merging_twice_doubles_occurrences() {
        let c = VariantCatalog::new().unwrap();
        let dst = ip(&c, "5.6.7.8");
        let mut canonical = ip(&c, "1.2.3.4");
        let mut incoming = ip(&c, "1.2.3.4");
        incoming.add_edge("connected_to", &dst, record([("port", 80i64)]));

        merge_into(&mut canonical, incoming.clone()).unwrap();
        merge_into(&mut canonical, incoming).unwrap();
        assert_eq!(canonical.edges().occurrence_count(), 2);
        assert_eq!(canonical.edges().entry_count(), 1);
    }

    #[test]
    fn identity_mismatch_leaves_canonical_unchanged() {
        let c = VariantCatalog::new().unwrap();
        let mut canonical = ip(&c, "1.2.3.4");
        let incoming = ip(&c, "9.9.9.9").with("mac", "bb");

        let err = merge_into(&mut canonical, incoming).unwrap_err();
        assert!(matches!(err, MergeError::IdentityMismatch { .. }));
        assert!(canonical.get("mac").is_none());
    }

    #[test]
    fn cross_variant_merge_is_a_mismatch() {
        let c = VariantCatalog::new().unwrap();
        let mut domain = Node::new(c.builtin(BuiltinVariant::Domain)).with("domain", "x");
        let uri = Node::new(c.builtin(BuiltinVariant::Uri)).with("uri", "x");
        assert!(merge_into(&mut domain, uri).is_err());
    }

    #[test]
    fn policy_deserializes_snake_case() {
        let p: FieldPolicy = serde_json::from_str("\"last_writer_wins\"").unwrap();
        assert_eq!(p, FieldPolicy::LastWriterWins);
    }
}
