//! Rich diagnostic error types for the beagle graph engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so users know what went wrong and
//! whether a run can continue past it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the beagle graph engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum BeagleError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Definition errors
// ---------------------------------------------------------------------------

/// A node variant was declared with a broken schema.
///
/// These are fatal at startup: no instance of a malformed variant can exist.
#[derive(Debug, Error, Diagnostic)]
pub enum DefinitionError {
    #[error("variant \"{variant}\" has no identity declaration")]
    #[diagnostic(
        code(beagle::node::missing_identity),
        help(
            "Every node variant must declare at least one identity field. \
             Identity fields decide when two observations describe the same entity."
        )
    )]
    MissingIdentity { variant: String },

    #[error("variant name must not be empty")]
    #[diagnostic(
        code(beagle::node::empty_name),
        help("Give the variant a name such as \"Process\" or \"IPAddress\".")
    )]
    EmptyName,

    #[error("variant \"{variant}\" declares identity field \"{field}\" more than once")]
    #[diagnostic(
        code(beagle::node::duplicate_identity_field),
        help("Remove the repeated entry from the identity field list.")
    )]
    DuplicateIdentityField { variant: String, field: String },

    #[error("variant \"{variant}\" declares an empty field name")]
    #[diagnostic(
        code(beagle::node::empty_field),
        help("Identity and display field names must be non-empty.")
    )]
    EmptyField { variant: String },

    #[error("variant \"{name}\" is already registered")]
    #[diagnostic(
        code(beagle::node::duplicate_variant),
        help(
            "Variant names are unique within a catalog. Built-in variants \
             (Process, File, IPAddress, Domain, URI, RegistryKey, Alert) cannot be redefined."
        )
    )]
    DuplicateVariant { name: String },

    #[error("unknown variant \"{name}\"")]
    #[diagnostic(
        code(beagle::node::unknown_variant),
        help(
            "The variant is not in the catalog. Declare it under [[variants]] \
             in the configuration file, or list known variants with `beagle variants`."
        )
    )]
    UnknownVariant { name: String },
}

// ---------------------------------------------------------------------------
// Merge errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum MergeError {
    #[error("cannot merge {incoming} into {canonical}: identities differ")]
    #[diagnostic(
        code(beagle::merge::identity_mismatch),
        help(
            "Only nodes with the same variant and identity values can be merged. \
             This is a bug in the caller; the canonical node was left unchanged."
        )
    )]
    IdentityMismatch { canonical: String, incoming: String },
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

/// Why a node could not be ingested.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedReason {
    #[error("identity is missing required field(s) {}", .missing.join(", "))]
    IncompleteIdentity { missing: Vec<String> },

    #[error("`{kind}` edge target {target} is missing required field(s) {}", .missing.join(", "))]
    IncompleteTarget {
        kind: String,
        target: String,
        missing: Vec<String>,
    },

    #[error("`{kind}` edge target {target} is neither canonical nor part of the batch")]
    UnresolvedTarget { kind: String, target: String },
}

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("malformed node {node}: {reason}")]
    #[diagnostic(
        code(beagle::graph::malformed_node),
        help(
            "The transformer emitted a node (or an edge to a node) whose identity \
             cannot be computed. Set `on_malformed = \"skip\"` to drop such nodes \
             and keep processing, or fix the transformer's field mapping."
        )
    )]
    MalformedNode {
        node: String,
        reason: MalformedReason,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Merge(#[from] MergeError),
}

// ---------------------------------------------------------------------------
// Datasource errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SourceError {
    #[error("failed to read event source {path}")]
    #[diagnostic(
        code(beagle::source::io),
        help("Check that the file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: invalid JSON event: {message}")]
    #[diagnostic(
        code(beagle::source::parse),
        help("Each line must hold exactly one JSON object mapping field names to scalars.")
    )]
    Parse { line: usize, message: String },

    #[error("line {line}: field \"{field}\" is not a scalar")]
    #[diagnostic(
        code(beagle::source::non_scalar),
        help("Event records are flat: values must be strings, booleans, null or numbers within the 64-bit integer range.")
    )]
    NonScalarField { line: usize, field: String },
}

// ---------------------------------------------------------------------------
// Transformer errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TransformError {
    #[error("{transformer}: missing field \"{field}\"")]
    #[diagnostic(
        code(beagle::transform::missing_field),
        help("The event type requires this field. The event was skipped.")
    )]
    MissingField {
        transformer: &'static str,
        field: String,
    },

    #[error("{transformer}: field \"{field}\" has invalid value {value}")]
    #[diagnostic(
        code(beagle::transform::invalid_field),
        help("Numeric fields such as process IDs and ports must be integers.")
    )]
    InvalidField {
        transformer: &'static str,
        field: String,
        value: String,
    },

    #[error("unknown transformer \"{name}\"")]
    #[diagnostic(
        code(beagle::transform::unknown),
        help("Available transformers: generic, network.")
    )]
    Unknown { name: String },
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ExportError {
    #[error("graph document error: {message}")]
    #[diagnostic(
        code(beagle::export::serde),
        help("The document must be a node-link JSON graph written by `beagle graph`.")
    )]
    Serialization { message: String },

    #[error("link {link} references unknown node {node}")]
    #[diagnostic(
        code(beagle::export::dangling_link),
        help("Every link source and target must be the id of a node in the same document.")
    )]
    DanglingLink { link: usize, node: usize },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Definition(#[from] DefinitionError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(beagle::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(beagle::config::parse),
        help("Check the TOML syntax; `beagle config show` prints a valid example.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(beagle::config::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(beagle::config::invalid), help("{message}"))]
    Invalid { message: String },
}

/// Convenience alias for functions returning beagle results.
pub type BeagleResult<T> = std::result::Result<T, BeagleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_error_converts_to_beagle_error() {
        let err = DefinitionError::MissingIdentity {
            variant: "Widget".into(),
        };
        let top: BeagleError = err.into();
        assert!(matches!(
            top,
            BeagleError::Definition(DefinitionError::MissingIdentity { .. })
        ));
    }

    #[test]
    fn graph_error_wraps_merge_error() {
        let err = MergeError::IdentityMismatch {
            canonical: "a".into(),
            incoming: "b".into(),
        };
        let graph: GraphError = err.into();
        assert!(matches!(graph, GraphError::Merge(_)));
    }

    #[test]
    fn malformed_reason_lists_missing_fields() {
        let err = GraphError::MalformedNode {
            node: "Process(null, null, cmd.exe)".into(),
            reason: MalformedReason::IncompleteIdentity {
                missing: vec!["process_id".into()],
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("process_id"));
        assert!(msg.contains("cmd.exe"));
    }
}
