//! Builders for the entity nodes shared by the reference transformers.

use std::collections::BTreeMap;

use crate::edge::EdgeKind;
use crate::error::TransformError;
use crate::node::{BuiltinVariant, Node, Variant, VariantCatalog};
use crate::value::{Record, Value};

use super::fields::Fields;

/// Digest fields folded into a file's `hashes` map.
const HASH_FIELDS: [&str; 3] = ["md5", "sha1", "sha256"];

/// The built-in variants, resolved once per transformer.
#[derive(Debug, Clone)]
pub struct EntityKinds {
    pub process: Variant,
    pub file: Variant,
    pub ip_address: Variant,
    pub domain: Variant,
    pub uri: Variant,
    pub registry_key: Variant,
    pub alert: Variant,
}

impl EntityKinds {
    pub fn from_catalog(catalog: &VariantCatalog) -> Self {
        Self {
            process: catalog.builtin(BuiltinVariant::Process).clone(),
            file: catalog.builtin(BuiltinVariant::File).clone(),
            ip_address: catalog.builtin(BuiltinVariant::IpAddress).clone(),
            domain: catalog.builtin(BuiltinVariant::Domain).clone(),
            uri: catalog.builtin(BuiltinVariant::Uri).clone(),
            registry_key: catalog.builtin(BuiltinVariant::RegistryKey).clone(),
            alert: catalog.builtin(BuiltinVariant::Alert).clone(),
        }
    }

    pub fn ip(&self, address: &str) -> Node {
        Node::new(&self.ip_address).with("ip_address", address)
    }

    pub fn domain(&self, name: &str) -> Node {
        Node::new(&self.domain).with("domain", name)
    }

    pub fn uri(&self, uri: &str) -> Node {
        Node::new(&self.uri).with("uri", uri)
    }
}

/// Join a directory and a name with `\`, without doubling the separator.
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.ends_with('\\') {
        format!("{dir}{name}")
    } else {
        format!("{dir}\\{name}")
    }
}

/// Text after the last `.` of a file name, if any.
pub fn extension(file_name: &str) -> Option<&str> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
}

/// Process attributes read from an event. `prefix` selects e.g. the
/// `parent_` set of fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessFields {
    pub host: Option<String>,
    pub user: Option<String>,
    pub process_id: i64,
    pub process_image: String,
    pub process_image_path: Option<String>,
    pub command_line: Option<String>,
}

impl ProcessFields {
    pub fn read(fields: &Fields<'_>, prefix: &str) -> Result<Self, TransformError> {
        let name = |field: &str| format!("{prefix}{field}");
        Ok(Self {
            host: fields.opt_str("hostname")?,
            user: fields.opt_str(&name("user"))?,
            process_id: fields.int(&name("process_id"))?,
            process_image: fields.str(&name("process_image"))?,
            process_image_path: fields.opt_str(&name("process_image_path"))?,
            command_line: fields.opt_str(&name("command_line"))?,
        })
    }

    pub fn process_path(&self) -> Option<String> {
        self.process_image_path
            .as_deref()
            .map(|dir| join_path(dir, &self.process_image))
    }

    pub fn node(&self, kinds: &EntityKinds) -> Node {
        Node::new(&kinds.process)
            .with("host", self.host.clone())
            .with("user", self.user.clone())
            .with("process_id", self.process_id)
            .with("process_image", self.process_image.as_str())
            .with("process_image_path", self.process_image_path.clone())
            .with("process_path", self.process_path())
            .with("command_line", self.command_line.clone())
    }

    /// The executable image of this process as a file.
    pub fn image_file(&self) -> FileFields {
        FileFields {
            host: self.host.clone(),
            file_path: self.process_image_path.clone(),
            file_name: self.process_image.clone(),
            hashes: BTreeMap::new(),
        }
    }

    /// Process node followed by its image file node, linked `file_of`.
    pub fn nodes(&self, kinds: &EntityKinds) -> (Node, Node) {
        let process = self.node(kinds);
        let mut file = self.image_file().node(kinds);
        file.connect(EdgeKind::from("file_of"), &process);
        (process, file)
    }
}

/// File attributes read from an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFields {
    pub host: Option<String>,
    pub file_path: Option<String>,
    pub file_name: String,
    pub hashes: BTreeMap<String, String>,
}

impl FileFields {
    /// Read `{prefix}file_path`, `{prefix}file_name` and digests.
    pub fn read(fields: &Fields<'_>, prefix: &str) -> Result<Self, TransformError> {
        let mut hashes = BTreeMap::new();
        for algorithm in HASH_FIELDS {
            if let Some(digest) = fields.opt_str(&format!("{prefix}{algorithm}"))? {
                hashes.insert(algorithm.to_string(), digest);
            }
        }
        Ok(Self {
            host: fields.opt_str("hostname")?,
            file_path: fields.opt_str(&format!("{prefix}file_path"))?,
            file_name: fields.str(&format!("{prefix}file_name"))?,
            hashes,
        })
    }

    pub fn full_path(&self) -> String {
        match &self.file_path {
            Some(dir) => join_path(dir, &self.file_name),
            None => self.file_name.clone(),
        }
    }

    pub fn node(&self, kinds: &EntityKinds) -> Node {
        let hashes = (!self.hashes.is_empty()).then(|| Value::Map(self.hashes.clone()));
        Node::new(&kinds.file)
            .with("host", self.host.clone())
            .with("full_path", self.full_path())
            .with("file_path", self.file_path.clone())
            .with("file_name", self.file_name.as_str())
            .with("extension", extension(&self.file_name))
            .with("hashes", hashes)
    }
}

/// Registry key attributes read from an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryFields {
    pub hive: String,
    pub key_path: String,
    pub key: String,
    pub value: Option<String>,
}

impl RegistryFields {
    pub fn read(fields: &Fields<'_>) -> Result<Self, TransformError> {
        Ok(Self {
            hive: fields.str("hive")?,
            key_path: fields.str("reg_key_path")?,
            key: fields.str("reg_key")?,
            value: fields.opt_str("reg_key_value")?,
        })
    }

    pub fn node(&self, kinds: &EntityKinds) -> Node {
        Node::new(&kinds.registry_key)
            .with("hive", self.hive.as_str())
            .with("key_path", self.key_path.as_str())
            .with("key", self.key.as_str())
            .with("value", self.value.clone())
    }
}

/// Add an occurrence when it carries attributes, otherwise just connect.
pub fn link(source: &mut Node, kind: &str, target: &Node, occurrence: Record) {
    if occurrence.is_empty() {
        source.connect(kind, target);
    } else {
        source.add_edge(kind, target, occurrence);
    }
}
