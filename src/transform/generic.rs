//! Transformer for the normalized endpoint-event schema.
//!
//! Records carry an `event_type` plus flat, well-known field names
//! (`process_image`, `file_name`, `ip_address`, ...). Copy events use
//! `src_`/`dest_` prefixed file fields; launch events use `parent_` prefixed
//! process fields. Any record with a truthy `alerted_on` and an `alert_name`
//! is additionally wrapped in an Alert node.

use crate::error::TransformError;
use crate::event::EventRecord;
use crate::node::{Node, VariantCatalog};
use crate::value::{Record, Value, record};

use super::Transformer;
use super::entities::{EntityKinds, FileFields, ProcessFields, RegistryFields, link};
use super::fields::Fields;

const NAME: &str = "generic";

/// What a process did to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Opened,
    Written,
    Deleted,
    LoadedModule,
}

impl FileAction {
    fn edge(self) -> &'static str {
        match self {
            FileAction::Opened => "accessed",
            FileAction::Written => "wrote",
            FileAction::Deleted => "deleted",
            FileAction::LoadedModule => "loaded",
        }
    }
}

/// What a process did to a registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryAction {
    Opened,
    Deleted,
}

/// A parsed endpoint event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenericEvent {
    ProcessLaunched {
        parent: ProcessFields,
        child: ProcessFields,
        timestamp: Option<i64>,
    },
    File {
        process: ProcessFields,
        file: FileFields,
        action: FileAction,
        timestamp: Option<i64>,
    },
    FileCopied {
        process: ProcessFields,
        src: FileFields,
        dest: FileFields,
        timestamp: Option<i64>,
    },
    Connection {
        process: ProcessFields,
        ip_address: String,
        port: Option<i64>,
        protocol: Option<String>,
        timestamp: Option<i64>,
    },
    HttpRequest {
        process: ProcessFields,
        http_host: String,
        uri: String,
        method: Option<String>,
        ip_address: Option<String>,
        timestamp: Option<i64>,
    },
    DnsLookup {
        process: ProcessFields,
        domain: String,
        ip_address: Option<String>,
        timestamp: Option<i64>,
    },
    Registry {
        process: ProcessFields,
        key: RegistryFields,
        action: RegistryAction,
        timestamp: Option<i64>,
    },
    RegistryValueSet {
        process: ProcessFields,
        key: RegistryFields,
        timestamp: Option<i64>,
    },
    Alert {
        alert_name: String,
        alert_data: Option<String>,
        timestamp: Option<i64>,
        /// The alerted-on event, if its type is known.
        inner: Option<Box<GenericEvent>>,
    },
}

impl GenericEvent {
    /// Parse a record. Unknown or absent event types yield `None`.
    pub fn parse(event: &EventRecord) -> Result<Option<Self>, TransformError> {
        let fields = Fields::new(NAME, event);
        if fields.flag("alerted_on") {
            return Ok(Some(GenericEvent::Alert {
                alert_name: fields.str("alert_name")?,
                alert_data: fields.opt_str("alert_data")?,
                timestamp: fields.opt_int("timestamp")?,
                inner: Self::parse_plain(&fields)?.map(Box::new),
            }));
        }
        Self::parse_plain(&fields)
    }

    fn parse_plain(fields: &Fields<'_>) -> Result<Option<Self>, TransformError> {
        let Some(event_type) = fields.opt_str("event_type")? else {
            return Ok(None);
        };
        let timestamp = fields.opt_int("timestamp")?;
        let file_action = match event_type.as_str() {
            "file_opened" => Some(FileAction::Opened),
            "file_written" => Some(FileAction::Written),
            "file_deleted" => Some(FileAction::Deleted),
            "loaded_module" => Some(FileAction::LoadedModule),
            _ => None,
        };
        if let Some(action) = file_action {
            return Ok(Some(GenericEvent::File {
                process: ProcessFields::read(fields, "")?,
                file: FileFields::read(fields, "")?,
                action,
                timestamp,
            }));
        }

        let event = match event_type.as_str() {
            "process_launched" => GenericEvent::ProcessLaunched {
                parent: ProcessFields::read(fields, "parent_")?,
                child: ProcessFields::read(fields, "")?,
                timestamp,
            },
            "file_copied" => GenericEvent::FileCopied {
                process: ProcessFields::read(fields, "")?,
                src: FileFields::read(fields, "src_")?,
                dest: FileFields::read(fields, "dest_")?,
                timestamp,
            },
            "connection" => GenericEvent::Connection {
                process: ProcessFields::read(fields, "")?,
                ip_address: fields.str("ip_address")?,
                port: fields.opt_int("port")?,
                protocol: fields.opt_str("protocol")?,
                timestamp,
            },
            "http_request" => GenericEvent::HttpRequest {
                process: ProcessFields::read(fields, "")?,
                http_host: fields.str("http_host")?,
                uri: fields.str("uri")?,
                method: fields.opt_str("http_method")?,
                ip_address: fields.opt_str("ip_address")?,
                timestamp,
            },
            "dns_lookup" => GenericEvent::DnsLookup {
                process: ProcessFields::read(fields, "")?,
                domain: fields.str("http_host")?,
                ip_address: fields.opt_str("ip_address")?,
                timestamp,
            },
            "reg_key_opened" | "reg_key_deleted" => GenericEvent::Registry {
                process: ProcessFields::read(fields, "")?,
                key: RegistryFields::read(fields)?,
                action: if event_type == "reg_key_opened" {
                    RegistryAction::Opened
                } else {
                    RegistryAction::Deleted
                },
                timestamp,
            },
            "reg_key_set" => GenericEvent::RegistryValueSet {
                process: ProcessFields::read(fields, "")?,
                key: RegistryFields::read(fields)?,
                timestamp,
            },
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Maps [`GenericEvent`]s to node batches.
#[derive(Debug, Clone)]
pub struct GenericTransformer {
    kinds: EntityKinds,
}

impl GenericTransformer {
    pub fn new(catalog: &VariantCatalog) -> Self {
        Self {
            kinds: EntityKinds::from_catalog(catalog),
        }
    }

    /// Nodes for one event, edges wired, in emission order.
    pub fn nodes(&self, event: GenericEvent) -> Vec<Node> {
        let k = &self.kinds;
        match event {
            GenericEvent::ProcessLaunched {
                parent,
                child,
                timestamp,
            } => {
                let (mut parent, parent_file) = parent.nodes(k);
                let (child, child_file) = child.nodes(k);
                link(&mut parent, "launched", &child, stamp(timestamp));
                vec![parent, parent_file, child, child_file]
            }
            GenericEvent::File {
                process,
                file,
                action,
                timestamp,
            } => {
                let (mut process, image) = process.nodes(k);
                let file = file.node(k);
                link(&mut process, action.edge(), &file, stamp(timestamp));
                vec![process, image, file]
            }
            GenericEvent::FileCopied {
                process,
                src,
                dest,
                timestamp,
            } => {
                let (mut process, image) = process.nodes(k);
                let mut src = src.node(k);
                let dest = dest.node(k);
                link(&mut src, "copied_to", &dest, stamp(timestamp));
                link(&mut process, "copied", &src, stamp(timestamp));
                vec![process, image, src, dest]
            }
            GenericEvent::Connection {
                process,
                ip_address,
                port,
                protocol,
                timestamp,
            } => {
                let (mut process, image) = process.nodes(k);
                let addr = k.ip(&ip_address);
                let mut occurrence = stamp(timestamp);
                occurrence.extend(record([
                    ("port", Value::from(port)),
                    ("protocol", Value::from(protocol)),
                ]));
                link(&mut process, "connected_to", &addr, occurrence);
                vec![process, image, addr]
            }
            GenericEvent::HttpRequest {
                process,
                http_host,
                uri,
                method,
                ip_address,
                timestamp,
            } => {
                let (mut process, image) = process.nodes(k);
                let mut dom = k.domain(&http_host);
                let mut uri = k.uri(&uri);
                uri.connect("uri_of", &dom);
                let mut occurrence = stamp(timestamp);
                occurrence.extend(record([("method", method)]));
                link(&mut process, "http_request_to", &uri, occurrence);

                match ip_address {
                    Some(ip_address) => {
                        let ip = k.ip(&ip_address);
                        dom.connect("resolves_to", &ip);
                        link(&mut process, "connected_to", &ip, stamp(timestamp));
                        vec![process, image, uri, dom, ip]
                    }
                    None => vec![process, image, uri, dom],
                }
            }
            GenericEvent::DnsLookup {
                process,
                domain,
                ip_address,
                timestamp,
            } => {
                let (mut process, image) = process.nodes(k);
                let mut dom = k.domain(&domain);
                link(&mut process, "dns_query_for", &dom, stamp(timestamp));

                match ip_address {
                    Some(ip_address) => {
                        let addr = k.ip(&ip_address);
                        dom.connect("resolves_to", &addr);
                        vec![process, image, dom, addr]
                    }
                    None => vec![process, image, dom],
                }
            }
            GenericEvent::Registry {
                process,
                key,
                action,
                timestamp,
            } => {
                let (mut process, image) = process.nodes(k);
                let reg = key.node(k);
                let kind = match action {
                    RegistryAction::Opened => "read_key",
                    RegistryAction::Deleted => "deleted_key",
                };
                link(&mut process, kind, &reg, stamp(timestamp));
                vec![process, image, reg]
            }
            GenericEvent::RegistryValueSet {
                process,
                key,
                timestamp,
            } => {
                let (mut process, image) = process.nodes(k);
                let reg = key.node(k);
                let mut occurrence = stamp(timestamp);
                occurrence.extend(record([("value", key.value)]));
                link(&mut process, "changed_value", &reg, occurrence);
                vec![process, image, reg]
            }
            GenericEvent::Alert {
                alert_name,
                alert_data,
                timestamp,
                inner,
            } => {
                let mut alert = Node::new(&k.alert)
                    .with("alert_name", alert_name)
                    .with("alert_data", alert_data);
                let nodes = inner.map(|e| self.nodes(*e)).unwrap_or_default();
                for node in &nodes {
                    link(&mut alert, "alerted_on", node, stamp(timestamp));
                }
                let mut batch = Vec::with_capacity(nodes.len() + 1);
                batch.push(alert);
                batch.extend(nodes);
                batch
            }
        }
    }
}

impl Transformer for GenericTransformer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn transform(&self, event: &EventRecord) -> Result<Option<Vec<Node>>, TransformError> {
        Ok(GenericEvent::parse(event)?.map(|e| self.nodes(e)))
    }
}

fn stamp(timestamp: Option<i64>) -> Record {
    record([("timestamp", timestamp)])
}
