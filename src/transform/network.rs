//! Transformer for decoded network-flow records.
//!
//! Each record describes one packet by its top-most decoded layer
//! (`event_type` = `TCP`, `UDP`, `DNS` or `HTTPRequest`) together with the
//! addressing fields of the lower layers. Packets without both IP addresses,
//! or whose top layer is below transport, are not relevant.

use crate::error::TransformError;
use crate::event::EventRecord;
use crate::node::{Node, VariantCatalog};
use crate::value::{Record, Value, record};

use super::Transformer;
use super::entities::{EntityKinds, link};
use super::fields::Fields;

const NAME: &str = "network";

/// Addressing shared by every flow event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub src_ip: String,
    pub dst_ip: String,
    pub src_mac: Option<String>,
    pub dst_mac: Option<String>,
    pub sport: Option<i64>,
    pub dport: Option<i64>,
    pub protocol: Option<String>,
    pub timestamp: Option<i64>,
    pub payload: Option<String>,
}

/// A parsed flow record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// TCP or UDP traffic.
    Flow(Endpoints),
    Http {
        flow: Endpoints,
        method: Option<String>,
        uri: String,
        host: String,
    },
    Dns {
        flow: Endpoints,
        qname: String,
        qtype: Option<String>,
        answer: Option<String>,
    },
}

impl NetworkEvent {
    /// Parse a record; irrelevant packets yield `None`.
    pub fn parse(event: &EventRecord) -> Result<Option<Self>, TransformError> {
        let fields = Fields::new(NAME, event);
        let Some(event_type) = fields.opt_str("event_type")? else {
            return Ok(None);
        };
        if !matches!(event_type.as_str(), "TCP" | "UDP" | "DNS" | "HTTPRequest") {
            return Ok(None);
        }
        let (Some(src_ip), Some(dst_ip)) = (fields.opt_str("src_ip")?, fields.opt_str("dst_ip")?)
        else {
            return Ok(None);
        };

        let flow = Endpoints {
            src_ip,
            dst_ip,
            src_mac: fields.opt_str("src_mac")?,
            dst_mac: fields.opt_str("dst_mac")?,
            sport: fields.opt_int("sport")?,
            dport: fields.opt_int("dport")?,
            protocol: fields.opt_str("protocol")?,
            timestamp: fields.opt_int("timestamp")?,
            payload: fields.opt_str("payload")?,
        };

        let event = match event_type.as_str() {
            "HTTPRequest" => NetworkEvent::Http {
                flow,
                method: fields.opt_str("http_method")?,
                uri: fields.str("uri")?,
                host: fields.str("http_dest")?,
            },
            "DNS" => NetworkEvent::Dns {
                flow,
                qname: fields.str("qname")?.trim_end_matches('.').to_string(),
                qtype: fields.opt_str("qtype")?,
                answer: fields.opt_str("qanswer")?,
            },
            _ => NetworkEvent::Flow(flow),
        };
        Ok(Some(event))
    }
}

/// Maps [`NetworkEvent`]s to node batches.
#[derive(Debug, Clone)]
pub struct NetworkTransformer {
    kinds: EntityKinds,
}

impl NetworkTransformer {
    pub fn new(catalog: &VariantCatalog) -> Self {
        Self {
            kinds: EntityKinds::from_catalog(catalog),
        }
    }

    /// Source and destination nodes, source `connected_to` destination.
    fn endpoints(&self, flow: &Endpoints) -> (Node, Node) {
        let mut src = self.kinds.ip(&flow.src_ip).with("mac", flow.src_mac.clone());
        let dst = self.kinds.ip(&flow.dst_ip).with("mac", flow.dst_mac.clone());
        let occurrence = record([
            ("protocol", Value::from(flow.protocol.clone())),
            ("port", Value::from(flow.dport)),
            ("timestamp", Value::from(flow.timestamp)),
            ("payload", Value::from(flow.payload.clone())),
        ]);
        link(&mut src, "connected_to", &dst, occurrence);
        (src, dst)
    }

    /// Nodes for one event, edges wired, in emission order.
    pub fn nodes(&self, event: NetworkEvent) -> Vec<Node> {
        let k = &self.kinds;
        match event {
            NetworkEvent::Flow(flow) => {
                let (src, dst) = self.endpoints(&flow);
                vec![src, dst]
            }
            NetworkEvent::Http {
                flow,
                method,
                uri,
                host,
            } => {
                let (mut src, dst) = self.endpoints(&flow);
                let mut dom = k.domain(&host);
                let mut uri = k.uri(&uri);
                uri.connect("uri_of", &dom);
                let occurrence = record([
                    ("method", Value::from(method)),
                    ("timestamp", Value::from(flow.timestamp)),
                ]);
                link(&mut src, "http_request_to", &uri, occurrence);
                dom.connect("resolves_to", &dst);
                vec![src, dst, dom, uri]
            }
            NetworkEvent::Dns {
                flow,
                qname,
                qtype,
                answer,
            } => {
                let (mut src, dst) = self.endpoints(&flow);
                let mut dom = k.domain(&qname);
                let occurrence: Record = record([
                    ("record_type", Value::from(qtype)),
                    ("timestamp", Value::from(flow.timestamp)),
                ]);
                link(&mut src, "dns_query_for", &dom, occurrence);
                match answer {
                    Some(answer) => {
                        let ip = k.ip(&answer);
                        link(
                            &mut dom,
                            "resolves_to",
                            &ip,
                            record([("timestamp", flow.timestamp)]),
                        );
                        vec![src, dom, ip, dst]
                    }
                    None => vec![src, dom, dst],
                }
            }
        }
    }
}

impl Transformer for NetworkTransformer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn transform(&self, event: &EventRecord) -> Result<Option<Vec<Node>>, TransformError> {
        Ok(NetworkEvent::parse(event)?.map(|e| self.nodes(e)))
    }
}
