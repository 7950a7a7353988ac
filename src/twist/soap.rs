//! SOAP 1.1 envelope encoding and response decoding.
//!
//! Requests are built as plain strings (escaped with quick-xml); responses
//! are read with the quick-xml pull parser into a small tree and folded into
//! `serde_json::Value` so callers can use the usual `.get()` accessors.
//!
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use serde_json::{Map, Value};

use super::model::Filter;
use crate::error::TwistError;

const ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Remote services reachable under `<endpoint>/osapi/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Server,
    Customer,
    SoftwarePolicy,
    ServerScript,
    Job,
    Search,
}

impl Service {
    pub fn name(self) -> &'static str {
        match self {
            Service::Server => "ServerService",
            Service::Customer => "CustomerService",
            Service::SoftwarePolicy => "SoftwarePolicyService",
            Service::ServerScript => "ServerScriptService",
            Service::Job => "JobService",
            Service::Search => "SearchService",
        }
    }

    fn package(self) -> &'static str {
        match self {
            Service::Server => "server",
            Service::Customer => "locality",
            Service::SoftwarePolicy => "swmgmt",
            Service::ServerScript => "script",
            Service::Job => "job",
            Service::Search => "search",
        }
    }

    /// Path relative to `<endpoint>/osapi/`.
    pub fn path(self) -> String {
        format!("com/opsware/{}/{}", self.package(), self.name())
    }

    pub fn namespace(self) -> String {
        format!("http://{}.opsware.com", self.package())
    }
}

/// One encoded call argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Text(String),
    Bool(bool),
    Nil,
    /// Object reference, sent as `<id>`.
    Ref(i64),
    Refs(Vec<i64>),
    Filter(Filter),
    Struct(Vec<(&'static str, Arg)>),
}

/// A single remote method invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub service: Service,
    pub method: &'static str,
    pub args: Vec<(&'static str, Arg)>,
}

impl Call {
    pub fn new(service: Service, method: &'static str) -> Self {
        Self {
            service,
            method,
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, name: &'static str, value: Arg) -> Self {
        self.args.push((name, value));
        self
    }

    /// `Service.method`, used in logs and error messages.
    pub fn label(&self) -> String {
        format!("{}.{}", self.service.name(), self.method)
    }

    pub fn soap_action(&self) -> String {
        format!("{}/{}", self.service.namespace(), self.method)
    }
}

/* ---- Encoding ---- */

/// Serialize a call into a complete SOAP envelope.
pub fn envelope(call: &Call) -> String {
    let mut body = String::new();
    for (name, arg) in &call.args {
        write_arg(&mut body, name, arg);
    }
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<soapenv:Envelope xmlns:soapenv="{env}" xmlns:xsi="{xsi}" xmlns:ns="{ns}">"#,
            "<soapenv:Body><ns:{method}>{body}</ns:{method}></soapenv:Body>",
            "</soapenv:Envelope>"
        ),
        env = ENVELOPE_NS,
        xsi = XSI_NS,
        ns = call.service.namespace(),
        method = call.method,
        body = body,
    )
}

fn write_arg(out: &mut String, name: &str, arg: &Arg) {
    match arg {
        Arg::Nil => {
            out.push_str(&format!(r#"<{name} xsi:nil="true"/>"#));
        }
        Arg::Text(s) => out.push_str(&format!("<{name}>{}</{name}>", escape(s.as_str()))),
        Arg::Bool(b) => out.push_str(&format!("<{name}>{b}</{name}>")),
        Arg::Ref(id) => out.push_str(&format!("<{name}><id>{id}</id></{name}>")),
        Arg::Refs(ids) => {
            out.push_str(&format!("<{name}>"));
            for id in ids {
                out.push_str(&format!("<item><id>{id}</id></item>"));
            }
            out.push_str(&format!("</{name}>"));
        }
        Arg::Filter(f) => out.push_str(&format!(
            "<{name}><expression>{}</expression><objectType>{}</objectType></{name}>",
            escape(f.expression.as_str()),
            escape(f.object_type)
        )),
        Arg::Struct(fields) => {
            out.push_str(&format!("<{name}>"));
            for (field, value) in fields {
                write_arg(out, field, value);
            }
            out.push_str(&format!("</{name}>"));
        }
    }
}

/* ---- Decoding ---- */

#[derive(Debug, Default)]
struct Node {
    name: String,
    text: String,
    nil: bool,
    children: Vec<Node>,
}

impl Node {
    fn open(start: &BytesStart<'_>) -> Self {
        let nil = start.attributes().flatten().any(|a| {
            a.key.local_name().as_ref() == b"nil" && a.value.as_ref() == b"true"
        });
        Node {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            nil,
            ..Default::default()
        }
    }

    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    fn to_value(&self) -> Value {
        if self.nil {
            return Value::Null;
        }
        if self.children.is_empty() {
            return Value::String(self.text.clone());
        }
        let mut map = Map::new();
        for c in &self.children {
            let v = c.to_value();
            match map.get_mut(&c.name) {
                Some(Value::Array(items)) => items.push(v),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, v]);
                }
                None => {
                    map.insert(c.name.clone(), v);
                }
            }
        }
        Value::Object(map)
    }
}

fn parse_tree(label: &str, body: &str) -> Result<Node, TwistError> {
    // Leaf text stays byte-exact; whitespace between tags only ever lands on
    // nodes with children, where `to_value` ignores it.
    let mut reader = Reader::from_str(body);

    let mut stack = vec![Node::default()];
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(Node::open(&e)),
            Ok(Event::Empty(e)) => {
                let node = Node::open(&e);
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Ok(Event::End(_)) => {
                if stack.len() < 2 {
                    return Err(TwistError::malformed(label, "unbalanced closing tag"));
                }
                if let Some(node) = stack.pop()
                    && let Some(parent) = stack.last_mut()
                {
                    parent.children.push(node);
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| TwistError::malformed(label, e.to_string()))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(TwistError::malformed(label, e.to_string())),
        }
    }

    if stack.len() != 1 {
        return Err(TwistError::malformed(label, "truncated document"));
    }
    stack
        .pop()
        .ok_or_else(|| TwistError::malformed(label, "empty document"))
}

/// Decode a response envelope.
///
/// Returns the method's `return` payload (`Null` for void methods), or
/// `RemoteCallFailed` carrying the fault string when the body is a fault.
pub fn parse_response(label: &str, body: &str) -> Result<Value, TwistError> {
    let root = parse_tree(label, body)?;
    let payload = root
        .child("Envelope")
        .and_then(|env| env.child("Body"))
        .and_then(|b| b.children.first());

    let Some(payload) = payload else {
        return Err(TwistError::malformed(label, "no SOAP body"));
    };

    if payload.name == "Fault" {
        let message = payload
            .child("faultstring")
            .map(|n| n.text.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "unspecified fault".to_string());
        return Err(TwistError::remote(label, message));
    }

    match payload.to_value() {
        Value::Object(mut map) => Ok(map.remove("return").unwrap_or(Value::Null)),
        _ => Ok(Value::Null),
    }
}
