//! XML-RPC value model and (de)serialization of calls and responses.
//!
//! Parsing goes through a small element tree built from `quick_xml` events.
//! XML-RPC documents are tiny, so the tree is simpler than a streaming
//! state machine and keeps the value rules in one recursive function.

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine as _;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::RpcError;

/// An XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    String(String),
    Double(f64),
    /// `dateTime.iso8601`, kept as the wire text.
    DateTime(String),
    Base64(Vec<u8>),
    Array(Vec<Value>),
    Struct(BTreeMap<String, Value>),
    Nil,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "boolean",
            Value::String(_) => "string",
            Value::Double(_) => "double",
            Value::DateTime(_) => "dateTime.iso8601",
            Value::Base64(_) => "base64",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
            Value::Nil => "nil",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::String(s) | Value::DateTime(s) => f.write_str(s),
            Value::Double(d) => write!(f, "{d}"),
            Value::Base64(b) => write!(f, "<{} bytes>", b.len()),
            Value::Array(items) => write!(f, "<array of {}>", items.len()),
            Value::Struct(members) => write!(f, "<struct of {}>", members.len()),
            Value::Nil => f.write_str("nil"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

struct Emitter {
    writer: Writer<Vec<u8>>,
}

impl Emitter {
    fn new() -> Result<Self, RpcError> {
        let mut e = Emitter {
            writer: Writer::new(Vec::new()),
        };
        e.event(Event::Decl(BytesDecl::new("1.0", None, None)))?;
        Ok(e)
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), RpcError> {
        self.writer
            .write_event(event)
            .map_err(|e| RpcError::Encode(e.to_string()))
    }

    fn open(&mut self, name: &str) -> Result<(), RpcError> {
        self.event(Event::Start(BytesStart::new(name)))
    }

    fn close(&mut self, name: &str) -> Result<(), RpcError> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<(), RpcError> {
        self.open(name)?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.close(name)
    }

    fn value(&mut self, value: &Value) -> Result<(), RpcError> {
        self.open("value")?;
        let tag = value.type_name();
        match value {
            Value::Int(i) => self.text_element(tag, &i.to_string())?,
            Value::Bool(b) => self.text_element(tag, if *b { "1" } else { "0" })?,
            Value::String(s) | Value::DateTime(s) => self.text_element(tag, s)?,
            Value::Double(d) => self.text_element(tag, &d.to_string())?,
            Value::Base64(bytes) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                self.text_element(tag, &encoded)?
            }
            Value::Array(items) => {
                self.open("array")?;
                self.open("data")?;
                for item in items {
                    self.value(item)?;
                }
                self.close("data")?;
                self.close("array")?;
            }
            Value::Struct(members) => {
                self.open("struct")?;
                for (name, member) in members {
                    self.open("member")?;
                    self.text_element("name", name)?;
                    self.value(member)?;
                    self.close("member")?;
                }
                self.close("struct")?;
            }
            Value::Nil => self.event(Event::Empty(BytesStart::new("nil")))?,
        }
        self.close("value")
    }

    fn params(&mut self, params: &[Value]) -> Result<(), RpcError> {
        self.open("params")?;
        for p in params {
            self.open("param")?;
            self.value(p)?;
            self.close("param")?;
        }
        self.close("params")
    }

    fn finish(self) -> Result<String, RpcError> {
        String::from_utf8(self.writer.into_inner()).map_err(|e| RpcError::Encode(e.to_string()))
    }
}

/// Serialize a `methodCall` document.
pub fn encode_call(method: &str, params: &[Value]) -> Result<String, RpcError> {
    let mut e = Emitter::new()?;
    e.open("methodCall")?;
    e.text_element("methodName", method)?;
    e.params(params)?;
    e.close("methodCall")?;
    e.finish()
}

/// Serialize a successful `methodResponse` document.
pub fn encode_response(value: &Value) -> Result<String, RpcError> {
    let mut e = Emitter::new()?;
    e.open("methodResponse")?;
    e.params(std::slice::from_ref(value))?;
    e.close("methodResponse")?;
    e.finish()
}

/// Serialize a fault `methodResponse` document.
pub fn encode_fault(code: i64, message: &str) -> Result<String, RpcError> {
    let mut members = BTreeMap::new();
    members.insert("faultCode".to_string(), Value::Int(code));
    members.insert("faultString".to_string(), Value::from(message));

    let mut e = Emitter::new()?;
    e.open("methodResponse")?;
    e.open("fault")?;
    e.value(&Value::Struct(members))?;
    e.close("fault")?;
    e.close("methodResponse")?;
    e.finish()
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Node {
    name: String,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    fn require(&self, name: &str) -> Result<&Node, RpcError> {
        self.child(name).ok_or_else(|| {
            RpcError::Protocol(format!("<{}> is missing <{}>", self.name, name))
        })
    }
}

fn protocol(e: impl fmt::Display) -> RpcError {
    RpcError::Protocol(e.to_string())
}

fn parse_tree(xml: &str) -> Result<Node, RpcError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Node> = vec![Node::default()];

    loop {
        match reader.read_event().map_err(protocol)? {
            Event::Start(start) => stack.push(Node {
                name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
                ..Node::default()
            }),
            Event::Empty(start) => {
                let node = Node {
                    name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
                    ..Node::default()
                };
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .filter(|_| !stack.is_empty())
                    .ok_or_else(|| protocol("unbalanced end tag"))?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Event::Text(text) => {
                let decoded = text.decode().map_err(protocol)?;
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&decoded);
                }
            }
            Event::CData(data) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::GeneralRef(reference) => {
                let resolved = match reference.resolve_char_ref().map_err(protocol)? {
                    Some(ch) => ch.to_string(),
                    None => {
                        let name = reference.decode().map_err(protocol)?;
                        resolve_predefined_entity(&name)
                            .ok_or_else(|| protocol(format!("unknown entity &{name};")))?
                            .to_string()
                    }
                };
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&resolved);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() != 1 {
        return Err(protocol("document ended inside an element"));
    }
    let mut document = stack.pop().unwrap_or_default();
    document
        .children
        .pop()
        .ok_or_else(|| protocol("empty document"))
}

fn parse_value(node: &Node) -> Result<Value, RpcError> {
    let Some(typed) = node.children.first() else {
        // An untyped <value> is a string.
        return Ok(Value::String(node.text.clone()));
    };
    let text = typed.text.trim();
    let value = match typed.name.as_str() {
        "int" | "i4" | "i8" => Value::Int(
            text.parse()
                .map_err(|_| protocol(format!("bad integer {text:?}")))?,
        ),
        "boolean" => match text {
            "1" => Value::Bool(true),
            "0" => Value::Bool(false),
            other => return Err(protocol(format!("bad boolean {other:?}"))),
        },
        "string" => Value::String(typed.text.clone()),
        "double" => Value::Double(
            text.parse()
                .map_err(|_| protocol(format!("bad double {text:?}")))?,
        ),
        "dateTime.iso8601" => Value::DateTime(text.to_string()),
        "base64" => {
            let compact: String = text.split_whitespace().collect();
            Value::Base64(
                base64::engine::general_purpose::STANDARD
                    .decode(compact)
                    .map_err(protocol)?,
            )
        }
        "array" => {
            let data = typed.require("data")?;
            Value::Array(
                data.children
                    .iter()
                    .filter(|c| c.name == "value")
                    .map(parse_value)
                    .collect::<Result<_, _>>()?,
            )
        }
        "struct" => {
            let mut members = BTreeMap::new();
            for member in typed.children.iter().filter(|c| c.name == "member") {
                let name = member.require("name")?.text.clone();
                members.insert(name, parse_value(member.require("value")?)?);
            }
            Value::Struct(members)
        }
        "nil" => Value::Nil,
        other => return Err(protocol(format!("unknown value type <{other}>"))),
    };
    Ok(value)
}

fn parse_params(node: &Node) -> Result<Vec<Value>, RpcError> {
    let Some(params) = node.child("params") else {
        return Ok(vec![]);
    };
    params
        .children
        .iter()
        .filter(|c| c.name == "param")
        .map(|p| parse_value(p.require("value")?))
        .collect()
}

/// Parse a `methodResponse`. A fault becomes [`RpcError::Fault`].
pub fn decode_response(xml: &str) -> Result<Value, RpcError> {
    let root = parse_tree(xml)?;
    if root.name != "methodResponse" {
        return Err(protocol(format!("expected <methodResponse>, got <{}>", root.name)));
    }

    if let Some(fault) = root.child("fault") {
        let value = parse_value(fault.require("value")?)?;
        let Value::Struct(members) = value else {
            return Err(protocol("fault value is not a struct"));
        };
        let code = members.get("faultCode").and_then(Value::as_i64).unwrap_or(0);
        let message = members
            .get("faultString")
            .map(|v| v.to_string())
            .unwrap_or_default();
        return Err(RpcError::Fault { code, message });
    }

    parse_params(&root)?
        .into_iter()
        .next()
        .ok_or_else(|| protocol("response has no params"))
}

/// Parse a `methodCall` into its method name and parameters.
pub fn decode_call(xml: &str) -> Result<(String, Vec<Value>), RpcError> {
    let root = parse_tree(xml)?;
    if root.name != "methodCall" {
        return Err(protocol(format!("expected <methodCall>, got <{}>", root.name)));
    }
    let method = root.require("methodName")?.text.trim().to_string();
    Ok((method, parse_params(&root)?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
