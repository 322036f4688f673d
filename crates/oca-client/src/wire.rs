//! XML-RPC wire codec: method calls out, responses and faults back in.

use quick_xml::escape::escape;

use oca_xml::Node;

use crate::RpcError;

/// A value crossing the XML-RPC boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcValue {
    Int(i64),
    Bool(bool),
    Str(String),
    Double(f64),
    Array(Vec<RpcValue>),
}

impl RpcValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RpcValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RpcValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RpcValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<RpcValue>> {
        match self {
            RpcValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// JSON image of the value, the form fixture archives store.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            RpcValue::Int(value) => serde_json::Value::from(*value),
            RpcValue::Bool(value) => serde_json::Value::from(*value),
            RpcValue::Str(value) => serde_json::Value::from(value.clone()),
            RpcValue::Double(value) => serde_json::Value::from(*value),
            RpcValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(RpcValue::to_json).collect())
            }
        }
    }

    /// Rebuild a value from its JSON image.
    pub fn from_json(value: &serde_json::Value) -> RpcValue {
        match value {
            serde_json::Value::Bool(value) => RpcValue::Bool(*value),
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(value) => RpcValue::Int(value),
                None => RpcValue::Double(number.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(value) => RpcValue::Str(value.clone()),
            serde_json::Value::Array(items) => {
                RpcValue::Array(items.iter().map(RpcValue::from_json).collect())
            }
            // Fixtures only ever hold images produced by to_json; anything
            // else degrades to its textual form.
            serde_json::Value::Null => RpcValue::Str(String::new()),
            other => RpcValue::Str(other.to_string()),
        }
    }
}

/// Serialize a method call document ready for an HTTP POST body.
pub fn encode_call(method: &str, params: &[RpcValue]) -> String {
    let mut out = String::with_capacity(256);
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    out.push_str("<methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param><value>");
        encode_value(param, &mut out);
        out.push_str("</value></param>");
    }
    out.push_str("</params></methodCall>");
    out
}

fn encode_value(value: &RpcValue, out: &mut String) {
    match value {
        RpcValue::Int(value) => {
            out.push_str("<i4>");
            out.push_str(&value.to_string());
            out.push_str("</i4>");
        }
        RpcValue::Bool(value) => {
            out.push_str("<boolean>");
            out.push_str(if *value { "1" } else { "0" });
            out.push_str("</boolean>");
        }
        RpcValue::Str(value) => {
            out.push_str("<string>");
            out.push_str(&escape(value));
            out.push_str("</string>");
        }
        RpcValue::Double(value) => {
            out.push_str("<double>");
            out.push_str(&value.to_string());
            out.push_str("</double>");
        }
        RpcValue::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                out.push_str("<value>");
                encode_value(item, out);
                out.push_str("</value>");
            }
            out.push_str("</data></array>");
        }
    }
}

/// Parse a method response document. A `<fault>` element becomes
/// [`RpcError::Fault`]; anything else yields the response value.
pub fn decode_response(body: &[u8]) -> Result<RpcValue, RpcError> {
    let root = oca_xml::parse(body)?;
    if root.tag() != "methodResponse" {
        return Err(RpcError::Response(format!(
            "unexpected root element '{}'",
            root.tag()
        )));
    }
    if root.contains("fault") {
        return Err(decode_fault(root.child("fault")?)?);
    }
    let value = root.child("params")?.child("param")?.child("value")?;
    decode_value(value)
}

fn decode_fault(fault: &Node) -> Result<RpcError, RpcError> {
    let members = fault.child("value")?.child("struct")?;
    let mut code = 0i64;
    let mut message = String::new();
    for member in members.list("member")? {
        let name = member.scalar("name")?;
        match (name, decode_value(member.child("value")?)?) {
            ("faultCode", RpcValue::Int(value)) => code = value,
            ("faultString", RpcValue::Str(value)) => message = value,
            _ => {}
        }
    }
    Ok(RpcError::Fault { code, message })
}

fn decode_value(node: &Node) -> Result<RpcValue, RpcError> {
    for tag in ["i4", "int", "i8"] {
        if node.contains(tag) {
            return Ok(RpcValue::Int(node.scalar_i64(tag)?));
        }
    }
    if node.contains("boolean") {
        return match node.scalar("boolean")?.trim() {
            "0" => Ok(RpcValue::Bool(false)),
            "1" => Ok(RpcValue::Bool(true)),
            other => Err(RpcError::Response(format!("invalid boolean '{other}'"))),
        };
    }
    if node.contains("string") {
        return Ok(RpcValue::Str(node.scalar("string")?.to_string()));
    }
    if node.contains("double") {
        let raw = node.scalar("double")?;
        return raw
            .trim()
            .parse()
            .map(RpcValue::Double)
            .map_err(|err| RpcError::Response(format!("invalid double '{raw}': {err}")));
    }
    if node.contains("array") {
        let data = node.child("array")?.child("data")?;
        if !data.contains("value") {
            return Ok(RpcValue::Array(Vec::new()));
        }
        let items = data
            .list("value")?
            .iter()
            .map(decode_value)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(RpcValue::Array(items));
    }
    // An untyped <value> is a string per the XML-RPC spec.
    Ok(RpcValue::Str(node.text().to_string()))
}
