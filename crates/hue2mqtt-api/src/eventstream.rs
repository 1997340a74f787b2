//! Event-stream decoding.
//!
//! The bridge pushes newline-delimited fragments over a long-lived GET.
//! Each fragment is JSON (optionally framed as an SSE `data:` line) holding
//! either one event object or a list of them, where every object is either
//! a resource `{type, id, ...}` or an envelope `{data: [{type, id, ...}]}`.
//! Decoding is pure; the connection lifecycle lives in the core crate.

use serde_json::{Map, Value};
use tracing::debug;

// ── StreamEvent ──────────────────────────────────────────────────────

/// One resource change extracted from a fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub resource_type: String,
    pub id: String,
    /// All remaining fields of the resource, `type` and `id` removed.
    pub fields: Map<String, Value>,
}

impl StreamEvent {
    /// Build an event from a resource object, if it carries `type` and `id`.
    pub fn from_resource(mut object: Map<String, Value>) -> Option<Self> {
        let resource_type = object.get("type")?.as_str()?.to_owned();
        let id = object.get("id")?.as_str()?.to_owned();
        object.remove("type");
        object.remove("id");
        Some(Self {
            resource_type,
            id,
            fields: object,
        })
    }

    pub fn payload(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

// ── Fragment decoding ────────────────────────────────────────────────

/// Decode one line of the stream.
///
/// Blank lines, SSE comments and `id:`/`event:`/`retry:` fields yield no
/// events. Malformed JSON is returned as an error for the caller to log.
pub fn decode_fragment(line: &str) -> Result<Vec<StreamEvent>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return Ok(Vec::new());
    }
    let json = match line.split_once(':') {
        Some(("data", rest)) => rest.trim_start(),
        Some(("id" | "event" | "retry", _)) => return Ok(Vec::new()),
        _ => line,
    };

    let value: Value = serde_json::from_str(json)?;
    let mut events = Vec::new();
    collect(value, &mut events);
    Ok(events)
}

fn collect(value: Value, out: &mut Vec<StreamEvent>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect(item, out);
            }
        }
        Value::Object(mut object) => {
            // Only an array `data` marks an envelope; a resource may carry
            // its own `data` field.
            if let Some(Value::Array(items)) = object.get_mut("data") {
                for item in std::mem::take(items) {
                    collect(item, out);
                }
            } else if let Some(event) = StreamEvent::from_resource(object) {
                out.push(event);
            } else {
                debug!("skipping stream object without type/id");
            }
        }
        other => debug!(value = %other, "skipping non-object stream value"),
    }
}

// ── LineBuffer ───────────────────────────────────────────────────────

/// Reassembles lines from arbitrarily split body chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).trim_end().to_owned());
        }
        lines
    }

    /// Return whatever is left after the stream ended without a newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).trim_end().to_owned())
    }
}
