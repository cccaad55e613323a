//! One-record-per-line JSON codec.
//!
//! The codec is picked once when a writer or query engine is built and stays fixed for the
//! lifetime of that value, so every line of a run shares one format. Both variants emit plain
//! JSON objects and either can decode the other's output.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Codec {
    /// Serialize straight from the struct, keys in declaration order.
    #[default]
    Compact,
    /// Round-trip through `serde_json::Value` and emit object keys sorted, so identical
    /// records always produce identical bytes. Slower.
    Canonical,
}

impl Codec {
    /// Name recorded in the run's sidecar metadata.
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Compact => "serde_json",
            Codec::Canonical => "serde_json-canonical",
        }
    }

    /// Append `value` to `buf` as a single JSON line, trailing newline included.
    pub fn encode_line<T: Serialize>(&self, value: &T, buf: &mut Vec<u8>) -> Result<()> {
        match self {
            Codec::Compact => serde_json::to_writer(&mut *buf, value)?,
            Codec::Canonical => {
                let value = sort_keys(serde_json::to_value(value)?);
                serde_json::to_writer(&mut *buf, &value)?;
            }
        }
        buf.push(b'\n');
        Ok(())
    }

    pub fn decode_line<T: DeserializeOwned>(&self, line: &str) -> Result<T> {
        Ok(serde_json::from_str(line)?)
    }
}

// Map may be insertion-ordered depending on serde_json features, so rebuild it explicitly.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::with_capacity(entries.len());
            for (key, value) in entries {
                sorted.insert(key, sort_keys(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
