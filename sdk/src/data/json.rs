//! Detailed-schema JSON view of Plutus data, as used by blueprints and
//! chain explorers:
//!
//! ```json
//! {"constructor": 0, "fields": [{"bytes": "48656c6c6f"}, {"int": 42}]}
//! ```
//!
//! Integers outside the `i64`/`u64` range are written as decimal strings.

use num_bigint::BigInt;
use serde_json::{Map, Value, json};

use super::PlutusData;
use crate::error::CodecError;

pub fn to_json(data: &PlutusData) -> Value {
    match data {
        PlutusData::Constr(c) => json!({
            "constructor": c.tag,
            "fields": c.fields.iter().map(to_json).collect::<Vec<_>>(),
        }),
        PlutusData::Map(entries) => json!({
            "map": entries
                .iter()
                .map(|(k, v)| json!({ "k": to_json(k), "v": to_json(v) }))
                .collect::<Vec<_>>(),
        }),
        PlutusData::List(items) => json!({ "list": items.iter().map(to_json).collect::<Vec<_>>() }),
        PlutusData::Integer(n) => {
            let int = if let Ok(v) = i64::try_from(n) {
                Value::from(v)
            } else if let Ok(v) = u64::try_from(n) {
                Value::from(v)
            } else {
                Value::String(n.to_string())
            };
            json!({ "int": int })
        }
        PlutusData::Bytes(b) => json!({ "bytes": hex::encode(b) }),
    }
}

pub fn from_json(value: &Value) -> Result<PlutusData, CodecError> {
    let obj = value
        .as_object()
        .ok_or_else(|| invalid("expected an object", value))?;

    if let Some(tag) = obj.get("constructor") {
        let tag = tag
            .as_u64()
            .ok_or_else(|| invalid("constructor must be a non-negative integer", tag))?;
        let fields = array_field(obj, "fields")?
            .iter()
            .map(from_json)
            .collect::<Result<_, _>>()?;
        return Ok(PlutusData::constr(tag, fields));
    }
    if let Some(b) = obj.get("bytes") {
        let s = b.as_str().ok_or_else(|| invalid("bytes must be a hex string", b))?;
        let bytes = hex::decode(s).map_err(|e| CodecError::InvalidHex(e.to_string()))?;
        return Ok(PlutusData::Bytes(bytes));
    }
    if let Some(n) = obj.get("int") {
        let int = match n {
            Value::Number(num) => num
                .as_i64()
                .map(BigInt::from)
                .or_else(|| num.as_u64().map(BigInt::from)),
            Value::String(s) => s.parse::<BigInt>().ok(),
            _ => None,
        };
        return int
            .map(PlutusData::Integer)
            .ok_or_else(|| invalid("int must be an integer", n));
    }
    if obj.contains_key("list") {
        let items = array_field(obj, "list")?
            .iter()
            .map(from_json)
            .collect::<Result<_, _>>()?;
        return Ok(PlutusData::List(items));
    }
    if obj.contains_key("map") {
        let entries = array_field(obj, "map")?
            .iter()
            .map(|entry| {
                let k = entry.get("k").ok_or_else(|| invalid("map entry without k", entry))?;
                let v = entry.get("v").ok_or_else(|| invalid("map entry without v", entry))?;
                Ok((from_json(k)?, from_json(v)?))
            })
            .collect::<Result<_, CodecError>>()?;
        return Ok(PlutusData::Map(entries));
    }
    Err(invalid("unknown data shape", value))
}

fn array_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a Vec<Value>, CodecError> {
    obj.get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| CodecError::InvalidJson(format!("{key} must be an array")))
}

fn invalid(what: &str, value: &Value) -> CodecError {
    CodecError::InvalidJson(format!("{what}: {value}"))
}
