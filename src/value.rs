use crate::error::{RecordError, Result};
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use smol_str::SmolStr;
use std::fmt;

/// Generic ordered mapping: field name to its occurrence list.
pub type Mapping = IndexMap<SmolStr, Vec<Value>>;

// ─── ViewValue ──────────────────────────────────────────────────────────────

/// A fixed-layout view occurrence. An empty `vname` is a NULL view.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewValue {
    pub vname: SmolStr,
    pub data: Mapping,
}

impl ViewValue {
    pub fn new(vname: impl Into<SmolStr>, data: Mapping) -> Self {
        Self {
            vname: vname.into(),
            data,
        }
    }

    pub fn is_null(&self) -> bool {
        self.vname.is_empty()
    }
}

// ─── Value ──────────────────────────────────────────────────────────────────

/// Owned, buffer-independent occurrence value.
///
/// Short and long fields decode to `Int`, float and double to `Float`,
/// nested buffers (embedded or pointed-to) to `Map`.
#[derive(Debug, Clone)]
pub enum Value {
    Char(u8),
    Int(i64),
    Float(f64),
    Str(SmolStr),
    Bytes(Vec<u8>),
    Map(Mapping),
    View(ViewValue),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::View(a), Value::View(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Mapping> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_view(&self) -> Option<&ViewValue> {
        match self {
            Value::View(v) => Some(v),
            _ => None,
        }
    }

    /// Short type description used in conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Char(_) => "char",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Map(_) => "mapping",
            Value::View(_) => "view",
        }
    }
}

// ─── Display (list/dict representation) ─────────────────────────────────────

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Char(c) => write!(f, "{:?}", *c as char),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Str(s) => write!(f, "{:?}", s.as_str()),
            Value::Bytes(b) => {
                f.write_str("b\"")?;
                for byte in b {
                    write!(f, "{}", std::ascii::escape_default(*byte))?;
                }
                f.write_str("\"")
            }
            Value::Map(m) => fmt_mapping(m, f),
            Value::View(v) => {
                write!(f, "{{\"vname\": {:?}, \"data\": ", v.vname.as_str())?;
                fmt_mapping(&v.data, f)?;
                f.write_str("}")
            }
        }
    }
}

pub(crate) fn fmt_list(values: &[Value], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("[")?;
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", v)?;
    }
    f.write_str("]")
}

pub(crate) fn fmt_mapping(map: &Mapping, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("{")?;
    for (i, (k, v)) in map.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{:?}: ", k.as_str())?;
        fmt_list(v, f)?;
    }
    f.write_str("}")
}

// ─── Serialize ──────────────────────────────────────────────────────────────

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Char(c) => serializer.serialize_char(*c as char),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Str(s) => serializer.serialize_str(s.as_str()),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::Map(m) => m.serialize(serializer),
            Value::View(v) => {
                let mut m = serializer.serialize_map(Some(2))?;
                m.serialize_entry("vname", v.vname.as_str())?;
                m.serialize_entry("data", &v.data)?;
                m.end()
            }
        }
    }
}

// ─── From impls ─────────────────────────────────────────────────────────────

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Int(n as i64)
                }
            }
        )*
    };
}

value_from_int!(i16, i32, i64, u16, u32);

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Float(n as f64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<u8> for Value {
    fn from(c: u8) -> Self {
        Value::Char(c)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(SmolStr::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(SmolStr::from(s))
    }
}

impl From<SmolStr> for Value {
    fn from(s: SmolStr) -> Self {
        Value::Str(s)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<Mapping> for Value {
    fn from(m: Mapping) -> Self {
        Value::Map(m)
    }
}

impl From<ViewValue> for Value {
    fn from(v: ViewValue) -> Self {
        Value::View(v)
    }
}

// ─── IntoOccurrences ────────────────────────────────────────────────────────

/// Argument of `FieldMap::set`: a single value (occurrence 0) or an ordered
/// list of values (occurrences 0..k-1).
pub trait IntoOccurrences {
    fn into_occurrences(self) -> Vec<Value>;
}

impl IntoOccurrences for Value {
    fn into_occurrences(self) -> Vec<Value> {
        vec![self]
    }
}

impl<T: Into<Value>> IntoOccurrences for Vec<T> {
    fn into_occurrences(self) -> Vec<Value> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<Value>, const N: usize> IntoOccurrences for [T; N] {
    fn into_occurrences(self) -> Vec<Value> {
        self.into_iter().map(Into::into).collect()
    }
}

macro_rules! scalar_occurrences {
    ($($t:ty),*) => {
        $(
            impl IntoOccurrences for $t {
                fn into_occurrences(self) -> Vec<Value> {
                    vec![Value::from(self)]
                }
            }
        )*
    };
}

scalar_occurrences!(
    i16, i32, i64, u8, u16, u32, f32, f64, &str, String, SmolStr, &[u8], Mapping, ViewValue
);

// ─── JSON conversion ────────────────────────────────────────────────────────

/// Convert one JSON occurrence of `field`. JSON has no byte strings or
/// views: objects become nested mappings and a nested array must be a list
/// of bytes.
pub(crate) fn value_from_json(field: &str, v: serde_json::Value) -> Result<Value> {
    Ok(match v {
        serde_json::Value::Null => Value::Str(SmolStr::default()),
        serde_json::Value::Bool(b) => Value::Int(b as i64),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(
                n.as_f64()
                    .ok_or_else(|| RecordError::conversion(field, format!("{n} is not representable")))?,
            ),
        },
        serde_json::Value::String(s) => Value::Str(SmolStr::from(s)),
        serde_json::Value::Array(items) => Value::Bytes(
            items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| RecordError::conversion(field, format!("{item} is not a byte")))
                })
                .collect::<Result<_>>()?,
        ),
        serde_json::Value::Object(obj) => Value::Map(mapping_from_json_object(obj)?),
    })
}

/// Top-level arrays are occurrence lists; any other value is a single
/// occurrence.
pub(crate) fn mapping_from_json_object(
    obj: serde_json::Map<String, serde_json::Value>,
) -> Result<Mapping> {
    obj.into_iter()
        .map(|(k, v)| {
            let occs = match v {
                serde_json::Value::Array(items) => items
                    .into_iter()
                    .map(|item| value_from_json(&k, item))
                    .collect::<Result<_>>()?,
                other => vec![value_from_json(&k, other)?],
            };
            Ok((SmolStr::from(k), occs))
        })
        .collect()
}

impl From<Value> for serde_json::Value {
    fn from(val: Value) -> Self {
        match val {
            Value::Char(c) => serde_json::Value::String((c as char).to_string()),
            Value::Int(i) => serde_json::json!(i),
            Value::Float(f) => serde_json::json!(f),
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::Bytes(b) => serde_json::Value::Array(
                b.into_iter().map(|byte| serde_json::json!(byte)).collect(),
            ),
            Value::Map(m) => mapping_to_json(m),
            Value::View(v) => serde_json::json!({
                "vname": v.vname.as_str(),
                "data": mapping_to_json(v.data),
            }),
        }
    }
}

pub(crate) fn mapping_to_json(map: Mapping) -> serde_json::Value {
    serde_json::Value::Object(
        map.into_iter()
            .map(|(k, v)| {
                let list = v.into_iter().map(serde_json::Value::from).collect();
                (k.to_string(), serde_json::Value::Array(list))
            })
            .collect(),
    )
}

// ─── CBOR conversion ────────────────────────────────────────────────────────

/// Convert one CBOR occurrence of `field`. A nested array must hold
/// integers in byte range; a two-entry map keyed `vname` is a view.
pub(crate) fn value_from_cbor(field: &str, v: cbor4ii::core::Value) -> Result<Value> {
    use cbor4ii::core::Value as Cbor;
    Ok(match v {
        Cbor::Null => Value::Str(SmolStr::default()),
        Cbor::Bool(b) => Value::Int(b as i64),
        Cbor::Integer(i) => match i64::try_from(i) {
            Ok(val) => Value::Int(val),
            Err(_) => Value::Float(i as f64),
        },
        Cbor::Float(f) => Value::Float(f),
        Cbor::Bytes(b) => Value::Bytes(b),
        Cbor::Text(s) => Value::Str(SmolStr::from(s)),
        Cbor::Array(items) => Value::Bytes(
            items
                .iter()
                .map(|item| {
                    let byte = match item {
                        Cbor::Integer(i) => u8::try_from(*i).ok(),
                        _ => None,
                    };
                    byte.ok_or_else(|| RecordError::conversion(field, format!("{item:?} is not a byte")))
                })
                .collect::<Result<_>>()?,
        ),
        Cbor::Map(entries) => {
            let is_view = entries.len() == 2
                && entries.iter().any(|(k, _)| matches!(k, Cbor::Text(t) if t == "vname"));
            let map = mapping_from_cbor_entries(entries)?;
            if is_view {
                let vname = map
                    .get("vname")
                    .and_then(|v| v.first())
                    .and_then(|v| v.as_str())
                    .map(SmolStr::from)
                    .unwrap_or_default();
                let data = match map.get("data").and_then(|v| v.first()) {
                    Some(Value::Map(m)) => m.clone(),
                    _ => Mapping::new(),
                };
                Value::View(ViewValue { vname, data })
            } else {
                Value::Map(map)
            }
        }
        Cbor::Tag(_, inner) => value_from_cbor(field, *inner)?,
        other => {
            return Err(RecordError::conversion(
                field,
                format!("{other:?} has no occurrence form"),
            ));
        }
    })
}

pub(crate) fn mapping_from_cbor_entries(
    entries: Vec<(cbor4ii::core::Value, cbor4ii::core::Value)>,
) -> Result<Mapping> {
    entries
        .into_iter()
        .map(|(k, v)| {
            let key = match k {
                cbor4ii::core::Value::Text(s) => SmolStr::from(s),
                cbor4ii::core::Value::Integer(i) => SmolStr::from(i.to_string()),
                other => SmolStr::from(format!("{:?}", other)),
            };
            let occs = match v {
                cbor4ii::core::Value::Array(items) => items
                    .into_iter()
                    .map(|item| value_from_cbor(&key, item))
                    .collect::<Result<_>>()?,
                other => vec![value_from_cbor(&key, other)?],
            };
            Ok((key, occs))
        })
        .collect()
}
