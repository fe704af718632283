use super::config::MapConfig;
use super::map::FieldMap;
use crate::error::{RecordError, Result};
use crate::pool::BufferPool;
use crate::serialization::Encoder;
use crate::types::FieldType;
use crate::value::{Mapping, Value, mapping_from_cbor_entries, mapping_from_json_object};
use smol_str::SmolStr;
use std::fmt;
use std::fmt::Write as _;
use std::rc::Rc;

// ════════════════════════════════════════════════════════════════════════════
// Generic mapping
// ════════════════════════════════════════════════════════════════════════════

impl FieldMap<'_> {
    /// Generic ordered mapping of the whole buffer. Embedded and pointed-to
    /// buffers become nested `Value::Map`s.
    pub fn to_mapping(&self) -> Result<Mapping> {
        self.pool.to_mapping(self.loc)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_mapping()?)?)
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        cbor4ii::serde::to_vec(Vec::new(), &self.to_mapping()?)
            .map_err(|e| RecordError::CborError(format!("{e:?}")))
    }

    /// Render every occurrence as `NAME\tvalue\n`. Nested buffers and views
    /// follow their field line, indented by one tab per level.
    pub fn print(&self) -> Result<String> {
        let mut out = String::new();
        print_mapping(&mut out, &self.to_mapping()?, 0);
        Ok(out)
    }
}

impl FieldMap<'static> {
    /// New owned buffer holding `mapping`. Pointer fields given as mappings
    /// get child buffers owned by the new one.
    pub fn from_mapping(pool: &Rc<BufferPool>, mapping: &Mapping, config: MapConfig) -> Result<Self> {
        let map = FieldMap::with_config(pool, config)?;
        // Children already allocated are owned by `map` and go with it if
        // encoding fails.
        let record = Encoder::new(pool, map.handle()).encode_mapping(mapping)?;
        pool.write(map.handle(), |rec| {
            *rec = record;
            Ok(())
        })?;
        Ok(map)
    }

    /// Build from a JSON object. Arrays are occurrence lists; a bare value is
    /// a single occurrence.
    pub fn from_json(pool: &Rc<BufferPool>, text: &str, config: MapConfig) -> Result<Self> {
        match serde_json::from_str::<serde_json::Value>(text)? {
            serde_json::Value::Object(obj) => {
                Self::from_mapping(pool, &mapping_from_json_object(obj)?, config)
            }
            _ => Err(RecordError::InvalidArgument("JSON document must be an object")),
        }
    }

    pub fn from_cbor(pool: &Rc<BufferPool>, data: &[u8], config: MapConfig) -> Result<Self> {
        let value: cbor4ii::core::Value = cbor4ii::serde::from_slice(data)
            .map_err(|e| RecordError::CborError(format!("{e:?}")))?;
        match value {
            cbor4ii::core::Value::Map(entries) => {
                Self::from_mapping(pool, &mapping_from_cbor_entries(entries)?, config)
            }
            _ => Err(RecordError::InvalidArgument("CBOR document must be a map")),
        }
    }

    /// Rebuild a buffer from [`FieldMap::print`] output. Only scalar field
    /// types can be read back.
    pub fn extread(pool: &Rc<BufferPool>, text: &str, config: MapConfig) -> Result<Self> {
        let mut mapping = Mapping::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let (name, raw) = line
                .split_once('\t')
                .ok_or(RecordError::InvalidArgument("print line without tab separator"))?;
            let id = pool.table().resolve_field_id(name)?;
            let ftype = id.field_type();
            if ftype.is_nested() || ftype == FieldType::View {
                return Err(RecordError::conversion(
                    name,
                    "nested fields cannot be read from print text",
                ));
            }
            let bytes = unescape(raw).map_err(|reason| RecordError::conversion(name, reason))?;
            let value = match ftype {
                FieldType::Carray | FieldType::Char => Value::Bytes(bytes),
                _ => Value::Str(SmolStr::from(
                    String::from_utf8(bytes)
                        .map_err(|_| RecordError::conversion(name, "value is not UTF-8"))?,
                )),
            };
            mapping.entry(SmolStr::from(name)).or_default().push(value);
        }
        Self::from_mapping(pool, &mapping, config)
    }
}

impl fmt::Display for FieldMap<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.print() {
            Ok(text) => f.write_str(&text),
            Err(e) => write!(f, "<{}>", e),
        }
    }
}

// ─── Print helpers ──────────────────────────────────────────────────────────

fn print_mapping(out: &mut String, map: &Mapping, depth: usize) {
    for (name, occs) in map {
        for value in occs {
            indent(out, depth);
            out.push_str(name);
            out.push('\t');
            match value {
                Value::Char(c) => escape_into(out, &[*c]),
                Value::Int(i) => {
                    let _ = write!(out, "{}", i);
                }
                Value::Float(v) => {
                    let _ = write!(out, "{:.6}", v);
                }
                Value::Str(s) => escape_into(out, s.as_bytes()),
                Value::Bytes(b) => escape_into(out, b),
                Value::Map(nested) => {
                    out.push('\n');
                    print_mapping(out, nested, depth + 1);
                    continue;
                }
                Value::View(view) => {
                    out.push_str(&view.vname);
                    out.push('\n');
                    print_mapping(out, &view.data, depth + 1);
                    continue;
                }
            }
            out.push('\n');
        }
    }
}

#[inline]
fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push('\t');
    }
}

/// Printable ASCII as is, backslash doubled, everything else as `\hh`.
fn escape_into(out: &mut String, bytes: &[u8]) {
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{:02x}", b);
            }
        }
    }
}

fn unescape(text: &str) -> std::result::Result<Vec<u8>, &'static str> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        match bytes.get(i + 1) {
            Some(b'\\') => {
                out.push(b'\\');
                i += 2;
            }
            Some(_) => {
                let hex = text.get(i + 1..i + 3).ok_or("truncated escape")?;
                out.push(u8::from_str_radix(hex, 16).map_err(|_| "bad hex escape")?);
                i += 3;
            }
            None => return Err("dangling backslash"),
        }
    }
    Ok(out)
}
