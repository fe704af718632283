use crate::error::{RecordError, Result};
use crate::pool::BufferPool;
use crate::record::RecordBufMut;
use crate::types::*;
use crate::value::{Mapping, Value, ViewValue};
use crate::view::encode_view;
use smol_str::SmolStr;

// ─── Scalar coercion ────────────────────────────────────────────────────────
//
// Every write converts the caller's value to the field's declared type before
// the buffer is touched. A value that cannot be represented is a
// TypeConversion error.

pub(crate) fn coerce_int(field: &str, value: &Value, min: i64, max: i64) -> Result<i64> {
    let n = match value {
        Value::Int(i) => *i,
        Value::Char(c) => *c as i64,
        Value::Float(f) => float_to_int(field, *f)?,
        Value::Str(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(i) => i,
                Err(_) => match s.parse::<f64>() {
                    Ok(f) => float_to_int(field, f)?,
                    Err(_) => {
                        return Err(RecordError::conversion(field, format!("{s:?} is not a number")));
                    }
                },
            }
        }
        other => {
            return Err(RecordError::conversion(
                field,
                format!("{} cannot be stored as an integer", other.kind()),
            ));
        }
    };
    if n < min || n > max {
        return Err(RecordError::conversion(
            field,
            format!("{n} out of range {min}..={max}"),
        ));
    }
    Ok(n)
}

fn float_to_int(field: &str, f: f64) -> Result<i64> {
    if !f.is_finite() || f < i64::MIN as f64 || f > i64::MAX as f64 {
        return Err(RecordError::conversion(field, format!("{f} is not representable")));
    }
    Ok(f.trunc() as i64)
}

pub(crate) fn coerce_float(field: &str, value: &Value) -> Result<f64> {
    match value {
        Value::Float(f) => Ok(*f),
        Value::Int(i) => Ok(*i as f64),
        Value::Char(c) => Ok(*c as f64),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| RecordError::conversion(field, format!("{s:?} is not a number"))),
        other => Err(RecordError::conversion(
            field,
            format!("{} cannot be stored as a float", other.kind()),
        )),
    }
}

/// Finite doubles outside the `f32` range are rejected rather than
/// rounded to infinity.
pub(crate) fn coerce_f32(field: &str, value: &Value) -> Result<f32> {
    let f = coerce_float(field, value)?;
    if f.is_finite() && f.abs() > f32::MAX as f64 {
        return Err(RecordError::conversion(field, format!("{f} is outside the float range")));
    }
    Ok(f as f32)
}

pub(crate) fn coerce_char(field: &str, value: &Value) -> Result<u8> {
    match value {
        Value::Char(c) => Ok(*c),
        Value::Str(s) if s.len() <= 1 => Ok(s.as_bytes().first().copied().unwrap_or(0)),
        Value::Bytes(b) if b.len() <= 1 => Ok(b.first().copied().unwrap_or(0)),
        Value::Int(i) if (0..=255).contains(i) => Ok(*i as u8),
        other => Err(RecordError::conversion(
            field,
            format!("{} is not a single character", other.kind()),
        )),
    }
}

pub(crate) fn coerce_text(field: &str, value: &Value) -> Result<SmolStr> {
    let text = match value {
        Value::Str(s) => s.clone(),
        Value::Int(i) => SmolStr::from(i.to_string()),
        Value::Float(f) => SmolStr::from(f.to_string()),
        Value::Char(c) => SmolStr::from((*c as char).to_string()),
        Value::Bytes(b) => SmolStr::from(
            std::str::from_utf8(b)
                .map_err(|_| RecordError::conversion(field, "bytes are not UTF-8"))?,
        ),
        other => {
            return Err(RecordError::conversion(
                field,
                format!("{} cannot be stored as a string", other.kind()),
            ));
        }
    };
    if text.as_bytes().contains(&0) {
        return Err(RecordError::conversion(field, "string contains NUL"));
    }
    Ok(text)
}

pub(crate) fn coerce_bytes(field: &str, value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::Bytes(b) => Ok(b.clone()),
        Value::Str(s) => Ok(s.as_bytes().to_vec()),
        Value::Char(c) => Ok(vec![*c]),
        other => Err(RecordError::conversion(
            field,
            format!("{} cannot be stored as a byte array", other.kind()),
        )),
    }
}

/// A mapping shaped like `{"vname": [..], "data": [{..}]}` (the generic form
/// of a view) is accepted where a view is expected.
fn coerce_view(field: &str, value: &Value) -> Result<ViewValue> {
    match value {
        Value::View(v) => Ok(v.clone()),
        Value::Map(m) if m.contains_key("vname") => {
            let vname = m
                .get("vname")
                .and_then(|v| v.first())
                .and_then(Value::as_str)
                .map(SmolStr::from)
                .unwrap_or_default();
            let data = match m.get("data").and_then(|v| v.first()) {
                Some(Value::Map(d)) => d.clone(),
                None => Mapping::new(),
                Some(other) => {
                    return Err(RecordError::conversion(
                        field,
                        format!("view data must be a mapping, got {}", other.kind()),
                    ));
                }
            };
            Ok(ViewValue { vname, data })
        }
        other => Err(RecordError::conversion(
            field,
            format!("{} cannot be stored as a view", other.kind()),
        )),
    }
}

// ─── Encoder ────────────────────────────────────────────────────────────────

/// Converts generic values into occurrence bytes for one target buffer.
///
/// Pointer occurrences given as mappings allocate a child buffer owned by
/// `owner`. If a later value fails, [`Encoder::rollback`] frees every child
/// allocated so far, so the pool is left as it was.
pub(crate) struct Encoder<'a> {
    pool: &'a BufferPool,
    owner: BufferHandle,
    allocated: Vec<BufferHandle>,
}

impl<'a> Encoder<'a> {
    pub(crate) fn new(pool: &'a BufferPool, owner: BufferHandle) -> Self {
        Encoder {
            pool,
            owner,
            allocated: Vec::new(),
        }
    }

    /// Encode occurrence `value` of a field.
    pub(crate) fn encode(&mut self, id: FieldId, value: &Value) -> Result<Vec<u8>> {
        let table = self.pool.table();
        let name = table.display_name(id);
        let field = name.as_str();
        Ok(match id.field_type() {
            FieldType::Char => vec![coerce_char(field, value)?],
            FieldType::Short => {
                let v = coerce_int(field, value, i16::MIN as i64, i16::MAX as i64)?;
                (v as i16).to_le_bytes().to_vec()
            }
            FieldType::Long => coerce_int(field, value, i64::MIN, i64::MAX)?
                .to_le_bytes()
                .to_vec(),
            FieldType::Float => coerce_f32(field, value)?.to_le_bytes().to_vec(),
            FieldType::Double => coerce_float(field, value)?.to_le_bytes().to_vec(),
            FieldType::String => coerce_text(field, value)?.as_bytes().to_vec(),
            FieldType::Carray => coerce_bytes(field, value)?,
            FieldType::View => encode_view(table, field, &coerce_view(field, value)?)?,
            FieldType::Ubf => match value {
                Value::Map(m) => self.encode_mapping(m)?.into_bytes(),
                other => {
                    return Err(RecordError::conversion(
                        field,
                        format!("{} cannot be stored as a nested buffer", other.kind()),
                    ));
                }
            },
            FieldType::Ptr => match value {
                Value::Map(m) => self.alloc_child(m)?.to_bits().to_le_bytes().to_vec(),
                other => {
                    return Err(RecordError::conversion(
                        field,
                        format!("{} cannot be stored as a pointer", other.kind()),
                    ));
                }
            },
        })
    }

    /// Build a complete record from a generic mapping.
    pub(crate) fn encode_mapping(&mut self, map: &Mapping) -> Result<RecordBufMut> {
        let mut rec = RecordBufMut::new_empty();
        for (name, occs) in map {
            let id = self.pool.table().resolve_field_id(name)?;
            for (idx, value) in occs.iter().enumerate() {
                let bytes = self.encode(id, value)?;
                rec.set_occurrence(id, idx, &bytes)?;
            }
        }
        Ok(rec)
    }

    fn alloc_child(&mut self, map: &Mapping) -> Result<BufferHandle> {
        let child = self.pool.alloc("UBF", None, 0)?;
        self.allocated.push(child);
        self.pool.set_owner(child, Some(self.owner))?;
        // Grandchildren are owned by `child` and go with it on rollback.
        let rec = Encoder::new(self.pool, child).encode_mapping(map)?;
        self.pool.write(child, |r| {
            *r = rec;
            Ok(())
        })?;
        Ok(child)
    }

    /// Keep every allocated child.
    pub(crate) fn commit(self) {}

    pub(crate) fn rollback(self) {
        for handle in self.allocated {
            if let Err(e) = self.pool.free(handle) {
                tracing::warn!(handle = handle.to_bits(), error = %e, "rollback free failed");
            }
        }
    }
}
