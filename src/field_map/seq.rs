use super::iter::Values;
use super::map::FieldMap;
use crate::error::{RecordError, Result};
use crate::types::*;
use crate::value::{Value, fmt_mapping};
use std::fmt;

// ─── Index arithmetic ───────────────────────────────────────────────────────

/// Resolve a possibly negative index against `len`, for access to an
/// existing occurrence.
#[inline]
pub(crate) fn normalize_index(index: isize, len: usize) -> Result<usize> {
    let resolved = if index < 0 { index + len as isize } else { index };
    if resolved < 0 || resolved as usize >= len {
        return Err(RecordError::IndexOutOfRange { index, len });
    }
    Ok(resolved as usize)
}

/// Like [`normalize_index`] but `len` itself is a valid insert position.
#[inline]
fn normalize_insert(index: isize, len: usize) -> Result<usize> {
    let resolved = if index < 0 { index + len as isize } else { index };
    if resolved < 0 || resolved as usize > len {
        return Err(RecordError::IndexOutOfRange { index, len });
    }
    Ok(resolved as usize)
}

/// Indices selected by a half-open, stepped slice with negative bounds
/// counted from the end. Out-of-range bounds are clamped.
pub(crate) fn slice_indices(
    len: usize,
    start: Option<isize>,
    stop: Option<isize>,
    step: isize,
) -> Result<Vec<usize>> {
    if step == 0 {
        return Err(RecordError::InvalidArgument("slice step cannot be zero"));
    }
    let n = len as isize;
    let clamp = |bound: isize| -> isize {
        if bound < 0 {
            let b = bound + n;
            if b < 0 {
                if step < 0 { -1 } else { 0 }
            } else {
                b
            }
        } else if bound >= n {
            if step < 0 { n - 1 } else { n }
        } else {
            bound
        }
    };
    let start = match start {
        Some(s) => clamp(s),
        None if step < 0 => n - 1,
        None => 0,
    };
    let stop = match stop {
        Some(s) => clamp(s),
        None if step < 0 => -1,
        None => n,
    };
    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        out.push(i as usize);
        i += step;
    }
    Ok(out)
}

// ════════════════════════════════════════════════════════════════════════════
// FieldValue
// ════════════════════════════════════════════════════════════════════════════

/// One occurrence as handed out by a sequence: a decoded value, or a map
/// over a nested buffer (read-only embedded, or pointer-aliased).
#[derive(Debug)]
pub enum FieldValue<'m> {
    Value(Value),
    Record(FieldMap<'m>),
}

impl<'m> FieldValue<'m> {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            FieldValue::Value(v) => Some(v),
            FieldValue::Record(_) => None,
        }
    }

    pub fn as_record(&self) -> Option<&FieldMap<'m>> {
        match self {
            FieldValue::Record(m) => Some(m),
            FieldValue::Value(_) => None,
        }
    }

    pub fn into_record(self) -> Option<FieldMap<'m>> {
        match self {
            FieldValue::Record(m) => Some(m),
            FieldValue::Value(_) => None,
        }
    }

    #[inline]
    pub fn is_record(&self) -> bool {
        matches!(self, FieldValue::Record(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_value().and_then(Value::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_value().and_then(Value::as_f64)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.as_value().and_then(Value::as_bytes)
    }

    /// Owned generic value; nested buffers are converted to `Value::Map`.
    pub fn into_value(self) -> Result<Value> {
        match self {
            FieldValue::Value(v) => Ok(v),
            FieldValue::Record(m) => Ok(Value::Map(m.to_mapping()?)),
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        match self {
            FieldValue::Value(v) => Ok(v.clone()),
            FieldValue::Record(m) => Ok(Value::Map(m.to_mapping()?)),
        }
    }

    pub fn equals_value(&self, other: &Value) -> Result<bool> {
        match (self, other) {
            (FieldValue::Value(v), _) => Ok(v == other),
            (FieldValue::Record(m), Value::Map(expected)) => m.equals_mapping(expected),
            (FieldValue::Record(_), _) => Ok(false),
        }
    }
}

impl PartialEq<Value> for FieldValue<'_> {
    /// Conversion failures compare unequal; use [`FieldValue::equals_value`]
    /// to see them.
    fn eq(&self, other: &Value) -> bool {
        self.equals_value(other).unwrap_or(false)
    }
}

impl fmt::Display for FieldValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Value(v) => write!(f, "{}", v),
            FieldValue::Record(m) => match m.to_mapping() {
                Ok(map) => fmt_mapping(&map, f),
                Err(e) => write!(f, "<{}>", e),
            },
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// FieldSeq (read)
// ════════════════════════════════════════════════════════════════════════════

/// Occurrence sequence of one field, bound to a map. Holds no data.
#[derive(Debug, Clone, Copy)]
pub struct FieldSeq<'m> {
    map: &'m FieldMap<'m>,
    id: FieldId,
}

impl<'m> FieldSeq<'m> {
    pub(crate) fn new(map: &'m FieldMap<'m>, id: FieldId) -> Self {
        FieldSeq { map, id }
    }

    #[inline]
    pub fn field_id(&self) -> FieldId {
        self.id
    }

    pub fn key(&self) -> FieldKey {
        self.map.table().key_for(self.id)
    }

    /// Current occurrence count, 0 for an absent field.
    pub fn len(&self) -> Result<usize> {
        self.map.count(self.id)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Occurrence at `index`; negative indices count from the end.
    pub fn get(&self, index: isize) -> Result<FieldValue<'m>> {
        let idx = normalize_index(index, self.len()?)?;
        self.map.occurrence(self.id, idx)
    }

    /// Materialized, independent slice of the occurrences.
    pub fn slice(
        &self,
        start: Option<isize>,
        stop: Option<isize>,
        step: isize,
    ) -> Result<Vec<FieldValue<'m>>> {
        slice_indices(self.len()?, start, stop, step)?
            .into_iter()
            .map(|idx| self.map.occurrence(self.id, idx))
            .collect()
    }

    pub fn values(&self) -> Values<'m> {
        Values::new(self.map, self.id)
    }

    /// All occurrences as owned generic values.
    pub fn to_values(&self) -> Result<Vec<Value>> {
        self.values().map(|v| v.and_then(FieldValue::into_value)).collect()
    }

    pub fn equals(&self, other: &FieldSeq<'_>) -> Result<bool> {
        let len = self.len()?;
        if len != other.len()? {
            return Ok(false);
        }
        for idx in 0..len {
            let mine = self.map.occurrence(self.id, idx)?.into_value()?;
            if !other.map.occurrence(other.id, idx)?.equals_value(&mine)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn equals_values(&self, values: &[Value]) -> Result<bool> {
        if self.len()? != values.len() {
            return Ok(false);
        }
        for (idx, expected) in values.iter().enumerate() {
            if !self.map.occurrence(self.id, idx)?.equals_value(expected)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl fmt::Display for FieldSeq<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, value) in self.values().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match value {
                Ok(v) => write!(f, "{}", v)?,
                Err(e) => write!(f, "<{}>", e)?,
            }
        }
        f.write_str("]")
    }
}

// ════════════════════════════════════════════════════════════════════════════
// FieldSeqMut (write)
// ════════════════════════════════════════════════════════════════════════════

/// Writable occurrence sequence. Every mutation fails with
/// `ReadOnlyViolation` unless the map owns its buffer.
#[derive(Debug)]
pub struct FieldSeqMut<'m, 'p> {
    map: &'m mut FieldMap<'p>,
    id: FieldId,
}

impl<'m, 'p> FieldSeqMut<'m, 'p> {
    pub(crate) fn new(map: &'m mut FieldMap<'p>, id: FieldId) -> Self {
        FieldSeqMut { map, id }
    }

    /// Read-only view of the same sequence.
    #[inline]
    pub fn as_seq(&self) -> FieldSeq<'_> {
        FieldSeq::new(&*self.map, self.id)
    }

    #[inline]
    pub fn field_id(&self) -> FieldId {
        self.id
    }

    pub fn len(&self) -> Result<usize> {
        self.map.count(self.id)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get(&self, index: isize) -> Result<FieldValue<'_>> {
        let idx = normalize_index(index, self.len()?)?;
        self.map.occurrence(self.id, idx)
    }

    pub fn slice(
        &self,
        start: Option<isize>,
        stop: Option<isize>,
        step: isize,
    ) -> Result<Vec<FieldValue<'_>>> {
        self.as_seq().slice(start, stop, step)
    }

    /// Overwrite the existing occurrence at `index`.
    pub fn set(&mut self, index: isize, value: impl Into<Value>) -> Result<()> {
        self.map.ownership.ensure_writable("set")?;
        let id = self.id;
        let idx = normalize_index(index, self.len()?)?;
        self.map.apply("set", id, &[value.into()], |rec, encoded| {
            for bytes in &encoded {
                rec.set_occurrence(id, idx, bytes)?;
            }
            Ok(())
        })
    }

    /// Remove the occurrence at `index`; later occurrences shift down.
    pub fn delete(&mut self, index: isize) -> Result<()> {
        self.map.ownership.ensure_writable("delete")?;
        let id = self.id;
        let idx = normalize_index(index, self.len()?)?;
        self.map
            .pool
            .write(self.map.loc.handle, |rec| rec.delete_occurrence(id, idx))
    }

    /// Insert before `index`; `index == len` appends.
    pub fn insert(&mut self, index: isize, value: impl Into<Value>) -> Result<()> {
        self.map.ownership.ensure_writable("insert")?;
        let id = self.id;
        let idx = normalize_insert(index, self.len()?)?;
        self.map.apply("insert", id, &[value.into()], |rec, encoded| {
            for bytes in &encoded {
                rec.insert_occurrence(id, idx, bytes)?;
            }
            Ok(())
        })
    }

    pub fn append(&mut self, value: impl Into<Value>) -> Result<()> {
        self.map.ownership.ensure_writable("append")?;
        let len = self.len()?;
        self.insert(len as isize, value)
    }

    /// Store `target` as the pointer value at `index` (an existing
    /// occurrence, or `len` to append).
    pub fn set_ptr(&mut self, index: isize, target: &FieldMap<'_>) -> Result<()> {
        self.map.ownership.ensure_writable("set_ptr")?;
        let idx = normalize_insert(index, self.len()?)?;
        self.map.store_pointer(self.id, idx, target)
    }

    pub fn to_values(&self) -> Result<Vec<Value>> {
        self.as_seq().to_values()
    }

    pub fn equals_values(&self, values: &[Value]) -> Result<bool> {
        self.as_seq().equals_values(values)
    }
}

impl fmt::Display for FieldSeqMut<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_seq())
    }
}
