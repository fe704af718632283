use crate::error::{RecordError, Result};
use crate::schema::FieldTable;
use crate::serialization::{
    coerce_bytes, coerce_char, coerce_f32, coerce_float, coerce_int, coerce_text,
};
use crate::types::FieldType;
use crate::value::{Mapping, Value, ViewValue};
use arrayvec::ArrayString;
use smol_str::SmolStr;

/// Bytes reserved for the NUL-padded view name at the start of a view
/// occurrence.
pub const VIEW_NAME_SIZE: usize = 32;

/// Used counts and carray lengths are stored as `u16`.
pub const VIEW_MAX_SLOTS: usize = u16::MAX as usize;

// ─── Definitions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewField {
    pub cname: SmolStr,
    pub ftype: FieldType,
    /// Fixed number of occurrence slots.
    pub count: usize,
    /// Slot capacity for string and carray members.
    pub size: usize,
}

impl ViewField {
    fn slot_size(&self) -> usize {
        match self.ftype {
            FieldType::Char => 1,
            FieldType::Short => 2,
            FieldType::Float => 4,
            FieldType::Long | FieldType::Double => 8,
            FieldType::String => self.size,
            FieldType::Carray => 2 + self.size,
            // rejected by parse_views
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDef {
    pub name: ArrayString<VIEW_NAME_SIZE>,
    pub fields: Vec<ViewField>,
}

impl ViewDef {
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() || name.len() >= VIEW_NAME_SIZE {
            return Err(RecordError::Schema {
                line: 0,
                reason: format!("view name {name:?} must be 1..{VIEW_NAME_SIZE} bytes"),
            });
        }
        let name = ArrayString::from(name).map_err(|_| RecordError::Schema {
            line: 0,
            reason: format!("view name {name:?} too long"),
        })?;
        Ok(ViewDef {
            name,
            fields: Vec::new(),
        })
    }

    pub fn member(mut self, cname: &str, ftype: FieldType, count: usize, size: usize) -> Self {
        self.fields.push(ViewField {
            cname: SmolStr::from(cname),
            ftype,
            count,
            size,
        });
        self
    }

    pub fn field(&self, cname: &str) -> Option<&ViewField> {
        self.fields.iter().find(|f| f.cname == cname)
    }

    /// Size of the fixed layout that follows the view name.
    pub fn layout_size(&self) -> usize {
        self.fields
            .iter()
            .map(|f| 2 + f.count * f.slot_size())
            .sum()
    }
}

/// Parse view definition text:
///
/// ```text
/// VIEW MYVIEW1
/// #type  cname   fbname  count flag size null
/// short  tshort1 -       2     -    -    -
/// string tstring1 -      3     -    20   -
/// END
/// ```
pub fn parse_views(text: &str) -> Result<Vec<ViewDef>> {
    let mut out = Vec::new();
    let mut current: Option<ViewDef> = None;
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('$') {
            continue;
        }
        let err = |reason: String| RecordError::Schema {
            line: line_no,
            reason,
        };
        let parts: Vec<&str> = line.split_whitespace().collect();
        match (parts[0], current.take()) {
            ("VIEW", None) => {
                let name = parts.get(1).ok_or_else(|| err("VIEW without name".into()))?;
                current = Some(ViewDef::new(name).map_err(|_| err(format!("bad view name {name:?}")))?);
            }
            ("VIEW", Some(_)) => return Err(err("nested VIEW block".into())),
            ("END", Some(def)) => out.push(def),
            ("END", None) => return Err(err("END outside VIEW block".into())),
            (_, None) => return Err(err(format!("unexpected line {line:?}"))),
            (kind, Some(mut def)) => {
                if parts.len() < 6 {
                    return Err(err("expected type cname fbname count flag size".into()));
                }
                let ftype = match kind {
                    "int" => FieldType::Long,
                    other => FieldType::from_keyword(other)
                        .filter(|t| !t.is_nested() && *t != FieldType::View)
                        .ok_or_else(|| err(format!("unsupported view member type {other:?}")))?,
                };
                let count: usize = parts[3]
                    .parse()
                    .ok()
                    .filter(|c| (1..=VIEW_MAX_SLOTS).contains(c))
                    .ok_or_else(|| err(format!("bad count {:?}", parts[3])))?;
                let size = match ftype {
                    FieldType::String | FieldType::Carray => parts[5]
                        .parse()
                        .ok()
                        .filter(|s| (1..=VIEW_MAX_SLOTS).contains(s))
                        .ok_or_else(|| err(format!("bad size {:?}", parts[5])))?,
                    _ => 0,
                };
                def.fields.push(ViewField {
                    cname: SmolStr::from(parts[1]),
                    ftype,
                    count,
                    size,
                });
                current = Some(def);
            }
        }
    }
    if let Some(def) = current {
        return Err(RecordError::Schema {
            line: text.lines().count(),
            reason: format!("view {} not closed with END", def.name),
        });
    }
    Ok(out)
}

// ─── Encoding ───────────────────────────────────────────────────────────────

/// Encode a view occurrence: NUL-padded name, then per member a u16 used
/// count and `count` fixed slots. An empty name encodes the NULL view.
pub fn encode_view(table: &FieldTable, field: &str, view: &ViewValue) -> Result<Vec<u8>> {
    if view.vname.len() >= VIEW_NAME_SIZE {
        return Err(RecordError::NoSpace(format!(
            "view name {} exceeds {} bytes",
            view.vname,
            VIEW_NAME_SIZE - 1
        )));
    }
    let mut out = vec![0u8; VIEW_NAME_SIZE];
    out[..view.vname.len()].copy_from_slice(view.vname.as_bytes());
    if view.is_null() {
        return Ok(out);
    }
    let def = table
        .view(&view.vname)
        .ok_or_else(|| RecordError::KeyNotResolvable(view.vname.to_string()))?;

    for cname in view.data.keys() {
        if def.field(cname).is_none() {
            return Err(RecordError::KeyNotResolvable(format!("{}.{}", view.vname, cname)));
        }
    }

    out.reserve(def.layout_size());
    for member in &def.fields {
        let values: &[Value] = view.data.get(&member.cname).map_or(&[], |v| v.as_slice());
        if values.len() > member.count {
            return Err(RecordError::NoSpace(format!(
                "{}.{} holds {} occurrences, got {}",
                view.vname,
                member.cname,
                member.count,
                values.len()
            )));
        }
        let used = u16::try_from(values.len()).map_err(|_| {
            RecordError::NoSpace(format!("{}.{} used count exceeds u16", view.vname, member.cname))
        })?;
        out.extend_from_slice(&used.to_le_bytes());
        let label = format!("{field}.{}", member.cname);
        for slot in 0..member.count {
            let start = out.len();
            out.resize(start + member.slot_size(), 0);
            let Some(value) = values.get(slot) else {
                continue;
            };
            let dst = &mut out[start..];
            match member.ftype {
                FieldType::Char => dst[0] = coerce_char(&label, value)?,
                FieldType::Short => {
                    let v = coerce_int(&label, value, i16::MIN as i64, i16::MAX as i64)?;
                    dst[..2].copy_from_slice(&(v as i16).to_le_bytes());
                }
                FieldType::Long => {
                    let v = coerce_int(&label, value, i64::MIN, i64::MAX)?;
                    dst[..8].copy_from_slice(&v.to_le_bytes());
                }
                FieldType::Float => {
                    let v = coerce_f32(&label, value)?;
                    dst[..4].copy_from_slice(&v.to_le_bytes());
                }
                FieldType::Double => {
                    let v = coerce_float(&label, value)?;
                    dst[..8].copy_from_slice(&v.to_le_bytes());
                }
                FieldType::String => {
                    let text = coerce_text(&label, value)?;
                    if text.len() >= member.size {
                        return Err(RecordError::NoSpace(format!(
                            "{label}: string of {} bytes does not fit {}",
                            text.len(),
                            member.size
                        )));
                    }
                    dst[..text.len()].copy_from_slice(text.as_bytes());
                }
                FieldType::Carray => {
                    let bytes = coerce_bytes(&label, value)?;
                    let len = u16::try_from(bytes.len())
                        .ok()
                        .filter(|_| bytes.len() <= member.size)
                        .ok_or_else(|| {
                            RecordError::NoSpace(format!(
                                "{label}: {} bytes do not fit {}",
                                bytes.len(),
                                member.size.min(VIEW_MAX_SLOTS)
                            ))
                        })?;
                    dst[..2].copy_from_slice(&len.to_le_bytes());
                    dst[2..2 + bytes.len()].copy_from_slice(&bytes);
                }
                _ => return Err(RecordError::conversion(label, "nested member in view")),
            }
        }
    }
    Ok(out)
}

// ─── Decoding ───────────────────────────────────────────────────────────────

/// Decode a view occurrence. Members with no used slots are left out of
/// `data`.
pub fn decode_view(table: &FieldTable, data: &[u8]) -> Result<ViewValue> {
    let name_bytes = data
        .get(..VIEW_NAME_SIZE)
        .ok_or(RecordError::Corruption("view occurrence shorter than name"))?;
    let name_len = name_bytes.iter().position(|b| *b == 0).unwrap_or(VIEW_NAME_SIZE);
    let vname = std::str::from_utf8(&name_bytes[..name_len])
        .map_err(|_| RecordError::Corruption("view name is not UTF-8"))?;
    if vname.is_empty() {
        return Ok(ViewValue::default());
    }
    let def = table
        .view(vname)
        .ok_or_else(|| RecordError::KeyNotResolvable(vname.to_string()))?;
    if data.len() != VIEW_NAME_SIZE + def.layout_size() {
        return Err(RecordError::Corruption("view occurrence size does not match layout"));
    }

    let mut pos = VIEW_NAME_SIZE;
    let mut map = Mapping::new();
    for member in &def.fields {
        let used = u16::from_le_bytes([data[pos], data[pos + 1]]) as usize;
        pos += 2;
        if used > member.count {
            return Err(RecordError::Corruption("view member used count exceeds slots"));
        }
        let slot = member.slot_size();
        let mut values = Vec::with_capacity(used);
        for i in 0..used {
            let s = &data[pos + i * slot..pos + (i + 1) * slot];
            values.push(decode_slot(member, s)?);
        }
        pos += member.count * slot;
        if !values.is_empty() {
            map.insert(member.cname.clone(), values);
        }
    }
    Ok(ViewValue {
        vname: SmolStr::from(vname),
        data: map,
    })
}

fn decode_slot(member: &ViewField, s: &[u8]) -> Result<Value> {
    let bad = RecordError::Corruption("view slot truncated");
    Ok(match member.ftype {
        FieldType::Char => Value::Char(s[0]),
        FieldType::Short => Value::Int(i16::from_le_bytes(s.try_into().map_err(|_| bad)?) as i64),
        FieldType::Long => Value::Int(i64::from_le_bytes(s.try_into().map_err(|_| bad)?)),
        FieldType::Float => Value::Float(f32::from_le_bytes(s.try_into().map_err(|_| bad)?) as f64),
        FieldType::Double => Value::Float(f64::from_le_bytes(s.try_into().map_err(|_| bad)?)),
        FieldType::String => {
            let end = s.iter().position(|b| *b == 0).unwrap_or(s.len());
            let text = std::str::from_utf8(&s[..end])
                .map_err(|_| RecordError::Corruption("view string is not UTF-8"))?;
            Value::Str(SmolStr::from(text))
        }
        FieldType::Carray => {
            let len = u16::from_le_bytes([s[0], s[1]]) as usize;
            let bytes = s
                .get(2..2 + len)
                .ok_or(RecordError::Corruption("view carray length exceeds slot"))?;
            Value::Bytes(bytes.to_vec())
        }
        _ => return Err(RecordError::Corruption("nested member in view")),
    })
}
