use crate::error::{RecordError, Result};
use crate::types::{FieldId, FieldKey, FieldType, MAX_FIELD_NUMBER};
use crate::view::{ViewDef, parse_views};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use xxhash_rust::const_xxh64::xxh64;

// ─── Field Table ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: SmolStr,
    pub id: FieldId,
}

/// Name <-> id resolution for every field a pool knows about, plus the view
/// definitions used by view-typed fields.
#[derive(Debug, Clone, Default)]
pub struct FieldTable {
    by_name: FxHashMap<SmolStr, FieldId>,
    by_id: FxHashMap<FieldId, SmolStr>,
    views: FxHashMap<SmolStr, ViewDef>,
}

/// Derive a field number from its name. Never zero.
#[inline]
pub fn derive_field_number(name: &str) -> u32 {
    let n = (xxh64(name.as_bytes(), 0) as u32) & MAX_FIELD_NUMBER;
    if n == 0 { 1 } else { n }
}

impl FieldTable {
    pub fn builder() -> FieldTableBuilder {
        FieldTableBuilder::default()
    }

    /// Parse field definition text:
    ///
    /// ```text
    /// $ comment
    /// *base 1000
    /// T_NAME_FLD   1   string   - Customer name
    /// ```
    pub fn parse_fd(text: &str) -> Result<Self> {
        Self::builder().load_fd(text)?.build()
    }

    pub fn resolve_field_id(&self, name: &str) -> Result<FieldId> {
        if let Some(id) = self.by_name.get(name) {
            return Ok(*id);
        }
        parse_compiled_id(name).ok_or_else(|| RecordError::KeyNotResolvable(name.to_string()))
    }

    pub fn resolve_key(&self, key: &FieldKey) -> Result<FieldId> {
        match key {
            FieldKey::Name(name) => self.resolve_field_id(name),
            FieldKey::Id(id) => Ok(*id),
        }
    }

    pub fn field_name(&self, id: FieldId) -> Option<&str> {
        self.by_id.get(&id).map(|n| n.as_str())
    }

    /// Name if known, otherwise the compiled id.
    pub fn key_for(&self, id: FieldId) -> FieldKey {
        match self.by_id.get(&id) {
            Some(name) => FieldKey::Name(name.clone()),
            None => FieldKey::Id(id),
        }
    }

    /// Display name used in mappings and print output.
    pub fn display_name(&self, id: FieldId) -> SmolStr {
        match self.by_id.get(&id) {
            Some(name) => name.clone(),
            None => SmolStr::from(id.to_string()),
        }
    }

    pub fn view(&self, name: &str) -> Option<&ViewDef> {
        self.views.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldDef> + '_ {
        self.by_name.iter().map(|(name, id)| FieldDef {
            name: name.clone(),
            id: *id,
        })
    }
}

/// `((BFLDID32)n)` as printed for fields without a name.
fn parse_compiled_id(name: &str) -> Option<FieldId> {
    let raw = name.strip_prefix("((BFLDID32)")?.strip_suffix(')')?;
    FieldId::from_raw(raw.parse().ok()?)
}

// ─── Builder ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FieldTableBuilder {
    fields: Vec<(SmolStr, FieldType, Option<u32>, usize)>,
    views: Vec<ViewDef>,
}

impl FieldTableBuilder {
    /// Add a field whose number is derived from its name.
    pub fn field(mut self, name: &str, ftype: FieldType) -> Self {
        self.fields.push((SmolStr::from(name), ftype, None, 0));
        self
    }

    pub fn field_numbered(mut self, name: &str, number: u32, ftype: FieldType) -> Self {
        self.fields.push((SmolStr::from(name), ftype, Some(number), 0));
        self
    }

    pub fn view(mut self, def: ViewDef) -> Self {
        self.views.push(def);
        self
    }

    /// Add every view from view definition text.
    pub fn load_views(mut self, text: &str) -> Result<Self> {
        self.views.extend(parse_views(text)?);
        Ok(self)
    }

    /// Add every field from field definition text.
    pub fn load_fd(mut self, text: &str) -> Result<Self> {
        let mut base = 0u32;
        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('$') || line.starts_with('#') {
                continue;
            }
            let schema_err = |reason: String| RecordError::Schema {
                line: line_no,
                reason,
            };
            if let Some(directive) = line.strip_prefix('*') {
                let mut parts = directive.split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some("base"), Some(n)) => {
                        base = n
                            .parse()
                            .map_err(|_| schema_err(format!("bad base offset {n:?}")))?;
                    }
                    _ => return Err(schema_err(format!("unknown directive {line:?}"))),
                }
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(name), Some(number), Some(kind)) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(schema_err("expected NAME NUMBER TYPE".into()));
            };
            let number: u32 = number
                .parse()
                .map_err(|_| schema_err(format!("bad field number {number:?}")))?;
            let ftype = FieldType::from_keyword(kind)
                .ok_or_else(|| schema_err(format!("unknown field type {kind:?}")))?;
            let number = base
                .checked_add(number)
                .ok_or_else(|| schema_err(format!("field number {number} overflows base {base}")))?;
            self.fields
                .push((SmolStr::from(name), ftype, Some(number), line_no));
        }
        Ok(self)
    }

    pub fn build(self) -> Result<FieldTable> {
        let mut table = FieldTable::default();
        for (name, ftype, number, line) in self.fields {
            let number = number.unwrap_or_else(|| derive_field_number(&name));
            let id = FieldId::new(ftype, number).ok_or_else(|| RecordError::Schema {
                line,
                reason: format!("field number {number} out of range for {name}"),
            })?;
            if let Some(other) = table.by_id.get(&id) {
                if *other != name {
                    return Err(RecordError::Schema {
                        line,
                        reason: format!("{name} collides with {other} on id {id}"),
                    });
                }
            }
            if let Some(prev) = table.by_name.get(&name) {
                if *prev != id {
                    return Err(RecordError::Schema {
                        line,
                        reason: format!("{name} defined twice"),
                    });
                }
            }
            table.by_name.insert(name.clone(), id);
            table.by_id.insert(id, name);
        }
        for def in self.views {
            table.views.insert(SmolStr::from(def.name.as_str()), def);
        }
        tracing::debug!(
            fields = table.by_name.len(),
            views = table.views.len(),
            "field table built"
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests;
