use super::map::FieldMap;
use super::seq::{FieldSeq, FieldValue};
use crate::deserialization::decode_occurrence;
use crate::error::Result;
use crate::record::RecordReadable;
use crate::types::*;

// ─── Field walk ─────────────────────────────────────────────────────────────

/// Distinct field ids in buffer order. Stops after the first error.
struct Fields<'m> {
    map: &'m FieldMap<'m>,
    cursor: Option<FieldCursor>,
}

impl<'m> Fields<'m> {
    fn new(map: &'m FieldMap<'m>) -> Self {
        Fields {
            map,
            cursor: Some(FieldCursor::START),
        }
    }
}

impl Iterator for Fields<'_> {
    type Item = Result<FieldId>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.take()?;
        match self.map.read(|rec| rec.next_field(cursor)) {
            Ok(Some((id, next))) => {
                self.cursor = Some(next);
                Some(Ok(id))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

// ─── Keys ───────────────────────────────────────────────────────────────────

/// Field keys of a map in buffer order. Single pass.
pub struct Keys<'m> {
    fields: Fields<'m>,
}

impl<'m> Keys<'m> {
    pub(crate) fn new(map: &'m FieldMap<'m>) -> Self {
        Keys {
            fields: Fields::new(map),
        }
    }
}

impl Iterator for Keys<'_> {
    type Item = Result<FieldKey>;

    fn next(&mut self) -> Option<Self::Item> {
        let map = self.fields.map;
        self.fields.next().map(|id| id.map(|id| map.table().key_for(id)))
    }
}

// ─── Items ──────────────────────────────────────────────────────────────────

/// `(key, sequence)` per present field.
pub struct Items<'m> {
    fields: Fields<'m>,
}

impl<'m> Items<'m> {
    pub(crate) fn new(map: &'m FieldMap<'m>) -> Self {
        Items {
            fields: Fields::new(map),
        }
    }
}

impl<'m> Iterator for Items<'m> {
    type Item = Result<(FieldKey, FieldSeq<'m>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let map = self.fields.map;
        self.fields
            .next()
            .map(|id| id.map(|id| (map.table().key_for(id), FieldSeq::new(map, id))))
    }
}

// ─── ItemsOcc ───────────────────────────────────────────────────────────────

/// `(key, value)` per occurrence, fields in buffer order and occurrences in
/// index order.
pub struct ItemsOcc<'m> {
    map: &'m FieldMap<'m>,
    /// Offset of the next entry; `None` once exhausted.
    pos: Option<usize>,
}

impl<'m> ItemsOcc<'m> {
    pub(crate) fn new(map: &'m FieldMap<'m>) -> Self {
        ItemsOcc {
            map,
            pos: Some(HEADER_SIZE),
        }
    }

    /// Total occurrence count of the map.
    pub fn len(&self) -> Result<usize> {
        self.map.read(|rec| Ok(rec.occ_count()))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl<'m> Iterator for ItemsOcc<'m> {
    type Item = Result<(FieldKey, FieldValue<'m>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let pos = self.pos.take()?;
        let map = self.map;
        let base = map.loc.base();
        let step = map.read(|rec| {
            let Some((field_id, data_offset, data_len)) = rec.entry_at(pos)? else {
                return Ok(None);
            };
            let raw = RawOccurrence {
                field_id,
                occ: 0,
                offset: pos,
                data_offset,
                data: &rec.data_buf[data_offset..data_offset + data_len],
            };
            let decoded = decode_occurrence(map.table(), &raw, base)?;
            Ok(Some((field_id, decoded, data_offset + data_len)))
        });
        match step {
            Ok(Some((id, decoded, next))) => match map.materialize(decoded) {
                Ok(value) => {
                    self.pos = Some(next);
                    Some(Ok((map.table().key_for(id), value)))
                }
                Err(e) => Some(Err(e)),
            },
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

// ─── Values ─────────────────────────────────────────────────────────────────

/// Occurrences of one field in index order.
pub struct Values<'m> {
    map: &'m FieldMap<'m>,
    id: FieldId,
    idx: usize,
    done: bool,
}

impl<'m> Values<'m> {
    pub(crate) fn new(map: &'m FieldMap<'m>, id: FieldId) -> Self {
        Values {
            map,
            id,
            idx: 0,
            done: false,
        }
    }
}

impl<'m> Iterator for Values<'m> {
    type Item = Result<FieldValue<'m>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.map.count(self.id) {
            Ok(len) if self.idx < len => {
                let item = self.map.occurrence(self.id, self.idx);
                self.idx += 1;
                if item.is_err() {
                    self.done = true;
                }
                Some(item)
            }
            Ok(_) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
