use crate::error::{RecordError, Result};
use crate::types::*;

/// Location of all occurrences of one field inside a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpan {
    /// Offset of the first occurrence entry.
    pub start: usize,
    /// Offset just past the last occurrence entry.
    pub end: usize,
    pub count: usize,
}

pub trait RecordReadable {
    fn data_buf(&self) -> &[u8];

    #[inline]
    fn read_u32(&self, at: usize) -> Result<u32> {
        let bytes = self
            .data_buf()
            .get(at..at + 4)
            .ok_or(RecordError::Corruption("read past end of buffer"))?;
        Ok(u32::from_le_bytes(
            bytes
                .try_into()
                .map_err(|_| RecordError::Corruption("short read"))?,
        ))
    }

    /// Number of distinct fields present.
    #[inline]
    fn field_count(&self) -> usize {
        self.read_u32(8).unwrap_or(0) as usize
    }

    /// Total number of occurrences over all fields.
    #[inline]
    fn occ_count(&self) -> usize {
        self.read_u32(12).unwrap_or(0) as usize
    }

    #[inline]
    fn byte_len(&self) -> usize {
        self.data_buf().len()
    }

    /// Decode the entry header at `offset`. `None` at end of buffer.
    fn entry_at(&self, offset: usize) -> Result<Option<(FieldId, usize, usize)>> {
        let len = self.data_buf().len();
        if offset == len {
            return Ok(None);
        }
        if offset + ENTRY_HEADER_SIZE > len {
            return Err(RecordError::Corruption("truncated entry header"));
        }
        let raw = self.read_u32(offset)?;
        let field_id =
            FieldId::from_raw(raw).ok_or(RecordError::Corruption("invalid field id in entry"))?;
        let data_len = self.read_u32(offset + 4)? as usize;
        let data_offset = offset + ENTRY_HEADER_SIZE;
        if data_offset + data_len > len {
            return Err(RecordError::Corruption("entry data overruns buffer"));
        }
        Ok(Some((field_id, data_offset, data_len)))
    }

    /// Iterate over every occurrence entry in buffer order (zero-copy).
    fn iter_entries(&self) -> EntryIter<'_> {
        EntryIter {
            buf: self.data_buf(),
            pos: HEADER_SIZE,
            last: None,
            occ: 0,
            failed: false,
        }
    }

    /// Find all occurrences of `id`. Entries are sorted, so the walk stops at
    /// the first larger id.
    fn find_field(&self, id: FieldId) -> Result<Option<FieldSpan>> {
        let mut pos = HEADER_SIZE;
        let mut span: Option<FieldSpan> = None;
        while let Some((fid, data_offset, data_len)) = self.entry_at(pos)? {
            let next = data_offset + data_len;
            if fid == id {
                let s = span.get_or_insert(FieldSpan {
                    start: pos,
                    end: next,
                    count: 0,
                });
                s.end = next;
                s.count += 1;
            } else if fid > id {
                break;
            }
            pos = next;
        }
        Ok(span)
    }

    /// Offset where the first occurrence of a not-yet-present `id` goes.
    fn insert_position(&self, id: FieldId) -> Result<usize> {
        let mut pos = HEADER_SIZE;
        while let Some((fid, data_offset, data_len)) = self.entry_at(pos)? {
            if fid > id {
                return Ok(pos);
            }
            pos = data_offset + data_len;
        }
        Ok(pos)
    }

    #[inline]
    fn count_occurrences(&self, id: FieldId) -> Result<usize> {
        Ok(self.find_field(id)?.map_or(0, |s| s.count))
    }

    #[inline]
    fn has_field(&self, id: FieldId) -> Result<bool> {
        Ok(self.find_field(id)?.is_some())
    }

    /// Get occurrence `idx` of field `id`.
    fn get_occurrence(&self, id: FieldId, idx: usize) -> Result<RawOccurrence<'_>> {
        let span = self.find_field(id)?;
        let count = span.map_or(0, |s| s.count);
        let span = match span {
            Some(s) if idx < count => s,
            _ => {
                return Err(RecordError::IndexOutOfRange {
                    index: idx as isize,
                    len: count,
                });
            }
        };
        let mut pos = span.start;
        for occ in 0..=idx {
            let (fid, data_offset, data_len) = self
                .entry_at(pos)?
                .ok_or(RecordError::Corruption("field span ended early"))?;
            if occ == idx {
                return Ok(RawOccurrence {
                    field_id: fid,
                    occ,
                    offset: pos,
                    data_offset,
                    data: &self.data_buf()[data_offset..data_offset + data_len],
                });
            }
            pos = data_offset + data_len;
        }
        Err(RecordError::Corruption("field span ended early"))
    }

    /// Field at `cursor` and the cursor of the field after it.
    fn next_field(&self, cursor: FieldCursor) -> Result<Option<(FieldId, FieldCursor)>> {
        let Some((id, data_offset, data_len)) = self.entry_at(cursor.0)? else {
            return Ok(None);
        };
        let mut pos = data_offset + data_len;
        while let Some((fid, d_off, d_len)) = self.entry_at(pos)? {
            if fid != id {
                break;
            }
            pos = d_off + d_len;
        }
        Ok(Some((id, FieldCursor(pos))))
    }

    /// Full structural validation: header, entry bounds, ordering, counts.
    fn validate(&self) -> Result<()> {
        let buf = self.data_buf();
        if buf.len() < HEADER_SIZE {
            return Err(RecordError::Corruption("buffer shorter than header"));
        }
        if self.read_u32(0)? != BUFFER_MAGIC {
            return Err(RecordError::Corruption("bad magic"));
        }
        if self.read_u32(4)? as usize != buf.len() {
            return Err(RecordError::Corruption("length does not match header"));
        }
        let mut fields = 0usize;
        let mut occs = 0usize;
        let mut last: Option<FieldId> = None;
        for entry in self.iter_entries() {
            let entry = entry?;
            match last {
                Some(prev) if prev > entry.field_id => {
                    return Err(RecordError::Corruption("entries out of order"));
                }
                Some(prev) if prev == entry.field_id => {}
                _ => fields += 1,
            }
            last = Some(entry.field_id);
            occs += 1;
        }
        if fields != self.field_count() || occs != self.occ_count() {
            return Err(RecordError::Corruption("header counts do not match entries"));
        }
        Ok(())
    }

    /// Structural equality. The layout is canonical (sorted, no padding), so
    /// two records with the same content have identical bytes.
    #[inline]
    fn same_content<R: RecordReadable + ?Sized>(&self, other: &R) -> bool {
        self.data_buf() == other.data_buf()
    }
}

// ─── Iterator ───────────────────────────────────────────────────────────────

pub struct EntryIter<'a> {
    buf: &'a [u8],
    pos: usize,
    last: Option<FieldId>,
    occ: usize,
    failed: bool,
}

impl<'a> EntryIter<'a> {
    fn step(&mut self) -> Result<Option<RawOccurrence<'a>>> {
        let rec = super::RecordBuf { data_buf: self.buf };
        let Some((field_id, data_offset, data_len)) = rec.entry_at(self.pos)? else {
            return Ok(None);
        };
        self.occ = if self.last == Some(field_id) {
            self.occ + 1
        } else {
            0
        };
        self.last = Some(field_id);
        let offset = self.pos;
        self.pos = data_offset + data_len;
        Ok(Some(RawOccurrence {
            field_id,
            occ: self.occ,
            offset,
            data_offset,
            data: &self.buf[data_offset..data_offset + data_len],
        }))
    }
}

impl<'a> Iterator for EntryIter<'a> {
    type Item = Result<RawOccurrence<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.step() {
            Ok(Some(raw)) => Some(Ok(raw)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
