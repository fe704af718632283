use super::read_op::RecordReadable;
use super::record_mut::RecordBufMut;
use crate::error::{RecordError, Result};
use crate::types::*;

impl RecordBufMut {
    // ════════════════════════════════════════════════════════════════════════
    // Internal: header writes
    // ════════════════════════════════════════════════════════════════════════

    #[inline]
    fn write_u32(&mut self, at: usize, value: u32) {
        self.data_buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn sync_len(&mut self) -> Result<()> {
        let len = u32::try_from(self.data_buf.len())
            .map_err(|_| RecordError::NoSpace("record buffer exceeds 4 GiB".into()))?;
        self.write_u32(4, len);
        Ok(())
    }

    fn adjust_counts(&mut self, fields: isize, occs: isize) {
        let field_count = (self.field_count() as isize + fields) as u32;
        let occ_count = (self.occ_count() as isize + occs) as u32;
        self.write_u32(8, field_count);
        self.write_u32(12, occ_count);
    }

    // ════════════════════════════════════════════════════════════════════════
    // Internal: buffer splice
    // ════════════════════════════════════════════════════════════════════════

    /// Replace `old_len` bytes at `offset` with `new_data`.
    /// Handles grow, shrink, and same-size cases.
    fn splice_data(&mut self, offset: usize, old_len: usize, new_data: &[u8]) {
        let new_len = new_data.len();
        let old_end = offset + old_len;
        let tail_len = self.data_buf.len() - old_end;

        if new_len == old_len {
            self.data_buf[offset..offset + new_len].copy_from_slice(new_data);
        } else if new_len > old_len {
            let growth = new_len - old_len;
            self.data_buf.resize(self.data_buf.len() + growth, 0);
            // Shift tail right
            self.data_buf
                .copy_within(old_end..old_end + tail_len, old_end + growth);
            self.data_buf[offset..offset + new_len].copy_from_slice(new_data);
        } else {
            let shrink = old_len - new_len;
            self.data_buf[offset..offset + new_len].copy_from_slice(new_data);
            // Shift tail left
            self.data_buf
                .copy_within(old_end..old_end + tail_len, old_end - shrink);
            self.data_buf.truncate(self.data_buf.len() - shrink);
        }
    }

    fn insert_entry(&mut self, at: usize, id: FieldId, data: &[u8]) -> Result<()> {
        let data_len = u32::try_from(data.len())
            .map_err(|_| RecordError::NoSpace("occurrence exceeds 4 GiB".into()))?;
        let mut entry = Vec::with_capacity(ENTRY_HEADER_SIZE + data.len());
        entry.extend_from_slice(&id.raw().to_le_bytes());
        entry.extend_from_slice(&data_len.to_le_bytes());
        entry.extend_from_slice(data);
        self.splice_data(at, 0, &entry);
        self.sync_len()
    }

    // ════════════════════════════════════════════════════════════════════════
    // Occurrence writes
    // ════════════════════════════════════════════════════════════════════════

    /// Overwrite occurrence `idx` of `id`, or add it when `idx` equals the
    /// current count.
    pub fn set_occurrence(&mut self, id: FieldId, idx: usize, data: &[u8]) -> Result<()> {
        let span = self.find_field(id)?;
        let count = span.map_or(0, |s| s.count);

        if idx < count {
            let (offset, data_offset, old_len) = {
                let occ = self.get_occurrence(id, idx)?;
                (occ.offset, occ.data_offset, occ.data.len())
            };
            if old_len == data.len() {
                return self.patch_data(data_offset, data);
            }
            let new_len = u32::try_from(data.len())
                .map_err(|_| RecordError::NoSpace("occurrence exceeds 4 GiB".into()))?;
            self.splice_data(data_offset, old_len, data);
            self.write_u32(offset + 4, new_len);
            return self.sync_len();
        }
        if idx > count {
            return Err(RecordError::IndexOutOfRange {
                index: idx as isize,
                len: count,
            });
        }

        let at = match span {
            Some(s) => s.end,
            None => self.insert_position(id)?,
        };
        self.insert_entry(at, id, data)?;
        self.adjust_counts(if count == 0 { 1 } else { 0 }, 1);
        Ok(())
    }

    /// Insert a new occurrence before `idx`, shifting later ones up.
    /// `idx == count` appends.
    pub fn insert_occurrence(&mut self, id: FieldId, idx: usize, data: &[u8]) -> Result<()> {
        let span = self.find_field(id)?;
        let count = span.map_or(0, |s| s.count);
        if idx > count {
            return Err(RecordError::IndexOutOfRange {
                index: idx as isize,
                len: count,
            });
        }
        let at = match span {
            Some(_) if idx < count => self.get_occurrence(id, idx)?.offset,
            Some(s) => s.end,
            None => self.insert_position(id)?,
        };
        self.insert_entry(at, id, data)?;
        self.adjust_counts(if count == 0 { 1 } else { 0 }, 1);
        Ok(())
    }

    /// Remove occurrence `idx`; later occurrences shift down by one.
    pub fn delete_occurrence(&mut self, id: FieldId, idx: usize) -> Result<()> {
        let count = self.count_occurrences(id)?;
        if idx >= count {
            return Err(RecordError::IndexOutOfRange {
                index: idx as isize,
                len: count,
            });
        }
        let (start, end) = {
            let occ = self.get_occurrence(id, idx)?;
            (occ.offset, occ.data_offset + occ.data.len())
        };
        self.splice_data(start, end - start, &[]);
        self.sync_len()?;
        self.adjust_counts(if count == 1 { -1 } else { 0 }, -1);
        Ok(())
    }

    /// Remove every occurrence of `id`.
    pub fn delete_field(&mut self, id: FieldId) -> Result<()> {
        let span = self
            .find_field(id)?
            .ok_or_else(|| RecordError::FieldNotPresent(id.to_string()))?;
        self.splice_data(span.start, span.end - span.start, &[]);
        self.sync_len()?;
        self.adjust_counts(-1, -(span.count as isize));
        Ok(())
    }

    /// Drop occurrences at index `keep` and above. Returns how many were
    /// removed.
    pub fn truncate_field(&mut self, id: FieldId, keep: usize) -> Result<usize> {
        let Some(span) = self.find_field(id)? else {
            return Ok(0);
        };
        if span.count <= keep {
            return Ok(0);
        }
        let start = if keep == 0 {
            span.start
        } else {
            self.get_occurrence(id, keep)?.offset
        };
        let removed = span.count - keep;
        self.splice_data(start, span.end - start, &[]);
        self.sync_len()?;
        self.adjust_counts(if keep == 0 { -1 } else { 0 }, -(removed as isize));
        Ok(removed)
    }

    /// Overwrite occurrence data in place. The length must not change.
    pub fn patch_data(&mut self, data_offset: usize, data: &[u8]) -> Result<()> {
        let target = self
            .data_buf
            .get_mut(data_offset..data_offset + data.len())
            .ok_or(RecordError::Corruption("patch outside buffer"))?;
        target.copy_from_slice(data);
        Ok(())
    }
}
