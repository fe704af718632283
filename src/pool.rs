use crate::deserialization::{Decoded, decode_occurrence};
use crate::error::{RecordError, Result};
use crate::record::{RecordBuf, RecordBufMut, RecordReadable};
use crate::schema::FieldTable;
use crate::types::*;
use crate::value::{Mapping, Value};
use rustc_hash::FxHashSet;
use std::cell::RefCell;
use std::rc::Rc;

/// Deepest chain of embedded or pointed-to buffers followed by conversions
/// and deep copies.
pub const MAX_NESTING_DEPTH: usize = 64;

// ─── Slots ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct SlotEntry {
    record: RecordBufMut,
    /// Buffer that frees this one when it is freed (pointer-field parent).
    owner: Option<BufferHandle>,
    /// Buffers whose `owner` is this one.
    children: FxHashSet<BufferHandle>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<SlotEntry>,
}

#[derive(Debug, Default)]
struct PoolInner {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

// ─── BufferPool ─────────────────────────────────────────────────────────────

/// Arena of record buffers addressed by generation-checked handles.
///
/// Single-threaded: shared through `Rc`, interior state in a `RefCell`.
/// Every method borrows the arena for the duration of the call only, and
/// the closures given to [`BufferPool::read`] and [`BufferPool::write`] must
/// not call back into the pool.
#[derive(Debug)]
pub struct BufferPool {
    table: FieldTable,
    inner: RefCell<PoolInner>,
}

impl BufferPool {
    pub fn new(table: FieldTable) -> Rc<Self> {
        Rc::new(BufferPool {
            table,
            inner: RefCell::new(PoolInner::default()),
        })
    }

    #[inline]
    pub fn table(&self) -> &FieldTable {
        &self.table
    }

    /// Allocate an empty buffer. Only the `"UBF"` kind is supported.
    pub fn alloc(&self, kind: &str, subtype: Option<&str>, size_hint: usize) -> Result<BufferHandle> {
        if !kind.eq_ignore_ascii_case("UBF") {
            return Err(RecordError::InvalidBufferType(kind.to_string()));
        }
        let handle = self
            .inner
            .borrow_mut()
            .insert(RecordBufMut::with_capacity(size_hint), None);
        tracing::trace!(handle = handle.to_bits(), subtype = ?subtype, size_hint, "buffer allocated");
        Ok(handle)
    }

    /// Take an existing record into the pool.
    pub fn adopt(&self, record: RecordBufMut) -> BufferHandle {
        let handle = self.inner.borrow_mut().insert(record, None);
        tracing::trace!(handle = handle.to_bits(), "buffer adopted");
        handle
    }

    /// Free `handle` and every buffer it owns, recursively.
    pub fn free(&self, handle: BufferHandle) -> Result<()> {
        let freed = self.inner.borrow_mut().release(handle)?;
        tracing::debug!(handle = handle.to_bits(), freed, "buffer freed");
        Ok(())
    }

    /// Byte copy of the buffer at `loc` into a new root buffer. Pointer
    /// occurrences keep referring to the same targets without owning them.
    pub fn copy_buffer(&self, loc: BufLoc) -> Result<BufferHandle> {
        let mut inner = self.inner.borrow_mut();
        let bytes = inner.bytes(loc)?.to_vec();
        let record = RecordBufMut::from_bytes(bytes)?;
        let handle = inner.insert(record, None);
        tracing::trace!(from = loc.handle.to_bits(), to = handle.to_bits(), "buffer copied");
        Ok(handle)
    }

    /// Copy of the buffer at `loc` where every pointed-to buffer is copied as
    /// well and owned by the new buffer.
    pub fn deep_copy(&self, loc: BufLoc) -> Result<BufferHandle> {
        let handle = self.inner.borrow_mut().deep_copy(loc, None, 0)?;
        tracing::trace!(from = loc.handle.to_bits(), to = handle.to_bits(), "buffer deep-copied");
        Ok(handle)
    }

    /// Structural equality. The layout is canonical, so equal content means
    /// equal bytes.
    pub fn compare_buffers(&self, a: BufLoc, b: BufLoc) -> Result<bool> {
        let inner = self.inner.borrow();
        let left = RecordBuf::new(inner.bytes(a)?)?;
        let right = RecordBuf::new(inner.bytes(b)?)?;
        Ok(left.same_content(&right))
    }

    pub fn read<R>(&self, loc: BufLoc, f: impl FnOnce(RecordBuf<'_>) -> Result<R>) -> Result<R> {
        let inner = self.inner.borrow();
        f(RecordBuf::new(inner.bytes(loc)?)?)
    }

    pub fn write<R>(
        &self,
        handle: BufferHandle,
        f: impl FnOnce(&mut RecordBufMut) -> Result<R>,
    ) -> Result<R> {
        let mut inner = self.inner.borrow_mut();
        f(&mut inner.entry_mut(handle)?.record)
    }

    pub fn set_owner(&self, handle: BufferHandle, owner: Option<BufferHandle>) -> Result<()> {
        self.inner.borrow_mut().link(handle, owner)
    }

    pub fn owner(&self, handle: BufferHandle) -> Result<Option<BufferHandle>> {
        Ok(self.inner.borrow().entry(handle)?.owner)
    }

    /// Whether `ancestor` is on the owner chain above `handle`.
    pub fn is_ancestor(&self, ancestor: BufferHandle, handle: BufferHandle) -> Result<bool> {
        let inner = self.inner.borrow();
        let mut current = inner.entry(handle)?.owner;
        let mut steps = 0;
        while let Some(h) = current {
            if h == ancestor {
                return Ok(true);
            }
            steps += 1;
            if steps > inner.slots.len() {
                return Err(RecordError::Corruption("owner chain contains a cycle"));
            }
            current = inner.entry(h).ok().and_then(|e| e.owner);
        }
        Ok(false)
    }

    #[inline]
    pub fn is_live(&self, handle: BufferHandle) -> bool {
        self.inner.borrow().entry(handle).is_ok()
    }

    /// Number of allocated buffers.
    #[inline]
    pub fn live_count(&self) -> usize {
        self.inner.borrow().live
    }

    /// Convert the buffer at `loc` into a generic mapping, following embedded
    /// and pointer fields.
    pub fn to_mapping(&self, loc: BufLoc) -> Result<Mapping> {
        self.inner.borrow().mapping_at(&self.table, loc, 0)
    }
}

// ─── Arena internals ────────────────────────────────────────────────────────

impl PoolInner {
    fn entry(&self, handle: BufferHandle) -> Result<&SlotEntry> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.entry.as_ref())
            .ok_or_else(|| stale(handle))
    }

    fn entry_mut(&mut self, handle: BufferHandle) -> Result<&mut SlotEntry> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.entry.as_mut())
            .ok_or_else(|| stale(handle))
    }

    fn insert(&mut self, record: RecordBufMut, owner: Option<BufferHandle>) -> BufferHandle {
        self.live += 1;
        let entry = Some(SlotEntry {
            record,
            owner,
            children: FxHashSet::default(),
        });
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = entry;
                BufferHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 1,
                    entry,
                });
                BufferHandle {
                    index,
                    generation: 1,
                }
            }
        };
        if let Some(parent) = owner.and_then(|o| self.entry_mut(o).ok()) {
            parent.children.insert(handle);
        }
        handle
    }

    /// Move `handle` under `owner`, keeping both child sets in step.
    fn link(&mut self, handle: BufferHandle, owner: Option<BufferHandle>) -> Result<()> {
        if let Some(o) = owner {
            self.entry(o)?;
        }
        let previous = std::mem::replace(&mut self.entry_mut(handle)?.owner, owner);
        if let Some(parent) = previous.and_then(|p| self.entry_mut(p).ok()) {
            parent.children.remove(&handle);
        }
        if let Some(parent) = owner.and_then(|o| self.entry_mut(o).ok()) {
            parent.children.insert(handle);
        }
        Ok(())
    }

    /// Free `handle` and everything below it in the ownership tree. Returns
    /// the number of buffers freed.
    fn release(&mut self, handle: BufferHandle) -> Result<usize> {
        let owner = self.entry(handle)?.owner;
        if let Some(parent) = owner.and_then(|o| self.entry_mut(o).ok()) {
            parent.children.remove(&handle);
        }

        let mut pending = vec![handle];
        let mut freed = 0;
        while let Some(next) = pending.pop() {
            let Some(slot) = self
                .slots
                .get_mut(next.index as usize)
                .filter(|s| s.generation == next.generation)
            else {
                continue;
            };
            let Some(entry) = slot.entry.take() else {
                continue;
            };
            slot.generation = slot.generation.wrapping_add(1).max(1);
            self.free.push(next.index);
            self.live -= 1;
            freed += 1;
            pending.extend(entry.children);
        }
        Ok(freed)
    }

    fn bytes(&self, loc: BufLoc) -> Result<&[u8]> {
        let buf = self.entry(loc.handle)?.record.as_bytes();
        match loc.span {
            None => Ok(buf),
            Some(span) => buf
                .get(span.start..span.start + span.len)
                .ok_or(RecordError::Corruption("embedded span outside buffer")),
        }
    }

    fn deep_copy(
        &mut self,
        loc: BufLoc,
        owner: Option<BufferHandle>,
        depth: usize,
    ) -> Result<BufferHandle> {
        if depth > MAX_NESTING_DEPTH {
            return Err(RecordError::Corruption("buffer nesting too deep"));
        }
        let mut bytes = self.bytes(loc)?.to_vec();
        let handle = self.insert(RecordBufMut::new_empty(), owner);
        let len = bytes.len();
        let result = self
            .relink(&mut bytes, 0, len, handle, depth)
            .and_then(|_| RecordBufMut::from_bytes(bytes));
        match result {
            Ok(record) => {
                self.entry_mut(handle)?.record = record;
                Ok(handle)
            }
            Err(e) => {
                // Also drops the pointer copies made so far.
                self.release(handle)?;
                Err(e)
            }
        }
    }

    /// Replace every pointer occurrence in the record at `bytes[base..]`
    /// (and in records embedded in it) with a deep copy owned by `owner`.
    fn relink(
        &mut self,
        bytes: &mut [u8],
        base: usize,
        len: usize,
        owner: BufferHandle,
        depth: usize,
    ) -> Result<()> {
        let nested: Vec<(FieldType, usize, usize)> = {
            let slice = bytes
                .get(base..base + len)
                .ok_or(RecordError::Corruption("embedded span outside buffer"))?;
            let rec = RecordBuf::new(slice)?;
            let mut out = Vec::new();
            for raw in rec.iter_entries() {
                let raw = raw?;
                let ftype = raw.field_id.field_type();
                if ftype.is_nested() {
                    out.push((ftype, raw.data_offset, raw.data.len()));
                }
            }
            out
        };
        for (ftype, offset, data_len) in nested {
            let at = base + offset;
            if ftype == FieldType::Ubf {
                self.relink(bytes, at, data_len, owner, depth + 1)?;
                continue;
            }
            let raw: [u8; PTR_DATA_SIZE] = bytes[at..at + data_len]
                .try_into()
                .map_err(|_| RecordError::Corruption("pointer occurrence has wrong size"))?;
            let target = BufferHandle::from_bits(u64::from_le_bytes(raw));
            let copy = self.deep_copy(BufLoc::root(target), Some(owner), depth + 1)?;
            bytes[at..at + PTR_DATA_SIZE].copy_from_slice(&copy.to_bits().to_le_bytes());
        }
        Ok(())
    }

    fn mapping_at(&self, table: &FieldTable, loc: BufLoc, depth: usize) -> Result<Mapping> {
        if depth > MAX_NESTING_DEPTH {
            return Err(RecordError::Corruption("buffer nesting too deep"));
        }
        let rec = RecordBuf::new(self.bytes(loc)?)?;
        let mut map = Mapping::new();
        for raw in rec.iter_entries() {
            let raw = raw?;
            let value = match decode_occurrence(table, &raw, loc.base())? {
                Decoded::Value(v) => v,
                Decoded::Embedded(span) => Value::Map(self.mapping_at(
                    table,
                    BufLoc {
                        handle: loc.handle,
                        span: Some(span),
                    },
                    depth + 1,
                )?),
                Decoded::Pointer(target) => {
                    Value::Map(self.mapping_at(table, BufLoc::root(target), depth + 1)?)
                }
            };
            map.entry(table.display_name(raw.field_id))
                .or_default()
                .push(value);
        }
        Ok(map)
    }
}

fn stale(handle: BufferHandle) -> RecordError {
    tracing::debug!(handle = handle.to_bits(), "stale buffer handle");
    RecordError::StaleHandle(handle.to_bits())
}
