use super::config::{MapConfig, SetMode};
use super::iter::{Items, ItemsOcc, Keys};
use super::ownership::{Ownership, OwnershipState};
use super::seq::{FieldSeq, FieldSeqMut, FieldValue};
use crate::deserialization::{Decoded, decode_occurrence};
use crate::error::{RecordError, Result};
use crate::pool::BufferPool;
use crate::record::{RecordBuf, RecordBufMut, RecordReadable};
use crate::schema::FieldTable;
use crate::serialization::Encoder;
use crate::types::*;
use crate::value::{IntoOccurrences, Mapping, Value};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

/// Attribute names that never resolve to fields.
pub const RESERVED_ATTRS: [&str; 2] = ["handle", "ownership"];

// ════════════════════════════════════════════════════════════════════════════
// FieldMap
// ════════════════════════════════════════════════════════════════════════════

/// Mapping view over one record buffer: field name to occurrence list.
///
/// The map holds no field data. Every operation goes to the buffer in the
/// pool. `'p` is the borrow of the parent map for views over nested
/// buffers, so a parent cannot be mutated or dropped while such a view is
/// alive. Root maps are `FieldMap<'static>`.
pub struct FieldMap<'p> {
    pub(crate) pool: Rc<BufferPool>,
    pub(crate) loc: BufLoc,
    pub(crate) ownership: Ownership,
    pub(crate) config: MapConfig,
    _parent: PhantomData<&'p ()>,
}

impl FieldMap<'static> {
    /// Allocate an empty buffer with the default configuration.
    pub fn new(pool: &Rc<BufferPool>) -> Result<Self> {
        Self::with_config(pool, MapConfig::default())
    }

    pub fn with_config(pool: &Rc<BufferPool>, config: MapConfig) -> Result<Self> {
        let handle = pool.alloc("UBF", None, 0)?;
        Ok(Self::owned(pool.clone(), handle, config))
    }

    /// Take over a root buffer already in the pool. The buffer must not be
    /// owned by another buffer.
    pub fn from_handle(pool: &Rc<BufferPool>, handle: BufferHandle, config: MapConfig) -> Result<Self> {
        if pool.owner(handle)?.is_some() {
            return Err(RecordError::InvalidArgument(
                "buffer is owned through a pointer field",
            ));
        }
        Ok(Self::owned(pool.clone(), handle, config))
    }

    /// Take a serialized record into the pool.
    pub fn from_record(pool: &Rc<BufferPool>, record: RecordBufMut, config: MapConfig) -> Self {
        let handle = pool.adopt(record);
        Self::owned(pool.clone(), handle, config)
    }

    pub(crate) fn owned(pool: Rc<BufferPool>, handle: BufferHandle, config: MapConfig) -> Self {
        FieldMap {
            pool,
            loc: BufLoc::root(handle),
            ownership: Ownership::new(OwnershipState::Owned),
            config,
            _parent: PhantomData,
        }
    }
}

impl<'p> FieldMap<'p> {
    // ────────────────────────────────────────────────────────────────────────
    // Internal plumbing
    // ────────────────────────────────────────────────────────────────────────

    #[inline]
    pub(crate) fn table(&self) -> &FieldTable {
        self.pool.table()
    }

    #[inline]
    pub(crate) fn read<R>(&self, f: impl FnOnce(RecordBuf<'_>) -> Result<R>) -> Result<R> {
        self.pool.read(self.loc, f)
    }

    #[inline]
    pub(crate) fn resolve(&self, key: impl Into<FieldKey>) -> Result<FieldId> {
        self.table().resolve_key(&key.into())
    }

    /// Map over a nested buffer reached from this one.
    fn derived(&self, loc: BufLoc, state: OwnershipState) -> FieldMap<'_> {
        FieldMap {
            pool: self.pool.clone(),
            loc,
            ownership: Ownership::new(state),
            config: self.config,
            _parent: PhantomData,
        }
    }

    pub(crate) fn materialize(&self, decoded: Decoded) -> Result<FieldValue<'_>> {
        let (loc, state) = match decoded {
            Decoded::Value(v) => return Ok(FieldValue::Value(v)),
            Decoded::Embedded(span) => (
                BufLoc {
                    handle: self.loc.handle,
                    span: Some(span),
                },
                OwnershipState::ReadOnlyEmbedded,
            ),
            Decoded::Pointer(target) => {
                if !self.pool.is_live(target) {
                    return Err(RecordError::StaleHandle(target.to_bits()));
                }
                (BufLoc::root(target), OwnershipState::PointerAliased)
            }
        };
        if self.config.rich_view {
            Ok(FieldValue::Record(self.derived(loc, state)))
        } else {
            Ok(FieldValue::Value(Value::Map(self.pool.to_mapping(loc)?)))
        }
    }

    /// Occurrence `idx` of field `id`.
    pub(crate) fn occurrence(&self, id: FieldId, idx: usize) -> Result<FieldValue<'_>> {
        let base = self.loc.base();
        let decoded = self.read(|rec| {
            let raw = rec.get_occurrence(id, idx)?;
            decode_occurrence(self.table(), &raw, base)
        })?;
        self.materialize(decoded)
    }

    #[inline]
    pub(crate) fn count(&self, id: FieldId) -> Result<usize> {
        self.read(|rec| rec.count_occurrences(id))
    }

    /// Encode `values` for field `id`, then hand the bytes to `f` for the
    /// buffer write. Pointer children allocated during encoding are released
    /// again if anything fails.
    pub(crate) fn apply<F>(&self, op: &'static str, id: FieldId, values: &[Value], f: F) -> Result<()>
    where
        F: FnOnce(&mut RecordBufMut, Vec<Vec<u8>>) -> Result<()>,
    {
        self.ownership.ensure_writable(op)?;
        let mut enc = Encoder::new(&self.pool, self.loc.handle);
        let encoded: Result<Vec<Vec<u8>>> = values.iter().map(|v| enc.encode(id, v)).collect();
        let result = encoded.and_then(|bytes| self.pool.write(self.loc.handle, |rec| f(rec, bytes)));
        match result {
            Ok(()) => {
                enc.commit();
                Ok(())
            }
            Err(e) => {
                enc.rollback();
                Err(e)
            }
        }
    }

    /// Write `target` as the pointer value of occurrence `idx`.
    pub(crate) fn store_pointer(&self, id: FieldId, idx: usize, target: &FieldMap<'_>) -> Result<()> {
        self.ownership.ensure_writable("set_ptr")?;
        if id.field_type() != FieldType::Ptr {
            return Err(RecordError::conversion(
                self.table().display_name(id),
                "only pointer fields can hold a buffer reference",
            ));
        }
        if target.state() == OwnershipState::ReadOnlyEmbedded || target.loc.span.is_some() {
            return Err(RecordError::InvalidArgument(
                "embedded buffer cannot be stored as a pointer",
            ));
        }
        if !Rc::ptr_eq(&self.pool, &target.pool) {
            return Err(RecordError::InvalidArgument("buffer belongs to another pool"));
        }
        let parent = self.loc.handle;
        let child = target.loc.handle;
        if child == parent || self.pool.is_ancestor(child, parent)? {
            return Err(RecordError::InvalidArgument(
                "pointer would create an ownership cycle",
            ));
        }
        let previous = self.pool.owner(child)?;
        self.pool.write(parent, |rec| {
            rec.set_occurrence(id, idx, &child.to_bits().to_le_bytes())
        })?;
        self.pool.set_owner(child, Some(parent))?;
        target.ownership.mark_aliased()?;
        tracing::debug!(
            parent = parent.to_bits(),
            child = child.to_bits(),
            previous_owner = ?previous.map(BufferHandle::to_bits),
            "buffer stored as pointer"
        );
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────────
    // Introspection
    // ────────────────────────────────────────────────────────────────────────

    #[inline]
    pub fn handle(&self) -> BufferHandle {
        self.loc.handle
    }

    #[inline]
    pub fn location(&self) -> BufLoc {
        self.loc
    }

    #[inline]
    pub fn state(&self) -> OwnershipState {
        self.ownership.get()
    }

    #[inline]
    pub fn config(&self) -> MapConfig {
        self.config
    }

    #[inline]
    pub fn pool(&self) -> &Rc<BufferPool> {
        &self.pool
    }

    // ────────────────────────────────────────────────────────────────────────
    // Field access
    // ────────────────────────────────────────────────────────────────────────

    /// Sequence over the occurrences of `key`. Succeeds for absent fields;
    /// indexing into the empty sequence is what fails.
    pub fn get(&self, key: impl Into<FieldKey>) -> Result<FieldSeq<'_>> {
        let id = self.resolve(key)?;
        Ok(FieldSeq::new(self, id))
    }

    pub fn get_mut(&mut self, key: impl Into<FieldKey>) -> Result<FieldSeqMut<'_, 'p>> {
        let id = self.resolve(key)?;
        Ok(FieldSeqMut::new(self, id))
    }

    /// Assign occurrences using the map's configured [`SetMode`].
    pub fn set(&mut self, key: impl Into<FieldKey>, value: impl IntoOccurrences) -> Result<()> {
        let mode = self.config.set_mode;
        self.set_with_mode(key, value, mode)
    }

    /// A single value overwrites occurrence 0. A list writes occurrences
    /// `0..k`; `mode` decides what happens to occurrences `k..`.
    pub fn set_with_mode(
        &mut self,
        key: impl Into<FieldKey>,
        value: impl IntoOccurrences,
        mode: SetMode,
    ) -> Result<()> {
        self.ownership.ensure_writable("set")?;
        let id = self.resolve(key)?;
        let values = value.into_occurrences();
        let keep = values.len();
        self.apply("set", id, &values, |rec, encoded| {
            for (idx, bytes) in encoded.iter().enumerate() {
                rec.set_occurrence(id, idx, bytes)?;
            }
            if mode == SetMode::Truncate {
                rec.truncate_field(id, keep)?;
            }
            Ok(())
        })
    }

    /// Store `target` as occurrence 0 of pointer field `key`. `target`
    /// becomes [`OwnershipState::PointerAliased`] and this map's buffer
    /// takes over freeing it.
    pub fn set_ptr(&mut self, key: impl Into<FieldKey>, target: &FieldMap<'_>) -> Result<()> {
        let id = self.resolve(key)?;
        self.store_pointer(id, 0, target)
    }

    /// Remove every occurrence of `key`.
    pub fn delete(&mut self, key: impl Into<FieldKey>) -> Result<()> {
        self.ownership.ensure_writable("delete")?;
        let id = self.resolve(key)?;
        let name = self.table().display_name(id);
        self.pool.write(self.loc.handle, |rec| {
            if !rec.has_field(id)? {
                return Err(RecordError::FieldNotPresent(name.to_string()));
            }
            rec.delete_field(id)
        })
    }

    pub fn contains(&self, key: impl Into<FieldKey>) -> Result<bool> {
        let id = self.resolve(key)?;
        self.read(|rec| rec.has_field(id))
    }

    /// Number of distinct fields present.
    pub fn len(&self) -> Result<usize> {
        self.read(|rec| Ok(rec.field_count()))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Iteration
    // ────────────────────────────────────────────────────────────────────────

    /// Field keys in buffer order.
    pub fn keys(&self) -> Keys<'_> {
        Keys::new(self)
    }

    #[inline]
    pub fn iter(&self) -> Keys<'_> {
        self.keys()
    }

    /// `(key, sequence)` for every present field.
    pub fn items(&self) -> Items<'_> {
        Items::new(self)
    }

    /// `(key, value)` for every occurrence of every field.
    pub fn items_occ(&self) -> ItemsOcc<'_> {
        ItemsOcc::new(self)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Comparison
    // ────────────────────────────────────────────────────────────────────────

    /// Structural equality of the two buffers.
    pub fn equals(&self, other: &FieldMap<'_>) -> Result<bool> {
        if Rc::ptr_eq(&self.pool, &other.pool) {
            return self.pool.compare_buffers(self.loc, other.loc);
        }
        let mine = self.read(|rec| Ok(rec.data_buf.to_vec()))?;
        other.read(|rec| Ok(rec.data_buf == mine.as_slice()))
    }

    /// Field-by-field comparison against a generic mapping.
    pub fn equals_mapping(&self, other: &Mapping) -> Result<bool> {
        if self.len()? != other.len() {
            return Ok(false);
        }
        for (name, occs) in other {
            let id = match self.table().resolve_field_id(name) {
                Ok(id) => id,
                Err(RecordError::KeyNotResolvable(_)) => return Ok(false),
                Err(e) => return Err(e),
            };
            if !FieldSeq::new(self, id).equals_values(occs)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Copies
    // ────────────────────────────────────────────────────────────────────────

    /// New owned buffer with the same content. Pointer occurrences in the
    /// copy refer to the same targets without owning them.
    pub fn copy(&self) -> Result<FieldMap<'static>> {
        let handle = self.pool.copy_buffer(self.loc)?;
        Ok(FieldMap::owned(self.pool.clone(), handle, self.config))
    }

    /// New owned buffer where every pointed-to buffer is duplicated too and
    /// owned by the copy.
    pub fn deep_copy(&self) -> Result<FieldMap<'static>> {
        let handle = self.pool.deep_copy(self.loc)?;
        Ok(FieldMap::owned(self.pool.clone(), handle, self.config))
    }

    // ────────────────────────────────────────────────────────────────────────
    // Attribute-style access
    // ────────────────────────────────────────────────────────────────────────

    fn check_attr(name: &str) -> Result<()> {
        if RESERVED_ATTRS.contains(&name) {
            return Err(RecordError::ReservedName(name.to_string()));
        }
        Ok(())
    }

    pub fn attr(&self, name: &str) -> Result<FieldSeq<'_>> {
        Self::check_attr(name)?;
        self.get(name)
    }

    pub fn set_attr(&mut self, name: &str, value: impl IntoOccurrences) -> Result<()> {
        Self::check_attr(name)?;
        self.set(name, value)
    }

    pub fn del_attr(&mut self, name: &str) -> Result<()> {
        Self::check_attr(name)?;
        self.delete(name)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Release
    // ────────────────────────────────────────────────────────────────────────

    /// Release the buffer now. Same as dropping, but reports failures.
    pub fn free(self) -> Result<()> {
        if self.ownership.take_release() {
            self.pool.free(self.loc.handle)?;
        }
        Ok(())
    }
}

impl Drop for FieldMap<'_> {
    fn drop(&mut self) {
        if self.ownership.take_release() {
            if let Err(e) = self.pool.free(self.loc.handle) {
                tracing::warn!(handle = self.loc.handle.to_bits(), error = %e, "free on drop failed");
            }
        }
    }
}

impl fmt::Debug for FieldMap<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMap")
            .field("handle", &self.loc.handle)
            .field("span", &self.loc.span)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

impl<'a, 'p> IntoIterator for &'a FieldMap<'p> {
    type Item = Result<FieldKey>;
    type IntoIter = Keys<'a>;

    fn into_iter(self) -> Keys<'a> {
        Keys::new(self)
    }
}
