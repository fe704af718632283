use crate::error::{RecordError, Result};
use std::cell::Cell;

/// Lifetime responsibility a map has for its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnershipState {
    /// Fresh allocation or copy: writable, freed on drop.
    Owned,
    /// Nested buffer stored inside a parent's memory: read-only, never freed.
    ReadOnlyEmbedded,
    /// Buffer stored as a pointer value in another buffer, which now owns it.
    PointerAliased,
}

impl OwnershipState {
    #[inline]
    pub fn is_writable(self) -> bool {
        self == OwnershipState::Owned
    }
}

// ─── State machine ──────────────────────────────────────────────────────────
//
//   Owned ──store as pointer──▶ PointerAliased ──store again──▶ PointerAliased
//   ReadOnlyEmbedded: terminal (created over a parent's nested field)
//   copy()/deep_copy() of any state produces a new Owned map

#[derive(Debug)]
pub(crate) struct Ownership {
    state: Cell<OwnershipState>,
    released: Cell<bool>,
}

impl Ownership {
    pub(crate) fn new(state: OwnershipState) -> Self {
        Ownership {
            state: Cell::new(state),
            released: Cell::new(false),
        }
    }

    #[inline]
    pub(crate) fn get(&self) -> OwnershipState {
        self.state.get()
    }

    /// Gate for every mutating operation.
    #[inline]
    pub(crate) fn ensure_writable(&self, op: &'static str) -> Result<()> {
        let state = self.state.get();
        if state.is_writable() {
            Ok(())
        } else {
            tracing::debug!(op, ?state, "mutation rejected");
            Err(RecordError::ReadOnlyViolation { op, state })
        }
    }

    /// The buffer was stored as a pointer value; its new parent frees it.
    pub(crate) fn mark_aliased(&self) -> Result<()> {
        match self.state.get() {
            OwnershipState::ReadOnlyEmbedded => Err(RecordError::InvalidArgument(
                "embedded buffer cannot be stored as a pointer",
            )),
            from => {
                self.state.set(OwnershipState::PointerAliased);
                tracing::trace!(?from, "ownership moved to pointer parent");
                Ok(())
            }
        }
    }

    /// Whether dropping the map must free its buffer. Returns true at most
    /// once.
    pub(crate) fn take_release(&self) -> bool {
        if self.state.get() == OwnershipState::Owned && !self.released.get() {
            self.released.set(true);
            true
        } else {
            false
        }
    }
}
