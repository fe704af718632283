// ─── Error ──────────────────────────────────────────────────────────────────
use crate::field_map::OwnershipState;
use thiserror::Error;

pub type Result<T, E = RecordError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("field name not resolvable: {0}")]
    KeyNotResolvable(String),
    #[error("field {0} not present in buffer")]
    FieldNotPresent(String),
    #[error("occurrence index {index} out of range (field has {len})")]
    IndexOutOfRange { index: isize, len: usize },
    #[error("cannot {op} through a {state:?} buffer")]
    ReadOnlyViolation {
        op: &'static str,
        state: OwnershipState,
    },
    #[error("cannot convert value for field {field}: {reason}")]
    TypeConversion { field: String, reason: String },
    #[error("no space in fixed-capacity field: {0}")]
    NoSpace(String),
    #[error("record buffer corrupted: {0}")]
    Corruption(&'static str),
    #[error("buffer handle {0} is no longer valid")]
    StaleHandle(u64),
    #[error("unsupported buffer type {0}")]
    InvalidBufferType(String),
    #[error("name {0} is reserved for the adapter")]
    ReservedName(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("definition error at line {line}: {reason}")]
    Schema { line: usize, reason: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CBOR error: {0}")]
    CborError(String),
}

impl RecordError {
    pub(crate) fn conversion(field: impl Into<String>, reason: impl Into<String>) -> Self {
        let field = field.into();
        let reason = reason.into();
        tracing::debug!(%field, %reason, "value conversion rejected");
        RecordError::TypeConversion { field, reason }
    }
}
