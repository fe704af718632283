use super::RecordBuf;
use super::read_op::RecordReadable;
use crate::error::Result;
use crate::types::*;

/// Owned, growable record buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBufMut {
    pub data_buf: Vec<u8>,
}

impl RecordBufMut {
    /// Create a new empty record.
    pub fn new_empty() -> Self {
        Self::with_capacity(HEADER_SIZE)
    }

    /// Create an empty record with room for `size_hint` bytes.
    pub fn with_capacity(size_hint: usize) -> Self {
        let mut data_buf = Vec::with_capacity(size_hint.max(HEADER_SIZE));
        data_buf.extend_from_slice(&BUFFER_MAGIC.to_le_bytes());
        data_buf.extend_from_slice(&(HEADER_SIZE as u32).to_le_bytes());
        data_buf.extend_from_slice(&0u32.to_le_bytes());
        data_buf.extend_from_slice(&0u32.to_le_bytes());
        Self { data_buf }
    }

    /// Take ownership of serialized bytes after full validation.
    pub fn from_bytes(data_buf: Vec<u8>) -> Result<Self> {
        let rec = Self { data_buf };
        rec.validate()?;
        Ok(rec)
    }

    #[inline]
    pub fn as_record(&self) -> RecordBuf<'_> {
        RecordBuf {
            data_buf: &self.data_buf,
        }
    }

    /// Consume and return the underlying buffer.
    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data_buf
    }

    /// Borrow the underlying buffer.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data_buf
    }
}

impl Default for RecordBufMut {
    fn default() -> Self {
        Self::new_empty()
    }
}

impl RecordReadable for RecordBufMut {
    #[inline]
    fn data_buf(&self) -> &[u8] {
        &self.data_buf
    }
}
