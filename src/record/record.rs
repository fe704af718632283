use super::read_op::RecordReadable;
use crate::error::{RecordError, Result};
use crate::types::*;

// ─── Reader (zero-copy) ────────────────────────────────────────────────────
/// Zero-copy reader over a record byte slice.
/// No decoding happens until a specific occurrence is requested.
#[derive(Debug, Clone, Copy)]
pub struct RecordBuf<'a> {
    pub data_buf: &'a [u8],
}

impl<'a> RecordBuf<'a> {
    /// Wrap a slice after checking the header. Entry-level problems surface
    /// as `Corruption` when the entries are walked.
    #[inline]
    pub fn new(data_buf: &'a [u8]) -> Result<Self> {
        if data_buf.len() < HEADER_SIZE {
            return Err(RecordError::Corruption("buffer shorter than header"));
        }
        let rec = Self { data_buf };
        if rec.read_u32(0)? != BUFFER_MAGIC {
            return Err(RecordError::Corruption("bad magic"));
        }
        if rec.read_u32(4)? as usize != data_buf.len() {
            return Err(RecordError::Corruption("length does not match header"));
        }
        Ok(rec)
    }
}

impl<'a> RecordReadable for RecordBuf<'a> {
    #[inline]
    fn data_buf(&self) -> &[u8] {
        self.data_buf
    }
}
