mod read_op;
pub mod record;
pub mod record_mut;
pub mod write_op;

pub use read_op::{EntryIter, FieldSpan, RecordReadable};
pub use record::RecordBuf;
pub use record_mut::RecordBufMut;
