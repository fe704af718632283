//! Mapping and sequence views over multi-field record buffers.
//!
//! A record buffer holds fields, each an ordered list of typed occurrences.
//! [`FieldMap`] exposes a buffer as `name -> [occurrences]` without copying
//! it out, and tracks who is responsible for freeing it: an owned buffer,
//! a read-only view over a buffer nested inside another one, or a buffer
//! stored as a pointer value in another buffer.
//!
//! ```
//! use record_map::{BufferPool, FieldMap, FieldTable, FieldType, Value};
//!
//! let table = FieldTable::builder()
//!     .field("A", FieldType::Long)
//!     .field("B", FieldType::String)
//!     .build()?;
//! let pool = BufferPool::new(table);
//! let mut map = FieldMap::new(&pool)?;
//! map.set("A", [100, 99])?;
//! map.set("B", ["HELLO", "WORLD"])?;
//! assert_eq!(map.get("A")?.get(-1)?, Value::Int(99));
//! # Ok::<(), record_map::RecordError>(())
//! ```

mod deserialization;
pub mod error;
pub mod field_map;
pub mod pool;
pub mod record;
pub mod schema;
mod serialization;
pub mod types;
pub mod value;
pub mod view;

pub use error::{RecordError, Result};
pub use field_map::{
    FieldMap, FieldSeq, FieldSeqMut, FieldValue, Items, ItemsOcc, Keys, MapConfig, OwnershipState,
    SetMode, Values,
};
pub use pool::BufferPool;
pub use schema::{FieldTable, FieldTableBuilder};
pub use types::{BufLoc, BufferHandle, FieldId, FieldKey, FieldType};
pub use value::{IntoOccurrences, Mapping, Value, ViewValue};
pub use view::{ViewDef, ViewField};
