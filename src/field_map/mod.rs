mod config;
mod convert;
mod iter;
mod map;
mod ownership;
mod seq;

pub use config::{MapConfig, SetMode};
pub use iter::{Items, ItemsOcc, Keys, Values};
pub use map::{FieldMap, RESERVED_ATTRS};
pub use ownership::OwnershipState;
pub use seq::{FieldSeq, FieldSeqMut, FieldValue};
