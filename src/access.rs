//! Tuple and value model plus sequential table access.

pub mod scan;
pub mod tuple;
pub mod value;

pub use scan::SeqScan;
pub use tuple::{Tuple, TupleId};
pub use value::{deserialize_tuple, serialize_tuple, DataType, Schema, Value};
