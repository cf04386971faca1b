//! Data models shared across the driver layer.

pub mod column;
pub mod value;

pub use column::{ColumnDescriptor, SchemaRows};
pub use value::{Row, SqlValue};
