//! ORM abstraction consumed by the query layer: class metadata and the query builder.

mod class_metadata;
mod query_builder;

pub use class_metadata::*;
pub use query_builder::*;
