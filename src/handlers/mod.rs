//! HTTP handlers for resource collections, items and subresources.

pub mod resource;
pub use resource::*;
