//! PostgreSQL rendering: identifiers from ORM metadata only, values always as parameters.

mod builder;
mod hydrate;
pub mod params;
mod render;

pub use builder::*;
pub use hydrate::hydrate;
pub use params::*;
pub use render::{render_count, render_select};
