//! Query assembly: name generation, safety predicates and the extension pipeline.

pub mod checker;
pub mod extension;
mod name_generator;

pub use name_generator::QueryNameGenerator;
