//! Request lifecycle listeners run by the resource handlers: read, validate, write.

mod read;
mod validate;
mod write;

pub use read::ReadListener;
pub use validate::ValidateListener;
pub use write::WriteListener;
