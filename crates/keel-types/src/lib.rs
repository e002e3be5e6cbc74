//! Foundation types for Keel.
//!
//! This crate provides the content-address and file-mode types used
//! throughout the checkpoint engine. Every other keel crate depends on
//! `keel-types`.

pub mod error;
pub mod mode;
pub mod object;

pub use error::TypeError;
pub use mode::EntryMode;
pub use object::ObjectId;
