//! Plain-text formats exchanged with simulation engines.
//!
//! Every format implements [`traits::PlainTextFile`], so reading and writing
//! share the same entry points regardless of layout.

pub mod colvar;
pub mod hills;
pub(crate) mod parsing;
pub mod table;
pub mod traits;
pub mod xyz;
