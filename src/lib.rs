//! Schema driven decoding of PE/COFF executable headers.
//!
//! A [`schema::Layout`] describes a binary structure: integers, characters,
//! bitfields, enumerations, structs, arrays whose length comes from earlier
//! fields, and tagged unions picked by a predicate over what was decoded so
//! far. [`decode`] turns a byte buffer into a [`Document`] tree. Validation
//! findings are attached to the offending fields instead of failing the call.
//!
//! [`headers`] holds the PE layout and [`executable::Executable`] wraps it with
//! typed accessors.

pub mod context;
pub mod decoder;
pub mod executable;
pub mod headers;
pub mod node;
pub mod report;
pub mod schema;

pub use decoder::{decode, Document};
pub use nutil::NError;
