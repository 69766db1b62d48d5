//! Data structures representing format components.
//!
//! The fixed-layout file header and chunk header, plus the handler
//! declarations carried in XML metadata chunks.

pub mod chunk;
pub mod file_header;
pub mod handler;
pub mod metadata;
