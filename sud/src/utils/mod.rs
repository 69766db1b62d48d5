//! Utility functions and supporting infrastructure.
//!
//! Provides bit-level I/O for the block codec, CRC checksums for chunk
//! framing, and the error types shared across the crate.

pub mod bitstream_io;
pub mod crc;
pub mod errors;
