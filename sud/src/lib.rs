#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! ### File Organization
//!
//! **File header**: 30 bytes, written once at open and never back-patched.
//! **Chunks**: a 20-byte header followed by an even-length, byte-pair swapped payload.
//!
//! ### Byte Order
//!
//! 16-bit fields are little-endian. 32-bit fields use PDP order, high 16-bit
//! half first with big-endian bytes inside each half. See [`endian`].
//!
//! ### Handler Graph
//!
//! Metadata chunks (id 0) declare numbered handlers in XML. The writer declares
//! a decompressor (id 1) and an audio sink (id 2) fed by it, in two separate
//! chunks. Audio chunks carry id 2; the reader routes their payload through
//! the decompressor before handing out PCM.
//!
//! ## Quick Start
//!
//! 1. Open a stream with [`process::write::SudWriter::create`] and a [`config::WriterConfig`]
//! 2. Write interleaved samples with [`process::write::SudWriter::write`]
//! 3. Read them back with [`process::read::SudReader`], frame by frame or as an iterator

/// Codecs for audio chunk payloads.
///
/// - **Codec boundary** ([`codec::FrameCodec`]): what the container needs from a compressor
/// - **X3** ([`codec::x3`]): the bundled lossless block codec
pub mod codec;

/// Writer configuration, reader options and well-known ids.
pub mod config;

/// Little-endian and PDP integer codecs, byte-pair swapping.
pub mod endian;

/// Stream processing.
///
/// 1. **Frames** ([`process::frame`]): compression plus storage swap, chunk clock
/// 2. **Writing** ([`process::write`]): header, metadata and audio chunks
/// 3. **Reading** ([`process::read`]): handler resolution and decoding
pub mod process;

/// Data structures representing SUD format components.
///
/// - **File Header** ([`structs::file_header`]): the 30-byte file preamble
/// - **Chunks** ([`structs::chunk`]): chunk header and framing
/// - **Handlers** ([`structs::handler`]): handler descriptors and routing graph
/// - **Metadata** ([`structs::metadata`]): XML handler declarations
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading/writing
/// - **CRC Validation** ([`utils::crc`]): Error detection
/// - **Error Handling** ([`utils::errors`]): Error types
pub mod utils;

pub use codec::{FrameCodec, X3Codec};
pub use config::{ReaderOptions, WriterConfig};
pub use process::read::{AudioFormat, AudioFrame, SudReader};
pub use process::write::SudWriter;
