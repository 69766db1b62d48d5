//! Compression codecs for audio chunk payloads.
//!
//! The container does not care how samples are compressed, only that the
//! codec is lossless for 16-bit PCM, deterministic, and able to decode a frame
//! given the sample count stored in the chunk header. [`FrameCodec`] is that
//! boundary; [`x3::X3Codec`] is the codec written by default.

use anyhow::Result;

/// X3 lossless block codec.
pub mod x3;

pub use x3::X3Codec;

/// A lossless frame compressor for interleaved 16-bit PCM.
pub trait FrameCodec {
    /// The `FTYPE` tag declared for this codec in the decompressor metadata.
    fn ftype(&self) -> &'static str;

    /// Internal block granularity in samples per channel, published in the
    /// decompressor metadata as `BLKLEN`.
    fn block_samples(&self) -> usize;

    /// Compresses `n_samples` interleaved samples per channel into `out`.
    ///
    /// Returns the number of bytes written. The count may be odd; padding is
    /// the caller's concern.
    fn encode_frame(
        &mut self,
        samples: &[i16],
        out: &mut [u8],
        n_channels: usize,
        n_samples: usize,
    ) -> Result<usize>;

    /// Decompresses a frame holding `n_samples` samples per channel.
    ///
    /// Trailing bytes after the last coded sample are ignored.
    fn decode_frame(&mut self, data: &[u8], n_channels: usize, n_samples: usize)
    -> Result<Vec<i16>>;
}

/// Scratch size for one compressed frame: three bytes per raw sample plus slack,
/// since a frame can come out slightly larger than the PCM it encodes.
pub const fn scratch_capacity(n_channels: usize, n_samples: usize) -> usize {
    n_samples * n_channels * 3 + 16
}
