//! X3 block codec.
//!
//! Frame layout, for `C` channels and `N` samples per channel:
//!
//! ```text
//! C x 16 bits        first sample of each channel, raw
//! then for each block of up to 20 samples, for each channel:
//!   2 bits           selector
//!     1..=3          Rice code, parameter 0 / 2 / 4, of zig-zag first differences
//!     0              block floating point:
//!       4 bits       width w; 1..=15 -> w-bit two's-complement differences
//!                             0     -> raw 16-bit samples
//! ```
//!
//! Differences are taken against the previous sample of the same channel,
//! carried across block boundaries. The frame ends on a byte boundary.
//!
//! # Compatibility
//!
//! The coder follows the X3 scheme (raw lead sample, per-block choice of Rice
//! or block floating point) but its bitstream is not the one produced by
//! SoundTrap recorders. It still declares `FTYPE="x3v2"`, so the metadata
//! chunks stay byte-identical to recorder output. Files written with
//! [`X3Codec`] decode with this crate; third-party readers that dispatch on
//! `x3v2` will misdecode their audio. Reading recorder files, or writing files
//! for other readers, needs a bit-exact [`FrameCodec`] passed to
//! [`SudWriter::with_codec`](crate::process::write::SudWriter::with_codec) or
//! [`SudReader::with_codec`](crate::process::read::SudReader::with_codec).

use std::io;

use anyhow::{Result, bail, ensure};
use log::trace;

use crate::codec::FrameCodec;
use crate::utils::bitstream_io::{BitstreamIoWriter, BsIoSliceReader};
use crate::utils::errors::CodecError;

/// Samples per channel in one coded block.
pub const X3_BLOCK_SAMPLES: usize = 20;

/// Metadata `FTYPE` of the X3 decompressor.
pub const X3_FTYPE: &str = "x3v2";

const RICE_PARAMS: [u32; 3] = [0, 2, 4];
const SELECTOR_BITS: u32 = 2;
const BFP_WIDTH_BITS: u32 = 4;
const MAX_BFP_WIDTH: u32 = 15;
const RAW_BITS: u32 = 16;

/// Longest unary prefix accepted on decode. A valid encoder never emits a
/// Rice block costlier than the raw fallback.
const MAX_UNARY: u32 = (X3_BLOCK_SAMPLES as u32) * RAW_BITS + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockCode {
    Rice(usize),
    Bfp(u32),
    Raw,
}

#[derive(Debug, Default, Clone)]
pub struct X3Codec {
    frames_encoded: usize,
    frames_decoded: usize,
}

impl X3Codec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_encoded(&self) -> usize {
        self.frames_encoded
    }

    pub fn frames_decoded(&self) -> usize {
        self.frames_decoded
    }
}

impl FrameCodec for X3Codec {
    fn ftype(&self) -> &'static str {
        X3_FTYPE
    }

    fn block_samples(&self) -> usize {
        X3_BLOCK_SAMPLES
    }

    fn encode_frame(
        &mut self,
        samples: &[i16],
        out: &mut [u8],
        n_channels: usize,
        n_samples: usize,
    ) -> Result<usize> {
        ensure!(n_channels > 0, CodecError::InvalidChannels(n_channels));
        ensure!(
            samples.len() >= n_channels * n_samples,
            "encode_frame: {} samples supplied, {} required",
            samples.len(),
            n_channels * n_samples
        );

        if n_samples == 0 {
            return Ok(0);
        }

        let capacity = out.len();
        let mut cursor = io::Cursor::new(out);
        let mut writer = BitstreamIoWriter::new(&mut cursor);

        let encoded = encode_blocks(&mut writer, samples, n_channels, n_samples)
            .and_then(|()| writer.finish());

        let bytes = match encoded {
            Ok((_, bytes)) => bytes,
            Err(e) if e.kind() == io::ErrorKind::WriteZero => {
                bail!(CodecError::ScratchOverflow(capacity))
            }
            Err(e) => return Err(e.into()),
        };

        self.frames_encoded += 1;
        trace!("X3 frame: {n_channels} ch x {n_samples} samples -> {bytes} bytes");

        Ok(bytes)
    }

    fn decode_frame(
        &mut self,
        data: &[u8],
        n_channels: usize,
        n_samples: usize,
    ) -> Result<Vec<i16>> {
        ensure!(n_channels > 0, CodecError::InvalidChannels(n_channels));
        ensure!(
            min_frame_bits(n_channels, n_samples) <= data.len() as u64 * 8,
            CodecError::FrameTooShort {
                n_channels,
                n_samples,
                bytes: data.len(),
            }
        );

        let mut out = vec![0i16; n_channels * n_samples];
        if n_samples == 0 {
            return Ok(out);
        }

        let mut decoded = 0;
        if let Err(e) = decode_blocks(data, &mut out, n_channels, n_samples, &mut decoded) {
            match e.kind() {
                io::ErrorKind::UnexpectedEof => bail!(CodecError::Truncated {
                    decoded,
                    expected: n_samples,
                }),
                io::ErrorKind::InvalidData => bail!(CodecError::InvalidCode("Rice")),
                _ => return Err(e.into()),
            }
        }

        self.frames_decoded += 1;
        Ok(out)
    }
}

/// Smallest frame able to hold `n_samples` per channel: the raw first
/// samples, then at least one bit per difference.
const fn min_frame_bits(n_channels: usize, n_samples: usize) -> u64 {
    if n_samples == 0 {
        return 0;
    }
    let n_channels = n_channels as u64;
    RAW_BITS as u64 * n_channels + (n_samples as u64 - 1) * n_channels
}

#[inline]
const fn zigzag(d: i32) -> u32 {
    ((d << 1) ^ (d >> 31)) as u32
}

#[inline]
const fn unzigzag(z: u32) -> i32 {
    ((z >> 1) as i32) ^ -((z & 1) as i32)
}

/// Bits needed to hold `d` in two's complement.
#[inline]
const fn signed_width(d: i32) -> u32 {
    let magnitude = if d < 0 { !d } else { d };
    33 - magnitude.leading_zeros()
}

#[inline]
const fn sign_extend(raw: u32, width: u32) -> i32 {
    let shift = 32 - width;
    ((raw << shift) as i32) >> shift
}

fn choose_code(diffs: &[i32]) -> BlockCode {
    let len = diffs.len() as u64;

    let width = diffs
        .iter()
        .map(|&d| signed_width(d))
        .max()
        .unwrap_or(1);

    let (mut best, mut best_cost) = if width <= MAX_BFP_WIDTH {
        (BlockCode::Bfp(width), BFP_WIDTH_BITS as u64 + width as u64 * len)
    } else {
        (BlockCode::Raw, BFP_WIDTH_BITS as u64 + RAW_BITS as u64 * len)
    };

    for (i, &k) in RICE_PARAMS.iter().enumerate() {
        let cost: u64 = diffs
            .iter()
            .map(|&d| (zigzag(d) >> k) as u64 + 1 + k as u64)
            .sum();
        if cost < best_cost {
            best = BlockCode::Rice(i);
            best_cost = cost;
        }
    }

    best
}

fn encode_blocks<W: io::Write>(
    writer: &mut BitstreamIoWriter<W>,
    samples: &[i16],
    n_channels: usize,
    n_samples: usize,
) -> io::Result<()> {
    let mut prev = vec![0i32; n_channels];
    for (ch, p) in prev.iter_mut().enumerate() {
        let v = samples[ch];
        writer.put_n(RAW_BITS, v as u16 as u32)?;
        *p = v as i32;
    }

    let mut diffs = [0i32; X3_BLOCK_SAMPLES];
    let mut raw = [0i16; X3_BLOCK_SAMPLES];

    let mut start = 1;
    while start < n_samples {
        let len = X3_BLOCK_SAMPLES.min(n_samples - start);

        for (ch, p) in prev.iter_mut().enumerate() {
            let mut last = *p;
            for i in 0..len {
                let v = samples[(start + i) * n_channels + ch];
                raw[i] = v;
                diffs[i] = v as i32 - last;
                last = v as i32;
            }
            *p = last;

            let diffs = &diffs[..len];
            match choose_code(diffs) {
                BlockCode::Rice(index) => {
                    let k = RICE_PARAMS[index];
                    writer.put_n(SELECTOR_BITS, index as u32 + 1)?;
                    for &d in diffs {
                        let z = zigzag(d);
                        writer.put_unary(z >> k)?;
                        if k > 0 {
                            writer.put_n(k, z)?;
                        }
                    }
                }
                BlockCode::Bfp(width) => {
                    writer.put_n(SELECTOR_BITS, 0)?;
                    writer.put_n(BFP_WIDTH_BITS, width)?;
                    for &d in diffs {
                        writer.put_n(width, d as u32)?;
                    }
                }
                BlockCode::Raw => {
                    writer.put_n(SELECTOR_BITS, 0)?;
                    writer.put_n(BFP_WIDTH_BITS, 0)?;
                    for &v in &raw[..len] {
                        writer.put_n(RAW_BITS, v as u16 as u32)?;
                    }
                }
            }
        }

        start += len;
    }

    Ok(())
}

fn decode_blocks(
    data: &[u8],
    out: &mut [i16],
    n_channels: usize,
    n_samples: usize,
    decoded: &mut usize,
) -> io::Result<()> {
    let mut reader = BsIoSliceReader::from_slice(data);

    let mut prev = vec![0i32; n_channels];
    for (ch, p) in prev.iter_mut().enumerate() {
        let v = reader.get_n(RAW_BITS)? as u16 as i16;
        out[ch] = v;
        *p = v as i32;
    }
    *decoded = 1;

    let mut start = 1;
    while start < n_samples {
        let len = X3_BLOCK_SAMPLES.min(n_samples - start);

        for (ch, p) in prev.iter_mut().enumerate() {
            let selector = reader.get_n(SELECTOR_BITS)? as usize;
            let slots = (start..start + len).map(|s| s * n_channels + ch);

            if selector == 0 {
                let width = reader.get_n(BFP_WIDTH_BITS)?;
                for slot in slots {
                    let v = if width == 0 {
                        reader.get_n(RAW_BITS)? as u16 as i16
                    } else {
                        let d = sign_extend(reader.get_n(width)?, width);
                        p.wrapping_add(d) as i16
                    };
                    out[slot] = v;
                    *p = v as i32;
                }
            } else {
                let k = RICE_PARAMS[selector - 1];
                for slot in slots {
                    let q = reader.get_unary(MAX_UNARY)?;
                    let r = if k > 0 { reader.get_n(k)? } else { 0 };
                    let d = unzigzag((q << k) | r);
                    let v = p.wrapping_add(d) as i16;
                    out[slot] = v;
                    *p = v as i32;
                }
            }
        }

        start += len;
        *decoded = start;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::scratch_capacity;

    fn round_trip(samples: &[i16], n_channels: usize) -> Result<(Vec<i16>, usize)> {
        let n_samples = samples.len() / n_channels;
        let mut codec = X3Codec::new();
        let mut scratch = vec![0u8; scratch_capacity(n_channels, n_samples)];
        let bytes = codec.encode_frame(samples, &mut scratch, n_channels, n_samples)?;
        let decoded = codec.decode_frame(&scratch[..bytes], n_channels, n_samples)?;
        Ok((decoded, bytes))
    }

    #[test]
    fn declares_recorder_ftype() {
        let codec = X3Codec::new();
        assert_eq!(codec.ftype(), "x3v2");
        assert_eq!(codec.block_samples(), 20);
    }

    #[test]
    fn helpers() {
        for d in [0, 1, -1, 2, -2, 65535, -65535, i16::MIN as i32] {
            assert_eq!(unzigzag(zigzag(d)), d);
        }
        assert_eq!(zigzag(-1), 1);
        assert_eq!(zigzag(1), 2);

        assert_eq!(signed_width(0), 1);
        assert_eq!(signed_width(-1), 1);
        assert_eq!(signed_width(1), 2);
        assert_eq!(signed_width(-128), 8);
        assert_eq!(signed_width(127), 8);
        assert_eq!(signed_width(128), 9);

        assert_eq!(sign_extend(0b111, 3), -1);
        assert_eq!(sign_extend(0b011, 3), 3);
    }

    #[test]
    fn silence_compresses() -> Result<()> {
        let samples = vec![0i16; 1000];
        let (decoded, bytes) = round_trip(&samples, 1)?;
        assert_eq!(decoded, samples);
        // 16 bits + ~50 blocks of (2 + 20) bits
        assert!(bytes < 160, "silence took {bytes} bytes");
        Ok(())
    }

    #[test]
    fn extreme_steps_use_raw_blocks() -> Result<()> {
        let samples: Vec<i16> = (0..101)
            .map(|i| if i % 2 == 0 { i16::MAX } else { i16::MIN })
            .collect();
        let (decoded, bytes) = round_trip(&samples, 1)?;
        assert_eq!(decoded, samples);
        assert!(bytes <= scratch_capacity(1, samples.len()));
        Ok(())
    }

    #[test]
    fn interleaved_channels_stay_separate() -> Result<()> {
        let samples: Vec<i16> = (0..777)
            .flat_map(|i: i32| [(i * 7) as i16, -(i as i16), (i % 3) as i16])
            .collect();
        let (decoded, _) = round_trip(&samples, 3)?;
        assert_eq!(decoded, samples);
        Ok(())
    }

    #[test]
    fn single_sample_frame() -> Result<()> {
        let (decoded, bytes) = round_trip(&[-12345, 42], 2)?;
        assert_eq!(decoded, [-12345, 42]);
        assert_eq!(bytes, 4);
        Ok(())
    }

    #[test]
    fn truncated_frame_is_rejected() -> Result<()> {
        let samples: Vec<i16> = (0..500).map(|i| (i * 31 % 2000) as i16).collect();
        let mut codec = X3Codec::new();
        let mut scratch = vec![0u8; scratch_capacity(1, samples.len())];
        let bytes = codec.encode_frame(&samples, &mut scratch, 1, samples.len())?;

        let err = codec
            .decode_frame(&scratch[..bytes / 2], 1, samples.len())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CodecError>(),
            Some(CodecError::Truncated { .. })
        ));
        Ok(())
    }

    #[test]
    fn impossible_frame_size_is_rejected() -> Result<()> {
        let mut codec = X3Codec::new();
        let err = codec.decode_frame(&[0, 0], 4096, 65535).unwrap_err();
        assert_eq!(
            err.downcast_ref::<CodecError>(),
            Some(&CodecError::FrameTooShort {
                n_channels: 4096,
                n_samples: 65535,
                bytes: 2,
            })
        );

        // 16 bits for the first sample, one bit for each of the other 8
        assert_eq!(min_frame_bits(1, 9), 24);
        let mut scratch = [0u8; 64];
        let bytes = codec.encode_frame(&[0; 9], &mut scratch, 1, 9)?;
        assert!(bytes * 8 >= 24);
        assert_eq!(codec.decode_frame(&scratch[..bytes], 1, 9)?, [0; 9]);
        assert!(matches!(
            codec.decode_frame(&scratch[..2], 1, 9).unwrap_err().downcast_ref::<CodecError>(),
            Some(CodecError::FrameTooShort { bytes: 2, .. })
        ));
        Ok(())
    }

    #[test]
    fn small_scratch_overflows() {
        let samples: Vec<i16> = (0..200).map(|i| (i * 997) as i16).collect();
        let mut codec = X3Codec::new();
        let mut scratch = vec![0u8; 8];
        let err = codec
            .encode_frame(&samples, &mut scratch, 1, samples.len())
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<CodecError>(),
            Some(&CodecError::ScratchOverflow(8))
        );
    }
}
