//! Byte-order primitives for the SUD container.
//!
//! SUD mixes two integer layouts: 16-bit values are little-endian, while
//! 32-bit values use a "PDP" (middle-endian) order where the two 16-bit halves
//! appear high half first but each half keeps big-endian byte order. The same
//! routines are used by the writer and the reader so the two sides cannot
//! drift apart.
//!
//! Every chunk payload is additionally stored byte-pair swapped. Writers
//! pre-swap with [`swap_byte_pairs`] and readers undo it unconditionally with
//! the same function before interpreting a payload.

/// Appends `v` as two little-endian bytes.
#[inline]
pub fn write_u16_le(v: u16, dst: &mut Vec<u8>) {
    dst.extend_from_slice(&v.to_le_bytes());
}

#[inline]
pub fn read_u16_le(src: &[u8]) -> u16 {
    u16::from_le_bytes([src[0], src[1]])
}

/// Encodes `v` as `[(v>>16)&FF, (v>>24)&FF, v&FF, (v>>8)&FF]`.
#[inline]
pub const fn i32_to_pdp_bytes(v: i32) -> [u8; 4] {
    let be = v.to_be_bytes();
    [be[1], be[0], be[3], be[2]]
}

/// Inverse of [`i32_to_pdp_bytes`]: `w1<<24 | w0<<16 | w3<<8 | w2`.
#[inline]
pub const fn i32_from_pdp_bytes(w: [u8; 4]) -> i32 {
    i32::from_be_bytes([w[1], w[0], w[3], w[2]])
}

#[inline]
pub fn write_i32_pdp(v: i32, dst: &mut Vec<u8>) {
    dst.extend_from_slice(&i32_to_pdp_bytes(v));
}

#[inline]
pub fn read_i32_pdp(src: &[u8]) -> i32 {
    i32_from_pdp_bytes([src[0], src[1], src[2], src[3]])
}

/// Exchanges bytes `2i` and `2i + 1` in place. A trailing odd byte is left alone.
pub fn swap_byte_pairs(data: &mut [u8]) {
    data.chunks_exact_mut(2).for_each(|pair| pair.swap(0, 1));
}

/// Zero-pads `data` to an even length. Returns `true` if a byte was added.
pub fn pad_to_even(data: &mut Vec<u8>) -> bool {
    if data.len() % 2 != 0 {
        data.push(0);
        true
    } else {
        false
    }
}

/// A primitive with a fixed SUD wire encoding.
pub trait SudEncode: Sized {
    /// Encoded width in bytes.
    const WIDTH: usize;

    fn encode_sud(&self, dst: &mut Vec<u8>);

    /// Decodes from the first [`Self::WIDTH`] bytes of `src`.
    fn decode_sud(src: &[u8]) -> Self;
}

/// A fixed-size record made of [`SudEncode`] fields, usually derived with
/// `#[derive(SudLayout)]`.
pub trait SudLayout: Sized {
    const SIZE: usize;

    fn write_sud(&self, dst: &mut Vec<u8>);

    /// Decodes from the first [`Self::SIZE`] bytes of `src`.
    fn read_sud(src: &[u8]) -> Self;

    fn to_sud_bytes(&self) -> Vec<u8> {
        let mut vec = Vec::with_capacity(Self::SIZE);
        self.write_sud(&mut vec);
        vec
    }
}

macro_rules! impl_sud_encode {
    ($($t:ty => $width:expr, $write:ident, $read:ident);+ $(;)?) => { $(
        impl SudEncode for $t {
            const WIDTH: usize = $width;
            #[inline] fn encode_sud(&self, dst: &mut Vec<u8>) { $write(*self, dst) }
            #[inline] fn decode_sud(src: &[u8]) -> Self { $read(src) }
        }
    )+ }
}

#[inline]
fn write_u8(v: u8, dst: &mut Vec<u8>) {
    dst.push(v);
}

#[inline]
fn read_u8(src: &[u8]) -> u8 {
    src[0]
}

impl_sud_encode!(
    u8 => 1, write_u8, read_u8;
    u16 => 2, write_u16_le, read_u16_le;
    i32 => 4, write_i32_pdp, read_i32_pdp;
);
