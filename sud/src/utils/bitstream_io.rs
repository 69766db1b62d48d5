//! Bit-level I/O used by the block codec.
//!
//! Thin wrappers over `bitstream_io` that add bounds-aware error messages on
//! the read side and a byte counter on the write side.

use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter};

#[derive(Debug)]
pub struct BitstreamIoReader<R: io::Read> {
    bs: BitReader<R, BigEndian>,
    len: u64,
    position: u64,
}

pub type BsIoSliceReader<'a> = BitstreamIoReader<io::Cursor<&'a [u8]>>;

impl<'a> BsIoSliceReader<'a> {
    pub fn from_slice(data: &'a [u8]) -> Self {
        Self::new(io::Cursor::new(data), data.len() as u64)
    }
}

impl<R> BitstreamIoReader<R>
where
    R: io::Read,
{
    pub fn new(read: R, len_bytes: u64) -> Self {
        Self {
            bs: BitReader::new(read),
            len: len_bytes << 3,
            position: 0,
        }
    }

    /// Bits left before the end of the underlying buffer.
    #[inline(always)]
    pub fn available(&self) -> u64 {
        self.len.saturating_sub(self.position)
    }

    #[inline(always)]
    pub fn get(&mut self) -> io::Result<bool> {
        self.check(1)?;
        self.position += 1;
        self.bs.read_bit()
    }

    /// Reads an `n`-bit unsigned value, `1 <= n <= 32`.
    #[inline(always)]
    pub fn get_n(&mut self, n: u32) -> io::Result<u32> {
        self.check(n)?;
        self.position += n as u64;
        self.bs.read_unsigned_var(n)
    }

    /// Counts `1` bits up to the next `0`, failing once `limit` is exceeded.
    pub fn get_unary(&mut self, limit: u32) -> io::Result<u32> {
        let mut count = 0;
        while self.get()? {
            count += 1;
            if count > limit {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unary code longer than {limit} bits at {}", self.position),
                ));
            }
        }
        Ok(count)
    }

    fn check(&self, n: u32) -> io::Result<()> {
        if n as u64 > self.available() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("get_n({n}): out of bounds bits at {}", self.position),
            ));
        }
        Ok(())
    }
}

pub struct BitstreamIoWriter<W: io::Write> {
    bs: BitWriter<W, BigEndian>,
    bits_written: u64,
}

impl<W> BitstreamIoWriter<W>
where
    W: io::Write,
{
    pub fn new(write: W) -> Self {
        Self {
            bs: BitWriter::new(write),
            bits_written: 0,
        }
    }

    #[inline(always)]
    pub fn put(&mut self, bit: bool) -> io::Result<()> {
        self.bits_written += 1;
        self.bs.write_bit(bit)
    }

    /// Writes the low `n` bits of `value`, `1 <= n <= 32`.
    #[inline(always)]
    pub fn put_n(&mut self, n: u32, value: u32) -> io::Result<()> {
        self.bits_written += n as u64;
        let mask = if n >= 32 { u32::MAX } else { (1u32 << n) - 1 };
        self.bs.write_unsigned_var(n, value & mask)
    }

    /// Writes `count` `1` bits followed by a `0`.
    pub fn put_unary(&mut self, count: u32) -> io::Result<()> {
        for _ in 0..count {
            self.put(true)?;
        }
        self.put(false)
    }

    /// Pads with zero bits to the next byte boundary and returns the byte count.
    pub fn finish(mut self) -> io::Result<(W, usize)> {
        self.bs.byte_align()?;
        let bytes = self.bits_written.div_ceil(8) as usize;
        Ok((self.bs.into_writer(), bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_fields() -> io::Result<()> {
        let mut writer = BitstreamIoWriter::new(Vec::new());
        writer.put_n(2, 0b10)?;
        writer.put_n(16, 0xBEEF)?;
        writer.put_unary(3)?;
        writer.put(true)?;
        let (data, bytes) = writer.finish()?;

        // 2 + 16 + 4 + 1 = 23 bits
        assert_eq!(bytes, 3);
        assert_eq!(data.len(), 3);

        let mut reader = BsIoSliceReader::from_slice(&data);
        assert_eq!(reader.get_n(2)?, 0b10);
        assert_eq!(reader.get_n(16)?, 0xBEEF);
        assert_eq!(reader.get_unary(8)?, 3);
        assert!(reader.get()?);
        assert_eq!(reader.available(), 1);
        assert!(reader.get_n(2).is_err());
        Ok(())
    }

    #[test]
    fn unary_limit() -> io::Result<()> {
        let data = [0xFF, 0xFF];
        let mut reader = BsIoSliceReader::from_slice(&data);
        let err = reader.get_unary(4).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        Ok(())
    }
}
