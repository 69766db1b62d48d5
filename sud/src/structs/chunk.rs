use std::io::{self, Read, Write};

use anyhow::{Result, bail, ensure};
use log::{trace, warn};
use sud_macros::SudLayout;

use crate::config::CHUNK_MAGIC;
use crate::endian::SudLayout;
use crate::utils::crc::Checksums;
use crate::utils::errors::ChunkError;

/// Offset and length of the header bytes covered by the header CRC.
pub const HEADER_CRC_OFFSET: usize = 2;
pub const HEADER_CRC_LENGTH: usize = 16;

/// The 20-byte header in front of every chunk payload.
#[derive(Debug, Clone, PartialEq, Eq, SudLayout)]
#[sud(size = 20)]
pub struct ChunkHeader {
    pub magic: u16,
    pub chunk_id: u16,
    pub data_length: u16,
    /// Samples per channel carried by an audio chunk; 0 for metadata.
    pub sample_count: u16,
    pub time_seconds: i32,
    pub time_offset_micros: i32,
    pub data_crc: u16,
    pub header_crc: u16,
}

impl ChunkHeader {
    pub const SIZE: usize = <Self as SudLayout>::SIZE;
}

/// A chunk as stored: header plus the still byte-swapped payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub header: ChunkHeader,
    pub payload: Vec<u8>,
}

impl Chunk {
    /// Header CRC recomputed from the stored header bytes.
    pub fn computed_header_crc(&self, checksums: &Checksums) -> u16 {
        let bytes = self.header.to_sud_bytes();
        checksums.header_crc(&bytes, HEADER_CRC_LENGTH, HEADER_CRC_OFFSET)
    }

    /// Data CRC recomputed from the stored payload.
    pub fn computed_data_crc(&self, checksums: &Checksums) -> u16 {
        checksums.data_crc(&self.payload)
    }
}

/// Frames `payload` and writes header plus payload in one call.
///
/// The payload must already be padded to even length and byte-pair swapped.
/// Returns the number of bytes written.
pub fn write_chunk<W: Write>(
    writer: &mut W,
    checksums: &Checksums,
    chunk_id: u16,
    payload: &[u8],
    sample_count: u16,
    time_seconds: i32,
    time_offset_micros: i32,
) -> Result<usize> {
    ensure!(
        payload.len() % 2 == 0,
        ChunkError::OddPayloadLength(payload.len())
    );
    let Ok(data_length) = u16::try_from(payload.len()) else {
        bail!(ChunkError::PayloadTooLarge(payload.len()));
    };

    let mut header = ChunkHeader {
        magic: CHUNK_MAGIC,
        chunk_id,
        data_length,
        sample_count,
        time_seconds,
        time_offset_micros,
        data_crc: checksums.data_crc(payload),
        header_crc: 0,
    };

    let mut bytes = header.to_sud_bytes();
    header.header_crc = checksums.header_crc(&bytes, HEADER_CRC_LENGTH, HEADER_CRC_OFFSET);
    bytes[18..20].copy_from_slice(&header.header_crc.to_le_bytes());

    bytes.extend_from_slice(payload);
    writer.write_all(&bytes)?;

    trace!(
        "Wrote chunk id={chunk_id} len={data_length} samples={sample_count} t={time_seconds}s+{time_offset_micros}us"
    );

    Ok(bytes.len())
}

/// Fills `buf` as far as the source allows. Returns the number of bytes read.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Reads the next chunk.
///
/// Returns `Ok(None)` at end of stream, including when fewer than 20 header
/// bytes remain. CRCs are not checked here.
pub fn read_chunk<R: Read>(reader: &mut R) -> Result<Option<Chunk>> {
    let mut buf = [0u8; ChunkHeader::SIZE];
    let filled = read_up_to(reader, &mut buf)?;

    if filled == 0 {
        return Ok(None);
    }
    if filled < buf.len() {
        warn!("Ignoring {filled} trailing bytes: incomplete chunk header at end of stream");
        return Ok(None);
    }

    let header = ChunkHeader::read_sud(&buf);
    if header.magic != CHUNK_MAGIC {
        bail!(ChunkError::BadMagic {
            expected: CHUNK_MAGIC,
            found: header.magic,
        });
    }

    let expected = header.data_length as usize;
    let mut payload = vec![0u8; expected];
    let actual = read_up_to(reader, &mut payload)?;
    if actual < expected {
        bail!(ChunkError::ShortPayload { expected, actual });
    }

    trace!(
        "Read chunk id={} len={} samples={}",
        header.chunk_id, header.data_length, header.sample_count
    );

    Ok(Some(Chunk { header, payload }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn framed(payload: &[u8]) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        write_chunk(&mut out, &Checksums::default(), 2, payload, 1000, 1_700_000_000, 20833)?;
        Ok(out.into_inner())
    }

    #[test]
    fn header_layout() -> Result<()> {
        let checksums = Checksums::default();
        let bytes = framed(&[1, 2, 3, 4])?;

        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[0..2], &[0x52, 0xA9]);
        assert_eq!(&bytes[2..4], &[0x02, 0x00]);
        assert_eq!(&bytes[4..6], &[0x04, 0x00]);
        assert_eq!(&bytes[6..8], &1000u16.to_le_bytes());
        assert_eq!(
            &bytes[16..18],
            &checksums.data_crc(&[1, 2, 3, 4]).to_le_bytes()
        );
        assert_eq!(
            &bytes[18..20],
            &checksums
                .header_crc(&bytes, HEADER_CRC_LENGTH, HEADER_CRC_OFFSET)
                .to_le_bytes()
        );
        assert_eq!(&bytes[20..], &[1, 2, 3, 4]);

        let chunk = read_chunk(&mut Cursor::new(&bytes))?.unwrap();
        assert_eq!(chunk.header.time_seconds, 1_700_000_000);
        assert_eq!(chunk.header.time_offset_micros, 20833);
        assert_eq!(chunk.computed_header_crc(&checksums), chunk.header.header_crc);
        assert_eq!(chunk.computed_data_crc(&checksums), chunk.header.data_crc);
        Ok(())
    }

    #[test]
    fn rejects_unframeable_payloads() {
        let checksums = Checksums::default();
        let mut sink = Vec::new();

        let err = write_chunk(&mut sink, &checksums, 2, &[1, 2, 3], 1, 0, 0).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ChunkError>(),
            Some(&ChunkError::OddPayloadLength(3))
        );

        let big = vec![0u8; 65536];
        let err = write_chunk(&mut sink, &checksums, 2, &big, 1, 0, 0).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ChunkError>(),
            Some(&ChunkError::PayloadTooLarge(65536))
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn end_of_stream() -> Result<()> {
        assert!(read_chunk(&mut Cursor::new(Vec::<u8>::new()))?.is_none());

        let bytes = framed(&[0, 0])?;
        assert!(read_chunk(&mut Cursor::new(&bytes[..7]))?.is_none());
        Ok(())
    }

    #[test]
    fn framing_errors() -> Result<()> {
        let mut bytes = framed(&[9, 9, 9, 9])?;

        let err = read_chunk(&mut Cursor::new(&bytes[..22])).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ChunkError>(),
            Some(&ChunkError::ShortPayload {
                expected: 4,
                actual: 2
            })
        );

        bytes[0] = 0x00;
        let err = read_chunk(&mut Cursor::new(&bytes)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ChunkError>(),
            Some(&ChunkError::BadMagic {
                expected: 0xA952,
                found: 0xA900
            })
        );
        Ok(())
    }
}
