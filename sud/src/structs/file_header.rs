use std::io::{Read, Write};

use anyhow::Result;
use sud_macros::SudLayout;

use crate::config::WriterConfig;
use crate::endian::SudLayout;

/// The 30-byte record opening every SUD file.
///
/// Written once when a stream is opened and never revisited: the block
/// counters and the CRC stay zero because the final values are unknown at
/// open time. Readers do not verify [`crc`](Self::crc).
#[derive(Debug, Clone, PartialEq, Eq, SudLayout)]
#[sud(size = 30)]
pub struct FileHeader {
    pub host_code_version: u16,
    /// Seconds since the Unix epoch.
    pub host_time: i32,
    pub device_type: u8,
    pub device_code_version: u8,
    /// Seconds since the Unix epoch.
    pub device_time: i32,
    pub device_identifier: i32,
    /// Uncompressed bytes per nominal chunk.
    pub block_length: i32,
    pub start_block: u16,
    pub end_block: u16,
    pub no_of_blocks: i32,
    pub crc: u16,
}

impl FileHeader {
    pub const SIZE: usize = <Self as SudLayout>::SIZE;

    /// Header for a stream opened at `config.start_time_ms`.
    ///
    /// `config` must have passed [`WriterConfig::validate`].
    pub fn for_stream(config: &WriterConfig) -> Self {
        let seconds = (config.start_time_ms / 1000) as i32;

        Self {
            host_code_version: config.host_code_version,
            host_time: seconds,
            device_type: config.device_type,
            device_code_version: config.device_code_version,
            device_time: seconds,
            device_identifier: config.device_identifier,
            block_length: config.block_length() as i32,
            start_block: 0,
            end_block: 0,
            no_of_blocks: 0,
            crc: 0,
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_sud_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; Self::SIZE];
        reader.read_exact(&mut buf)?;
        Ok(Self::read_sud(&buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn layout() -> Result<()> {
        let config = WriterConfig::new(48000, 2)
            .with_chunk_samples(1000)
            .with_start_time_ms(1_700_000_000_500);
        let header = FileHeader::for_stream(&config);

        let mut out = Cursor::new(Vec::new());
        header.write_to(&mut out)?;
        let bytes = out.into_inner();

        assert_eq!(bytes.len(), 30);
        assert_eq!(&bytes[0..2], &[0x01, 0x00]);
        // 1_700_000_000 = 0x6553_F100
        assert_eq!(&bytes[2..6], &[0x53, 0x65, 0x00, 0xF1]);
        assert_eq!(&bytes[6..8], &[0, 0]);
        assert_eq!(&bytes[8..12], &bytes[2..6]);
        // 4000 = 0x0FA0
        assert_eq!(&bytes[16..20], &[0x00, 0x00, 0xA0, 0x0F]);
        assert!(bytes[20..].iter().all(|&b| b == 0));

        let parsed = FileHeader::read_from(&mut Cursor::new(&bytes))?;
        assert_eq!(parsed, header);
        Ok(())
    }

    #[test]
    fn short_input() {
        let err = FileHeader::read_from(&mut Cursor::new([0u8; 12])).unwrap_err();
        assert_eq!(
            err.downcast_ref::<std::io::Error>().map(|e| e.kind()),
            Some(std::io::ErrorKind::UnexpectedEof)
        );
    }
}
