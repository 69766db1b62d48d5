//! Stream configuration and well-known identifiers.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Result, ensure};

use crate::codec::scratch_capacity;
use crate::utils::crc::Checksums;
use crate::utils::errors::StreamError;

/// Magic number opening every chunk header.
pub const CHUNK_MAGIC: u16 = 0xA952;

/// Chunk id reserved for XML metadata.
pub const XML_CHUNK_ID: u16 = 0;

/// Handler id of the decompressor declared by [`SudWriter`](crate::process::write::SudWriter).
pub const DECOMPRESSOR_ID: u16 = 1;

/// Handler id of the audio sink; audio chunks carry this id.
pub const AUDIO_SINK_ID: u16 = 2;

pub const DEFAULT_CHUNK_SAMPLES: usize = 1000;
pub const MAX_CHUNK_SAMPLES: usize = u16::MAX as usize;
pub const BITS_PER_SAMPLE: u16 = 16;
pub const BYTES_PER_SAMPLE: usize = 2;
pub const HOST_CODE_VERSION: u16 = 1;

/// Parameters of a stream being written.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub sample_rate: u32,
    pub n_channels: u16,

    /// Nominal samples per channel in one audio chunk.
    pub chunk_samples: usize,

    /// Wall-clock time of the first sample, in milliseconds since the Unix epoch.
    pub start_time_ms: i64,

    pub host_code_version: u16,
    pub device_type: u8,
    pub device_code_version: u8,
    pub device_identifier: i32,

    pub checksums: Checksums,
}

impl WriterConfig {
    /// Configuration with defaults for everything but the audio format. The
    /// start time is the current system time.
    pub fn new(sample_rate: u32, n_channels: u16) -> Self {
        Self {
            sample_rate,
            n_channels,
            chunk_samples: DEFAULT_CHUNK_SAMPLES,
            start_time_ms: now_millis(),
            host_code_version: HOST_CODE_VERSION,
            device_type: 0,
            device_code_version: 0,
            device_identifier: 0,
            checksums: Checksums::default(),
        }
    }

    pub fn with_chunk_samples(mut self, chunk_samples: usize) -> Self {
        self.chunk_samples = chunk_samples;
        self
    }

    pub fn with_start_time_ms(mut self, start_time_ms: i64) -> Self {
        self.start_time_ms = start_time_ms;
        self
    }

    pub fn with_device(mut self, device_type: u8, code_version: u8, identifier: i32) -> Self {
        self.device_type = device_type;
        self.device_code_version = code_version;
        self.device_identifier = identifier;
        self
    }

    pub fn with_checksums(mut self, checksums: Checksums) -> Self {
        self.checksums = checksums;
        self
    }

    /// Uncompressed bytes in one nominal chunk, as recorded in the file header.
    pub fn block_length(&self) -> usize {
        self.chunk_samples * BYTES_PER_SAMPLE * self.n_channels as usize
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.sample_rate > 0,
            StreamError::InvalidConfig("sample rate must be positive")
        );
        ensure!(
            self.n_channels > 0,
            StreamError::InvalidConfig("channel count must be positive")
        );
        ensure!(
            self.chunk_samples > 0,
            StreamError::InvalidConfig("chunk sample capacity must be positive")
        );
        ensure!(
            self.chunk_samples <= MAX_CHUNK_SAMPLES,
            StreamError::InvalidConfig("chunk sample capacity exceeds 65535")
        );
        ensure!(
            scratch_capacity(self.n_channels as usize, self.chunk_samples) <= u16::MAX as usize,
            StreamError::InvalidConfig("a full chunk may not fit the 65535-byte payload field")
        );
        ensure!(
            i32::try_from(self.block_length()).is_ok(),
            StreamError::InvalidConfig("block length does not fit the header field")
        );
        Ok(())
    }
}

/// Reader behaviour.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Anomalies logged at this level or more severe abort the read.
    ///
    /// - `log::Level::Error`: CRC mismatches are logged and tolerated (default)
    /// - `log::Level::Warn`: CRC mismatches are fatal (strict mode)
    pub fail_level: log::Level,

    pub checksums: Checksums,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            fail_level: log::Level::Error,
            checksums: Checksums::default(),
        }
    }
}

impl ReaderOptions {
    pub fn strict() -> Self {
        Self {
            fail_level: log::Level::Warn,
            ..Self::default()
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_bad_formats() {
        assert!(WriterConfig::new(48000, 2).validate().is_ok());

        for config in [
            WriterConfig::new(0, 1),
            WriterConfig::new(48000, 0),
            WriterConfig::new(48000, 1).with_chunk_samples(0),
            WriterConfig::new(48000, 1).with_chunk_samples(70000),
        ] {
            let err = config.validate().unwrap_err();
            assert!(matches!(
                err.downcast_ref::<StreamError>(),
                Some(StreamError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn chunk_capacity_fits_payload_field() {
        assert!(WriterConfig::new(48000, 1).with_chunk_samples(20000).validate().is_ok());
        assert!(WriterConfig::new(48000, 21).validate().is_ok());

        for config in [
            WriterConfig::new(48000, 2).with_chunk_samples(20000),
            WriterConfig::new(48000, 32).with_chunk_samples(1000),
        ] {
            let err = config.validate().unwrap_err();
            assert_eq!(
                err.downcast_ref::<StreamError>(),
                Some(&StreamError::InvalidConfig(
                    "a full chunk may not fit the 65535-byte payload field"
                ))
            );
        }
    }

    #[test]
    fn block_length() {
        let config = WriterConfig::new(48000, 2).with_chunk_samples(1000);
        assert_eq!(config.block_length(), 4000);
    }
}
