use std::io::{BufWriter, Write};

use anyhow::{Result, bail, ensure};
use log::{debug, warn};

use crate::codec::{FrameCodec, X3Codec, scratch_capacity};
use crate::config::{AUDIO_SINK_ID, MAX_CHUNK_SAMPLES, WriterConfig, XML_CHUNK_ID};
use crate::process::frame::{FrameClock, pack_audio_frame};
use crate::structs::chunk::write_chunk;
use crate::structs::file_header::FileHeader;
use crate::structs::handler::stream_handlers;
use crate::structs::metadata::{encode_metadata_payload, to_xml};
use crate::utils::errors::StreamError;

/// Statistics about a stream being written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub chunks_written: u64,
    /// Samples per channel.
    pub samples_written: u64,
    /// Bytes emitted including the file header and metadata chunks.
    pub bytes_written: u64,
}

/// Writes a SUD stream.
///
/// The file header and both metadata chunks are written by [`create`](Self::create);
/// each [`write`](Self::write) then emits one audio chunk. Dropping the writer
/// flushes what was written, but only [`close`](Self::close) reports errors.
pub struct SudWriter<W: Write, C: FrameCodec = X3Codec> {
    writer: Option<BufWriter<W>>,
    config: WriterConfig,
    codec: C,
    clock: FrameClock,
    scratch: Vec<u8>,
    stats: WriterStats,
}

impl<W: Write> SudWriter<W> {
    /// Opens a stream compressed with [`X3Codec`].
    pub fn create(writer: W, config: WriterConfig) -> Result<Self> {
        Self::with_codec(writer, config, X3Codec::new())
    }
}

impl<W: Write, C: FrameCodec> SudWriter<W, C> {
    pub fn with_codec(writer: W, config: WriterConfig, codec: C) -> Result<Self> {
        config.validate()?;

        let mut this = Self {
            writer: Some(BufWriter::new(writer)),
            clock: FrameClock::new(config.start_time_ms, config.sample_rate),
            scratch: vec![0u8; scratch_capacity(config.n_channels as usize, config.chunk_samples)],
            config,
            codec,
            stats: WriterStats::default(),
        };
        this.write_preamble()?;

        debug!(
            "Opened SUD stream: {} Hz, {} ch, {} samples/chunk, codec {}",
            this.config.sample_rate,
            this.config.n_channels,
            this.config.chunk_samples,
            this.codec.ftype()
        );

        Ok(this)
    }

    fn write_preamble(&mut self) -> Result<()> {
        let header = FileHeader::for_stream(&self.config);
        let handlers = stream_handlers(
            &self.config,
            self.codec.ftype(),
            self.codec.block_samples(),
        )?;
        let time_seconds = header.host_time;

        let Some(writer) = self.writer.as_mut() else {
            bail!(StreamError::Closed);
        };

        header.write_to(writer)?;
        self.stats.bytes_written += FileHeader::SIZE as u64;

        for descriptor in &handlers {
            let payload = encode_metadata_payload(&to_xml(descriptor));
            self.stats.bytes_written += write_chunk(
                writer,
                &self.config.checksums,
                XML_CHUNK_ID,
                &payload,
                0,
                time_seconds,
                0,
            )? as u64;
        }

        Ok(())
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    pub fn stats(&self) -> WriterStats {
        self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    /// Writes `n_samples` samples per channel from the interleaved `samples`
    /// as one audio chunk.
    ///
    /// Rejected before any I/O when `n_samples` is zero or above 65535, or when
    /// `samples` is too short.
    pub fn write(&mut self, samples: &[i16], n_samples: usize) -> Result<()> {
        ensure!(self.writer.is_some(), StreamError::Closed);
        ensure!(n_samples > 0, StreamError::ZeroSamples);
        ensure!(
            n_samples <= MAX_CHUNK_SAMPLES,
            StreamError::TooManySamples(n_samples)
        );

        let n_channels = self.config.n_channels as usize;
        let required = n_samples * n_channels;
        ensure!(
            samples.len() >= required,
            StreamError::SampleBufferTooShort {
                expected: required,
                actual: samples.len(),
            }
        );

        let capacity = scratch_capacity(n_channels, n_samples);
        let payload = pack_audio_frame(
            &mut self.codec,
            &samples[..required],
            &mut self.scratch,
            n_channels,
            n_samples,
            capacity,
        )?;

        let time = self.clock.timestamp();
        let Some(writer) = self.writer.as_mut() else {
            bail!(StreamError::Closed);
        };
        self.stats.bytes_written += write_chunk(
            writer,
            &self.config.checksums,
            AUDIO_SINK_ID,
            &payload,
            n_samples as u16,
            time.seconds,
            time.offset_micros,
        )? as u64;

        self.clock.advance(n_samples);
        self.stats.chunks_written += 1;
        self.stats.samples_written += n_samples as u64;

        Ok(())
    }

    /// Splits interleaved `samples` into chunks of the configured capacity.
    /// A trailing partial frame (fewer values than channels) is rejected.
    pub fn write_interleaved(&mut self, samples: &[i16]) -> Result<()> {
        let n_channels = self.config.n_channels as usize;
        ensure!(
            samples.len() % n_channels == 0,
            "{} samples do not divide into {n_channels} channels",
            samples.len()
        );
        ensure!(!samples.is_empty(), StreamError::ZeroSamples);

        for chunk in samples.chunks(self.config.chunk_samples * n_channels) {
            self.write(chunk, chunk.len() / n_channels)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        match self.writer.as_mut() {
            Some(writer) => Ok(writer.flush()?),
            None => bail!(StreamError::Closed),
        }
    }

    /// Flushes and releases the sink. Closing twice is a no-op; writing after
    /// close fails with [`StreamError::Closed`].
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            debug!(
                "Closed SUD stream: {} chunks, {} samples, {} bytes",
                self.stats.chunks_written, self.stats.samples_written, self.stats.bytes_written
            );
        }
        Ok(())
    }

    /// Flushes and returns the sink.
    pub fn into_inner(mut self) -> Result<W> {
        match self.writer.take() {
            Some(writer) => Ok(writer.into_inner().map_err(|e| e.into_error())?),
            None => bail!(StreamError::Closed),
        }
    }
}

impl<W: Write, C: FrameCodec> Drop for SudWriter<W, C> {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush SUD stream on drop: {e}");
            }
        }
    }
}
