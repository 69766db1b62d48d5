use std::io::{BufReader, Read};

use anyhow::{Result, bail};
use log::debug;

use crate::codec::{FrameCodec, X3Codec};
use crate::config::ReaderOptions;
use crate::log_or_err;
use crate::process::frame::unpack_audio_frame;
use crate::structs::chunk::{Chunk, read_chunk};
use crate::structs::file_header::FileHeader;
use crate::structs::handler::{HandlerGraph, Route};
use crate::structs::metadata::decode_metadata_payload;
use crate::utils::errors::{CrcError, HandlerError, StreamError};

/// One decoded audio chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub chunk_id: u16,
    /// Samples per channel.
    pub sample_count: u16,
    pub time_seconds: i32,
    pub time_offset_micros: i32,
    /// Interleaved 16-bit PCM, `sample_count * n_channels` values.
    pub samples: Vec<i16>,
}

impl AudioFrame {
    /// Chunk time in microseconds since the Unix epoch.
    pub fn timestamp_micros(&self) -> i64 {
        self.time_seconds as i64 * 1_000_000 + self.time_offset_micros as i64
    }
}

/// Audio format declared by the stream's audio sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub n_channels: u16,
    pub bits_per_sample: u16,
}

/// Statistics about a stream being read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub chunks_read: u64,
    pub metadata_chunks: u64,
    pub chunks_skipped: u64,
    pub crc_mismatches: u64,
    /// Samples per channel.
    pub samples_decoded: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadStatus {
    Open,
    Finished,
    Aborted,
}

/// Reads a SUD stream.
///
/// Opening consumes the file header and the metadata chunks up to the point
/// where an audio sink and its decompressor are declared. Audio chunks are
/// then decoded one at a time by [`read_frame`](Self::read_frame) or by
/// iterating the reader. The first fatal error aborts the stream.
#[derive(Debug)]
pub struct SudReader<R: Read, C: FrameCodec = X3Codec> {
    reader: BufReader<R>,
    codec: C,
    options: ReaderOptions,
    header: FileHeader,
    graph: HandlerGraph,
    format: AudioFormat,
    stats: ReaderStats,
    status: ReadStatus,
}

impl<R: Read> SudReader<R> {
    pub fn open(reader: R) -> Result<Self> {
        Self::open_with(reader, ReaderOptions::default())
    }

    pub fn open_with(reader: R, options: ReaderOptions) -> Result<Self> {
        Self::with_codec(reader, options, X3Codec::new())
    }
}

impl<R: Read, C: FrameCodec> SudReader<R, C> {
    pub fn with_codec(reader: R, options: ReaderOptions, codec: C) -> Result<Self> {
        let mut reader = BufReader::new(reader);
        let header = FileHeader::read_from(&mut reader)?;

        let mut this = Self {
            reader,
            codec,
            options,
            header,
            graph: HandlerGraph::new(),
            format: AudioFormat {
                sample_rate: 0,
                n_channels: 0,
                bits_per_sample: 0,
            },
            stats: ReaderStats::default(),
            status: ReadStatus::Open,
        };

        this.format = this.read_metadata()?;

        debug!(
            "Opened SUD stream: {} Hz, {} ch, {} bits, {} handlers",
            this.format.sample_rate,
            this.format.n_channels,
            this.format.bits_per_sample,
            this.graph.len()
        );

        Ok(this)
    }

    /// Consumes metadata chunks until an audio path resolves.
    fn read_metadata(&mut self) -> Result<AudioFormat> {
        loop {
            if let Some(path) = self.graph.audio_path()? {
                return Ok(AudioFormat {
                    sample_rate: path.sink.sample_rate,
                    n_channels: path.decompressor.n_channels,
                    bits_per_sample: path.sink.n_bits,
                });
            }

            let Some(chunk) = read_chunk(&mut self.reader)? else {
                bail!(HandlerError::MissingAudioSink);
            };
            self.stats.chunks_read += 1;
            self.verify_crc(&chunk)?;

            match self.graph.route(chunk.header.chunk_id)? {
                Route::Metadata => self.merge_metadata(&chunk)?,
                Route::Ignored => self.stats.chunks_skipped += 1,
                Route::Audio(_) => bail!(HandlerError::MissingAudioSink),
            }
        }
    }

    fn merge_metadata(&mut self, chunk: &Chunk) -> Result<()> {
        let declarations = decode_metadata_payload(&chunk.payload, self.codec.ftype())?;
        for descriptor in &declarations.handlers {
            debug!(
                "Handler {}: {} (source {:?})",
                descriptor.id(),
                descriptor.kind(),
                descriptor.source()
            );
        }
        self.graph.merge(declarations)?;
        self.stats.metadata_chunks += 1;
        Ok(())
    }

    fn verify_crc(&mut self, chunk: &Chunk) -> Result<()> {
        let chunk_id = chunk.header.chunk_id;
        let checksums = &self.options.checksums;

        let computed = chunk.computed_data_crc(checksums);
        if computed != chunk.header.data_crc {
            self.stats.crc_mismatches += 1;
            log_or_err!(
                self.options,
                log::Level::Warn,
                CrcError::DataMismatch {
                    chunk_id,
                    stored: chunk.header.data_crc,
                    computed,
                }
            );
        }

        let computed = chunk.computed_header_crc(&self.options.checksums);
        if computed != chunk.header.header_crc {
            self.stats.crc_mismatches += 1;
            log_or_err!(
                self.options,
                log::Level::Warn,
                CrcError::HeaderMismatch {
                    chunk_id,
                    stored: chunk.header.header_crc,
                    computed,
                }
            );
        }

        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<AudioFrame>> {
        loop {
            let Some(chunk) = read_chunk(&mut self.reader)? else {
                return Ok(None);
            };
            self.stats.chunks_read += 1;
            self.verify_crc(&chunk)?;

            let header = &chunk.header;
            let n_channels = match self.graph.route(header.chunk_id)? {
                Route::Metadata => {
                    self.merge_metadata(&chunk)?;
                    continue;
                }
                Route::Ignored => {
                    debug!("Skipping chunk for handler {}", header.chunk_id);
                    self.stats.chunks_skipped += 1;
                    continue;
                }
                Route::Audio(path) => path.decompressor.n_channels as usize,
            };

            let n_samples = header.sample_count as usize;
            let samples = unpack_audio_frame(&mut self.codec, &chunk.payload, n_channels, n_samples)?;
            self.stats.samples_decoded += n_samples as u64;

            return Ok(Some(AudioFrame {
                chunk_id: header.chunk_id,
                sample_count: header.sample_count,
                time_seconds: header.time_seconds,
                time_offset_micros: header.time_offset_micros,
                samples,
            }));
        }
    }

    /// Decodes the next audio chunk. Returns `Ok(None)` at end of stream.
    ///
    /// Metadata chunks met on the way are merged into the handler graph and
    /// chunks for unsupported handlers are skipped.
    pub fn read_frame(&mut self) -> Result<Option<AudioFrame>> {
        match self.status {
            ReadStatus::Finished => return Ok(None),
            ReadStatus::Aborted => bail!(StreamError::Aborted),
            ReadStatus::Open => {}
        }

        match self.next_frame() {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => {
                debug!(
                    "End of SUD stream: {} chunks, {} samples",
                    self.stats.chunks_read, self.stats.samples_decoded
                );
                self.status = ReadStatus::Finished;
                Ok(None)
            }
            Err(e) => {
                self.status = ReadStatus::Aborted;
                Err(e)
            }
        }
    }

    /// Decodes every remaining audio chunk into one interleaved buffer.
    pub fn read_to_end(&mut self) -> Result<Vec<i16>> {
        let mut samples = Vec::new();
        while let Some(frame) = self.read_frame()? {
            samples.extend_from_slice(&frame.samples);
        }
        Ok(samples)
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn handlers(&self) -> &HandlerGraph {
        &self.graph
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.status != ReadStatus::Open
    }

    /// Returns the source. Bytes already buffered by the reader are lost.
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}

impl<R: Read, C: FrameCodec> Iterator for SudReader<R, C> {
    type Item = Result<AudioFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.status == ReadStatus::Aborted {
            return None;
        }
        self.read_frame().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::x3::X3_FTYPE;
    use crate::config::{AUDIO_SINK_ID, WriterConfig, XML_CHUNK_ID};
    use crate::endian::SudLayout;
    use crate::process::write::SudWriter;
    use crate::structs::chunk::{ChunkHeader, write_chunk};
    use crate::structs::handler::{HandlerDescriptor, stream_handlers};
    use crate::structs::metadata::{encode_metadata_payload, to_xml};
    use crate::utils::crc::Checksums;
    use crate::utils::errors::{ChunkError, CodecError};
    use std::io::Cursor;

    fn encoded(samples: &[i16], config: WriterConfig) -> Result<Vec<u8>> {
        let mut writer = SudWriter::create(Cursor::new(Vec::new()), config)?;
        writer.write_interleaved(samples)?;
        Ok(writer.into_inner()?.into_inner())
    }

    fn config() -> WriterConfig {
        WriterConfig::new(48000, 1)
            .with_chunk_samples(100)
            .with_start_time_ms(1_000)
    }

    /// File header plus one metadata chunk per descriptor.
    fn preamble(descriptors: &[HandlerDescriptor]) -> Result<Vec<u8>> {
        let mut bytes = FileHeader::for_stream(&config()).to_sud_bytes();
        for descriptor in descriptors {
            let payload = encode_metadata_payload(&to_xml(descriptor));
            write_chunk(&mut bytes, &Checksums::default(), XML_CHUNK_ID, &payload, 0, 0, 0)?;
        }
        Ok(bytes)
    }

    /// Offset of the first audio chunk header.
    fn first_audio_chunk(bytes: &[u8]) -> usize {
        let mut offset = FileHeader::SIZE;
        loop {
            let header = ChunkHeader::read_sud(&bytes[offset..]);
            if header.chunk_id == AUDIO_SINK_ID {
                return offset;
            }
            offset += ChunkHeader::SIZE + header.data_length as usize;
        }
    }

    #[test]
    fn reads_back_frames() -> Result<()> {
        let samples: Vec<i16> = (0..250).map(|i| (i * 100) as i16).collect();
        let bytes = encoded(&samples, config())?;

        let mut reader = SudReader::open(Cursor::new(bytes))?;
        assert_eq!(
            reader.format(),
            AudioFormat {
                sample_rate: 48000,
                n_channels: 1,
                bits_per_sample: 16
            }
        );

        let frames: Vec<AudioFrame> = reader.by_ref().collect::<Result<_>>()?;
        assert_eq!(
            frames.iter().map(|f| f.sample_count).collect::<Vec<_>>(),
            [100, 100, 50]
        );
        assert_eq!(frames[1].timestamp_micros(), 1_000_000 + 2083);
        let decoded: Vec<i16> = frames.iter().flat_map(|f| f.samples.clone()).collect();
        assert_eq!(decoded, samples);

        assert!(reader.read_frame()?.is_none());
        let stats = reader.stats();
        assert_eq!(stats.metadata_chunks, 2);
        assert_eq!(stats.samples_decoded, 250);
        assert_eq!(stats.crc_mismatches, 0);
        Ok(())
    }

    #[test]
    fn corrupted_data_crc() -> Result<()> {
        let samples: Vec<i16> = (0..100).map(|i| (i * 7) as i16).collect();
        let mut bytes = encoded(&samples, config())?;
        let offset = first_audio_chunk(&bytes);
        bytes[offset + 16] ^= 0xFF;

        let mut lenient = SudReader::open(Cursor::new(bytes.clone()))?;
        assert_eq!(lenient.read_to_end()?, samples);
        assert!(lenient.stats().crc_mismatches > 0);

        let mut strict = SudReader::open_with(Cursor::new(bytes), ReaderOptions::strict())?;
        let err = strict.read_frame().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrcError>(),
            Some(CrcError::DataMismatch { chunk_id: 2, .. })
        ));

        let err = strict.read_frame().unwrap_err();
        assert_eq!(err.downcast_ref::<StreamError>(), Some(&StreamError::Aborted));
        assert!(strict.next().is_none());
        Ok(())
    }

    #[test]
    fn bad_magic_aborts() -> Result<()> {
        let mut bytes = encoded(&[1, 2, 3], config())?;
        let offset = first_audio_chunk(&bytes);
        bytes[offset] = 0;

        let mut reader = SudReader::open(Cursor::new(bytes))?;
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChunkError>(),
            Some(ChunkError::BadMagic { .. })
        ));
        Ok(())
    }

    #[test]
    fn missing_metadata() -> Result<()> {
        let header = FileHeader::for_stream(&config());
        let checksums = Checksums::default();

        let mut bytes = header.to_sud_bytes();
        let err = SudReader::open(Cursor::new(bytes.clone())).unwrap_err();
        assert_eq!(
            err.downcast_ref::<HandlerError>(),
            Some(&HandlerError::MissingAudioSink)
        );

        write_chunk(&mut bytes, &checksums, AUDIO_SINK_ID, &[0, 0], 1, 0, 0)?;
        let err = SudReader::open(Cursor::new(bytes)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<HandlerError>(),
            Some(&HandlerError::Undeclared(AUDIO_SINK_ID))
        );
        Ok(())
    }

    #[test]
    fn skips_unsupported_handlers() -> Result<()> {
        let samples = [5i16, 6, 7];
        let mut bytes = encoded(&samples, config())?;
        let checksums = Checksums::default();

        let xml = "<SUDAR><CFG ID=\"9\" FTYPE=\"csv\"></CFG></SUDAR>";
        write_chunk(&mut bytes, &checksums, XML_CHUNK_ID, &encode_metadata_payload(xml), 0, 0, 0)?;
        write_chunk(&mut bytes, &checksums, 9, &[1, 2, 3, 4], 0, 0, 0)?;

        let mut reader = SudReader::open(Cursor::new(bytes))?;
        assert_eq!(reader.read_to_end()?, samples);
        assert_eq!(reader.stats().chunks_skipped, 1);
        assert_eq!(reader.handlers().ignored().collect::<Vec<_>>(), [9]);
        Ok(())
    }

    #[test]
    fn oversized_frame_is_rejected() -> Result<()> {
        let handlers = stream_handlers(&WriterConfig::new(48000, u16::MAX), X3_FTYPE, 20)?;
        let mut bytes = preamble(&handlers)?;
        write_chunk(&mut bytes, &Checksums::default(), AUDIO_SINK_ID, &[0, 0], u16::MAX, 0, 0)?;

        let mut reader = SudReader::open(Cursor::new(bytes))?;
        assert_eq!(reader.format().n_channels, u16::MAX);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CodecError>(),
            Some(CodecError::FrameTooShort { bytes: 2, .. })
        ));
        Ok(())
    }

    #[test]
    fn sink_channels_must_match_decompressor() -> Result<()> {
        let [decompressor, _] = stream_handlers(&WriterConfig::new(48000, 2), X3_FTYPE, 20)?;
        let [_, sink] = stream_handlers(&WriterConfig::new(48000, 1), X3_FTYPE, 20)?;
        let bytes = preamble(&[decompressor, sink])?;

        let Err(err) = SudReader::open(Cursor::new(bytes)) else {
            panic!("mismatched channel counts accepted");
        };
        assert_eq!(
            err.downcast_ref::<HandlerError>(),
            Some(&HandlerError::ChannelMismatch {
                id: AUDIO_SINK_ID,
                sink_channels: 1,
                decompressor_channels: 2,
            })
        );
        Ok(())
    }
}
