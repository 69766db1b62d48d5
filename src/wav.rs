use std::io::{self, BufWriter, Seek, SeekFrom, Write};

pub const RIFF_ID: [u8; 4] = *b"RIFF";
pub const WAVE_ID: [u8; 4] = *b"WAVE";
pub const FMT_ID: [u8; 4] = *b"fmt ";
pub const DATA_ID: [u8; 4] = *b"data";

const HEADER_SIZE: u64 = 44;

/// RIFF WAVE file writer for 16-bit PCM audio
pub struct WAVWriter<W: Write + Seek> {
    writer: BufWriter<W>,
    data_size_position: u64,
    data_written: u64,
    sample_rate: u32,
    channels: u16,
    header_written: bool,
}

impl<W: Write + Seek> WAVWriter<W> {
    /// Create a new WAV writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            data_size_position: 0,
            data_written: 0,
            sample_rate: 48000,
            channels: 1,
            header_written: false,
        }
    }

    /// Configure audio format parameters
    pub fn configure_audio_format(&mut self, sample_rate: u32, channels: u16) -> io::Result<()> {
        if self.header_written {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Cannot change format after writing the header",
            ));
        }

        self.sample_rate = sample_rate;
        self.channels = channels;
        Ok(())
    }

    /// Write the RIFF header with placeholder sizes
    pub fn write_header(&mut self) -> io::Result<()> {
        let block_align = self.channels * 2;
        let byte_rate = self.sample_rate * block_align as u32;

        self.writer.write_all(&RIFF_ID)?;
        self.writer.write_all(&0u32.to_le_bytes())?; // RIFF size (to be updated later)
        self.writer.write_all(&WAVE_ID)?;

        self.writer.write_all(&FMT_ID)?;
        self.writer.write_all(&16u32.to_le_bytes())?;
        self.writer.write_all(&1u16.to_le_bytes())?; // PCM format
        self.writer.write_all(&self.channels.to_le_bytes())?;
        self.writer.write_all(&self.sample_rate.to_le_bytes())?;
        self.writer.write_all(&byte_rate.to_le_bytes())?;
        self.writer.write_all(&block_align.to_le_bytes())?;
        self.writer.write_all(&16u16.to_le_bytes())?;

        self.writer.write_all(&DATA_ID)?;
        self.data_size_position = self.writer.stream_position()?;
        self.writer.write_all(&0u32.to_le_bytes())?; // Data size (to be updated later)

        self.header_written = true;
        Ok(())
    }

    /// Write interleaved 16-bit samples
    pub fn write_pcm_16bit(&mut self, samples: &[i16]) -> io::Result<()> {
        for &sample in samples {
            self.writer.write_all(&sample.to_le_bytes())?;
        }
        self.data_written += samples.len() as u64 * 2;
        Ok(())
    }

    /// Finish writing and update size fields
    pub fn finish(&mut self) -> io::Result<()> {
        // RIFF sizes are 32-bit; larger files keep the saturated value
        let data_size = u32::try_from(self.data_written).unwrap_or(u32::MAX);
        let riff_size = u32::try_from(self.data_written + HEADER_SIZE - 8).unwrap_or(u32::MAX);

        self.writer.flush()?;
        let current_pos = self.writer.stream_position()?;

        self.writer.seek(SeekFrom::Start(self.data_size_position))?;
        self.writer.write_all(&data_size.to_le_bytes())?;

        self.writer.seek(SeekFrom::Start(4))?;
        self.writer.write_all(&riff_size.to_le_bytes())?;

        // Return to end of file
        self.writer.seek(SeekFrom::Start(current_pos))?;
        self.writer.flush()?;

        Ok(())
    }

    /// Get the underlying writer
    pub fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }

    /// Get statistics about written data
    pub fn stats(&self) -> WAVStats {
        WAVStats {
            data_written: self.data_written,
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}

/// Statistics about WAV file writing
#[derive(Debug, Clone)]
pub struct WAVStats {
    pub data_written: u64,
    pub sample_rate: u32,
    pub channels: u16,
}
