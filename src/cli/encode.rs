use std::fs::File;
use std::io::Write;
use std::time::Instant;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar};
use sud::config::{BYTES_PER_SAMPLE, WriterConfig};
use sud::process::write::SudWriter;

use super::command::{Cli, EncodeArgs};
use super::progress::create_progress_bar;
use crate::input::InputReader;
use crate::timestamp::time_str;

const READ_CHUNK_SIZE: usize = 64 * 1024;

pub fn cmd_encode(args: &EncodeArgs, _cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!(
        "Encoding raw PCM: {} ({} Hz, {} ch) -> {}",
        args.input.display(),
        args.sample_rate,
        args.channels,
        args.output.display()
    );

    let mut config = WriterConfig::new(args.sample_rate, args.channels)
        .with_chunk_samples(args.chunk_samples);
    if let Some(start_time_ms) = args.start_time_ms {
        config = config.with_start_time_ms(start_time_ms);
    }
    config.validate()?;

    let mut input = InputReader::new(&args.input)?;
    let pb = match multi {
        Some(multi) => Some(create_progress_bar(multi, input.size(), "encoding")?),
        None => None,
    };

    let mut writer = SudWriter::create(File::create(&args.output)?, config)?;
    let start_time = Instant::now();

    let trailing = encode_pcm(&mut input, &mut writer, pb.as_ref())?;
    if trailing > 0 {
        log::warn!("Ignoring {trailing} trailing bytes that do not form a whole frame");
    }

    let stats = writer.stats();
    writer.close()?;

    let duration = stats.samples_written as f64 / args.sample_rate as f64;
    let elapsed = start_time.elapsed().as_secs_f64();
    let message = format!(
        "{} chunks, {} | speed: {:.1}x",
        stats.chunks_written,
        time_str(duration),
        if elapsed > 0.0 { duration / elapsed } else { 0.0 }
    );
    match pb {
        Some(pb) => pb.finish_with_message(message),
        None => log::info!("Encoded {message}"),
    }

    if stats.samples_written == 0 {
        log::warn!("Input contained no samples; wrote header and metadata only");
    }

    log::info!(
        "Wrote {} bytes ({} samples per channel)",
        stats.bytes_written,
        stats.samples_written
    );
    Ok(())
}

/// Streams raw s16le PCM into `writer`. Samples are held back across reads so
/// that every chunk except the last carries the configured chunk size.
///
/// Returns the number of trailing bytes too short to form a whole frame.
fn encode_pcm<W: Write>(
    input: &mut InputReader,
    writer: &mut SudWriter<W>,
    pb: Option<&ProgressBar>,
) -> Result<usize> {
    let n_channels = writer.config().n_channels as usize;
    let frame_bytes = BYTES_PER_SAMPLE * n_channels;
    let chunk_len = writer.config().chunk_samples * n_channels;

    let mut pending: Vec<i16> = Vec::with_capacity(READ_CHUNK_SIZE / 2 + chunk_len);
    let mut trailing = 0;

    input.process_chunks(READ_CHUNK_SIZE, frame_bytes, |chunk| {
        if let Some(pb) = pb {
            pb.inc(chunk.len() as u64);
        }

        let whole = chunk.len() - chunk.len() % frame_bytes;
        trailing = chunk.len() - whole;

        pending.extend(
            chunk[..whole]
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]])),
        );

        let full = pending.len() - pending.len() % chunk_len;
        if full > 0 {
            writer.write_interleaved(&pending[..full])?;
            pending.drain(..full);
        }
        Ok(true)
    })?;

    if !pending.is_empty() {
        writer.write_interleaved(&pending)?;
    }

    Ok(trailing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use sud::process::read::SudReader;

    #[test]
    fn chunks_span_read_buffers() -> Result<()> {
        // 35500 stereo frames, well past one read buffer
        let samples: Vec<i16> = (0..71_000).map(|i| (i % 4000 - 2000) as i16).collect();
        let mut file = tempfile::NamedTempFile::new()?;
        for s in &samples {
            file.write_all(&s.to_le_bytes())?;
        }
        file.write_all(&[0x7F])?;
        file.flush()?;

        let config = WriterConfig::new(48000, 2)
            .with_chunk_samples(1000)
            .with_start_time_ms(0);
        let mut writer = SudWriter::create(Cursor::new(Vec::new()), config)?;
        let mut input = InputReader::new(file.path())?;
        assert_eq!(encode_pcm(&mut input, &mut writer, None)?, 1);
        let bytes = writer.into_inner()?.into_inner();

        let mut reader = SudReader::open(Cursor::new(bytes))?;
        let mut counts = Vec::new();
        let mut decoded = Vec::new();
        while let Some(frame) = reader.read_frame()? {
            counts.push(frame.sample_count);
            decoded.extend_from_slice(&frame.samples);
        }

        assert_eq!(counts.len(), 36);
        assert!(counts[..35].iter().all(|&n| n == 1000));
        assert_eq!(counts[35], 500);
        assert_eq!(decoded, samples);
        Ok(())
    }
}
