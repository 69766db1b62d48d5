use std::fs::File;
use std::path::Path;

use anyhow::Result;
use sud::config::WriterConfig;
use sud::process::read::{AudioFormat, SudReader};
use sud::process::write::SudWriter;

fn write_file(path: &Path, config: WriterConfig, samples: &[i16]) -> Result<()> {
    let mut writer = SudWriter::create(File::create(path)?, config)?;
    writer.write_interleaved(samples)?;
    writer.close()
}

fn read_file(path: &Path) -> Result<(AudioFormat, Vec<i16>)> {
    let mut reader = SudReader::open(File::open(path)?)?;
    let samples = reader.read_to_end()?;
    Ok((reader.format(), samples))
}

#[test]
fn mono_ramp() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("mono.sud");

    let samples: Vec<i16> = (0..3000).map(|i| (i % 32768) as i16).collect();
    let config = WriterConfig::new(48000, 1).with_chunk_samples(1000);
    write_file(&path, config, &samples)?;

    let (format, decoded) = read_file(&path)?;
    assert_eq!(format.sample_rate, 48000);
    assert_eq!(format.n_channels, 1);
    assert_eq!(decoded, samples);
    Ok(())
}

#[test]
fn stereo_interleaving() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("stereo.sud");

    let samples: Vec<i16> = (0..2000i16).flat_map(|i| [i, -i]).collect();
    write_file(&path, WriterConfig::new(96000, 2), &samples)?;

    let (format, decoded) = read_file(&path)?;
    assert_eq!(format.n_channels, 2);
    assert_eq!(decoded.len(), 4000);
    assert!(decoded.chunks_exact(2).all(|frame| frame[0] == -frame[1]));
    assert_eq!(decoded, samples);
    Ok(())
}

#[test]
fn sine_is_lossless() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("sine.sud");

    let samples: Vec<i16> = (0..4000)
        .map(|i| {
            let t = i as f64 / 44100.0;
            (8000.0 * (2.0 * std::f64::consts::PI * 1000.0 * t).sin()).round() as i16
        })
        .collect();
    write_file(&path, WriterConfig::new(44100, 1), &samples)?;

    let (_, decoded) = read_file(&path)?;
    assert_eq!(decoded, samples);
    Ok(())
}

#[test]
fn format_metadata() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("format.sud");

    let config = WriterConfig::new(192000, 2).with_chunk_samples(500);
    write_file(&path, config, &vec![0i16; 2 * 1234])?;

    let reader = SudReader::open(File::open(&path)?)?;
    assert_eq!(
        reader.format(),
        AudioFormat {
            sample_rate: 192000,
            n_channels: 2,
            bits_per_sample: 16
        }
    );
    assert_eq!(reader.header().block_length, 500 * 2 * 2);
    assert_eq!(reader.header().no_of_blocks, 0);
    Ok(())
}

#[test]
fn closed_output_is_openable() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("empty.sud");

    let mut writer = SudWriter::create(File::create(&path)?, WriterConfig::new(8000, 1))?;
    writer.close()?;

    assert!(std::fs::metadata(&path)?.len() > 0);
    let (_, decoded) = read_file(&path)?;
    assert!(decoded.is_empty());
    Ok(())
}

#[test]
fn dropped_writer_leaves_a_valid_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("dropped.sud");

    {
        let mut writer = SudWriter::create(File::create(&path)?, WriterConfig::new(16000, 1))?;
        writer.write(&[1, 2, 3, 4], 4)?;
    }

    let (_, decoded) = read_file(&path)?;
    assert_eq!(decoded, [1, 2, 3, 4]);
    Ok(())
}

#[test]
fn arbitrary_chunk_sizes() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("sizes.sud");

    let mut state = 0x1234_5678u32;
    let samples: Vec<i16> = (0..3 * 5000)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 16) as i16
        })
        .collect();

    let mut writer = SudWriter::create(File::create(&path)?, WriterConfig::new(22050, 3))?;
    let mut offset = 0;
    for n in [1, 19, 20, 21, 999, 3940] {
        writer.write(&samples[offset * 3..], n)?;
        offset += n;
    }
    assert_eq!(offset, 5000);
    writer.close()?;

    let mut reader = SudReader::open(File::open(&path)?)?;
    let counts: Vec<u16> = reader
        .by_ref()
        .map(|frame| frame.map(|f| f.sample_count))
        .collect::<Result<_>>()?;
    assert_eq!(counts, [1, 19, 20, 21, 999, 3940]);
    assert_eq!(reader.stats().samples_decoded, 5000);

    let (_, decoded) = read_file(&path)?;
    assert_eq!(decoded, samples);
    Ok(())
}
