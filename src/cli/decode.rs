use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use indicatif::MultiProgress;
use sud::config::ReaderOptions;
use sud::process::read::SudReader;

use super::command::{AudioFormat, Cli, DecodeArgs};
use super::progress::create_progress_bar;
use crate::input::InputReader;
use crate::timestamp::time_str;
use crate::wav::WAVWriter;

fn create_path_with_extension(base_path: &Path, expected_ext: &str) -> PathBuf {
    match base_path.extension() {
        Some(existing_ext) if existing_ext == expected_ext => base_path.to_path_buf(),
        Some(_) => {
            let mut name = base_path.as_os_str().to_owned();
            name.push(".");
            name.push(expected_ext);
            PathBuf::from(name)
        }
        None => base_path.with_extension(expected_ext),
    }
}

enum AudioWriter {
    Pcm(BufWriter<File>),
    Wav(WAVWriter<File>),
}

impl AudioWriter {
    fn create(path: &Path, format: AudioFormat, sample_rate: u32, channels: u16) -> Result<Self> {
        log::info!("Creating audio file: {}", path.display());
        let file = File::create(path)?;

        Ok(match format {
            AudioFormat::Wav => {
                let mut wav_writer = WAVWriter::new(file);
                wav_writer.configure_audio_format(sample_rate, channels)?;
                wav_writer.write_header()?;
                AudioWriter::Wav(wav_writer)
            }
            AudioFormat::Pcm => AudioWriter::Pcm(BufWriter::new(file)),
        })
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        match self {
            AudioWriter::Wav(wav_writer) => wav_writer.write_pcm_16bit(samples)?,
            AudioWriter::Pcm(pcm_writer) => {
                for sample in samples {
                    pcm_writer.write_all(&sample.to_le_bytes())?;
                }
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        match self {
            AudioWriter::Wav(wav_writer) => wav_writer.finish()?,
            AudioWriter::Pcm(pcm_writer) => pcm_writer.flush()?,
        }
        Ok(())
    }
}

pub fn cmd_decode(args: &DecodeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!(
        "Decoding SUD stream: {} (strict mode: {})",
        args.input.display(),
        cli.strict
    );

    let input = InputReader::new(&args.input)?;
    let pb = match multi {
        Some(multi) => Some(create_progress_bar(multi, input.size(), "decoding")?),
        None => None,
    };

    let options = ReaderOptions {
        fail_level: cli.fail_level(),
        ..ReaderOptions::default()
    };
    let source: Box<dyn std::io::Read> = match pb {
        Some(ref pb) => Box::new(pb.wrap_read(input)),
        None => Box::new(input),
    };
    let mut reader = SudReader::open_with(source, options)?;
    let format = reader.format();

    let mut audio_writer = match &args.output_path {
        Some(base_path) => {
            let ext = match args.format {
                AudioFormat::Wav => "wav",
                AudioFormat::Pcm => "pcm",
            };
            let path = create_path_with_extension(base_path, ext);
            Some(AudioWriter::create(
                &path,
                args.format,
                format.sample_rate,
                format.n_channels,
            )?)
        }
        None => {
            log::info!("No output path given; decoding for verification only");
            None
        }
    };

    let start_time = Instant::now();
    let mut first_time = None;
    let mut decoded_frames = 0u64;

    let result = (|| -> Result<()> {
        while let Some(frame) = reader.read_frame()? {
            first_time.get_or_insert((frame.time_seconds, frame.time_offset_micros));
            if let Some(ref mut writer) = audio_writer {
                writer.write(&frame.samples)?;
            }

            decoded_frames += 1;
            if decoded_frames.is_multiple_of(50) {
                if let Some(ref pb) = pb {
                    let stats = reader.stats();
                    let duration = stats.samples_decoded as f64 / format.sample_rate as f64;
                    let elapsed = start_time.elapsed().as_secs_f64();
                    pb.set_message(format!(
                        "speed: {:.1}x | timestamp: {}",
                        duration / elapsed.max(f64::EPSILON),
                        time_str(duration)
                    ));
                }
            }
        }
        Ok(())
    })();

    if let Some(ref mut writer) = audio_writer {
        writer.finish()?;
    }

    let stats = reader.stats();
    let duration = stats.samples_decoded as f64 / format.sample_rate as f64;
    if let Err(e) = result {
        if let Some(ref pb) = pb {
            pb.finish_with_message("decode failed");
        }
        return Err(e);
    }

    if let Some(ref pb) = pb {
        pb.finish_with_message(format!("decoded {}", time_str(duration)));
    }

    if let Some((seconds, micros)) = first_time {
        log::debug!(
            "First chunk at {}",
            crate::timestamp::utc_str(seconds as i64, micros as i64)
        );
    }
    if stats.crc_mismatches > 0 {
        log::warn!("{} CRC mismatches tolerated", stats.crc_mismatches);
    }
    log::info!(
        "Decoding completed: {} chunks, {} samples per channel ({})",
        decoded_frames,
        stats.samples_decoded,
        time_str(duration)
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_extensions() {
        assert_eq!(
            create_path_with_extension(Path::new("out"), "wav"),
            PathBuf::from("out.wav")
        );
        assert_eq!(
            create_path_with_extension(Path::new("out.wav"), "wav"),
            PathBuf::from("out.wav")
        );
        assert_eq!(
            create_path_with_extension(Path::new("dir/out.v1"), "pcm"),
            PathBuf::from("dir/out.v1.pcm")
        );
    }
}
