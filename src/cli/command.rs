use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};

#[derive(Debug, ClapParser)]
#[command(
    name         = env!("CARGO_PKG_NAME"),
    version      = env!("CARGO_PKG_VERSION"),
    long_version = concat!(
        env!("CARGO_PKG_VERSION"), "\n",
        "sud ", env!("SUD_VERSION"), "\n",
        "built ", env!("BUILD_TIMESTAMP"),
    ),
    author       = env!("CARGO_PKG_AUTHORS"),
    about        = "Tools for encoding, decoding and inspecting SUD acoustic recordings",
    long_about   = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat CRC mismatches as fatal errors.
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Reader fail level selected by `--strict`.
    pub fn fail_level(&self) -> log::Level {
        if self.strict {
            log::Level::Warn
        } else {
            log::Level::Error
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compress raw 16-bit PCM into a SUD file.
    Encode(EncodeArgs),

    /// Decode a SUD file into PCM audio.
    Decode(DecodeArgs),

    /// Print file information
    Info(InfoArgs),
}

#[derive(Debug, Args)]
pub struct EncodeArgs {
    /// Raw interleaved signed 16-bit little-endian PCM (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output SUD file.
    #[arg(long, short, value_name = "PATH")]
    pub output: PathBuf,

    /// Sample rate in Hz.
    #[arg(long, value_name = "HZ")]
    pub sample_rate: u32,

    /// Number of interleaved channels.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub channels: u16,

    /// Samples per channel in each audio chunk.
    #[arg(long, value_name = "N", default_value_t = sud::config::DEFAULT_CHUNK_SAMPLES)]
    pub chunk_samples: usize,

    /// Recording start time in milliseconds since the Unix epoch (defaults to now).
    #[arg(long, value_name = "MS")]
    pub start_time_ms: Option<i64>,
}

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Input SUD file (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output path for the decoded audio.
    #[arg(long, value_name = "PATH")]
    pub output_path: Option<PathBuf>,

    /// Audio format for output.
    #[arg(long, value_enum, default_value_t = AudioFormat::Wav)]
    pub format: AudioFormat,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input SUD file (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Report format.
    #[arg(long, value_enum, default_value_t = InfoFormat::Text)]
    pub format: InfoFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum AudioFormat {
    /// RIFF WAVE, 16-bit PCM.
    Wav,
    /// Raw PCM format (16-bit little-endian).
    Pcm,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum InfoFormat {
    /// Human-readable report.
    Text,
    /// YAML document.
    Yaml,
}
