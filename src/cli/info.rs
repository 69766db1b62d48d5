use anyhow::Result;
use indicatif::MultiProgress;
use serde::Serialize;
use sud::config::ReaderOptions;
use sud::process::read::SudReader;
use sud::structs::file_header::FileHeader;
use sud::structs::handler::{HandlerDescriptor, HandlerGraph, HandlerKind};

use super::command::{Cli, InfoArgs, InfoFormat};
use super::progress::create_progress_bar;
use crate::input::InputReader;
use crate::timestamp::{time_str, utc_str};

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing SUD stream: {}", args.input.display());

    let report = analyze_stream(args, cli, multi)?;

    match args.format {
        InfoFormat::Text => display_report(&report),
        InfoFormat::Yaml => print!("{}", serde_yaml_ng::to_string(&report)?),
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct InfoReport {
    input: String,
    header: HeaderInfo,
    handlers: Vec<HandlerInfo>,
    ignored_handlers: Vec<u16>,
    format: FormatInfo,
    chunks: ChunkInfo,
    samples_per_channel: u64,
    duration: String,
    first_chunk_time: Option<String>,
    last_chunk_time: Option<String>,
}

#[derive(Debug, Serialize)]
struct HeaderInfo {
    host_code_version: u16,
    host_time: String,
    device_type: u8,
    device_code_version: u8,
    device_time: String,
    device_identifier: i32,
    block_length: i32,
    no_of_blocks: i32,
}

impl From<&FileHeader> for HeaderInfo {
    fn from(header: &FileHeader) -> Self {
        Self {
            host_code_version: header.host_code_version,
            host_time: utc_str(header.host_time as i64, 0),
            device_type: header.device_type,
            device_code_version: header.device_code_version,
            device_time: utc_str(header.device_time as i64, 0),
            device_identifier: header.device_identifier,
            block_length: header.block_length,
            no_of_blocks: header.no_of_blocks,
        }
    }
}

#[derive(Debug, Serialize)]
struct HandlerInfo {
    id: u16,
    source: Option<u16>,
    kind: &'static str,
    ftype: String,
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
}

impl From<&HandlerDescriptor> for HandlerInfo {
    fn from(descriptor: &HandlerDescriptor) -> Self {
        let (kind, ftype, sample_rate, channels, bits_per_sample) = match descriptor.kind() {
            HandlerKind::Decompressor(p) => (
                "decompressor",
                p.ftype.clone(),
                p.sample_rate,
                p.n_channels,
                p.n_bits,
            ),
            HandlerKind::AudioSink(p) => (
                "audio_sink",
                p.suffix.clone(),
                p.sample_rate,
                p.n_channels,
                p.n_bits,
            ),
        };

        Self {
            id: descriptor.id(),
            source: descriptor.source(),
            kind,
            ftype,
            sample_rate,
            channels,
            bits_per_sample,
        }
    }
}

fn handler_infos(graph: &HandlerGraph) -> Vec<HandlerInfo> {
    graph.handlers().map(HandlerInfo::from).collect()
}

#[derive(Debug, Serialize)]
struct FormatInfo {
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
}

#[derive(Debug, Serialize)]
struct ChunkInfo {
    total: u64,
    metadata: u64,
    audio: u64,
    skipped: u64,
    crc_mismatches: u64,
}

fn analyze_stream(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<InfoReport> {
    let input = InputReader::new(&args.input)?;
    let pb = match multi {
        Some(multi) => Some(create_progress_bar(multi, input.size(), "analyzing chunks")?),
        None => None,
    };

    let source: Box<dyn std::io::Read> = match pb {
        Some(ref pb) => Box::new(pb.wrap_read(input)),
        None => Box::new(input),
    };
    let options = ReaderOptions {
        fail_level: cli.fail_level(),
        ..ReaderOptions::default()
    };
    let mut reader = SudReader::open_with(source, options)?;

    let mut first_time = None;
    let mut last_time = None;
    let mut audio_chunks = 0u64;

    while let Some(frame) = reader.read_frame()? {
        let time = (frame.time_seconds as i64, frame.time_offset_micros as i64);
        first_time.get_or_insert(time);
        last_time = Some(time);
        audio_chunks += 1;
    }

    if let Some(ref pb) = pb {
        pb.finish_and_clear();
    }

    let format = reader.format();
    let stats = reader.stats();
    let duration_secs = stats.samples_decoded as f64 / format.sample_rate as f64;

    Ok(InfoReport {
        input: args.input.display().to_string(),
        header: HeaderInfo::from(reader.header()),
        handlers: handler_infos(reader.handlers()),
        ignored_handlers: reader.handlers().ignored().collect(),
        format: FormatInfo {
            sample_rate: format.sample_rate,
            channels: format.n_channels,
            bits_per_sample: format.bits_per_sample,
        },
        chunks: ChunkInfo {
            total: stats.chunks_read,
            metadata: stats.metadata_chunks,
            audio: audio_chunks,
            skipped: stats.chunks_skipped,
            crc_mismatches: stats.crc_mismatches,
        },
        samples_per_channel: stats.samples_decoded,
        duration: time_str(duration_secs),
        first_chunk_time: first_time.map(|(s, us)| utc_str(s, us)),
        last_chunk_time: last_time.map(|(s, us)| utc_str(s, us)),
    })
}

fn display_report(report: &InfoReport) {
    println!();
    println!("SUD File Information");
    println!("====================");
    println!();

    let header = &report.header;
    println!("File Header");
    println!("  Host code version         {}", header.host_code_version);
    println!("  Host time                 {}", header.host_time);
    println!("  Device type               {}", header.device_type);
    println!("  Device code version       {}", header.device_code_version);
    println!("  Device time               {}", header.device_time);
    println!("  Device identifier         {}", header.device_identifier);
    println!("  Block length              {} bytes", header.block_length);
    println!();

    println!("Handlers");
    for handler in &report.handlers {
        let source = handler
            .source
            .map(|s| format!("from {s}"))
            .unwrap_or_else(|| "root".to_string());
        println!(
            "  {:<3} {:<14} {:<6} {} Hz, {} ch, {} bits ({source})",
            handler.id,
            handler.kind,
            handler.ftype,
            handler.sample_rate,
            handler.channels,
            handler.bits_per_sample
        );
    }
    for id in &report.ignored_handlers {
        println!("  {id:<3} unsupported (ignored)");
    }
    println!();

    let format = &report.format;
    println!("Audio");
    println!("  Sampling rate             {} Hz", format.sample_rate);
    println!("  Channels                  {}", format.channels);
    println!("  Bits per sample           {}", format.bits_per_sample);
    println!();

    let chunks = &report.chunks;
    println!("Analysis Summary");
    println!("  Chunks                    {}", chunks.total);
    println!("  Metadata chunks           {}", chunks.metadata);
    println!("  Audio chunks              {}", chunks.audio);
    if chunks.skipped > 0 {
        println!("  Skipped chunks            {}", chunks.skipped);
    }
    println!("  CRC mismatches            {}", chunks.crc_mismatches);
    println!("  Samples per channel       {}", report.samples_per_channel);
    println!("  Duration                  {}", report.duration);
    if let Some(first) = &report.first_chunk_time {
        println!("  First chunk               {first}");
    }
    if let Some(last) = &report.last_chunk_time {
        println!("  Last chunk                {last}");
    }
    println!();
}
