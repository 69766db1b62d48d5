//! Handler descriptors and the routing graph built from metadata chunks.
//!
//! Each handler is a numbered node. A node with a source must receive its
//! chunks through that source first, so an audio sink fed by a decompressor
//! forms the chain `sink <- decompressor`. The graph rejects self references,
//! dangling sources, duplicate ids and cycles when handlers are inserted, so a
//! [`HandlerGraph`] can always be resolved without recursion limits.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use anyhow::{Result, bail, ensure};

use crate::config::{AUDIO_SINK_ID, BITS_PER_SAMPLE, DECOMPRESSOR_ID, WriterConfig, XML_CHUNK_ID};
use crate::utils::errors::HandlerError;

/// `FTYPE` of the audio sink handler.
pub const AUDIO_SINK_FTYPE: &str = "wav";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompressorParams {
    pub ftype: String,
    pub n_channels: u16,
    pub sample_rate: u32,
    pub n_bits: u16,
    pub block_len: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSinkParams {
    pub sample_rate: u32,
    pub n_channels: u16,
    pub suffix: String,
    pub time_check: bool,
    pub n_bits: u16,
    /// Selected channel, or -1 for all channels.
    pub channel: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerKind {
    Decompressor(DecompressorParams),
    AudioSink(AudioSinkParams),
}

impl Display for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerKind::Decompressor(p) => write!(f, "decompressor ({})", p.ftype),
            HandlerKind::AudioSink(p) => write!(f, "audio sink ({})", p.suffix),
        }
    }
}

/// A validated handler declaration. A descriptor can never name itself as
/// its source or use the reserved metadata id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerDescriptor {
    id: u16,
    source: Option<u16>,
    kind: HandlerKind,
}

impl HandlerDescriptor {
    pub fn new(id: u16, source: Option<u16>, kind: HandlerKind) -> Result<Self> {
        ensure!(id != XML_CHUNK_ID, HandlerError::ReservedId);
        ensure!(source != Some(id), HandlerError::SelfReferential(id));
        Ok(Self { id, source, kind })
    }

    pub fn decompressor(id: u16, params: DecompressorParams) -> Result<Self> {
        Self::new(id, None, HandlerKind::Decompressor(params))
    }

    pub fn audio_sink(id: u16, source: u16, params: AudioSinkParams) -> Result<Self> {
        Self::new(id, Some(source), HandlerKind::AudioSink(params))
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn source(&self) -> Option<u16> {
        self.source
    }

    pub fn kind(&self) -> &HandlerKind {
        &self.kind
    }
}

/// The decompressor and audio sink declared for a stream written with `config`.
pub fn stream_handlers(
    config: &WriterConfig,
    ftype: &str,
    block_len: usize,
) -> Result<[HandlerDescriptor; 2]> {
    let decompressor = HandlerDescriptor::decompressor(
        DECOMPRESSOR_ID,
        DecompressorParams {
            ftype: ftype.to_string(),
            n_channels: config.n_channels,
            sample_rate: config.sample_rate,
            n_bits: BITS_PER_SAMPLE,
            block_len: block_len as u32,
        },
    )?;

    let sink = HandlerDescriptor::audio_sink(
        AUDIO_SINK_ID,
        DECOMPRESSOR_ID,
        AudioSinkParams {
            sample_rate: config.sample_rate,
            n_channels: config.n_channels,
            suffix: AUDIO_SINK_FTYPE.to_string(),
            time_check: true,
            n_bits: BITS_PER_SAMPLE,
            channel: -1,
        },
    )?;

    Ok([decompressor, sink])
}

/// Handlers declared by one metadata chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declarations {
    pub handlers: Vec<HandlerDescriptor>,
    /// Ids declared with an unsupported `FTYPE`.
    pub ignored: Vec<u16>,
}

/// Where a chunk must go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Metadata,
    Audio(AudioPath<'a>),
    Ignored,
}

/// A resolved audio sink and the decompressor feeding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioPath<'a> {
    pub sink_id: u16,
    pub sink: &'a AudioSinkParams,
    pub decompressor_id: u16,
    pub decompressor: &'a DecompressorParams,
}

#[derive(Debug, Clone, Default)]
pub struct HandlerGraph {
    handlers: BTreeMap<u16, HandlerDescriptor>,
    ignored: BTreeSet<u16>,
}

impl HandlerGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn handlers(&self) -> impl Iterator<Item = &HandlerDescriptor> {
        self.handlers.values()
    }

    pub fn ignored(&self) -> impl Iterator<Item = u16> + '_ {
        self.ignored.iter().copied()
    }

    pub fn get(&self, id: u16) -> Option<&HandlerDescriptor> {
        self.handlers.get(&id)
    }

    pub fn insert(&mut self, descriptor: HandlerDescriptor) -> Result<()> {
        self.merge(Declarations {
            handlers: vec![descriptor],
            ignored: Vec::new(),
        })
    }

    /// Adds one metadata chunk's declarations. Sources may refer to handlers
    /// declared earlier or in the same batch. On error the graph is unchanged.
    pub fn merge(&mut self, declarations: Declarations) -> Result<()> {
        let mut next = self.clone();

        for id in declarations.ignored {
            ensure!(id != XML_CHUNK_ID, HandlerError::ReservedId);
            ensure!(
                !next.handlers.contains_key(&id) && next.ignored.insert(id),
                HandlerError::Duplicate(id)
            );
        }

        for descriptor in declarations.handlers {
            let id = descriptor.id;
            ensure!(
                !next.ignored.contains(&id) && !next.handlers.contains_key(&id),
                HandlerError::Duplicate(id)
            );
            next.handlers.insert(id, descriptor);
        }

        next.validate()?;
        *self = next;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for descriptor in self.handlers.values() {
            if let Some(source_id) = descriptor.source {
                ensure!(
                    self.handlers.contains_key(&source_id) || self.ignored.contains(&source_id),
                    HandlerError::DanglingSource {
                        id: descriptor.id,
                        source_id,
                    }
                );
            }
        }

        for &start in self.handlers.keys() {
            let mut current = start;
            let mut steps = 0;
            while let Some(source_id) = self.handlers.get(&current).and_then(|h| h.source) {
                steps += 1;
                if source_id == start || steps > self.handlers.len() {
                    bail!(HandlerError::Cycle(start));
                }
                current = source_id;
            }
        }

        Ok(())
    }

    fn resolve_sink<'a>(&'a self, descriptor: &'a HandlerDescriptor) -> Result<Option<AudioPath<'a>>> {
        let HandlerKind::AudioSink(sink) = &descriptor.kind else {
            return Ok(None);
        };

        let decompressor = descriptor
            .source
            .and_then(|source_id| self.handlers.get(&source_id))
            .and_then(|source| match &source.kind {
                HandlerKind::Decompressor(params) => Some((source.id, params)),
                HandlerKind::AudioSink(_) => None,
            });

        let Some((decompressor_id, decompressor)) = decompressor else {
            bail!(HandlerError::NoDecompressor {
                id: descriptor.id,
                source_id: descriptor.source,
            });
        };
        ensure!(
            sink.n_channels == decompressor.n_channels,
            HandlerError::ChannelMismatch {
                id: descriptor.id,
                sink_channels: sink.n_channels,
                decompressor_channels: decompressor.n_channels,
            }
        );

        Ok(Some(AudioPath {
            sink_id: descriptor.id,
            sink,
            decompressor_id,
            decompressor,
        }))
    }

    /// The first declared audio sink, resolved to its decompressor.
    pub fn audio_path(&self) -> Result<Option<AudioPath<'_>>> {
        for descriptor in self.handlers.values() {
            if let Some(path) = self.resolve_sink(descriptor)? {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    pub fn route(&self, chunk_id: u16) -> Result<Route<'_>> {
        if chunk_id == XML_CHUNK_ID {
            return Ok(Route::Metadata);
        }
        if self.ignored.contains(&chunk_id) {
            return Ok(Route::Ignored);
        }

        let Some(descriptor) = self.handlers.get(&chunk_id) else {
            bail!(HandlerError::Undeclared(chunk_id));
        };

        Ok(match self.resolve_sink(descriptor)? {
            Some(path) => Route::Audio(path),
            None => Route::Ignored,
        })
    }
}
