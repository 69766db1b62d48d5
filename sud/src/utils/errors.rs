#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err.into());
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("Invalid chunk magic: expected {expected:#06X}, found {found:#06X}")]
    BadMagic { expected: u16, found: u16 },

    #[error("Chunk payload truncated: header declares {expected} bytes, only {actual} available")]
    ShortPayload { expected: usize, actual: usize },

    #[error("Chunk payload must have an even length, got {0}")]
    OddPayloadLength(usize),

    #[error("Chunk payload of {0} bytes exceeds the 65535-byte length field")]
    PayloadTooLarge(usize),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CrcError {
    #[error("Data CRC mismatch in chunk {chunk_id}: stored {stored:#06X}, computed {computed:#06X}")]
    DataMismatch {
        chunk_id: u16,
        stored: u16,
        computed: u16,
    },

    #[error("Header CRC mismatch in chunk {chunk_id}: stored {stored:#06X}, computed {computed:#06X}")]
    HeaderMismatch {
        chunk_id: u16,
        stored: u16,
        computed: u16,
    },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("Chunk references undeclared handler id {0}")]
    Undeclared(u16),

    #[error("Handler {0} cannot use itself as its source")]
    SelfReferential(u16),

    #[error("Handler graph contains a cycle through id {0}")]
    Cycle(u16),

    #[error("Handler {id} references undeclared source {source_id}")]
    DanglingSource { id: u16, source_id: u16 },

    #[error("Handler id {0} is declared more than once")]
    Duplicate(u16),

    #[error("Handler id 0 is reserved for metadata chunks")]
    ReservedId,

    #[error("No audio handler declared before the first data chunk")]
    MissingAudioSink,

    #[error("Audio handler {id} is not fed by a decompressor (source {source_id:?})")]
    NoDecompressor { id: u16, source_id: Option<u16> },

    #[error("Audio handler {id} declares {sink_channels} channels, its decompressor {decompressor_channels}")]
    ChannelMismatch {
        id: u16,
        sink_channels: u16,
        decompressor_channels: u16,
    },

    #[error("Metadata chunk is not valid XML: {0}")]
    MalformedXml(String),

    #[error("Metadata element <{element}> is missing or invalid")]
    MissingField { element: &'static str },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Cannot write a chunk of zero samples")]
    ZeroSamples,

    #[error("Sample buffer holds {actual} values, {expected} required")]
    SampleBufferTooShort { expected: usize, actual: usize },

    #[error("{0} samples per channel exceeds the 65535-sample chunk limit")]
    TooManySamples(usize),

    #[error("Invalid stream configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("Stream already closed")]
    Closed,

    #[error("Stream aborted by an earlier fatal error")]
    Aborted,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Compressed frame exceeds the {0}-byte scratch buffer")]
    ScratchOverflow(usize),

    #[error("Compressed frame ended early after {decoded} of {expected} samples")]
    Truncated { decoded: usize, expected: usize },

    #[error("Invalid {0} code in compressed frame")]
    InvalidCode(&'static str),

    #[error("Frame of {n_channels} channels x {n_samples} samples cannot fit in {bytes} bytes")]
    FrameTooShort {
        n_channels: usize,
        n_samples: usize,
        bytes: usize,
    },

    #[error("Unsupported channel count {0}")]
    InvalidChannels(usize),
}
