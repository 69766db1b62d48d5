//! XML metadata chunks.
//!
//! Each metadata chunk holds one `<SUDAR>` document declaring handlers:
//!
//! ```xml
//! <SUDAR><SRC ID="1"/><CFG ID="2" FTYPE="wav">...</CFG></SUDAR>
//! ```
//!
//! `CFG` carries the handler id and type, `SRC` (optional) the id of the
//! handler its chunks pass through first. Payloads are stored padded to even
//! length and byte-pair swapped like every other chunk payload.

use std::fmt::Write as _;
use std::str::FromStr;

use anyhow::{Result, bail};
use log::warn;
use xmltree::Element;

use crate::endian::{pad_to_even, swap_byte_pairs};
use crate::structs::handler::{
    AUDIO_SINK_FTYPE, AudioSinkParams, Declarations, DecompressorParams, HandlerDescriptor,
    HandlerKind,
};
use crate::utils::errors::HandlerError;

const ROOT: &str = "SUDAR";

/// Renders the metadata document declaring `descriptor`.
pub fn to_xml(descriptor: &HandlerDescriptor) -> String {
    let mut xml = String::with_capacity(192);
    xml.push_str("<SUDAR>");

    if let Some(source) = descriptor.source() {
        let _ = write!(xml, "<SRC ID=\"{source}\"/>");
    }

    let id = descriptor.id();
    let _ = match descriptor.kind() {
        HandlerKind::Decompressor(p) => write!(
            xml,
            "<CFG ID=\"{id}\" FTYPE=\"{}\">\
             <NCHS>{}</NCHS><FS>{}</FS><NBITS>{}</NBITS><BLKLEN>{}</BLKLEN></CFG>",
            p.ftype, p.n_channels, p.sample_rate, p.n_bits, p.block_len
        ),
        HandlerKind::AudioSink(p) => write!(
            xml,
            "<CFG ID=\"{id}\" FTYPE=\"{AUDIO_SINK_FTYPE}\">\
             <FS>{}</FS><NCHS>{}</NCHS><SUFFIX>{}</SUFFIX><TIMECHK>{}</TIMECHK>\
             <NBITS>{}</NBITS><CHANNEL>{}</CHANNEL></CFG>",
            p.sample_rate,
            p.n_channels,
            p.suffix,
            u8::from(p.time_check),
            p.n_bits,
            p.channel
        ),
    };

    xml.push_str("</SUDAR>");
    xml
}

/// UTF-8 `xml`, padded to even length and byte-pair swapped for storage.
pub fn encode_metadata_payload(xml: &str) -> Vec<u8> {
    let mut payload = xml.as_bytes().to_vec();
    pad_to_even(&mut payload);
    swap_byte_pairs(&mut payload);
    payload
}

/// Parses a stored metadata payload.
///
/// `CFG` nodes of type `wav` become audio sinks and nodes whose `FTYPE`
/// equals `codec_ftype` become decompressors; any other type is returned in
/// [`Declarations::ignored`].
pub fn decode_metadata_payload(payload: &[u8], codec_ftype: &str) -> Result<Declarations> {
    let mut bytes = payload.to_vec();
    swap_byte_pairs(&mut bytes);
    while bytes.last() == Some(&0) {
        bytes.pop();
    }

    let root = match Element::parse(bytes.as_slice()) {
        Ok(root) => root,
        Err(e) => bail!(HandlerError::MalformedXml(e.to_string())),
    };
    if root.name != ROOT {
        bail!(HandlerError::MalformedXml(format!(
            "unexpected root element <{}>",
            root.name
        )));
    }

    let source = match root.get_child("SRC") {
        Some(src) => Some(attribute::<u16>(src, "ID", "SRC")?),
        None => None,
    };

    let mut declarations = Declarations::default();
    let configs = root
        .children
        .iter()
        .filter_map(|node| node.as_element())
        .filter(|element| element.name == "CFG");

    for cfg in configs {
        let id = attribute::<u16>(cfg, "ID", "CFG")?;
        let ftype = cfg
            .attributes
            .get("FTYPE")
            .map(|s| s.trim())
            .unwrap_or_default();

        let kind = if ftype == AUDIO_SINK_FTYPE {
            HandlerKind::AudioSink(AudioSinkParams {
                sample_rate: required(cfg, "FS")?,
                n_channels: required(cfg, "NCHS")?,
                suffix: text(cfg, "SUFFIX").unwrap_or_else(|| AUDIO_SINK_FTYPE.to_string()),
                time_check: optional::<u8>(cfg, "TIMECHK")?.unwrap_or(0) != 0,
                n_bits: optional(cfg, "NBITS")?.unwrap_or(16),
                channel: optional(cfg, "CHANNEL")?.unwrap_or(-1),
            })
        } else if ftype == codec_ftype {
            HandlerKind::Decompressor(DecompressorParams {
                ftype: ftype.to_string(),
                n_channels: required(cfg, "NCHS")?,
                sample_rate: required(cfg, "FS")?,
                n_bits: optional(cfg, "NBITS")?.unwrap_or(16),
                block_len: optional(cfg, "BLKLEN")?.unwrap_or(0),
            })
        } else {
            warn!("Ignoring handler {id}: unsupported type {ftype:?}");
            declarations.ignored.push(id);
            continue;
        };

        declarations
            .handlers
            .push(HandlerDescriptor::new(id, source, kind)?);
    }

    Ok(declarations)
}

fn attribute<T: FromStr>(element: &Element, name: &str, context: &'static str) -> Result<T> {
    match element.attributes.get(name).map(|v| v.trim().parse()) {
        Some(Ok(value)) => Ok(value),
        _ => bail!(HandlerError::MissingField { element: context }),
    }
}

fn text(cfg: &Element, name: &str) -> Option<String> {
    cfg.get_child(name)
        .and_then(|child| child.get_text())
        .map(|t| t.trim().to_string())
}

fn optional<T: FromStr>(cfg: &Element, name: &'static str) -> Result<Option<T>> {
    match text(cfg, name) {
        None => Ok(None),
        Some(value) => match value.parse() {
            Ok(v) => Ok(Some(v)),
            Err(_) => bail!(HandlerError::MissingField { element: name }),
        },
    }
}

fn required<T: FromStr>(cfg: &Element, name: &'static str) -> Result<T> {
    match optional(cfg, name)? {
        Some(v) => Ok(v),
        None => bail!(HandlerError::MissingField { element: name }),
    }
}
