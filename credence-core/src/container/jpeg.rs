//! JPEG: the store is split across consecutive APP11 segments.
//!
//! Each segment's contents start with the JPEG-XT `JP` common identifier, a
//! two byte box instance, a big-endian sequence number (from 1) and the
//! `crds` box type, followed by up to [`MAX_SEGMENT_PAYLOAD`] store bytes.

use byteorder::{BigEndian, ReadBytesExt};
use img_parts::jpeg::{markers, JpegSegment};
use img_parts::Bytes;

use super::Segment;
use crate::error::ContainerError;
use crate::manifest::ByteRange;

pub(super) const SOI: &[u8] = &[0xFF, 0xD8];

/// Store bytes carried by a single APP11 segment.
pub const MAX_SEGMENT_PAYLOAD: usize = 64_000;

pub(super) const MAX_STORE_SIZE: usize = MAX_SEGMENT_PAYLOAD * 0xFFFF;

const COMMON_ID: &[u8; 2] = b"JP";
const BOX_INSTANCE: [u8; 2] = [0x43, 0x52];
const BOX_TYPE: &[u8; 4] = b"crds";
const HEADER_LEN: usize = 12;

fn corrupt(msg: impl Into<String>) -> ContainerError {
    ContainerError::CorruptSegment(msg.into())
}

/// Sequence number and payload of one of our APP11 segments, or `None` for
/// APP11 segments owned by someone else.
fn parse_contents(contents: &[u8]) -> Result<Option<(u32, &[u8])>, ContainerError> {
    if contents.len() < HEADER_LEN
        || &contents[..2] != COMMON_ID
        || contents[2..4] != BOX_INSTANCE
        || &contents[8..12] != BOX_TYPE
    {
        return Ok(None);
    }
    let seq = (&contents[4..8])
        .read_u32::<BigEndian>()
        .map_err(|e| corrupt(format!("sequence number: {e}")))?;
    Ok(Some((seq, &contents[HEADER_LEN..])))
}

struct Part<'a> {
    start: usize,
    end: usize,
    seq: u32,
    payload: &'a [u8],
}

/// What a walk over the marker segments found.
struct Layout {
    store: Option<Segment>,
    /// Offset right after the leading APP0/APP1 segments.
    insert_at: usize,
}

fn walk(asset: &[u8]) -> Result<Layout, ContainerError> {
    let mut parts: Vec<Part<'_>> = Vec::new();
    let mut pos = SOI.len();
    let mut insert_at = pos;
    let mut leading = true;

    while pos < asset.len() {
        if asset[pos] != 0xFF {
            return Err(corrupt(format!("expected marker at offset {pos}")));
        }
        let marker = *asset
            .get(pos + 1)
            .ok_or_else(|| corrupt("truncated marker"))?;
        match marker {
            // fill byte
            0xFF => {
                pos += 1;
                continue;
            }
            markers::SOS | markers::EOI => break,
            0x01 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            _ => {}
        }

        let mut header = asset.get(pos + 2..).unwrap_or_default();
        let len = header
            .read_u16::<BigEndian>()
            .map_err(|_| corrupt(format!("truncated segment length at offset {pos}")))?
            as usize;
        if len < 2 {
            return Err(corrupt(format!("invalid segment length at offset {pos}")));
        }
        let end = pos + 2 + len;
        if end > asset.len() {
            return Err(corrupt(format!("segment at offset {pos} overruns the asset")));
        }

        // JFIF / Exif headers stay first.
        if leading && matches!(marker, markers::APP0 | markers::APP1) {
            insert_at = end;
        } else {
            leading = false;
        }

        if marker == markers::APP11 {
            if let Some((seq, payload)) = parse_contents(&asset[pos + 4..end])? {
                parts.push(Part {
                    start: pos,
                    end,
                    seq,
                    payload,
                });
            }
        }
        pos = end;
    }

    Ok(Layout {
        store: assemble(&parts)?,
        insert_at,
    })
}

fn assemble(parts: &[Part<'_>]) -> Result<Option<Segment>, ContainerError> {
    let (Some(first), Some(last)) = (parts.first(), parts.last()) else {
        return Ok(None);
    };

    let mut payload = Vec::with_capacity(parts.len() * MAX_SEGMENT_PAYLOAD);
    for (i, part) in parts.iter().enumerate() {
        if part.seq as usize != i + 1 {
            return Err(corrupt(format!(
                "APP11 segment {} has sequence number {}",
                i + 1,
                part.seq
            )));
        }
        if i > 0 && parts[i - 1].end != part.start {
            return Err(corrupt("APP11 store segments are not contiguous"));
        }
        payload.extend_from_slice(part.payload);
    }

    Ok(Some(Segment {
        range: ByteRange::new(first.start, last.end - first.start),
        payload,
    }))
}

pub(super) fn scan(asset: &[u8]) -> Result<Option<Segment>, ContainerError> {
    Ok(walk(asset)?.store)
}

/// Encoded APP11 segments carrying `store`.
fn store_segments(store: &[u8]) -> Result<Vec<u8>, ContainerError> {
    let chunks: Vec<&[u8]> = if store.is_empty() {
        vec![store]
    } else {
        store.chunks(MAX_SEGMENT_PAYLOAD).collect()
    };

    let mut out = Vec::with_capacity(store.len() + chunks.len() * (HEADER_LEN + 4));
    for (i, chunk) in chunks.iter().enumerate() {
        let seq = u32::try_from(i + 1).map_err(|_| ContainerError::NoSpace {
            size: store.len(),
            max: MAX_STORE_SIZE,
        })?;
        let mut contents = Vec::with_capacity(HEADER_LEN + chunk.len());
        contents.extend_from_slice(COMMON_ID);
        contents.extend_from_slice(&BOX_INSTANCE);
        contents.extend_from_slice(&seq.to_be_bytes());
        contents.extend_from_slice(BOX_TYPE);
        contents.extend_from_slice(chunk);

        let segment = JpegSegment::new_with_contents(markers::APP11, Bytes::from(contents));
        out.extend_from_slice(&segment.encoder().bytes());
    }
    Ok(out)
}

/// Splice the store segments into the asset. An existing store is replaced
/// where it sits; otherwise the segments go after the leading APP0/APP1
/// segments. Every other byte is copied unchanged.
pub(super) fn embed(asset: &[u8], store: &[u8]) -> Result<Vec<u8>, ContainerError> {
    let layout = walk(asset)?;
    let (start, end) = match &layout.store {
        Some(existing) => (existing.range.start, existing.range.end()),
        None => (layout.insert_at, layout.insert_at),
    };

    let segments = store_segments(store)?;
    let mut out = Vec::with_capacity(asset.len() - (end - start) + segments.len());
    out.extend_from_slice(&asset[..start]);
    out.extend_from_slice(&segments);
    out.extend_from_slice(&asset[end..]);
    Ok(out)
}
