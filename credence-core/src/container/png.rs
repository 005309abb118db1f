//! PNG: the store lives in one `crBX` chunk right after `IHDR`.

use byteorder::{BigEndian, ReadBytesExt};
use img_parts::png::PngChunk;
use img_parts::Bytes;

use super::Segment;
use crate::error::ContainerError;
use crate::manifest::ByteRange;

pub(super) const SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

pub const STORE_CHUNK: [u8; 4] = *b"crBX";
const IHDR: [u8; 4] = *b"IHDR";
const IEND: [u8; 4] = *b"IEND";

/// PNG chunk lengths are limited to 2^31 - 1.
pub(super) const MAX_STORE_SIZE: usize = 0x7FFF_FFFF;

fn corrupt(msg: impl Into<String>) -> ContainerError {
    ContainerError::CorruptSegment(msg.into())
}

/// What a walk over the chunks found.
struct Layout {
    store: Option<Segment>,
    /// Offset right after the `IHDR` chunk.
    header_end: Option<usize>,
}

fn walk(asset: &[u8]) -> Result<Layout, ContainerError> {
    let mut store: Option<Segment> = None;
    let mut header_end = None;
    let mut pos = SIGNATURE.len();

    while pos < asset.len() {
        let mut header = asset
            .get(pos..pos + 8)
            .ok_or_else(|| corrupt(format!("truncated chunk header at offset {pos}")))?;
        let len = header
            .read_u32::<BigEndian>()
            .map_err(|e| corrupt(e.to_string()))? as usize;
        let kind = &asset[pos + 4..pos + 8];

        // length + type + data + crc
        let end = pos
            .checked_add(12 + len)
            .filter(|end| *end <= asset.len())
            .ok_or_else(|| corrupt(format!("chunk at offset {pos} overruns the asset")))?;

        if kind == STORE_CHUNK {
            if store.is_some() {
                return Err(corrupt("multiple crBX chunks"));
            }
            store = Some(Segment {
                range: ByteRange::new(pos, end - pos),
                payload: asset[pos + 8..pos + 8 + len].to_vec(),
            });
        }
        if kind == IHDR && header_end.is_none() {
            header_end = Some(end);
        }
        if kind == IEND {
            break;
        }
        pos = end;
    }

    Ok(Layout { store, header_end })
}

pub(super) fn scan(asset: &[u8]) -> Result<Option<Segment>, ContainerError> {
    Ok(walk(asset)?.store)
}

/// Splice a `crBX` chunk into the asset. An existing store chunk is replaced
/// where it sits; otherwise the chunk goes right after `IHDR`. Every other
/// byte, including anything after `IEND`, is copied unchanged.
pub(super) fn embed(asset: &[u8], store: &[u8]) -> Result<Vec<u8>, ContainerError> {
    let layout = walk(asset)?;
    let (start, end) = match (&layout.store, layout.header_end) {
        (Some(existing), _) => (existing.range.start, existing.range.end()),
        (None, Some(at)) => (at, at),
        (None, None) => return Err(corrupt("missing IHDR chunk")),
    };

    let chunk = PngChunk::new(STORE_CHUNK, Bytes::copy_from_slice(store))
        .encoder()
        .bytes();
    let mut out = Vec::with_capacity(asset.len() - (end - start) + chunk.len());
    out.extend_from_slice(&asset[..start]);
    out.extend_from_slice(&chunk);
    out.extend_from_slice(&asset[end..]);
    Ok(out)
}
