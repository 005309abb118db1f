//! Asset containers: find, extract and embed the manifest store segment.
//!
//! JPEG assets carry the store in JPEG-XT style APP11 segments, PNG assets in
//! a single `crBX` chunk. Locating walks segment headers only and never
//! decodes image data. Embedding always returns a new buffer in which every
//! byte outside the store segment is copied from the input unchanged.

mod jpeg;
mod png;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ContainerError;
use crate::manifest::{digest_parts, ByteRange};

/// Extension of sidecar store files written next to the asset.
pub const SIDECAR_EXTENSION: &str = "crd";

/// Supported container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetFormat {
    Jpeg,
    Png,
}

impl AssetFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    /// Largest store the format can physically carry.
    pub fn max_store_size(&self) -> usize {
        match self {
            Self::Jpeg => jpeg::MAX_STORE_SIZE,
            Self::Png => png::MAX_STORE_SIZE,
        }
    }
}

/// A located store segment: where it sits in the asset and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Segment {
    pub range: ByteRange,
    pub payload: Vec<u8>,
}

/// Detect the container format from magic bytes.
pub fn detect(asset: &[u8]) -> Option<AssetFormat> {
    if asset.starts_with(jpeg::SOI) {
        Some(AssetFormat::Jpeg)
    } else if asset.starts_with(png::SIGNATURE) {
        Some(AssetFormat::Png)
    } else {
        None
    }
}

fn scan(asset: &[u8]) -> Result<Option<Segment>, ContainerError> {
    match detect(asset) {
        Some(AssetFormat::Jpeg) => jpeg::scan(asset),
        Some(AssetFormat::Png) => png::scan(asset),
        None => Err(ContainerError::UnsupportedFormat),
    }
}

/// Byte range of the store segment, if the asset carries one.
pub fn locate(asset: &[u8]) -> Result<Option<ByteRange>, ContainerError> {
    Ok(scan(asset)?.map(|segment| segment.range))
}

/// Raw store bytes carried by the asset.
pub fn extract(asset: &[u8]) -> Result<Vec<u8>, ContainerError> {
    let segment = scan(asset)?.ok_or(ContainerError::NoManifest)?;
    debug!(
        start = segment.range.start,
        length = segment.range.length,
        payload = segment.payload.len(),
        "Extracted manifest store segment"
    );
    Ok(segment.payload)
}

/// New asset with `store` embedded, replacing any existing store.
pub fn embed(asset: &[u8], store: &[u8]) -> Result<Vec<u8>, ContainerError> {
    embed_with_limit(asset, store, usize::MAX)
}

/// Like [`embed`], with an additional configured cap on the store size.
pub fn embed_with_limit(
    asset: &[u8],
    store: &[u8],
    limit: usize,
) -> Result<Vec<u8>, ContainerError> {
    let format = detect(asset).ok_or(ContainerError::UnsupportedFormat)?;
    let max = format.max_store_size().min(limit);
    if store.len() > max {
        return Err(ContainerError::NoSpace {
            size: store.len(),
            max,
        });
    }

    let out = match format {
        AssetFormat::Jpeg => jpeg::embed(asset, store)?,
        AssetFormat::Png => png::embed(asset, store)?,
    };
    debug!(
        format = format.mime_type(),
        store = store.len(),
        before = asset.len(),
        after = out.len(),
        "Embedded manifest store"
    );
    Ok(out)
}

/// SHA3-256 over the asset with the store segment removed.
///
/// Assets in an unknown format (sidecar mode) are hashed whole.
pub fn content_digest(asset: &[u8]) -> Result<Vec<u8>, ContainerError> {
    if detect(asset).is_none() {
        return Ok(digest_parts(&[asset]));
    }
    Ok(match locate(asset)? {
        Some(range) => digest_parts(&[&asset[..range.start], &asset[range.end()..]]),
        None => digest_parts(&[asset]),
    })
}

/// Path of the sidecar store for an asset: `<asset>.crd`.
pub fn sidecar_path(asset: &Path) -> PathBuf {
    let mut name = asset.as_os_str().to_os_string();
    name.push(".");
    name.push(SIDECAR_EXTENSION);
    PathBuf::from(name)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect() {
        assert_eq!(detect(&fixtures::jpeg()), Some(AssetFormat::Jpeg));
        assert_eq!(detect(&fixtures::png()), Some(AssetFormat::Png));
        assert_eq!(detect(b"GIF89a"), None);
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert_eq!(
            extract(b"plain text").unwrap_err(),
            ContainerError::UnsupportedFormat
        );
        assert_eq!(
            embed(b"plain text", b"store").unwrap_err(),
            ContainerError::UnsupportedFormat
        );
    }

    #[test]
    fn test_extract_without_store() {
        assert_eq!(extract(&fixtures::png()).unwrap_err(), ContainerError::NoManifest);
        assert_eq!(extract(&fixtures::jpeg()).unwrap_err(), ContainerError::NoManifest);
    }

    #[test]
    fn test_embed_extract_both_formats() {
        for asset in [fixtures::jpeg(), fixtures::png()] {
            let out = embed(&asset, b"store-bytes").unwrap();
            assert_eq!(extract(&out).unwrap(), b"store-bytes");

            let replaced = embed(&out, b"second").unwrap();
            assert_eq!(extract(&replaced).unwrap(), b"second");
        }
    }

    #[test]
    fn test_digest_ignores_store_segment() {
        for asset in [fixtures::jpeg(), fixtures::png()] {
            let expected = content_digest(&asset).unwrap();
            let a = embed(&asset, b"one").unwrap();
            let b = embed(&asset, &vec![0x55; 150_000]).unwrap();
            assert_eq!(content_digest(&a).unwrap(), expected);
            assert_eq!(content_digest(&b).unwrap(), expected);
        }
    }

    #[test]
    fn test_embed_preserves_bytes_outside_segment() {
        let mut png = fixtures::png();
        png.extend_from_slice(b"TRAILER");
        let mut jpeg = fixtures::jpeg();
        jpeg.insert(20, 0xFF);
        jpeg.extend_from_slice(b"TRAILER");

        for asset in [png, jpeg] {
            let out = embed(&asset, b"store").unwrap();
            let range = locate(&out).unwrap().unwrap();
            assert_eq!(&out[..range.start], &asset[..range.start]);
            assert_eq!(&out[range.end()..], &asset[range.start..]);
            assert_eq!(content_digest(&out).unwrap(), content_digest(&asset).unwrap());
        }
    }

    #[test]
    fn test_configured_limit() {
        let err = embed_with_limit(&fixtures::png(), &[0u8; 100], 10).unwrap_err();
        assert_eq!(err, ContainerError::NoSpace { size: 100, max: 10 });
    }

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("/tmp/photo.jpg")),
            PathBuf::from("/tmp/photo.jpg.crd")
        );
    }
}
