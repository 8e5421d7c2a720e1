//! Compression detection and transparent decoding (spec §4.1).
//!
//! Selection is a pure function of the first few bytes — file extension is
//! untrusted. Modeled as a closed sum type per the "dynamic dispatch over
//! decoders" design note rather than a trait object keyed by a registry.

use async_compression::tokio::bufread::{BzDecoder, GzipDecoder, XzDecoder, ZstdDecoder};
use tokio::io::{AsyncReadExt, BufReader};

use crate::errors::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Codec {
    Zstd,
    Xz,
    Gzip,
    Bzip2,
    None,
}

impl Codec {
    /// Probe the leading magic bytes of a blob and pick the codec that
    /// decodes it. File extensions are never consulted.
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(&[0x28, 0xB5, 0x2F, 0xFD]) {
            Codec::Zstd
        } else if bytes.starts_with(&[0xFD, 0x37, 0x7A, 0x58, 0x00]) {
            Codec::Xz
        } else if bytes.starts_with(&[0x1F, 0x8B]) {
            Codec::Gzip
        } else if bytes.starts_with(&[0x42, 0x5A]) {
            Codec::Bzip2
        } else {
            Codec::None
        }
    }

    /// Decode an entire blob into memory. Metadata files are a handful of
    /// megabytes at most, so buffering is acceptable (unlike package
    /// artifacts, which stream through the downloader).
    pub async fn read_all(self, bytes: &[u8]) -> Result<Vec<u8>> {
        let reader = BufReader::new(bytes);
        let mut out = Vec::new();
        match self {
            Codec::Zstd => {
                ZstdDecoder::new(reader).read_to_end(&mut out).await?;
            }
            Codec::Xz => {
                XzDecoder::new(reader).read_to_end(&mut out).await?;
            }
            Codec::Gzip => {
                GzipDecoder::new(reader).read_to_end(&mut out).await?;
            }
            Codec::Bzip2 => {
                BzDecoder::new(reader).read_to_end(&mut out).await?;
            }
            Codec::None => return Ok(bytes.to_vec()),
        }
        Ok(out)
    }
}

/// Detect and decode in one step — the common entry point for a freshly
/// downloaded metadata blob.
pub async fn decode_any(bytes: &[u8]) -> Result<Vec<u8>> {
    Codec::detect(bytes).read_all(bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_zstd_magic() {
        assert_eq!(Codec::detect(&[0x28, 0xB5, 0x2F, 0xFD, 0x00]), Codec::Zstd);
    }

    #[test]
    fn detects_xz_magic() {
        assert_eq!(Codec::detect(&[0xFD, 0x37, 0x7A, 0x58, 0x00, 0x00]), Codec::Xz);
    }

    #[test]
    fn detects_gzip_magic() {
        assert_eq!(Codec::detect(&[0x1F, 0x8B, 0x08]), Codec::Gzip);
    }

    #[test]
    fn detects_bzip2_magic() {
        assert_eq!(Codec::detect(b"BZh9"), Codec::Bzip2);
    }

    #[test]
    fn falls_back_to_uncompressed() {
        assert_eq!(Codec::detect(b"@info@foo"), Codec::None);
    }

    #[tokio::test]
    async fn uncompressed_passthrough() {
        let out = decode_any(b"plain text").await.unwrap();
        assert_eq!(out, b"plain text");
    }

    #[tokio::test]
    async fn gzip_roundtrip() {
        use async_compression::tokio::write::GzipEncoder;
        use tokio::io::AsyncWriteExt;

        let mut encoder = GzipEncoder::new(Vec::new());
        encoder.write_all(b"hello synthesis").await.unwrap();
        encoder.shutdown().await.unwrap();
        let compressed = encoder.into_inner();

        assert_eq!(Codec::detect(&compressed), Codec::Gzip);
        let out = decode_any(&compressed).await.unwrap();
        assert_eq!(out, b"hello synthesis");
    }
}
