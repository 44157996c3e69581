//! The on-disk form of a [`Language`](super::Language).
//!
//! A blob is the four magic bytes `SPRG`, the format version as a
//! little-endian `u32`, then the table itself as JSON.

use super::LanguageParts;
use crate::grammar::GrammarError;

const MAGIC: &[u8; 4] = b"SPRG";

/// Version of the blob layout written by this build.
pub const FORMAT_VERSION: u32 = 1;

/// Reasons a serialized table cannot be loaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// The input does not start with the table magic bytes.
    #[error("not a sprig language table")]
    BadMagic,

    /// The table was written by an incompatible format version.
    #[error("table format version {found} is not supported (expected {expected})")]
    VersionMismatch {
        /// Version found in the header.
        found: u32,
        /// Version this build reads.
        expected: u32,
    },

    /// The body could not be decoded or is internally inconsistent.
    #[error("corrupt language table: {0}")]
    Corrupt(String),

    /// The table decoded but could not be rebuilt into a language.
    #[error(transparent)]
    Grammar(#[from] GrammarError),
}

pub(super) fn encode(parts: &LanguageParts) -> Vec<u8> {
    let body = facet_json::to_string(parts);
    let mut bytes = Vec::with_capacity(8 + body.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(body.as_bytes());
    bytes
}

pub(super) fn decode(bytes: &[u8]) -> Result<LanguageParts, LoadError> {
    let (magic, rest) = bytes.split_at_checked(4).ok_or(LoadError::BadMagic)?;
    if magic != MAGIC {
        return Err(LoadError::BadMagic);
    }
    let (version, body) = rest
        .split_first_chunk::<4>()
        .ok_or_else(|| LoadError::Corrupt("truncated header".to_string()))?;
    let found = u32::from_le_bytes(*version);
    if found != FORMAT_VERSION {
        return Err(LoadError::VersionMismatch {
            found,
            expected: FORMAT_VERSION,
        });
    }
    let body = std::str::from_utf8(body).map_err(|e| LoadError::Corrupt(e.to_string()))?;
    let parts: LanguageParts =
        facet_json::from_str(body).map_err(|e| LoadError::Corrupt(e.to_string()))?;
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_magic() {
        assert_eq!(decode(b"JSON{}"), Err(LoadError::BadMagic));
        assert_eq!(decode(b"SP"), Err(LoadError::BadMagic));
    }

    #[test]
    fn test_version_mismatch() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&7u32.to_le_bytes());
        bytes.extend_from_slice(b"{}");
        assert_eq!(
            decode(&bytes),
            Err(LoadError::VersionMismatch {
                found: 7,
                expected: FORMAT_VERSION
            })
        );
    }

    #[test]
    fn test_corrupt_body() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(b"{\"name\":");
        assert!(matches!(decode(&bytes), Err(LoadError::Corrupt(_))));
    }
}
