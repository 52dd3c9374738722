//! Content hashing and reference resolution.

use crate::error::{CtxError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// Canonical reference prefix for SHA-256 content hashes.
pub const HASH_PREFIX: &str = "sha256:";

/// URI prefix accepted as an alternate spelling on input.
const CTX_URI_PREFIX: &str = "ctx://";

/// Minimum number of hex characters required for prefix resolution.
const MIN_PREFIX_LEN: usize = 4;

/// A 32-byte SHA-256 content hash identifying a blob.
///
/// The canonical textual form is `sha256:<64-lowercase-hex>`. ContentHashes
/// are the foundation of the store: the same bytes always produce the same
/// hash, enabling deduplication and integrity verification.
///
/// # Examples
///
/// ```
/// use ctx_core::ContentHash;
///
/// let hash = ContentHash::of(b"hello world");
/// assert_eq!(hash.hex().len(), 64);
/// assert!(hash.to_ref().starts_with("sha256:"));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// The length of the hex portion of a reference.
    pub const HEX_LEN: usize = 64;

    /// Computes the content hash of a byte sequence.
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        Self(digest.into())
    }

    /// Creates a ContentHash from raw bytes.
    #[inline]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the lowercase hex portion (64 characters, no prefix).
    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns the canonical `sha256:<hex>` reference string.
    pub fn to_ref(&self) -> String {
        format!("{}{}", HASH_PREFIX, self.hex())
    }

    /// Returns the shard prefix (first 2 hex characters) used for
    /// directory fan-out in the object store.
    pub fn shard(&self) -> String {
        hex::encode(&self.0[..1])
    }

    /// Returns the first `n` characters of the hex portion, capped at 64.
    pub fn short(&self, n: usize) -> String {
        let hex = self.hex();
        let n = n.min(hex.len());
        hex[..n].to_string()
    }

    /// Parses a full `sha256:<hex>` reference.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHashRef` if the prefix is missing, the hex portion
    /// is not exactly 64 characters, or contains non-hex characters.
    pub fn parse(reference: &str) -> Result<Self> {
        let hex_str = reference.strip_prefix(HASH_PREFIX).ok_or_else(|| {
            CtxError::InvalidHashRef(format!(
                "expected {} prefix, got {:?}",
                HASH_PREFIX, reference
            ))
        })?;
        Self::from_hex(hex_str)
    }

    /// Parses a bare 64-character hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        if hex_str.len() != Self::HEX_LEN {
            return Err(CtxError::InvalidHashRef(format!(
                "expected {} hex chars, got {}",
                Self::HEX_LEN,
                hex_str.len()
            )));
        }
        let bytes = hex::decode(hex_str)
            .map_err(|e| CtxError::InvalidHashRef(format!("bad hex encoding: {}", e)))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CtxError::InvalidHashRef("invalid length".to_string()))?;
        Ok(Self(arr))
    }

    /// Accepts either a full `sha256:<hex>` reference or a plain 64-hex
    /// string and returns the parsed hash. Case is folded to lowercase by
    /// decoding. Anything else full-length fails.
    pub fn normalize(raw: &str) -> Result<Self> {
        if raw.starts_with(HASH_PREFIX) {
            Self::parse(raw)
        } else {
            Self::from_hex(raw)
        }
    }

    /// Checks whether a reference string is well-formed.
    pub fn is_valid_ref(reference: &str) -> bool {
        Self::parse(reference).is_ok()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ref())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({}...)", &self.hex()[..12])
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_ref())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// 128-bit hex prefix of the SHA-256 of a string. Used for the derived
/// identifiers (path ids, symbol ids, cache keys, run ids).
pub(crate) fn hex128(s: &str) -> String {
    ContentHash::of(s.as_bytes()).hex()[..32].to_string()
}

/// Strips an optional `ctx://` URI prefix from a reference.
fn strip_ctx_uri(reference: &str) -> &str {
    reference.strip_prefix(CTX_URI_PREFIX).unwrap_or(reference)
}

/// Resolves a full hash, short hex prefix, or `ctx://` URI to a full
/// reference by searching the registry under `packs/`.
///
/// # Errors
///
/// - `InvalidHexPrefix` when the input is not hex at all.
/// - `PrefixTooShort` when fewer than 4 hex characters are given.
/// - `PrefixNotFound` when nothing in the registry matches.
/// - `PrefixAmbiguous` when more than one pack matches.
pub fn resolve(store_root: &Path, reference: &str) -> Result<ContentHash> {
    let reference = strip_ctx_uri(reference);

    // Exact match first: full reference or full hex.
    if let Ok(hash) = ContentHash::normalize(reference) {
        return Ok(hash);
    }

    // Must be a short prefix.
    if reference.is_empty() || !reference.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CtxError::InvalidHexPrefix(reference.to_string()));
    }
    if reference.len() < MIN_PREFIX_LEN {
        return Err(CtxError::PrefixTooShort(reference.len()));
    }

    let prefix = reference.to_ascii_lowercase();
    let packs_dir = store_root.join("packs");
    let entries = match std::fs::read_dir(&packs_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CtxError::PrefixNotFound(prefix));
        }
        Err(e) => return Err(e.into()),
    };

    let mut matches = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(&prefix) {
            if let Ok(hash) = ContentHash::from_hex(name) {
                matches.push(hash);
            }
        }
    }

    match matches.len() {
        0 => Err(CtxError::PrefixNotFound(prefix)),
        1 => Ok(matches[0]),
        n => Err(CtxError::PrefixAmbiguous { prefix, matches: n }),
    }
}
