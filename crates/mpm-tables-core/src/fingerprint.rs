//! Listing-based identity of a dump directory.
//!
//! The fingerprint hashes the registry (tokens, naming, resolution) and the
//! discovered file list (name, step and byte size of every dump). It reads
//! directory metadata only, so checking whether prior outputs are still
//! current never touches raw file contents, and an edit that keeps a
//! file's size does not change the fingerprint. File names are hashed
//! rather than full paths, so relocating a dump directory keeps its
//! fingerprint.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::field::FieldRegistry;
use crate::loader::DumpListing;

const FINGERPRINT_DOMAIN: &[u8] = b"mpm-tables-input-v1";

/// Hex-encoded BLAKE3 digest identifying a set of inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint a listing under the registry that produced it.
pub fn fingerprint(listing: &DumpListing, registry: &FieldRegistry) -> Fingerprint {
    let mut h = blake3::Hasher::new();
    h.update(FINGERPRINT_DOMAIN);
    h.update(b"\0");
    h.update(&(registry.resolution() as u64).to_le_bytes());
    h.update(registry.naming().separator.to_string().as_bytes());
    h.update(b"\0");
    h.update(registry.naming().extension.as_bytes());
    h.update(b"\0");

    for spec in registry.specs() {
        h.update(spec.field.name().as_bytes());
        h.update(b"=");
        h.update(spec.token.as_bytes());
        h.update(b"\0");
    }

    for file in listing.iter() {
        let name = file
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        h.update(file.field.name().as_bytes());
        h.update(b"\0");
        h.update(&file.step.to_le_bytes());
        h.update(name.as_bytes());
        h.update(b"\0");
        h.update(&file.size.to_le_bytes());
    }

    Fingerprint(h.finalize().to_hex().to_string())
}
