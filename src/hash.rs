//! Content-addressed identities for patch applications.

use crate::error::PatchsetError;
use sha1::{Digest, Sha1};
use std::fs;
use std::path::Path;

/// Lowercase hex sha1 of `bytes`.
pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hash of a patch file's bytes; an unreadable file is fatal.
pub fn hash_patch_file(path: &Path) -> Result<String, PatchsetError> {
    let bytes = fs::read(path).map_err(|source| PatchsetError::PatchFileUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(sha1_hex(&bytes))
}

/// Aggregate identity of one package's patch set.
///
/// sha1 of the target's source reference followed by the `-`-joined
/// application hashes, in application order.
pub fn aggregate_hash<'a>(
    source_reference: Option<&str>,
    application_hashes: impl IntoIterator<Item = &'a str>,
) -> String {
    let joined = application_hashes.into_iter().collect::<Vec<_>>().join("-");
    let mut input = String::with_capacity(joined.len() + 40);
    input.push_str(source_reference.unwrap_or(""));
    input.push_str(&joined);
    sha1_hex(input.as_bytes())
}
