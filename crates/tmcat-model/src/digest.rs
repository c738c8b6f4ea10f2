use crate::{json_edit, ModelError};
use sha1::{Digest, Sha1};

/// Number of hex digits of the content digest carried in a TM filename.
pub const DIGEST_HEX_LEN: usize = 12;

/// Compute the stable content digest of a TM document.
///
/// The digest input is the document with the `id` member set to the empty
/// string (inserted if absent), all other bytes untouched. Returns the
/// 12-hex-digit digest and the normalized bytes it was computed over.
pub fn calculate_digest(raw: &[u8]) -> Result<(String, Vec<u8>), ModelError> {
    let normalized = json_edit::set_string(raw, &["id"], "")?;
    let digest = Sha1::digest(&normalized);
    Ok((hex::encode(&digest[..DIGEST_HEX_LEN / 2]), normalized))
}
