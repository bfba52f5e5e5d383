use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

use crate::constants::DESCRIPTOR_HASH_LEN;
use crate::Result;

/// Deterministic short digest of a serializable descriptor.
///
/// The descriptor goes through `serde_json::Value` first so object keys are
/// sorted, which makes the digest independent of field declaration order.
pub fn descriptor_digest<D: Serialize + ?Sized>(descriptor: &D) -> Result<String> {
    let canonical = serde_json::to_value(descriptor)?.to_string();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(DESCRIPTOR_HASH_LEN);
    Ok(digest)
}
