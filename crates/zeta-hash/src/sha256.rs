//! SHA-256 via `dcrypt`, exposed as a total function.

use dcrypt::algorithms::hash::sha2::Sha256 as DcryptSha256;
use dcrypt::algorithms::hash::HashFunction as DcryptHashFunction;
use dcrypt::algorithms::ByteSerializable;

/// Computes the SHA-256 digest of `data`.
///
/// `dcrypt`'s digest can only fail on an internal length mismatch that cannot
/// occur for a fixed 32-byte algorithm, so this is exposed as a total
/// function rather than threading a `Result` through every caller.
pub fn sha256<T: AsRef<[u8]>>(data: T) -> [u8; 32] {
    let digest = DcryptSha256::digest(data.as_ref()).unwrap_or_default();
    let bytes = digest.to_bytes();
    let mut out = [0u8; 32];
    let n = bytes.len().min(32);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}
