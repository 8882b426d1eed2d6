//! Bit-exact on-disk layout of a `.zeta` block file.
//!
//! ```text
//! Header  (40 bytes):
//!   u32 magic        = 0x4154455A   // "ZETA"
//!   u32 version      = 1
//!   i64 block_id
//!   i64 token_start
//!   i64 token_count
//!   i32 summary_dim
//!   i32 reserved     = 0
//!
//! Payload:
//!   f32 summary[summary_dim]
//!   f32 keys   [token_count * summary_dim]
//!   f32 values [token_count * summary_dim]
//! ```
//!
//! Little-endian throughout. Packed and unpacked by hand, the way the
//! teacher's container headers are, since the layout is read by processes
//! outside this workspace and must not depend on `serde`'s wire format.

/// Magic bytes identifying a `.zeta` block file ("ZETA" read little-endian).
pub const ZETA_MAGIC: u32 = 0x4154_455A;

/// The only on-disk format version this crate understands.
pub const ZETA_VERSION: u32 = 1;

/// Size in bytes of [`ZetaHeader`]'s fixed-size on-disk form.
pub const HEADER_SIZE: usize = 40;

/// The fixed-size header at the start of every `.zeta` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZetaHeader {
    /// Monotonic 64-bit identifier, unique across all sessions using the
    /// same store.
    pub block_id: i64,
    /// First logical token position this block represents.
    pub token_start: i64,
    /// Number of tokens this block represents. Always `>= 1`.
    pub token_count: i64,
    /// Vector dimension of keys, values, and summary. Always `> 0`.
    pub summary_dim: i32,
}

/// Why a `.zeta` file was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// The file was too short to contain a header.
    #[error("file too short to contain a header: {0} bytes")]
    Truncated(usize),
    /// The magic bytes did not match [`ZETA_MAGIC`].
    #[error("unknown magic bytes: {0:#010x}")]
    BadMagic(u32),
    /// The version field did not match [`ZETA_VERSION`].
    #[error("unsupported version: {0}")]
    BadVersion(u32),
    /// `token_count` or `summary_dim` was non-positive.
    #[error("invalid dimensions: token_count={token_count}, summary_dim={summary_dim}")]
    BadDimensions {
        /// The offending `token_count`.
        token_count: i64,
        /// The offending `summary_dim`.
        summary_dim: i32,
    },
}

impl ZetaHeader {
    /// Packs the header into its 40-byte on-disk form.
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        let mut offset = 0;

        bytes[offset..offset + 4].copy_from_slice(&ZETA_MAGIC.to_le_bytes());
        offset += 4;
        bytes[offset..offset + 4].copy_from_slice(&ZETA_VERSION.to_le_bytes());
        offset += 4;
        bytes[offset..offset + 8].copy_from_slice(&self.block_id.to_le_bytes());
        offset += 8;
        bytes[offset..offset + 8].copy_from_slice(&self.token_start.to_le_bytes());
        offset += 8;
        bytes[offset..offset + 8].copy_from_slice(&self.token_count.to_le_bytes());
        offset += 8;
        bytes[offset..offset + 4].copy_from_slice(&self.summary_dim.to_le_bytes());
        offset += 4;
        // remaining 4 bytes are the reserved field, left zeroed.
        let _ = offset;

        bytes
    }

    /// Validates and unpacks a 40-byte header.
    ///
    /// Files with unknown magic, unknown version, or non-positive
    /// dimensions are rejected here so the store can skip them at load
    /// time, per `spec.md` §4.3.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FormatError::Truncated(bytes.len()));
        }

        let magic = read_u32(bytes, 0);
        if magic != ZETA_MAGIC {
            return Err(FormatError::BadMagic(magic));
        }

        let version = read_u32(bytes, 4);
        if version != ZETA_VERSION {
            return Err(FormatError::BadVersion(version));
        }

        let block_id = read_i64(bytes, 8);
        let token_start = read_i64(bytes, 16);
        let token_count = read_i64(bytes, 24);
        let summary_dim = read_i32(bytes, 32);

        if token_count < 1 || summary_dim < 1 {
            return Err(FormatError::BadDimensions {
                token_count,
                summary_dim,
            });
        }

        Ok(Self {
            block_id,
            token_start,
            token_count,
            summary_dim,
        })
    }

    /// Total on-disk size (header + summary + keys + values) in bytes.
    pub fn payload_len(&self) -> usize {
        let dim = self.summary_dim as usize;
        let count = self.token_count as usize;
        4 * (dim + 2 * count * dim)
    }

    /// Total file size in bytes.
    pub fn file_len(&self) -> usize {
        HEADER_SIZE + self.payload_len()
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    read_u32(bytes, offset) as i32
}

fn read_i64(bytes: &[u8], offset: usize) -> i64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    i64::from_le_bytes(buf)
}

/// Reads `count` little-endian `f32`s starting at `offset` in `bytes`.
pub fn read_f32_slice(bytes: &[u8], offset: usize, count: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let start = offset + i * 4;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&bytes[start..start + 4]);
        out.push(f32::from_le_bytes(buf));
    }
    out
}

/// Appends `values` to `out` as little-endian `f32` bytes.
pub fn write_f32_slice(out: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> ZetaHeader {
        ZetaHeader {
            block_id: 7,
            token_start: 100,
            token_count: 4,
            summary_dim: 8,
        }
    }

    #[test]
    fn header_round_trips_through_bytes() {
        let header = sample_header();
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        let parsed = ZetaHeader::from_bytes(&bytes).expect("valid header");
        assert_eq!(parsed, header);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = sample_header().to_bytes();
        bytes[0] = 0;
        assert!(matches!(
            ZetaHeader::from_bytes(&bytes),
            Err(FormatError::BadMagic(_))
        ));
    }

    #[test]
    fn bad_version_is_rejected() {
        let mut bytes = sample_header().to_bytes();
        bytes[4] = 2;
        bytes[5] = 0;
        bytes[6] = 0;
        bytes[7] = 0;
        assert!(matches!(
            ZetaHeader::from_bytes(&bytes),
            Err(FormatError::BadVersion(2))
        ));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let bytes = [0u8; 10];
        assert!(matches!(
            ZetaHeader::from_bytes(&bytes),
            Err(FormatError::Truncated(10))
        ));
    }

    #[test]
    fn non_positive_dimensions_are_rejected() {
        let mut header = sample_header();
        header.token_count = 0;
        let bytes = header.to_bytes();
        assert!(matches!(
            ZetaHeader::from_bytes(&bytes),
            Err(FormatError::BadDimensions { .. })
        ));
    }

    #[test]
    fn f32_slice_round_trips() {
        let values = vec![1.0f32, -2.5, 0.0, 3.25];
        let mut buf = Vec::new();
        write_f32_slice(&mut buf, &values);
        let parsed = read_f32_slice(&buf, 0, values.len());
        assert_eq!(parsed, values);
    }
}
