//! The embedded KV-capture format ("Graph-KV"), `spec.md` §6.
//!
//! An optional secondary on-disk format used when the host exposes a
//! portable sequence-state blob instead of (or alongside) the `.zeta`
//! archive this crate otherwise owns. Unlike `.zeta`, which stores
//! full-precision `f32` keys/values, Graph-KV stores one `Q8_0`-quantized
//! block stream per layer — this format is authoritative only where the
//! host actually supports it, per `spec.md` §6, so lossy quantization is an
//! accepted tradeoff here that the primary `.zeta` format never makes.

/// Magic bytes identifying a Graph-KV layer capture.
pub const GRAPH_KV_MAGIC: u16 = 0x5A47;

/// The only Graph-KV format version this crate understands.
pub const GRAPH_KV_VERSION: u16 = 1;

/// Number of `f32` values packed into one `Q8_0` block.
pub const Q8_0_BLOCK_LEN: usize = 32;

/// On-disk size of one `Q8_0` block: a 2-byte `f16` scale followed by
/// 32 signed bytes.
pub const Q8_0_BLOCK_BYTES: usize = 2 + Q8_0_BLOCK_LEN;

/// Fixed-size header preceding one layer's quantized keys and values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphKvHeader {
    /// Which transformer layer this capture belongs to.
    pub layer: u32,
    /// Vector dimension of each key/value row.
    pub dim: u32,
    /// Number of token rows captured.
    pub token_count: u32,
    /// The live-window position the first captured token was at when this
    /// layer was captured. Every token's position is stored relative to
    /// this base and rebased to an `injection_pos` on reinjection, per
    /// `spec.md` §6.
    pub base_position: i64,
}

/// Size in bytes of [`GraphKvHeader`]'s packed on-disk form (not counting
/// the leading magic/version fields, which [`encode_layer`] writes
/// separately).
const HEADER_FIELDS_SIZE: usize = 4 + 4 + 4 + 8;

/// Why a Graph-KV byte stream was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GraphKvError {
    /// The stream was too short to contain a header.
    #[error("graph-kv stream too short: {0} bytes")]
    Truncated(usize),
    /// The magic bytes did not match [`GRAPH_KV_MAGIC`].
    #[error("unknown graph-kv magic: {0:#06x}")]
    BadMagic(u16),
    /// The version field did not match [`GRAPH_KV_VERSION`].
    #[error("unsupported graph-kv version: {0}")]
    BadVersion(u16),
    /// `dim` was not a positive multiple of [`Q8_0_BLOCK_LEN`].
    #[error("dim must be a positive multiple of {Q8_0_BLOCK_LEN}, got {0}")]
    BadDim(u32),
}

/// Quantizes one row of `dim` `f32` values into `dim / Q8_0_BLOCK_LEN`
/// `Q8_0` blocks (`dim` must already be a multiple of
/// [`Q8_0_BLOCK_LEN`]; callers pad short rows with zeros first).
///
/// Per block: `scale = max(|x|) / 127`, `q_i = round(clip(x_i / scale, -128, 127))`.
/// A block whose values are all zero encodes `scale = 0` and an all-zero
/// payload; dequantizing it returns zeros rather than dividing by zero.
fn quantize_row(row: &[f32], out: &mut Vec<u8>) {
    for block in row.chunks(Q8_0_BLOCK_LEN) {
        let max_abs = block.iter().fold(0.0f32, |acc, &v| acc.max(v.abs()));
        let scale = max_abs / 127.0;
        out.extend_from_slice(&f32_to_f16_bits(scale).to_le_bytes());

        for &value in block {
            let q = if scale > 0.0 {
                (value / scale).round().clamp(-128.0, 127.0) as i8
            } else {
                0i8
            };
            out.push(q as u8);
        }
        // Pad a short final block (dim not an exact multiple) with zeros;
        // callers are expected to pre-pad `row` to a multiple of the block
        // length, so this only guards against a caller that did not.
        for _ in block.len()..Q8_0_BLOCK_LEN {
            out.push(0);
        }
    }
}

/// Dequantizes `block_count` `Q8_0` blocks starting at `offset` in `bytes`
/// back into `f32` values.
fn dequantize_row(bytes: &[u8], offset: usize, block_count: usize) -> Result<Vec<f32>, GraphKvError> {
    let mut out = Vec::with_capacity(block_count * Q8_0_BLOCK_LEN);
    for block_index in 0..block_count {
        let start = offset + block_index * Q8_0_BLOCK_BYTES;
        let end = start + Q8_0_BLOCK_BYTES;
        let block = bytes
            .get(start..end)
            .ok_or(GraphKvError::Truncated(bytes.len()))?;
        let scale_bits = u16::from_le_bytes([block[0], block[1]]);
        let scale = f16_bits_to_f32(scale_bits);
        for &byte in &block[2..] {
            out.push((byte as i8) as f32 * scale);
        }
    }
    Ok(out)
}

/// Packs one layer's keys and values (each `token_count * dim` `f32`s,
/// row-major) into a Graph-KV byte stream, quantizing every row to `Q8_0`.
///
/// `dim` must be a positive multiple of [`Q8_0_BLOCK_LEN`]; rows of a
/// differently-shaped layer should be padded by the caller before reaching
/// this function.
pub fn encode_layer(header: GraphKvHeader, keys: &[f32], values: &[f32]) -> Result<Vec<u8>, GraphKvError> {
    if header.dim == 0 || header.dim as usize % Q8_0_BLOCK_LEN != 0 {
        return Err(GraphKvError::BadDim(header.dim));
    }

    let mut out = Vec::new();
    out.extend_from_slice(&GRAPH_KV_MAGIC.to_le_bytes());
    out.extend_from_slice(&GRAPH_KV_VERSION.to_le_bytes());
    out.extend_from_slice(&header.layer.to_le_bytes());
    out.extend_from_slice(&header.dim.to_le_bytes());
    out.extend_from_slice(&header.token_count.to_le_bytes());
    out.extend_from_slice(&header.base_position.to_le_bytes());

    let dim = header.dim as usize;
    for row in keys.chunks(dim) {
        quantize_row(row, &mut out);
    }
    for row in values.chunks(dim) {
        quantize_row(row, &mut out);
    }

    Ok(out)
}

/// Unpacks a Graph-KV byte stream back into its header and dequantized
/// keys/values (each `token_count * dim` `f32`s, row-major).
///
/// Unknown magic, unknown version, or a non-block-aligned `dim` are
/// rejected with [`GraphKvError`] rather than panicking, matching how
/// `.zeta` rejects malformed headers.
pub fn decode_layer(bytes: &[u8]) -> Result<(GraphKvHeader, Vec<f32>, Vec<f32>), GraphKvError> {
    if bytes.len() < 4 + HEADER_FIELDS_SIZE {
        return Err(GraphKvError::Truncated(bytes.len()));
    }

    let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
    if magic != GRAPH_KV_MAGIC {
        return Err(GraphKvError::BadMagic(magic));
    }
    let version = u16::from_le_bytes([bytes[2], bytes[3]]);
    if version != GRAPH_KV_VERSION {
        return Err(GraphKvError::BadVersion(version));
    }

    let layer = read_u32(bytes, 4);
    let dim = read_u32(bytes, 8);
    let token_count = read_u32(bytes, 12);
    let base_position = read_i64(bytes, 16);

    if dim == 0 || dim as usize % Q8_0_BLOCK_LEN != 0 {
        return Err(GraphKvError::BadDim(dim));
    }

    let header = GraphKvHeader {
        layer,
        dim,
        token_count,
        base_position,
    };

    let blocks_per_row = dim as usize / Q8_0_BLOCK_LEN;
    let blocks_per_side = blocks_per_row * token_count as usize;
    let payload_start = 4 + HEADER_FIELDS_SIZE;
    let keys = dequantize_row(bytes, payload_start, blocks_per_side)?;
    let values_start = payload_start + blocks_per_side * Q8_0_BLOCK_BYTES;
    let values = dequantize_row(bytes, values_start, blocks_per_side)?;

    Ok((header, keys, values))
}

/// Rebases every relative token position in `relative_positions` (as
/// stored against [`GraphKvHeader::base_position`]) onto `injection_pos`,
/// per `spec.md` §6: "Positions are stored relative to the block, rebased
/// to an `injection_pos` on reinjection."
pub fn rebase_positions(relative_positions: &[i64], injection_pos: i64) -> Vec<i64> {
    relative_positions
        .iter()
        .map(|&relative| injection_pos + relative)
        .collect()
}

/// The positions `token_count` contiguously-captured tokens occupy
/// relative to their own capture's `base_position` (i.e. `0..token_count`),
/// the form they are stored in before a later [`rebase_positions`] call.
pub fn relative_positions(token_count: u32) -> Vec<i64> {
    (0..token_count as i64).collect()
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

fn read_i64(bytes: &[u8], offset: usize) -> i64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    i64::from_le_bytes(buf)
}

/// Hand-rolled IEEE-754 binary16 encode. No crate in the corpus pulls in a
/// dedicated half-float type for this one conversion, so the bit-twiddling
/// lives here instead of adding a dependency for it.
fn f32_to_f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x7f_ffff;

    if exponent == 0xff {
        let nan_bit = if mantissa != 0 { 0x0200 } else { 0 };
        return sign | 0x7c00 | nan_bit;
    }

    let half_exponent = exponent - 127 + 15;

    if half_exponent >= 0x1f {
        return sign | 0x7c00;
    }
    if half_exponent <= 0 {
        if half_exponent < -10 {
            return sign;
        }
        let mantissa_with_implicit = mantissa | 0x0080_0000;
        let shift = 14 - half_exponent;
        let half_mantissa = (mantissa_with_implicit >> shift) as u16;
        return sign | half_mantissa;
    }

    let half_mantissa = (mantissa >> 13) as u16;
    sign | ((half_exponent as u16) << 10) | half_mantissa
}

/// Hand-rolled IEEE-754 binary16 decode, the inverse of [`f32_to_f16_bits`].
fn f16_bits_to_f32(bits: u16) -> f32 {
    let sign = (bits & 0x8000) as u32;
    let exponent = ((bits >> 10) & 0x1f) as u32;
    let mantissa = (bits & 0x3ff) as u32;

    let (exp32, mantissa32) = if exponent == 0 {
        if mantissa == 0 {
            (0u32, 0u32)
        } else {
            let mut shift = 0i32;
            let mut m = mantissa;
            while m & 0x400 == 0 {
                m <<= 1;
                shift += 1;
            }
            m &= 0x3ff;
            let exp32 = (127 - 15 - shift) as u32;
            (exp32, m << 13)
        }
    } else if exponent == 0x1f {
        (0xffu32, mantissa << 13)
    } else {
        (exponent + (127 - 15), mantissa << 13)
    };

    f32::from_bits((sign << 16) | (exp32 << 23) | mantissa32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> GraphKvHeader {
        GraphKvHeader {
            layer: 3,
            dim: 32,
            token_count: 2,
            base_position: 100,
        }
    }

    #[test]
    fn f16_round_trips_typical_scales() {
        for value in [0.0f32, 1.0, -1.0, 0.5, 3.25, 127.0, 0.0078125, -42.5] {
            let bits = f32_to_f16_bits(value);
            let back = f16_bits_to_f32(bits);
            assert!((back - value).abs() < 0.05 * value.abs().max(1.0));
        }
    }

    #[test]
    fn encode_decode_round_trips_within_quantization_error() {
        let header = sample_header();
        let keys: Vec<f32> = (0..64).map(|i| (i as f32 - 32.0) * 0.25).collect();
        let values: Vec<f32> = (0..64).map(|i| (i as f32) * 0.1).collect();

        let bytes = encode_layer(header, &keys, &values).expect("encode");
        let (decoded_header, decoded_keys, decoded_values) = decode_layer(&bytes).expect("decode");

        assert_eq!(decoded_header, header);
        assert_eq!(decoded_keys.len(), keys.len());
        assert_eq!(decoded_values.len(), values.len());

        for (original, roundtripped) in keys.iter().zip(decoded_keys.iter()) {
            assert!((original - roundtripped).abs() < 1.0, "{original} vs {roundtripped}");
        }
    }

    #[test]
    fn all_zero_row_quantizes_without_divide_by_zero() {
        let header = GraphKvHeader {
            layer: 0,
            dim: 32,
            token_count: 1,
            base_position: 0,
        };
        let zeros = vec![0.0f32; 32];
        let bytes = encode_layer(header, &zeros, &zeros).expect("encode");
        let (_, keys, values) = decode_layer(&bytes).expect("decode");
        assert!(keys.iter().all(|&v| v == 0.0));
        assert!(values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let header = sample_header();
        let mut bytes = encode_layer(header, &vec![0.0; 64], &vec![0.0; 64]).unwrap();
        bytes[0] = 0;
        assert!(matches!(decode_layer(&bytes), Err(GraphKvError::BadMagic(_))));
    }

    #[test]
    fn bad_version_is_rejected() {
        let header = sample_header();
        let mut bytes = encode_layer(header, &vec![0.0; 64], &vec![0.0; 64]).unwrap();
        bytes[2] = 9;
        bytes[3] = 0;
        assert!(matches!(decode_layer(&bytes), Err(GraphKvError::BadVersion(9))));
    }

    #[test]
    fn non_aligned_dim_is_rejected_at_encode_time() {
        let header = GraphKvHeader {
            layer: 0,
            dim: 20,
            token_count: 1,
            base_position: 0,
        };
        let err = encode_layer(header, &vec![0.0; 20], &vec![0.0; 20]).unwrap_err();
        assert_eq!(err, GraphKvError::BadDim(20));
    }

    #[test]
    fn positions_are_rebased_onto_the_injection_point() {
        let relative = relative_positions(4);
        assert_eq!(relative, vec![0, 1, 2, 3]);
        let absolute = rebase_positions(&relative, 500);
        assert_eq!(absolute, vec![500, 501, 502, 503]);
    }
}
