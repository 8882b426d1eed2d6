//! Weight XOR keystream.
//!
//! `decrypt_weights` is symmetric: encryption and decryption are the same
//! operation. Every supported element type is handled purely as bytes —
//! the keystream never needs to interpret a value numerically, only to XOR
//! independently-derived masks into fixed-size fields.

use zeta_hash::mask_word;

/// Element types `decrypt_weights` understands, per `spec.md` §4.2.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementKind {
    /// 4-byte IEEE-754 float.
    F32,
    /// 2-byte IEEE-754 half float.
    F16,
    /// ggml-style 4-bit block quantization: a 2-byte fp16 scale followed by
    /// a 16-byte packed-nibble payload (32 values per block).
    Q4_0,
    /// ggml-style 8-bit block quantization: a 2-byte fp16 scale followed by
    /// a 32-byte `i8` payload (32 values per block).
    Q8_0,
}

impl ElementKind {
    /// Size in bytes of one element (uncompressed kinds) or one block
    /// (quantized kinds).
    fn stride(self) -> usize {
        match self {
            ElementKind::F32 => 4,
            ElementKind::F16 => 2,
            ElementKind::Q4_0 => 2 + 16,
            ElementKind::Q8_0 => 2 + 32,
        }
    }
}

/// Distinguishes the scale sub-field from the payload sub-field of a
/// quantized block so the two are never masked with the same keystream.
const SCALE_SALT: u64 = 0x5343_414C_4530_3031; // "SCALE001"
const PAYLOAD_SALT: u64 = 0x5041_594C_4F4144; // "PAYLOAD"

/// XORs a counter-based keystream into `buf`, covering `n` elements (or
/// blocks, for quantized kinds) of `dtype`.
///
/// This is symmetric: calling it twice with the same `layer_offset`, `dtype`,
/// and `seed` restores the original buffer. `on_gpu` does not change the
/// masking math — GPU-resident buffers are masked identically to host
/// buffers, since the keystream is purely a function of element position,
/// never of memory location.
pub fn decrypt_weights(
    buf: &mut [u8],
    n: usize,
    layer_offset: u64,
    dtype: ElementKind,
    seed: u64,
    on_gpu: bool,
) {
    let _ = on_gpu;
    let stride = dtype.stride();
    let needed = stride.saturating_mul(n);
    let limit = needed.min(buf.len());

    match dtype {
        ElementKind::F32 | ElementKind::F16 => {
            xor_uniform_elements(&mut buf[..limit], stride, layer_offset, seed)
        }
        ElementKind::Q4_0 | ElementKind::Q8_0 => {
            xor_quantized_blocks(&mut buf[..limit], stride, layer_offset, seed)
        }
    }
}

fn xor_uniform_elements(buf: &mut [u8], stride: usize, layer_offset: u64, seed: u64) {
    for (index, chunk) in buf.chunks_mut(stride).enumerate() {
        let mask = mask_word(index as u64, layer_offset, seed).to_le_bytes();
        for (byte, mask_byte) in chunk.iter_mut().zip(mask.iter()) {
            *byte ^= mask_byte;
        }
    }
}

fn xor_quantized_blocks(buf: &mut [u8], stride: usize, layer_offset: u64, seed: u64) {
    for (block_index, block) in buf.chunks_mut(stride).enumerate() {
        if block.len() < 2 {
            continue;
        }
        let (scale, payload) = block.split_at_mut(2);

        let scale_mask = mask_word(block_index as u64, layer_offset ^ SCALE_SALT, seed).to_le_bytes();
        for (byte, mask_byte) in scale.iter_mut().zip(scale_mask.iter()) {
            *byte ^= mask_byte;
        }

        for (word_index, word) in payload.chunks_mut(8).enumerate() {
            let payload_mask = mask_word(
                (block_index as u64) * 1_000 + word_index as u64,
                layer_offset ^ PAYLOAD_SALT,
                seed,
            )
            .to_le_bytes();
            for (byte, mask_byte) in word.iter_mut().zip(payload_mask.iter()) {
                *byte ^= mask_byte;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_decrypt_is_an_involution() {
        let original = vec![1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
        let mut buf = original.clone();
        decrypt_weights(&mut buf, 3, 7, ElementKind::F32, 0xABCD, false);
        assert_ne!(buf, original);
        decrypt_weights(&mut buf, 3, 7, ElementKind::F32, 0xABCD, false);
        assert_eq!(buf, original);
    }

    #[test]
    fn q8_0_scale_and_payload_use_independent_masks() {
        let original = vec![0u8; 34];
        let mut buf = original.clone();
        decrypt_weights(&mut buf, 1, 0, ElementKind::Q8_0, 42, false);
        let scale_changed = buf[..2] != original[..2];
        let payload_changed = buf[2..] != original[2..];
        assert!(scale_changed);
        assert!(payload_changed);
        assert_ne!(&buf[..2], &buf[2..4]);
    }

    #[test]
    fn q4_0_round_trips() {
        let original: Vec<u8> = (0u8..18).collect();
        let mut buf = original.clone();
        decrypt_weights(&mut buf, 1, 5, ElementKind::Q4_0, 99, true);
        decrypt_weights(&mut buf, 1, 5, ElementKind::Q4_0, 99, true);
        assert_eq!(buf, original);
    }

    #[test]
    fn independent_subranges_decrypt_without_full_replay() {
        let mut whole = vec![0u8; 4 * 10];
        decrypt_weights(&mut whole, 10, 3, ElementKind::F32, 123, false);

        let mut just_element_five = vec![0u8; 4];
        let mask = mask_word(5, 3, 123).to_le_bytes();
        for (byte, mask_byte) in just_element_five.iter_mut().zip(mask.iter()) {
            *byte ^= mask_byte;
        }

        assert_eq!(&whole[5 * 4..6 * 4], just_element_five.as_slice());
    }
}
