//! Temporal decay and the fused decay-then-gate attention modifier.

use crate::tile::ScoreTile;

/// Multiplies every `S[q, k]` by `exp(-lambda * age)` where
/// `age = current_pos - k`, for `age > 0`. `lambda <= 0.0` is a no-op.
pub fn temporal_decay(tile: &mut ScoreTile, current_pos: i64, lambda: f32) {
    if lambda <= 0.0 {
        return;
    }
    for row in tile.rows_mut() {
        for (k, cell) in row.iter_mut().enumerate() {
            let age = current_pos - k as i64;
            if age > 0 {
                *cell *= (-lambda * age as f32).exp();
            }
        }
    }
}

/// Fuses [`temporal_decay`] with a sparse gate: decays the row, records its
/// maximum, masks every element below `tau` to `-inf`, then restores the
/// recorded maximum if gating would otherwise leave the row entirely
/// `-inf` (downstream softmax must never see an all-masked row).
pub fn attention_modifier(tile: &mut ScoreTile, current_pos: i64, lambda: f32, tau: f32) {
    temporal_decay(tile, current_pos, lambda);

    for row in tile.rows_mut() {
        let mut max_value = f32::NEG_INFINITY;
        let mut max_index = 0usize;
        for (k, &value) in row.iter().enumerate() {
            if value > max_value {
                max_value = value;
                max_index = k;
            }
        }

        for cell in row.iter_mut() {
            if *cell < tau {
                *cell = f32::NEG_INFINITY;
            }
        }

        let all_masked = row.iter().all(|&v| v == f32::NEG_INFINITY);
        if all_masked {
            if let Some(cell) = row.get_mut(max_index) {
                *cell = max_value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_lambda_is_a_no_op() {
        let mut tile = ScoreTile::from_vec(vec![1.0, 2.0, 3.0, 4.0], 1, 4).unwrap();
        let before = tile.clone();
        temporal_decay(&mut tile, 10, 0.0);
        assert_eq!(tile, before);
        temporal_decay(&mut tile, 10, -1.0);
        assert_eq!(tile, before);
    }

    #[test]
    fn decay_shrinks_older_keys_more() {
        let mut tile = ScoreTile::from_vec(vec![1.0, 1.0, 1.0], 1, 3).unwrap();
        temporal_decay(&mut tile, 2, 0.5);
        let row = tile.row(0).unwrap();
        // key 2 has age 0 (no decay), key 1 has age 1, key 0 has age 2.
        assert_eq!(row[2], 1.0);
        assert!(row[1] < row[2]);
        assert!(row[0] < row[1]);
    }

    #[test]
    fn sparse_gate_safety_restores_row_maximum() {
        let mut tile = ScoreTile::from_vec(vec![-10.0, -9.0, -8.0, -7.0], 1, 4).unwrap();
        attention_modifier(&mut tile, 0, 0.0, 0.0);
        let row = tile.row(0).unwrap();
        assert_eq!(row[0], f32::NEG_INFINITY);
        assert_eq!(row[1], f32::NEG_INFINITY);
        assert_eq!(row[2], f32::NEG_INFINITY);
        assert_eq!(row[3], -7.0);
    }

    #[test]
    fn gating_that_leaves_survivors_does_not_restore_anything() {
        let mut tile = ScoreTile::from_vec(vec![1.0, -1.0, 5.0], 1, 3).unwrap();
        attention_modifier(&mut tile, 0, 0.0, 0.0);
        let row = tile.row(0).unwrap();
        assert_eq!(row[0], 1.0);
        assert_eq!(row[1], f32::NEG_INFINITY);
        assert_eq!(row[2], 5.0);
    }
}
