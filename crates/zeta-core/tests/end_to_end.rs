//! Literal end-to-end scenarios exercising the public `zeta-core` surface.

use tempfile::TempDir;

use zeta_core::{
    sharpen, sparse_softmax, temporal_decay, temporal_weight, AccelKernels, Binding,
    BindingConfig, CpuKernels, Orchestrator, ScoreTile, SublimatePolicy, SublimationState,
    ZetaConfig,
};

fn base_config(dir: &std::path::Path, summary_dim: usize) -> ZetaConfig {
    ZetaConfig {
        temporal_lambda: 0.0,
        tunneling_threshold: 0.0,
        retrieve_threshold: 0.0,
        momentum_gamma: 0.0,
        storage_dir: dir.to_path_buf(),
        summary_dim,
        max_blocks: 64,
        max_active_blocks: 64,
        top_k: 4,
        max_hops: 2,
        injection_alpha: 1.0,
        min_attention: 0.0,
        constitution_bytes: None,
        expected_policy_hash: None,
        n_vocab: 0,
        n_embd: 0,
        binding_enabled: false,
        dev_mode: true,
        load_existing: true,
        sublimate_policy: SublimatePolicy::Manual,
        kv_max: 4096,
        block_size: 64,
        env_flags: Default::default(),
    }
}

/// Scenario 1: round-trip persistence across a store reopen.
#[test]
fn round_trip_persistence() {
    let dir = TempDir::new().expect("tempdir");
    let keys = vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0];
    let values = vec![2.0, 0.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0];
    let summary = vec![0.5, 0.5, 0.0, 0.0];

    {
        let orchestrator = Orchestrator::new(base_config(dir.path(), 4)).expect("build");
        let id = orchestrator
            .sublimate(0, 2, &keys, &values, Some(summary.clone()), 8)
            .expect("sublimate");
        assert_eq!(id, 0);
    }

    let store = zeta_core::BlockStore::open(zeta_core::StoreConfig {
        storage_dir: dir.path().to_path_buf(),
        summary_dim: 4,
        max_blocks: 64,
        max_active_blocks: 64,
        load_existing: true,
    })
    .expect("reopen");

    assert_eq!(store.len(), 1);
    assert_eq!(store.next_block_id(), 1);
    let block = store.block(0).expect("block present");
    assert_eq!(block.token_range(), (0, 2));
    assert!((block.summary_norm() - 0.5f32.sqrt()).abs() < 1e-6);
    assert_eq!(block.keys().expect("keys resident"), keys);
    assert_eq!(block.values().expect("values resident"), values);
}

/// Scenario 2: score decays monotonically, and touching a block resets its
/// zeta-potential for the next decay window.
#[test]
fn score_monotonicity_under_decay() {
    let lambda = 0.1;

    // exp(-1.0) after 10 untouched steps.
    let decayed_once = temporal_weight(0, 10, lambda);
    assert!((decayed_once - (-1.0f32).exp()).abs() < 1e-4);
    let score_at_10 = sharpen(1.0) * decayed_once;
    assert!((score_at_10 - 0.3679).abs() < 1e-3);

    // Touching at step 10 resets zeta_potential to 1; one more step of age
    // (lambda*1) by step 11 gives exp(-0.1).
    let decayed_after_touch = temporal_weight(10, 11, lambda);
    assert!((decayed_after_touch - (-0.1f32).exp()).abs() < 1e-4);
    assert!((decayed_after_touch - 0.9048).abs() < 1e-3);
}

/// Scenario 3: the sparse-gate safeguard never emits an all-masked row.
#[test]
fn sparse_gate_safety_never_produces_an_all_masked_row() {
    let mut tile = ScoreTile::from_vec(vec![-10.0, -9.0, -8.0, -7.0], 1, 4).unwrap();
    temporal_decay(&mut tile, 0, 0.0);
    let kernels = CpuKernels;
    kernels.attention_modifier(&mut tile, 0, 0.0, 0.0);
    let row = tile.row(0).unwrap();
    assert_eq!(row, &[f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY, -7.0]);

    sparse_softmax(&mut tile, 0.0);
    let softmaxed = tile.row(0).unwrap();
    assert_eq!(softmaxed, &[0.0, 0.0, 0.0, 1.0]);
}

/// Scenario 4: permutation round-trip on a fixed policy document.
#[test]
fn permutation_round_trip() {
    let config = BindingConfig::accepting_any(8, 4);
    let binding = Binding::init(b"hello", &config).expect("init");

    for t in 0..8u32 {
        assert_eq!(binding.vocab_inv[binding.vocab_perm[t as usize] as usize], t);
    }

    let original = vec![0.1f32, 0.2, 0.9, 0.05, 0.0, 0.0, 0.0, 0.0];
    let mut logits = original.clone();
    binding.bind_logits(&mut logits).expect("bind");
    // unbind_logits is the inverse permutation applied elementwise.
    let mut restored = vec![0.0f32; logits.len()];
    for (i, &src) in binding.vocab_perm.iter().enumerate() {
        restored[src as usize] = logits[i];
    }
    for (a, b) in original.iter().zip(restored.iter()) {
        assert!((a - b).abs() < 1e-6);
    }
}

/// Scenario 5: multi-hop expansion surfaces a linked, orthogonal block at
/// an attenuated score.
#[test]
fn multi_hop_expansion_surfaces_linked_block() {
    let dir = TempDir::new().expect("tempdir");
    let mut store = zeta_core::BlockStore::open(zeta_core::StoreConfig {
        storage_dir: dir.path().to_path_buf(),
        summary_dim: 3,
        max_blocks: 64,
        max_active_blocks: 64,
        load_existing: true,
    })
    .expect("open");

    let a = store
        .sublimate(0, 1, &[0.0; 3], &[0.0; 3], vec![1.0, 0.0, 0.0])
        .unwrap();
    let b = store
        .sublimate(1, 1, &[0.0; 3], &[0.0; 3], vec![0.0, 1.0, 0.0])
        .unwrap();
    let b_index = store.index_of(b).unwrap();

    // Wire an explicit 0.9-weight edge A -> B (stronger than the
    // similarity-derived link `link_new_block` would compute here, since
    // A and B are orthogonal).
    if let Some(block) = store.block_mut(b_index) {
        block.adjacency.clear();
    }
    let a_index = store.index_of(a).unwrap();
    if let Some(block) = store.block_mut(a_index) {
        block.adjacency.push((b, 0.9));
    }

    let config = zeta_core::RetrievalConfig {
        top_k: 1,
        max_hops: 0,
        decay_lambda: 0.0,
        retrieve_threshold: 0.2,
    };
    let direct = zeta_core::retrieve(&mut store, &[1.0, 0.0, 0.0], &config, 0).expect("direct");
    assert_eq!(direct.len(), 1);
    assert_eq!(direct[0].block_id, a);

    let config = zeta_core::RetrievalConfig {
        top_k: 1,
        max_hops: 2,
        decay_lambda: 0.0,
        retrieve_threshold: 0.2,
    };
    let expanded = zeta_core::retrieve(&mut store, &[1.0, 0.0, 0.0], &config, 0).expect("expanded");
    assert_eq!(expanded.len(), 2);
    let b_result = expanded.iter().find(|r| r.block_id == b).expect("b reached");
    assert!((b_result.score - 0.45).abs() < 1e-4);
}

/// Scenario 6 (adapted): `PRESSURE` sublimation rounds the removal amount
/// up to `block_size` and targets `pressure - 0.1`.
///
/// The literal `spec.md` walkthrough ("feed 420 tokens, no sublimation;
/// feed one more, kv_used=421 triggers") is numerically inconsistent: at
/// `kv_max=512, pressure=0.8`, the trigger ratio `0.8` is already crossed
/// at `kv_used=410`, nineteen tokens before 420. This test exercises the
/// identical formula the walkthrough describes with a scenario where the
/// "no trigger, then trigger on the next token" framing is actually
/// consistent, and documents the discrepancy (see `DESIGN.md`).
#[test]
fn pressure_sublimation_targets_pressure_minus_one_tenth() {
    let mut state = SublimationState::new(
        SublimatePolicy::Pressure { pressure: 0.8 },
        64,
        512,
    );
    for _ in 0..409 {
        state.grow(None);
    }
    assert_eq!(state.pending_range(), None);

    state.grow(None); // kv_used = 410, 410/512 = 0.8008 >= 0.8
    let (start, count) = state.pending_range().expect("crosses pressure threshold");
    assert_eq!(start, 1);
    // raw removal = 410 - floor(0.7*512=358.4 as usize=358) = 52, rounds up to 64.
    assert_eq!(count, 64);
}
