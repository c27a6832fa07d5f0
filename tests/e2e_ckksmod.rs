//! End-to-end tests for module CKKS
//!
//! KeyGen → Encrypt → Evaluate → (Rank reduce) → Decrypt = expected values

use modckks::params::{CkksModConfig, ScalingTechnique, SchemeKind};
use modckks::scheme::{Feature, ModuleCkks};
use modckks::ModckksError;

const X1: [f64; 8] = [0.25, 0.5, 0.75, 1.0, 2.0, 3.0, 4.0, 5.0];
const X2: [f64; 8] = [5.0, 4.0, 3.0, 2.0, 1.0, 0.75, 0.5, 0.25];

fn context(rank: usize, technique: ScalingTechnique, mult_depth: usize) -> ModuleCkks {
    let mut cc = ModuleCkks::new(CkksModConfig {
        ring_dim: 256,
        mult_depth,
        scheme: if rank == 1 {
            SchemeKind::Standard
        } else {
            SchemeKind::Module { rank }
        },
        scaling_technique: technique,
        batch_size: 8,
        seed: Some(0x5eed + rank as u64),
        ..CkksModConfig::default()
    })
    .unwrap();
    cc.enable(Feature::Pke).unwrap();
    cc.enable(Feature::KeySwitch).unwrap();
    cc.enable(Feature::LeveledShe).unwrap();
    cc
}

fn assert_close(got: &[f64], want: &[f64], tol: f64) {
    assert!(got.len() >= want.len());
    for (i, (g, w)) in got.iter().zip(want).enumerate() {
        assert!((g - w).abs() < tol, "slot {}: {} vs {}", i, g, w);
    }
}

fn product(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x * y).collect()
}

#[test]
fn test_e2e_add_mult_decrypt() {
    for technique in [
        ScalingTechnique::FixedAuto,
        ScalingTechnique::FlexibleAuto,
        ScalingTechnique::FlexibleAutoExt,
    ] {
        let mut cc = context(2, technique, 2);
        let keys = cc.key_gen().unwrap();
        let mult_keys = cc.eval_mult_mod_key_gen(&keys.secret_key).unwrap();

        let ct1 = cc.encrypt(&keys.public_key, &cc.make_ckks_packed_plaintext(&X1).unwrap()).unwrap();
        let ct2 = cc.encrypt(&keys.public_key, &cc.make_ckks_packed_plaintext(&X2).unwrap()).unwrap();

        let sum = cc.eval_add(&ct1, &ct2).unwrap();
        let expected: Vec<f64> = X1.iter().zip(&X2).map(|(a, b)| a + b).collect();
        assert_close(&cc.decrypt(&keys.secret_key, &sum).unwrap().values, &expected, 1e-6);

        let prod = cc.eval_mult_and_relinearize(&ct1, &ct2, &mult_keys).unwrap();
        assert_eq!(prod.len(), 2, "{}", technique);
        assert_eq!(prod.noise_scale_deg(), 2);
        assert_close(&cc.decrypt(&keys.secret_key, &prod).unwrap().values, &product(&X1, &X2), 1e-4);
    }
}

#[test]
fn test_e2e_depth_two_circuit() {
    let mut cc = context(3, ScalingTechnique::FlexibleAuto, 3);
    let keys = cc.key_gen().unwrap();
    let mult_keys = cc.eval_mult_mod_key_gen(&keys.secret_key).unwrap();

    let ct1 = cc.encrypt(&keys.public_key, &cc.make_ckks_packed_plaintext(&X1).unwrap()).unwrap();
    let ct2 = cc.encrypt(&keys.public_key, &cc.make_ckks_packed_plaintext(&X2).unwrap()).unwrap();

    // (x1·x2)·x1 + x2: the second product and the sum mix levels
    let p = cc.eval_mult_and_relinearize(&ct1, &ct2, &mult_keys).unwrap();
    let pp = cc.eval_mult_and_relinearize(&p, &ct1, &mult_keys).unwrap();
    let out = cc.eval_add(&pp, &ct2).unwrap();
    assert!(out.level() > ct1.level());

    let expected: Vec<f64> = (0..8).map(|i| X1[i] * X2[i] * X1[i] + X2[i]).collect();
    assert_close(&cc.decrypt(&keys.secret_key, &out).unwrap().values, &expected, 1e-3);
}

#[test]
fn test_e2e_fixed_manual_session() {
    let mut cc = context(2, ScalingTechnique::FixedManual, 2);
    let keys = cc.key_gen().unwrap();
    let mult_keys = cc.eval_mult_mod_key_gen(&keys.secret_key).unwrap();

    let ct1 = cc.encrypt(&keys.public_key, &cc.make_ckks_packed_plaintext(&X1).unwrap()).unwrap();
    let ct2 = cc.encrypt(&keys.public_key, &cc.make_ckks_packed_plaintext(&X2).unwrap()).unwrap();

    let prod = cc.eval_mult_and_relinearize(&ct1, &ct2, &mult_keys).unwrap();
    assert_eq!(prod.noise_scale_deg(), 2);

    // depth 2 against depth 1 cannot be reconciled without a manual rescale
    assert!(matches!(cc.eval_add(&prod, &ct1), Err(ModckksError::DepthMismatch(_))));

    let rescaled = cc.mod_reduce(&prod, 1).unwrap();
    assert_eq!(rescaled.noise_scale_deg(), 1);
    assert_eq!(rescaled.level(), prod.level() + 1);
    let sum = cc.eval_add(&rescaled, &ct1).unwrap();

    let expected: Vec<f64> = (0..8).map(|i| X1[i] * X2[i] + X1[i]).collect();
    assert_close(&cc.decrypt(&keys.secret_key, &sum).unwrap().values, &expected, 1e-4);
}

#[test]
fn test_e2e_no_rescale_products_keep_growing() {
    let mut cc = context(2, ScalingTechnique::NoRescale, 2);
    let keys = cc.key_gen().unwrap();
    let mult_keys = cc.eval_mult_mod_key_gen(&keys.secret_key).unwrap();
    let ct = cc.encrypt(&keys.public_key, &cc.make_ckks_packed_plaintext(&X1).unwrap()).unwrap();

    let sq = cc.eval_mult_and_relinearize(&ct, &ct, &mult_keys).unwrap();
    assert_eq!(sq.level(), ct.level());
    assert_eq!(sq.noise_scale_deg(), 2);
    assert_eq!(sq.scaling_factor(), ct.scaling_factor() * ct.scaling_factor());
    assert_close(&cc.decrypt(&keys.secret_key, &sq).unwrap().values, &product(&X1, &X1), 1e-3);
}

#[test]
fn test_e2e_rank_reduction_pairs() {
    for (rank, new_rank) in [(2, 1), (3, 1), (3, 2), (4, 1), (4, 2), (4, 3)] {
        let mut cc = context(rank, ScalingTechnique::FlexibleAuto, 2);
        let keys = cc.key_gen().unwrap();
        let mult_keys = cc.eval_mult_mod_key_gen(&keys.secret_key).unwrap();
        let (reduced_sk, red_key) = cc.eval_rank_red_key_gen(&keys.secret_key, new_rank).unwrap();
        assert_eq!(reduced_sk.rank(), new_rank);
        assert_eq!(red_key.new_rank(), new_rank);

        let ct1 = cc.encrypt(&keys.public_key, &cc.make_ckks_packed_plaintext(&X1).unwrap()).unwrap();
        let ct2 = cc.encrypt(&keys.public_key, &cc.make_ckks_packed_plaintext(&X2).unwrap()).unwrap();

        let fresh = cc.eval_rank_reduce(&ct1, &red_key).unwrap();
        assert_eq!(fresh.rank(), new_rank, "{} -> {}", rank, new_rank);
        assert_close(&cc.decrypt(&reduced_sk, &fresh).unwrap().values, &X1, 1e-5);

        let prod = cc.eval_mult_and_relinearize(&ct1, &ct2, &mult_keys).unwrap();
        let reduced = cc.eval_rank_reduce(&prod, &red_key).unwrap();
        assert_eq!(reduced.level(), prod.level());
        assert_close(
            &cc.decrypt(&reduced_sk, &reduced).unwrap().values,
            &product(&X1, &X2),
            1e-3,
        );
    }
}

#[test]
fn test_e2e_rank_reduction_rejects_wrong_rank() {
    let mut cc = context(4, ScalingTechnique::FlexibleAuto, 2);
    let keys = cc.key_gen().unwrap();
    let (sk3, key_to_3) = cc.eval_rank_red_key_gen(&keys.secret_key, 3).unwrap();
    let (_, key_3_to_1) = cc.eval_rank_red_key_gen(&sk3, 1).unwrap();

    let ct = cc.encrypt(&keys.public_key, &cc.make_ckks_packed_plaintext(&X1).unwrap()).unwrap();
    // a rank-3 key cannot be applied to the rank-4 ciphertext
    assert!(matches!(
        cc.eval_rank_reduce(&ct, &key_3_to_1),
        Err(ModckksError::DimensionMismatch(_))
    ));

    let ct3 = cc.eval_rank_reduce(&ct, &key_to_3).unwrap();
    assert_eq!(ct3.rank(), 3);

    for bad in [0, 4, 5] {
        assert!(matches!(
            cc.eval_rank_red_key_gen(&keys.secret_key, bad),
            Err(ModckksError::InvalidParameters(_))
        ));
    }
}

#[test]
fn test_e2e_scalar_and_plaintext_operands() {
    let mut cc = context(2, ScalingTechnique::FlexibleAutoExt, 2);
    let keys = cc.key_gen().unwrap();
    let ct = cc.encrypt(&keys.public_key, &cc.make_ckks_packed_plaintext(&X1).unwrap()).unwrap();

    let scaled = cc.eval_mult_scalar(&ct, -1.5).unwrap();
    let expected: Vec<f64> = X1.iter().map(|v| v * -1.5).collect();
    assert_close(&cc.decrypt(&keys.secret_key, &scaled).unwrap().values, &expected, 1e-4);

    let pt = cc.make_ckks_packed_plaintext(&X2).unwrap();
    let diff = cc.eval_sub_plaintext(&ct, &pt).unwrap();
    let expected: Vec<f64> = X1.iter().zip(&X2).map(|(a, b)| a - b).collect();
    assert_close(&cc.decrypt(&keys.secret_key, &diff).unwrap().values, &expected, 1e-5);
}

#[test]
fn test_e2e_depth_exhaustion_reports_dimension_mismatch() {
    let mut cc = context(2, ScalingTechnique::FlexibleAuto, 2);
    let keys = cc.key_gen().unwrap();
    let mult_keys = cc.eval_mult_mod_key_gen(&keys.secret_key).unwrap();
    let mut ct = cc.encrypt(&keys.public_key, &cc.make_ckks_packed_plaintext(&X1).unwrap()).unwrap();

    let mut squarings = 0;
    let err = loop {
        match cc.eval_mult_and_relinearize(&ct, &ct, &mult_keys) {
            Ok(next) => {
                ct = next;
                squarings += 1;
                assert!(squarings < 6, "depth never ran out");
            }
            Err(e) => break e,
        }
    };
    // the rescale refuses to drop the last tower before decryption could see none
    assert!(squarings >= 2, "failed after {} squarings: {}", squarings, err);
    assert!(matches!(err, ModckksError::DimensionMismatch(_)), "{}", err);
    assert!(ct.num_towers() >= 1);
}
