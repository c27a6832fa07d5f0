//! Precision of fresh ciphertexts under the rescaling modes
//!
//! The extra prime of `FlexibleAutoExt` encodes at a larger scale and rescales
//! the encryption noise away, so fresh ciphertexts decrypt with visibly more
//! bits than under `FlexibleAuto`.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use modckks::params::{CkksModConfig, ScalingTechnique, SchemeKind};
use modckks::scheme::{Feature, ModuleCkks};

const TRIALS: usize = 6;

fn mean_fresh_log_error(technique: ScalingTechnique) -> f64 {
    let mut cc = ModuleCkks::new(CkksModConfig {
        ring_dim: 2048,
        mult_depth: 1,
        scaling_mod_size: 40,
        first_mod_size: 60,
        scheme: SchemeKind::Module { rank: 2 },
        scaling_technique: technique,
        batch_size: 8,
        seed: Some(4242),
        ..CkksModConfig::default()
    })
    .unwrap();
    cc.enable(Feature::Pke).unwrap();
    let keys = cc.key_gen().unwrap();

    let mut rng = ChaCha20Rng::seed_from_u64(17);
    let mut total = 0.0;
    for _ in 0..TRIALS {
        let values: Vec<f64> = (0..8).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let pt = cc.make_ckks_packed_plaintext(&values).unwrap();
        let ct = cc.encrypt(&keys.public_key, &pt).unwrap();
        total += cc.decrypt(&keys.secret_key, &ct).unwrap().log_error(&values);
    }
    total / TRIALS as f64
}

#[test]
fn test_extra_prime_improves_fresh_precision() {
    let auto = mean_fresh_log_error(ScalingTechnique::FlexibleAuto);
    let ext = mean_fresh_log_error(ScalingTechnique::FlexibleAutoExt);
    assert!(auto > 20.0, "flexible-auto precision {} bits", auto);
    assert!(ext >= auto + 1.5, "ext {} bits vs auto {} bits", ext, auto);
}
