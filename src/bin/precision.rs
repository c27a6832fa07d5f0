//! modckks-precision: compare fresh-ciphertext precision across rescaling modes
//!
//! Encrypts random vectors, squares them and decrypts, reporting the mean
//! `log2` error for `FlexibleAuto` against `FlexibleAutoExt`.

use std::time::Instant;

use clap::Parser;
use eyre::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use modckks::params::{CkksModConfig, SchemeKind, ScalingTechnique};
use modckks::scheme::{Feature, ModuleCkks};

#[derive(Parser)]
#[command(name = "modckks-precision")]
#[command(about = "Measure decryption precision of module CKKS")]
#[command(version)]
struct Args {
    #[arg(long, default_value = "2048")]
    ring_dim: usize,

    #[arg(long, default_value = "2")]
    rank: usize,

    /// Encryptions per scaling technique
    #[arg(long, default_value = "20")]
    trials: usize,

    #[arg(long, default_value = "8")]
    slots: usize,

    #[arg(long, default_value = "40")]
    scaling_mod_size: u32,

    /// Random seed for the whole run
    #[arg(long, default_value = "1")]
    seed: u64,
}

struct Summary {
    fresh: f64,
    squared: f64,
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    info!("Module CKKS precision");
    info!("Ring dimension: {}, rank: {}, trials: {}", args.ring_dim, args.rank, args.trials);

    let mut results = Vec::new();
    for technique in [ScalingTechnique::FlexibleAuto, ScalingTechnique::FlexibleAutoExt] {
        let summary = run(&args, technique).with_context(|| format!("Precision run failed for {}", technique))?;
        results.push((technique, summary));
    }

    println!();
    println!("=== Precision (mean |log2 error|, higher is better) ===");
    for (technique, summary) in &results {
        println!(
            "{:<18} fresh {:>6.2} bits   squared {:>6.2} bits",
            technique.to_string(),
            summary.fresh,
            summary.squared
        );
    }
    if let [(_, auto), (_, ext)] = results.as_slice() {
        println!("Extra prime gain on fresh ciphertexts: {:.2} bits", ext.fresh - auto.fresh);
    }
    Ok(())
}

fn run(args: &Args, technique: ScalingTechnique) -> Result<Summary> {
    let config = CkksModConfig {
        ring_dim: args.ring_dim,
        mult_depth: 2,
        scaling_mod_size: args.scaling_mod_size,
        first_mod_size: 60,
        scheme: if args.rank == 1 {
            SchemeKind::Standard
        } else {
            SchemeKind::Module { rank: args.rank }
        },
        scaling_technique: technique,
        batch_size: args.slots,
        seed: Some(args.seed),
        ..CkksModConfig::default()
    };
    config
        .validate()
        .map_err(|e| eyre::eyre!("Invalid parameters: {}", e))?;

    let mut cc = ModuleCkks::new(config)?;
    cc.enable(Feature::Pke)?;
    cc.enable(Feature::KeySwitch)?;
    cc.enable(Feature::LeveledShe)?;
    let keys = cc.key_gen()?;
    let mult_keys = cc.eval_mult_mod_key_gen(&keys.secret_key)?;

    let mut rng = ChaCha20Rng::seed_from_u64(args.seed);
    let pb = ProgressBar::new(args.trials as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message(technique.to_string());

    let start = Instant::now();
    let mut fresh = 0.0;
    let mut squared = 0.0;
    for _ in 0..args.trials {
        let values: Vec<f64> = (0..args.slots).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let expected: Vec<f64> = values.iter().map(|v| v * v).collect();

        let pt = cc.make_ckks_packed_plaintext(&values)?;
        let ct = cc.encrypt(&keys.public_key, &pt)?;
        fresh += cc.decrypt(&keys.secret_key, &ct)?.log_error(&values);

        let sq = cc.eval_mult_and_relinearize(&ct, &ct, &mult_keys)?;
        squared += cc.decrypt(&keys.secret_key, &sq)?.log_error(&expected);
        pb.inc(1);
    }
    pb.finish_with_message(format!("{} done", technique));

    let trials = args.trials.max(1) as f64;
    info!("{}: {} trials in {:.2?}", technique, args.trials, start.elapsed());
    Ok(Summary {
        fresh: fresh / trials,
        squared: squared / trials,
    })
}
