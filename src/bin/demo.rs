//! modckks-demo: walk through a module CKKS session
//!
//! Generates keys, encrypts two vectors, adds and multiplies them, reduces the
//! module rank of the product and decrypts everything.

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use eyre::{Context, Result};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use modckks::params::{CkksModConfig, SchemeKind, ScalingTechnique};
use modckks::scheme::{Feature, ModuleCkks};

#[derive(Parser)]
#[command(name = "modckks-demo")]
#[command(about = "Encrypt, evaluate and decrypt with module CKKS")]
#[command(version)]
struct Args {
    /// JSON config file; command-line values below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ring dimension (power of two)
    #[arg(long)]
    ring_dim: Option<usize>,

    /// Module rank of fresh ciphertexts
    #[arg(long, default_value = "4")]
    rank: usize,

    /// Rank after reduction of the product
    #[arg(long, default_value = "2")]
    new_rank: usize,

    #[arg(long)]
    mult_depth: Option<usize>,

    #[arg(long)]
    scaling_mod_size: Option<u32>,

    /// fixed-manual, fixed-auto, flexible-auto, flexible-auto-ext or no-rescale
    #[arg(long, default_value = "flexible-auto-ext")]
    technique: ScalingTechnique,

    /// Log at debug level
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => CkksModConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => CkksModConfig::demo(),
    };
    config.scheme = if args.rank == 1 {
        SchemeKind::Standard
    } else {
        SchemeKind::Module { rank: args.rank }
    };
    config.scaling_technique = args.technique;
    if let Some(ring_dim) = args.ring_dim {
        config.ring_dim = ring_dim;
    }
    if let Some(depth) = args.mult_depth {
        config.mult_depth = depth;
    }
    if let Some(bits) = args.scaling_mod_size {
        config.scaling_mod_size = bits;
    }
    config
        .validate()
        .map_err(|e| eyre::eyre!("Invalid parameters: {}", e))?;

    info!("Module CKKS demo");
    info!("Ring dimension: {}", config.ring_dim);
    info!("Module rank: {}", config.rank());
    info!("Multiplicative depth: {}", config.mult_depth);
    info!("Scaling technique: {}", config.scaling_technique);

    let setup_start = Instant::now();
    let mut cc = ModuleCkks::new(config).wrap_err("Failed to build crypto context")?;
    cc.enable(Feature::Pke)?;
    cc.enable(Feature::KeySwitch)?;
    cc.enable(Feature::LeveledShe)?;
    info!("Context ready with {} towers ({:.2?})", cc.params().size_q(), setup_start.elapsed());

    let keygen_start = Instant::now();
    let keys = cc.key_gen().wrap_err("Key generation failed")?;
    let mult_keys = cc
        .eval_mult_mod_key_gen(&keys.secret_key)
        .wrap_err("Relinearization key generation failed")?;
    info!("Key generation: {:.2?}", keygen_start.elapsed());

    let x1 = [0.25, 0.5, 0.75, 1.0, 2.0, 3.0, 4.0, 5.0];
    let x2 = [5.0, 4.0, 3.0, 2.0, 1.0, 0.75, 0.5, 0.25];

    let encrypt_start = Instant::now();
    let pt1 = cc.make_ckks_packed_plaintext(&x1)?;
    let pt2 = cc.make_ckks_packed_plaintext(&x2)?;
    let ct1 = cc.encrypt(&keys.public_key, &pt1)?;
    let ct2 = cc.encrypt(&keys.public_key, &pt2)?;
    info!("Encryption: {:.2?}", encrypt_start.elapsed());

    let eval_start = Instant::now();
    let sum = cc.eval_add(&ct1, &ct2)?;
    let product = cc.eval_mult_and_relinearize(&ct1, &ct2, &mult_keys)?;
    let scaled = cc.eval_mult_scalar(&ct1, 4.0)?;
    info!("Evaluation: {:.2?}", eval_start.elapsed());

    let decrypted = cc.decrypt(&keys.secret_key, &ct1)?;
    info!("x1 = {:?}", round_all(&decrypted.values));
    info!("Estimated precision: {:.1} bits", decrypted.log_precision());

    let decrypted = cc.decrypt(&keys.secret_key, &sum)?;
    info!("x1 + x2 = {:?}", round_all(&decrypted.values));

    let decrypted = cc.decrypt(&keys.secret_key, &product)?;
    info!(
        "x1 * x2 = {:?} (level {}, depth {})",
        round_all(&decrypted.values),
        product.level(),
        product.noise_scale_deg()
    );

    let decrypted = cc.decrypt(&keys.secret_key, &scaled)?;
    info!("4 * x1 = {:?}", round_all(&decrypted.values));

    if args.new_rank < cc.rank() {
        let reduce_start = Instant::now();
        let (reduced_sk, reduce_key) = cc
            .eval_rank_red_key_gen(&keys.secret_key, args.new_rank)
            .wrap_err("Rank reduction key generation failed")?;
        let reduced = cc.eval_rank_reduce(&product, &reduce_key)?;
        info!(
            "Rank {} -> {} in {:.2?}",
            product.rank(),
            reduced.rank(),
            reduce_start.elapsed()
        );
        let decrypted = cc.decrypt(&reduced_sk, &reduced)?;
        info!("x1 * x2 after rank reduction = {:?}", round_all(&decrypted.values));
    }

    println!();
    println!("=== Demo Complete ===");
    println!("Ring dimension: {}", cc.params().ring_dim());
    println!("Towers: {}", cc.params().size_q());
    println!("Ciphertext rank: {}", ct1.rank());

    Ok(())
}

fn round_all(values: &[f64]) -> Vec<f64> {
    values.iter().map(|v| (v * 1e4).round() / 1e4).collect()
}
