//! Generates the RSA keypair used by the metric envelope: hand the public
//! key to agents (`--crypto-key`), keep the private key on the server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser)]
#[command(name = "metrond-keygen", about = "Generate an RSA keypair for metrond")]
struct Args {
    /// RSA key size in bits
    #[arg(long, default_value_t = 2048)]
    bits: usize,

    /// Directory to write private.pem and public.pem into
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let (private_pem, public_pem) =
        metrond_crypto::keys::generate_keys(args.bits).context("key generation failed")?;

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("cannot create {}", args.out_dir.display()))?;

    let private_path = args.out_dir.join("private.pem");
    let public_path = args.out_dir.join("public.pem");
    std::fs::write(&private_path, private_pem)
        .with_context(|| format!("cannot write {}", private_path.display()))?;
    std::fs::write(&public_path, public_pem)
        .with_context(|| format!("cannot write {}", public_path.display()))?;

    println!("wrote {}", private_path.display());
    println!("wrote {}", public_path.display());
    Ok(())
}
