mod cli;

use anyhow::Context;
use clap::Parser;
use source_verifier::{source, Address, Bytes, Settings, VerificationRequest, Verifier};
use std::{path::Path, str::FromStr};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = cli::Args::parse();
    let settings = match args.config_path {
        Some(path) => Settings::with_config_path(path)?,
        None => Settings::new()?,
    };

    let address = Address::from_str(&args.address)
        .map_err(|err| anyhow::anyhow!("invalid address {}: {}", args.address, err))?;
    let deployed_bytecode = read_bytecode(&args.deployed_bytecode)?;
    let files = source::read_paths(&args.inputs).context("failed to read input files")?;

    let verifier = Verifier::from_settings(&settings)?;
    let record = verifier
        .verify(VerificationRequest {
            chain_id: args.chain_id,
            address,
            files,
            deployed_bytecode,
            force_local: args.force_local,
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// Accepts either a hex string or a path to a file containing one.
fn read_bytecode(value: &str) -> anyhow::Result<Bytes> {
    let path = Path::new(value);
    let hex = if path.is_file() {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?
    } else {
        value.to_string()
    };
    let hex = hex.trim();
    let bytes = hex::decode(hex.strip_prefix("0x").unwrap_or(hex))
        .context("deployed bytecode is not a valid hex")?;
    Ok(Bytes::from(bytes))
}
