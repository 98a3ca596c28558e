use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Falls back to `SOURCE_VERIFIER__CONFIG` when omitted.
    #[clap(short, long)]
    pub config_path: Option<PathBuf>,

    /// Chain the contract is deployed on.
    #[clap(long)]
    pub chain_id: u64,

    /// Address of the deployed contract.
    #[clap(long)]
    pub address: String,

    /// Deployed bytecode as a hex string, or a path to a file containing it.
    #[clap(long)]
    pub deployed_bytecode: String,

    /// Skip the remote compiler and compile on this host.
    #[clap(long)]
    pub force_local: bool,

    /// Source files, metadata files, directories or archives.
    #[clap(required = true)]
    pub inputs: Vec<PathBuf>,
}
