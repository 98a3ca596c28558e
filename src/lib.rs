pub mod bytecode;
pub mod compiler;
mod consts;
mod mismatch;
pub mod repository;
mod settings;
pub mod source;
mod verifier;

pub use self::settings::Settings;
pub use ethers_core::types::{Address, Bytes};
pub use mismatch::Mismatch;
pub use repository::{MatchRecord, RepositoryWriter};
pub use verifier::{
    Error, LogObserver, VerificationObserver, VerificationRequest, Verifier,
};
