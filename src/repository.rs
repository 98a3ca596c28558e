use crate::{
    bytecode::{locate_metadata_reference, MatchTier, NoReferenceFound},
    compiler::CompilationResult,
    source::ContractDescriptor,
};
use ethers_core::{types::Address, utils::to_checksum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug)]
pub struct FileWriteFailure {
    pub path: PathBuf,
    pub error: std::io::Error,
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("compiled successfully, but cannot determine storage location: {0}")]
    StorageLocation(#[from] NoReferenceFound),
    #[error("failed to write {}", describe_failures(.0))]
    Files(Vec<FileWriteFailure>),
}

fn describe_failures(failures: &[FileWriteFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("{}: {}", failure.path.display(), failure.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Where a verified contract has been stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MatchRecord {
    pub chain_id: u64,
    pub address: String,
    pub tier: MatchTier,
    pub storage_path: PathBuf,
    /// Content-addressed copy of the metadata, perfect matches only.
    pub alias_path: Option<PathBuf>,
}

/// Filesystem repository of verified contracts:
///
/// ```text
/// {root}/contracts/{full_match|partial_match}/{chain_id}/{address}/metadata.json
/// {root}/contracts/{full_match|partial_match}/{chain_id}/{address}/sources/{path}
/// {root}/{ipfs|swarm/bzzr0|swarm/bzzr1}/{hash}
/// ```
pub struct RepositoryWriter {
    root: PathBuf,
}

impl RepositoryWriter {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stores the original metadata and all resolved sources.
    ///
    /// Every file is attempted even if some of them fail; files already
    /// written are left in place, as rewriting them is idempotent.
    pub async fn store_match(
        &self,
        tier: MatchTier,
        chain_id: u64,
        address: Address,
        result: &CompilationResult,
        contract: &ContractDescriptor,
    ) -> Result<MatchRecord, WriteError> {
        let alias_path = match tier {
            MatchTier::Perfect => {
                let pointer = locate_metadata_reference(result.deployed_bytecode.as_ref())?;
                Some(self.root.join(pointer.repository_path()))
            }
            MatchTier::Partial => None,
        };

        let address = to_checksum(&address, None);
        let storage_path = self
            .root
            .join("contracts")
            .join(tier.directory())
            .join(chain_id.to_string())
            .join(&address);

        let metadata = contract.metadata().raw();
        let mut files: Vec<(PathBuf, &str)> = vec![(storage_path.join("metadata.json"), metadata)];
        let sources_root = storage_path.join("sources");
        files.extend(
            contract
                .sources()
                .iter()
                .map(|(path, content)| (sources_root.join(sanitize_path(path)), content.as_str())),
        );
        if let Some(alias_path) = &alias_path {
            files.push((alias_path.clone(), metadata));
        }

        let mut failures = Vec::new();
        for (path, content) in files {
            if let Err(error) = write_file(&path, content).await {
                log::warn!("failed to write {}: {}", path.display(), error);
                failures.push(FileWriteFailure { path, error });
            }
        }
        if !failures.is_empty() {
            return Err(WriteError::Files(failures));
        }

        Ok(MatchRecord {
            chain_id,
            address,
            tier,
            storage_path,
            alias_path,
        })
    }
}

async fn write_file(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await
}

/// Makes a declared source path safe to be used inside the repository.
///
/// Characters other than `[A-Za-z0-9_./-]` are replaced with `_`, as are
/// segments consisting of dots only. Empty segments are dropped, so the
/// result is always relative.
pub fn sanitize_path(path: &str) -> PathBuf {
    let sanitized: String = path
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '.' | '/' | '-' => c,
            _ => '_',
        })
        .collect();
    let segments: Vec<&str> = sanitized
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            if segment.chars().all(|c| c == '.') {
                "_"
            } else {
                segment
            }
        })
        .collect();
    if segments.is_empty() {
        return PathBuf::from("_");
    }
    segments.iter().collect()
}
