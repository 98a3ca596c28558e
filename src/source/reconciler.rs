use super::{
    contract::{ContractDescriptor, InvalidCompilationTarget, InvalidSource, MissingSource},
    files::{self, RawFile},
    hash_index::{HashIndex, PathContent},
    metadata::{self, Metadata, Recognized},
};
use crate::mismatch::Mismatch;
use ethers_core::{types::H256, utils::keccak256};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Metadata-looking file which could not be used for verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectedMetadata {
    pub origin: String,
    pub reason: String,
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("metadata file not found{}", describe_rejected(.rejected))]
    NoMetadataFound { rejected: Vec<RejectedMetadata> },
}

fn describe_rejected(rejected: &[RejectedMetadata]) -> String {
    rejected
        .iter()
        .map(|rejected| format!("; {} rejected: {}", rejected.origin, rejected.reason))
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reconciliation {
    pub contracts: Vec<ContractDescriptor>,
    /// Uploaded files which did not satisfy any declared source.
    pub unused_files: Vec<String>,
    pub rejected: Vec<RejectedMetadata>,
}

/// Splits uploaded files into metadata and sources, and matches
/// every source declared by metadata against the uploaded ones.
pub fn reconcile(files: Vec<RawFile>) -> Result<Reconciliation, ReconcileError> {
    let files = files::explode(files);

    let mut metadata = Vec::new();
    let mut rejected = Vec::new();
    let mut pool = Vec::new();
    let mut unusable = Vec::new();
    for (i, file) in files.into_iter().enumerate() {
        let origin = file
            .path
            .clone()
            .unwrap_or_else(|| format!("<file #{i}>"));
        let text = match String::from_utf8(file.content.to_vec()) {
            Ok(text) => text,
            Err(_) => {
                log::debug!("{} is not a valid utf-8 file", origin);
                unusable.push(origin);
                continue;
            }
        };
        match metadata::recognize(&text) {
            Recognized::Metadata(found) => metadata.push((origin, *found)),
            Recognized::Malformed(reason) => {
                log::warn!("{} looks like metadata, but rejected: {}", origin, reason);
                rejected.push(RejectedMetadata { origin, reason });
            }
            Recognized::NotMetadata => pool.push(PathContent::new(origin, text)),
        }
    }

    let index = HashIndex::build(&pool);
    let mut used = BTreeSet::new();
    let mut contracts = Vec::with_capacity(metadata.len());
    for (origin, metadata) in metadata {
        match classify_sources(metadata, &index, &mut used) {
            Ok(contract) => contracts.push(contract),
            Err(err) => rejected.push(RejectedMetadata {
                origin,
                reason: err.to_string(),
            }),
        }
    }

    if contracts.is_empty() {
        return Err(ReconcileError::NoMetadataFound { rejected });
    }

    let unused_files = pool
        .into_iter()
        .map(|file| file.path)
        .filter(|path| !used.contains(path))
        .chain(unusable)
        .collect();

    Ok(Reconciliation {
        contracts,
        unused_files,
        rejected,
    })
}

fn classify_sources(
    metadata: Metadata,
    index: &HashIndex,
    used: &mut BTreeSet<String>,
) -> Result<ContractDescriptor, InvalidCompilationTarget> {
    let mut sources = BTreeMap::new();
    let mut missing = BTreeMap::new();
    let mut invalid = BTreeMap::new();

    for (path, declared) in &metadata.sources {
        if let Some(content) = &declared.content {
            let found = H256(keccak256(content.as_bytes()));
            if found == declared.keccak256 {
                sources.insert(path.clone(), content.clone());
            } else {
                invalid.insert(
                    path.clone(),
                    InvalidSource::HashMismatch(Mismatch::new(declared.keccak256, found)),
                );
            }
            continue;
        }

        match index.lookup(&declared.keccak256) {
            Some(file) => {
                used.insert(file.path.clone());
                sources.insert(path.clone(), file.content.clone());
            }
            None => {
                missing.insert(
                    path.clone(),
                    MissingSource {
                        keccak256: declared.keccak256,
                        urls: declared.urls.clone(),
                    },
                );
            }
        }
    }

    ContractDescriptor::new(metadata, sources, missing, invalid)
}
