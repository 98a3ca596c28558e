use super::{
    compiler_input::CompilerInput,
    fetcher::ContentFetcher,
    metadata::{Language, Metadata},
};
use crate::{
    consts::{FETCHABLE_SOURCE_PREFIX, IPFS_URL_PREFIX},
    mismatch::Mismatch,
};
use ethers_core::{types::H256, utils::keccak256};
use std::{collections::BTreeMap, fmt::Write};
use thiserror::Error;

/// A declared source which was not found among the uploaded files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissingSource {
    pub keccak256: H256,
    pub urls: Vec<String>,
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum InvalidSource {
    #[error("hash mismatch: {0}")]
    HashMismatch(Mismatch<H256>),
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("sources are still missing after fetching: {}", .paths.join(", "))]
pub struct MissingAfterFetch {
    pub paths: Vec<String>,
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("compilationTarget should have exactly one entry, found {0}")]
pub struct InvalidCompilationTarget(pub usize);

/// One metadata object together with its sources, split into
/// resolved, missing and invalid ones.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractDescriptor {
    metadata: Metadata,
    compiled_path: String,
    name: String,
    sources: BTreeMap<String, String>,
    missing: BTreeMap<String, MissingSource>,
    invalid: BTreeMap<String, InvalidSource>,
}

impl ContractDescriptor {
    pub fn new(
        metadata: Metadata,
        sources: BTreeMap<String, String>,
        missing: BTreeMap<String, MissingSource>,
        invalid: BTreeMap<String, InvalidSource>,
    ) -> Result<Self, InvalidCompilationTarget> {
        let (compiled_path, name) = metadata
            .compilation_target()
            .map(|(path, name)| (path.to_string(), name.to_string()))
            .ok_or(InvalidCompilationTarget(
                metadata.settings.compilation_target.len(),
            ))?;
        Ok(Self {
            metadata,
            compiled_path,
            name,
            sources,
            missing,
            invalid,
        })
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn language(&self) -> Language {
        self.metadata.language
    }

    pub fn compiler_version(&self) -> &str {
        &self.metadata.compiler.version
    }

    pub fn compiled_path(&self) -> &str {
        &self.compiled_path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sources(&self) -> &BTreeMap<String, String> {
        &self.sources
    }

    pub fn missing(&self) -> &BTreeMap<String, MissingSource> {
        &self.missing
    }

    pub fn invalid(&self) -> &BTreeMap<String, InvalidSource> {
        &self.invalid
    }

    pub fn is_valid(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }

    pub fn standard_compiler_input(&self, use_original_settings: bool) -> CompilerInput {
        CompilerInput::from_metadata(&self.metadata, &self.sources, use_original_settings)
    }

    /// Tries to retrieve missing vendored sources from IPFS.
    ///
    /// Retrieved content is accepted only if its keccak256 equals
    /// the hash declared in the metadata.
    pub async fn fetch_missing<F: ContentFetcher + ?Sized>(
        &mut self,
        fetcher: &F,
    ) -> Result<(), MissingAfterFetch> {
        let candidates: Vec<(String, MissingSource)> = self
            .missing
            .iter()
            .filter(|(path, _)| path.starts_with(FETCHABLE_SOURCE_PREFIX))
            .map(|(path, missing)| (path.clone(), missing.clone()))
            .collect();

        let fetched = futures::future::join_all(
            candidates
                .iter()
                .map(|(path, missing)| fetch_source(fetcher, path, missing)),
        )
        .await;

        for ((path, _), content) in candidates.into_iter().zip(fetched) {
            if let Some(content) = content {
                self.missing.remove(&path);
                self.sources.insert(path, content);
            }
        }

        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(MissingAfterFetch {
                paths: self.missing.keys().cloned().collect(),
            })
        }
    }

    /// Human readable summary of what is going to be verified.
    pub fn describe(&self) -> String {
        let mut info = format!("{} ({}):\n", self.name, self.compiled_path);
        let _ = writeln!(
            info,
            "  {}",
            if self.is_valid() { "valid" } else { "invalid" }
        );
        let _ = writeln!(info, "  compiler version: {}", self.compiler_version());
        let other_sources = self
            .sources
            .keys()
            .filter(|path| **path != self.compiled_path)
            .count();
        let _ = writeln!(info, "  {other_sources} other source file(s) matched");
        for (path, missing) in &self.missing {
            let _ = writeln!(info, "  missing: {path} (keccak256: {:?})", missing.keccak256);
        }
        for (path, invalid) in &self.invalid {
            let _ = writeln!(info, "  invalid: {path}: {invalid}");
        }
        info
    }
}

async fn fetch_source<F: ContentFetcher + ?Sized>(
    fetcher: &F,
    path: &str,
    missing: &MissingSource,
) -> Option<String> {
    let cids = missing
        .urls
        .iter()
        .filter_map(|url| url.strip_prefix(IPFS_URL_PREFIX));
    for cid in cids {
        let content = match fetcher.fetch(cid).await {
            Ok(Some(content)) => content,
            Ok(None) => {
                log::debug!("{} not found at {}", path, cid);
                continue;
            }
            Err(err) => {
                log::warn!("failed to fetch {} from {}: {}", path, cid, err);
                continue;
            }
        };
        let found = H256(keccak256(&content));
        if found != missing.keccak256 {
            log::warn!(
                "fetched {} from {} has a different hash: {}",
                path,
                cid,
                Mismatch::new(missing.keccak256, found)
            );
            continue;
        }
        match String::from_utf8(content.to_vec()) {
            Ok(content) => {
                log::info!("fetched missing source {} from {}", path, cid);
                return Some(content);
            }
            Err(_) => log::warn!("fetched {} from {} is not valid utf-8", path, cid),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{
        fetcher::FetchError, metadata::tests::metadata_json, reconcile, RawFile,
    };
    use async_trait::async_trait;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::{collections::HashMap, sync::Mutex};

    #[derive(Default)]
    struct FakeFetcher {
        files: HashMap<String, Bytes>,
        requested: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn with_file(mut self, cid: &str, content: &str) -> Self {
            self.files
                .insert(cid.to_string(), Bytes::from(content.to_string()));
            self
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContentFetcher for FakeFetcher {
        async fn fetch(&self, cid: &str) -> Result<Option<Bytes>, FetchError> {
            self.requested.lock().unwrap().push(cid.to_string());
            Ok(self.files.get(cid).cloned())
        }
    }

    fn single_contract(files: Vec<RawFile>) -> ContractDescriptor {
        let mut reconciliation = reconcile(files).expect("reconciliation failed");
        assert_eq!(1, reconciliation.contracts.len());
        reconciliation.contracts.remove(0)
    }

    /// Metadata with its `urls` replaced by the given ones for every source.
    fn metadata_with_urls(sources: &[(&str, &str)], urls: &[&str]) -> String {
        let entries: Vec<_> = sources
            .iter()
            .map(|(path, content)| (*path, *content, false))
            .collect();
        let mut metadata: Value =
            serde_json::from_str(&metadata_json(("A.sol", "A"), &entries)).unwrap();
        for (path, _) in sources {
            metadata["sources"][*path]["urls"] = json!(urls);
        }
        metadata.to_string()
    }

    #[test]
    fn inline_sources_make_contract_valid() {
        let metadata = metadata_json(
            ("A.sol", "A"),
            &[("A.sol", "contract A {}", true), ("B.sol", "contract B {}", true)],
        );

        let contract = single_contract(vec![RawFile::new("metadata.json", metadata)]);

        assert!(contract.is_valid());
        assert!(contract.missing().is_empty());
        assert!(contract.invalid().is_empty());
        assert_eq!("A", contract.name());
        assert_eq!("A.sol", contract.compiled_path());
    }

    #[test]
    fn inline_source_with_wrong_hash_is_invalid() {
        let mut metadata: Value =
            serde_json::from_str(&metadata_json(("A.sol", "A"), &[("A.sol", "contract A {}", true)]))
                .unwrap();
        metadata["sources"]["A.sol"]["content"] = json!("contract Evil {}");

        let contract = single_contract(vec![RawFile::new("metadata.json", metadata.to_string())]);

        assert!(!contract.is_valid());
        assert!(contract.missing().is_empty());
        assert!(contract.sources().is_empty());
        assert!(matches!(
            contract.invalid().get("A.sol"),
            Some(InvalidSource::HashMismatch(_))
        ));
    }

    #[test]
    fn compiler_input_with_original_settings() {
        let mut metadata: Value =
            serde_json::from_str(&metadata_json(("A.sol", "A"), &[("A.sol", "contract A {}", true)]))
                .unwrap();
        metadata["settings"]["libraries"] = json!({"Lib.sol:Lib": "0x01"});
        metadata["settings"]["unknownSetting"] = json!(true);
        let contract = single_contract(vec![RawFile::new("metadata.json", metadata.to_string())]);

        let input = contract.standard_compiler_input(true);

        let settings = input.settings.clone().expect("settings are missing");
        let mut keys: Vec<_> = settings.keys().cloned().collect();
        keys.sort();
        assert_eq!(
            vec![
                "evmVersion",
                "libraries",
                "metadata",
                "optimizer",
                "outputSelection",
                "remappings"
            ],
            keys
        );
        assert_eq!(
            json!({"*": {"*": ["evm.bytecode", "abi"]}}),
            settings["outputSelection"]
        );
        assert_eq!(json!({"Lib.sol": {"Lib": "0x01"}}), settings["libraries"]);
        assert_eq!(
            json!({
                "language": "Solidity",
                "sources": {"A.sol": {"content": "contract A {}"}},
                "settings": settings,
            }),
            serde_json::to_value(&input).unwrap()
        );
    }

    #[test]
    fn compiler_input_without_settings() {
        let metadata = metadata_json(("A.sol", "A"), &[("A.sol", "contract A {}", true)]);
        let contract = single_contract(vec![RawFile::new("metadata.json", metadata)]);

        let input = contract.standard_compiler_input(false);

        assert_eq!(
            json!({
                "language": "Solidity",
                "sources": {"A.sol": {"content": "contract A {}"}},
            }),
            serde_json::to_value(&input).unwrap()
        );
        let extended = input.with_output_selection(&["evm.deployedBytecode"]);
        assert_eq!(
            json!({"outputSelection": {"*": {"*": ["evm.deployedBytecode"]}}}),
            serde_json::to_value(extended.settings).unwrap()
        );
    }

    #[tokio::test]
    async fn fetches_missing_vendored_sources() {
        let path = "@openzeppelin/contracts/token/ERC20.sol";
        let content = "contract ERC20 {}";
        let metadata = metadata_with_urls(
            &[(path, content)],
            &["bzz-raw://abcdef", "dweb:/ipfs/QmWrong", "dweb:/ipfs/QmRight"],
        );
        let mut contract = single_contract(vec![RawFile::new("metadata.json", metadata)]);
        assert!(!contract.is_valid());
        let fetcher = FakeFetcher::default()
            .with_file("QmWrong", "contract Other {}")
            .with_file("QmRight", content);

        contract
            .fetch_missing(&fetcher)
            .await
            .expect("sources should be fetched");

        assert!(contract.is_valid());
        assert_eq!(Some(&content.to_string()), contract.sources().get(path));
        assert_eq!(vec!["QmWrong", "QmRight"], fetcher.requested());
    }

    #[tokio::test]
    async fn wrong_content_is_never_accepted() {
        let path = "@openzeppelin/contracts/access/Ownable.sol";
        let metadata = metadata_with_urls(
            &[(path, "contract Ownable {}")],
            &["dweb:/ipfs/QmOwnable"],
        );
        let mut contract = single_contract(vec![RawFile::new("metadata.json", metadata)]);
        let fetcher = FakeFetcher::default().with_file("QmOwnable", "contract Ownable { }");

        let result = contract.fetch_missing(&fetcher).await;

        assert_eq!(
            Err(MissingAfterFetch {
                paths: vec![path.to_string()]
            }),
            result
        );
        assert!(contract.sources().is_empty());
        assert!(contract.missing().contains_key(path));
    }

    #[tokio::test]
    async fn only_vendored_sources_are_fetched() {
        let metadata = metadata_with_urls(
            &[("contracts/Local.sol", "contract Local {}")],
            &["dweb:/ipfs/QmLocal"],
        );
        let mut contract = single_contract(vec![RawFile::new("metadata.json", metadata)]);
        let fetcher = FakeFetcher::default().with_file("QmLocal", "contract Local {}");

        let result = contract.fetch_missing(&fetcher).await;

        assert!(result.is_err());
        assert!(fetcher.requested().is_empty());
    }

    #[test]
    fn description_mentions_version_and_other_sources() {
        let metadata = metadata_json(
            ("A.sol", "A"),
            &[
                ("A.sol", "contract A {}", true),
                ("B.sol", "contract B {}", true),
                ("C.sol", "contract C {}", true),
            ],
        );
        let contract = single_contract(vec![RawFile::new("metadata.json", metadata)]);

        let description = contract.describe();

        assert!(description.contains("A (A.sol)"), "{description}");
        assert!(description.contains("valid"), "{description}");
        assert!(
            description.contains("compiler version: 0.8.7+commit.e28d00a7"),
            "{description}"
        );
        assert!(
            description.contains("2 other source file(s) matched"),
            "{description}"
        );
    }
}
