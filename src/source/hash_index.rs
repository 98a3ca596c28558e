use ethers_core::{types::H256, utils::keccak256};
use std::collections::HashMap;

/// A source file candidate: where it came from and what it contains.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathContent {
    pub path: String,
    pub content: String,
}

impl PathContent {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

type Variator = fn(&str) -> String;

const CONTENT_VARIATORS: [Variator; 3] = [
    |content| content.to_string(),
    |content| content.replace("\r\n", "\n"),
    |content| content.replace("\r\n", "\n").replace('\n', "\r\n"),
];

const ENDING_VARIATORS: [Variator; 6] = [
    |content| content.to_string(),
    |content| content.trim_end().to_string(),
    |content| format!("{}\n", content.trim_end()),
    |content| format!("{}\r\n", content.trim_end()),
    |content| format!("{content}\n"),
    |content| format!("{content}\r\n"),
];

/// Lookup from keccak256 of a file content to the file.
///
/// Every indexed file is stored under the hashes of all its
/// line-ending and trailing-whitespace variations, so that a metadata
/// hash computed over any plausible serialization of the file still
/// resolves. The stored content is the variation which produced the hash.
#[derive(Clone, Debug, Default)]
pub struct HashIndex {
    entries: HashMap<H256, PathContent>,
}

impl HashIndex {
    pub fn build<'a>(files: impl IntoIterator<Item = &'a PathContent>) -> Self {
        let mut entries = HashMap::new();
        for file in files {
            for content_variator in CONTENT_VARIATORS {
                let varied = content_variator(&file.content);
                for ending_variator in ENDING_VARIATORS {
                    let content = ending_variator(&varied);
                    let hash = H256(keccak256(content.as_bytes()));
                    // Colliding hashes are resolved by the latest inserted file.
                    entries.insert(hash, PathContent::new(file.path.clone(), content));
                }
            }
        }
        Self { entries }
    }

    pub fn lookup(&self, hash: &H256) -> Option<&PathContent> {
        self.entries.get(hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
