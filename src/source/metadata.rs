use ethers_core::types::H256;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, fmt};

lazy_static! {
    /// Metadata serialized as a json string somewhere inside a larger json blob
    /// (e.g. truffle artifacts keep it under the "metadata" key).
    static ref NESTED_METADATA_REGEX: Regex =
        Regex::new(r#""\{\\"compiler\\":\{\\"version\\".*?\},\\"version\\":1\}""#)
            .expect("valid regex");
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    Solidity,
    Vyper,
}

impl Language {
    /// Directory name under which local compiler binaries are stored.
    pub fn compiler_name(&self) -> &'static str {
        match self {
            Language::Solidity => "solc",
            Language::Vyper => "vyper",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Solidity => f.write_str("Solidity"),
            Language::Vyper => f.write_str("Vyper"),
        }
    }
}

/// Contract metadata as emitted by the compiler.
///
/// Only the fields needed for verification are typed; the rest of `settings`
/// is kept as is. The original json text is preserved in [`Metadata::raw`],
/// as that is what ends up in the repository.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Metadata {
    pub language: Language,
    pub compiler: Compiler,
    pub settings: MetadataSettings,
    pub sources: BTreeMap<String, MetadataSource>,

    #[serde(skip)]
    raw: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Compiler {
    pub version: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSettings {
    #[serde(default)]
    pub compilation_target: BTreeMap<String, String>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MetadataSource {
    pub keccak256: H256,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub license: Option<String>,
}

impl Metadata {
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The single `(path, contract name)` compilation target.
    pub fn compilation_target(&self) -> Option<(&str, &str)> {
        match self.settings.compilation_target.len() {
            1 => self
                .settings
                .compilation_target
                .iter()
                .next()
                .map(|(path, name)| (path.as_str(), name.as_str())),
            _ => None,
        }
    }
}

/// Result of checking whether some file content is a metadata object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recognized {
    Metadata(Box<Metadata>),
    /// Looks like metadata, but cannot be used for verification.
    Malformed(String),
    NotMetadata,
}

pub fn recognize(text: &str) -> Recognized {
    if let Some(candidate) = unwrap_json_object(text) {
        if is_metadata_shaped(&candidate.0) {
            return parse_candidate(candidate);
        }
    }

    match NESTED_METADATA_REGEX.find(text) {
        Some(found) => match serde_json::from_str::<String>(found.as_str()) {
            Ok(inner) => match serde_json::from_str::<Value>(&inner) {
                Ok(value) if is_metadata_shaped(&value) => parse_candidate((value, inner)),
                _ => Recognized::NotMetadata,
            },
            Err(_) => Recognized::NotMetadata,
        },
        None => Recognized::NotMetadata,
    }
}

/// Parses `text` as a json object, unwrapping one level of
/// string encoding. Returns the object along with its own json text.
fn unwrap_json_object(text: &str) -> Option<(Value, String)> {
    match serde_json::from_str::<Value>(text).ok()? {
        value @ Value::Object(_) => Some((value, text.to_string())),
        Value::String(inner) => match serde_json::from_str::<Value>(&inner).ok()? {
            value @ Value::Object(_) => Some((value, inner)),
            _ => None,
        },
        _ => None,
    }
}

fn is_metadata_shaped(value: &Value) -> bool {
    let supported_language = value
        .get("language")
        .cloned()
        .map(serde_json::from_value::<Language>)
        .map(|language| language.is_ok())
        .unwrap_or_default();
    let has_compiler = value
        .get("compiler")
        .and_then(Value::as_object)
        .map(|compiler| !compiler.is_empty())
        .unwrap_or_default();

    supported_language && has_compiler
}

fn parse_candidate((value, raw): (Value, String)) -> Recognized {
    let mut metadata: Metadata = match serde_json::from_value(value) {
        Ok(metadata) => metadata,
        Err(err) => return Recognized::Malformed(format!("invalid metadata structure: {err}")),
    };
    if metadata.compiler.version.is_empty() {
        return Recognized::Malformed("compiler version is empty".to_string());
    }
    let targets = metadata.settings.compilation_target.len();
    if targets != 1 {
        return Recognized::Malformed(format!(
            "compilationTarget should have exactly one entry, found {targets}"
        ));
    }

    metadata.raw = raw;
    Recognized::Metadata(Box::new(metadata))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ethers_core::utils::keccak256;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    pub(crate) fn metadata_json(
        target: (&str, &str),
        sources: &[(&str, &str, bool)],
    ) -> String {
        let sources: serde_json::Map<String, Value> = sources
            .iter()
            .map(|(path, content, inline)| {
                let hash = H256(keccak256(content.as_bytes()));
                let mut source = json!({
                    "keccak256": hash,
                    "urls": [format!("dweb:/ipfs/Qm{}", path.len())],
                });
                if *inline {
                    source["content"] = json!(content);
                }
                (path.to_string(), source)
            })
            .collect();
        let mut compilation_target = serde_json::Map::new();
        compilation_target.insert(target.0.to_string(), json!(target.1));
        json!({
            "compiler": {"version": "0.8.7+commit.e28d00a7"},
            "language": "Solidity",
            "output": {"abi": []},
            "settings": {
                "compilationTarget": compilation_target,
                "evmVersion": "london",
                "libraries": {},
                "metadata": {"bytecodeHash": "ipfs"},
                "optimizer": {"enabled": false, "runs": 200},
                "remappings": []
            },
            "sources": sources,
            "version": 1
        })
        .to_string()
    }

    fn expect_metadata(recognized: Recognized) -> Metadata {
        match recognized {
            Recognized::Metadata(metadata) => *metadata,
            other => panic!("metadata expected, got {other:?}"),
        }
    }

    #[test]
    fn recognizes_plain_metadata() {
        let text = metadata_json(("contracts/A.sol", "A"), &[("contracts/A.sol", "A", false)]);

        let metadata = expect_metadata(recognize(&text));

        assert_eq!(Language::Solidity, metadata.language);
        assert_eq!(Some(("contracts/A.sol", "A")), metadata.compilation_target());
        assert_eq!(text, metadata.raw());
        assert!(metadata.settings.other.contains_key("optimizer"));
        assert!(!metadata.settings.other.contains_key("compilationTarget"));
    }

    #[test]
    fn recognizes_double_encoded_metadata() {
        let inner = metadata_json(("A.sol", "A"), &[("A.sol", "A", false)]);
        let text = serde_json::to_string(&inner).unwrap();

        let metadata = expect_metadata(recognize(&text));

        assert_eq!(inner, metadata.raw());
    }

    #[test]
    fn recognizes_metadata_nested_into_artifact() {
        let inner = metadata_json(("A.sol", "A"), &[("A.sol", "A", false)]);
        let artifact = json!({
            "contractName": "A",
            "abi": [],
            "metadata": inner,
            "bytecode": "0x6080"
        })
        .to_string();

        let metadata = expect_metadata(recognize(&artifact));

        assert_eq!(inner, metadata.raw());
    }

    #[test]
    fn rejects_several_compilation_targets() {
        let text = json!({
            "compiler": {"version": "0.8.7+commit.e28d00a7"},
            "language": "Solidity",
            "settings": {"compilationTarget": {"A.sol": "A", "B.sol": "B"}},
            "sources": {}
        })
        .to_string();

        assert!(matches!(recognize(&text), Recognized::Malformed(_)));
    }

    #[test]
    fn rejects_missing_compilation_target() {
        let text = json!({
            "compiler": {"version": "0.8.7+commit.e28d00a7"},
            "language": "Solidity",
            "settings": {},
            "sources": {}
        })
        .to_string();

        assert!(matches!(recognize(&text), Recognized::Malformed(_)));
    }

    #[test]
    fn ignores_unsupported_languages_and_plain_sources() {
        let yul = json!({
            "compiler": {"version": "0.8.7"},
            "language": "Yul",
            "settings": {"compilationTarget": {"A.yul": "A"}},
            "sources": {}
        })
        .to_string();
        let no_compiler = json!({
            "compiler": {},
            "language": "Solidity",
        })
        .to_string();

        assert_eq!(Recognized::NotMetadata, recognize(&yul));
        assert_eq!(Recognized::NotMetadata, recognize(&no_compiler));
        assert_eq!(Recognized::NotMetadata, recognize("contract A {}"));
        assert_eq!(Recognized::NotMetadata, recognize(r#"{"name": "package"}"#));
    }
}
