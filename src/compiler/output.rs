use super::executor::CompileError;
use crate::bytecode::ByteRange;
use ethers_core::types::Bytes;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// `{file: {library: [range]}}`
type LinkReferences = BTreeMap<String, BTreeMap<String, Vec<ByteRange>>>;
/// `{ast id: [range]}`
type ImmutableReferences = BTreeMap<String, Vec<ByteRange>>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Diagnostic {
    severity: String,
    message: String,
    formatted_message: Option<String>,
}

/// Standard json output of a compilation which produced no errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilationOutput {
    raw: Value,
}

/// Artifacts of a single contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilationResult {
    pub bytecode: Bytes,
    pub deployed_bytecode: Bytes,
    /// Vyper does not emit metadata.
    pub metadata: Option<String>,
    pub abi: Option<Value>,
    /// Library addresses in the deployed bytecode. Left zeroed here.
    pub link_references: Vec<ByteRange>,
    /// Immutable variables in the deployed bytecode. Left zeroed by the compiler.
    pub immutable_references: Vec<ByteRange>,
}

impl CompilationResult {
    /// Deployed bytecode regions which are filled in on chain.
    pub fn deployment_ranges(&self) -> Vec<ByteRange> {
        self.link_references
            .iter()
            .chain(&self.immutable_references)
            .copied()
            .collect()
    }
}

impl CompilationOutput {
    /// Fails if the compiler reported any diagnostic with `error` severity.
    pub fn new(raw: Value) -> Result<Self, CompileError> {
        // Compilation errors, warnings and info messages are all returned in `errors`
        let diagnostics: Vec<Diagnostic> = match raw.get("errors") {
            Some(errors) => serde_json::from_value(errors.clone()).map_err(|err| {
                CompileError::Infrastructure(anyhow::anyhow!(
                    "unexpected compiler diagnostics format: {err}"
                ))
            })?,
            None => Vec::new(),
        };
        let errors: Vec<String> = diagnostics
            .into_iter()
            .filter(|diagnostic| diagnostic.severity == "error")
            .map(|diagnostic| diagnostic.formatted_message.unwrap_or(diagnostic.message))
            .collect();
        if !errors.is_empty() {
            return Err(CompileError::Compiler(errors));
        }

        Ok(Self { raw })
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn contract(&self, path: &str, name: &str) -> Result<CompilationResult, CompileError> {
        let contract = self
            .raw
            .get("contracts")
            .and_then(|contracts| contracts.get(path))
            .and_then(|contracts| contracts.get(name))
            .ok_or_else(|| CompileError::MissingArtifact {
                path: path.to_string(),
                name: name.to_string(),
            })?;

        let malformed = |reason: String| CompileError::MalformedArtifact {
            path: path.to_string(),
            name: name.to_string(),
            reason,
        };
        let field = |pointer: &str| non_null(contract, pointer);
        let link_references = |pointer: &str| -> Result<Vec<ByteRange>, CompileError> {
            let references: LinkReferences = match field(pointer) {
                Some(value) => serde_json::from_value(value.clone())
                    .map_err(|err| malformed(format!("{pointer} is invalid: {err}")))?,
                None => return Ok(Vec::new()),
            };
            Ok(references
                .into_values()
                .flat_map(BTreeMap::into_values)
                .flatten()
                .collect())
        };
        let bytecode = |pointer: &str, links: &[ByteRange]| -> Result<Bytes, CompileError> {
            let object = field(pointer)
                .and_then(Value::as_str)
                .ok_or_else(|| malformed(format!("{pointer} is missing")))?;
            let object = object.strip_prefix("0x").unwrap_or(object);
            let object = zero_placeholders(object, links)
                .ok_or_else(|| malformed(format!("{pointer} has link references out of range")))?;
            hex::decode(object)
                .map(Bytes::from)
                .map_err(|err| malformed(format!("{pointer} is not a valid hex: {err}")))
        };

        let creation_links = link_references("/evm/bytecode/linkReferences")?;
        let link_references = link_references("/evm/deployedBytecode/linkReferences")?;
        let immutable_references: ImmutableReferences =
            match field("/evm/deployedBytecode/immutableReferences") {
                Some(value) => serde_json::from_value(value.clone()).map_err(|err| {
                    malformed(format!("immutable references are invalid: {err}"))
                })?,
                None => ImmutableReferences::new(),
            };

        Ok(CompilationResult {
            bytecode: bytecode("/evm/bytecode/object", &creation_links)?,
            deployed_bytecode: bytecode("/evm/deployedBytecode/object", &link_references)?,
            metadata: contract
                .get("metadata")
                .and_then(Value::as_str)
                .map(str::to_string),
            abi: contract.get("abi").cloned(),
            link_references,
            immutable_references: immutable_references.into_values().flatten().collect(),
        })
    }
}

fn non_null<'a>(value: &'a Value, pointer: &str) -> Option<&'a Value> {
    value.pointer(pointer).filter(|value| !value.is_null())
}

/// Replaces unlinked library placeholders (`__$...$__`) with zero addresses.
/// Returns `None` if a reference does not fit into the hex object.
fn zero_placeholders(object: &str, links: &[ByteRange]) -> Option<Vec<u8>> {
    let mut object = object.as_bytes().to_vec();
    for link in links {
        let start = link.start.checked_mul(2)?;
        let end = link.length.checked_mul(2).and_then(|length| start.checked_add(length))?;
        object.get_mut(start..end)?.fill(b'0');
    }
    Some(object)
}
