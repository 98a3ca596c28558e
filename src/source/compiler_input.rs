use super::metadata::{Language, Metadata};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Metadata settings which are meaningful for a new compilation request.
const SETTINGS_ALLOW_LIST: [&str; 8] = [
    "stopAfter",
    "remappings",
    "optimizer",
    "evmVersion",
    "debug",
    "metadata",
    "libraries",
    "outputSelection",
];

const DEFAULT_OUTPUT_SELECTION: [&str; 2] = ["evm.bytecode", "abi"];

/// Standard json input of solc and vyper compilers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompilerInput {
    pub language: Language,
    pub sources: BTreeMap<String, Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<Map<String, Value>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Source {
    pub content: String,
}

impl CompilerInput {
    pub(crate) fn from_metadata(
        metadata: &Metadata,
        sources: &BTreeMap<String, String>,
        use_original_settings: bool,
    ) -> Self {
        let sources = sources
            .iter()
            .map(|(path, content)| {
                (
                    path.clone(),
                    Source {
                        content: content.clone(),
                    },
                )
            })
            .collect();
        let settings = use_original_settings.then(|| {
            let mut settings: Map<String, Value> = SETTINGS_ALLOW_LIST
                .iter()
                .filter_map(|key| {
                    metadata
                        .settings
                        .other
                        .get(*key)
                        .map(|value| (key.to_string(), value.clone()))
                })
                .collect();
            if let Some(libraries) = settings.get_mut("libraries") {
                *libraries = nest_libraries(libraries);
            }
            settings.insert(
                "outputSelection".to_string(),
                output_selection(&DEFAULT_OUTPUT_SELECTION),
            );
            settings
        });

        Self {
            language: metadata.language,
            sources,
            settings,
        }
    }

    /// Returns a new input requesting the given outputs for every contract.
    pub fn with_output_selection(self, outputs: &[&str]) -> Self {
        let mut settings = self.settings.unwrap_or_default();
        settings.insert("outputSelection".to_string(), output_selection(outputs));
        Self {
            settings: Some(settings),
            ..self
        }
    }
}

fn output_selection(outputs: &[&str]) -> Value {
    json!({ "*": { "*": outputs } })
}

/// Metadata lists libraries as `{"path:Name": address}`, while compilers
/// expect `{"path": {"Name": address}}`.
fn nest_libraries(libraries: &Value) -> Value {
    let libraries = match libraries.as_object() {
        Some(libraries) => libraries,
        None => return libraries.clone(),
    };
    let mut nested = Map::new();
    for (key, address) in libraries {
        if address.is_object() {
            nested.insert(key.clone(), address.clone());
            continue;
        }
        let (path, name) = match key.rsplit_once(':') {
            Some((path, name)) => (path, name),
            None => ("", key.as_str()),
        };
        if let Value::Object(file_libraries) = nested
            .entry(path.to_string())
            .or_insert_with(|| Value::Object(Map::new()))
        {
            file_libraries.insert(name.to_string(), address.clone());
        }
    }
    Value::Object(nested)
}
