use super::output::CompilationOutput;
use crate::source::{CompilerInput, Language};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Failure of a single compiler backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("compiler response exceeds {limit} bytes")]
    ResponseSizeExceeded { limit: usize },
    #[error("{0:#}")]
    Infrastructure(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("invalid compiler version {version}: {err}")]
    InvalidVersion {
        version: String,
        err: semver::Error,
    },
    #[error("compilation error: {}", .0.join("\n"))]
    Compiler(Vec<String>),
    #[error("compiler infrastructure error: {0:#}")]
    Infrastructure(anyhow::Error),
    #[error("compiler output has no artifact for {name} in {path}")]
    MissingArtifact { path: String, name: String },
    #[error("compiler output for {name} in {path} is malformed: {reason}")]
    MalformedArtifact {
        path: String,
        name: String,
        reason: String,
    },
}

impl From<BackendError> for CompileError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Infrastructure(err) => CompileError::Infrastructure(err),
            err @ BackendError::ResponseSizeExceeded { .. } => {
                CompileError::Infrastructure(anyhow::anyhow!(err))
            }
        }
    }
}

/// Something able to turn standard json input into standard json output.
#[async_trait]
pub trait CompilerBackend: Send + Sync {
    async fn compile(
        &self,
        language: Language,
        version: &str,
        input: &CompilerInput,
    ) -> Result<Value, BackendError>;
}

/// Compiles on the remote service when one is configured, and on this host
/// only if the remote response turned out to be too large.
pub struct CompilationExecutor {
    remote: Option<Arc<dyn CompilerBackend>>,
    local: Arc<dyn CompilerBackend>,
}

impl CompilationExecutor {
    pub fn new(remote: Option<Arc<dyn CompilerBackend>>, local: Arc<dyn CompilerBackend>) -> Self {
        Self { remote, local }
    }

    pub async fn compile(
        &self,
        language: Language,
        version: &str,
        input: &CompilerInput,
        force_local: bool,
    ) -> Result<CompilationOutput, CompileError> {
        semver::Version::parse(version).map_err(|err| CompileError::InvalidVersion {
            version: version.to_string(),
            err,
        })?;

        let raw = match &self.remote {
            Some(remote) if !force_local => match remote.compile(language, version, input).await {
                Err(BackendError::ResponseSizeExceeded { limit }) => {
                    log::info!(
                        "remote {} {} response exceeds {} bytes, compiling locally",
                        language,
                        version,
                        limit
                    );
                    self.local.compile(language, version, input).await?
                }
                result => result?,
            },
            _ => self.local.compile(language, version, input).await?,
        };

        CompilationOutput::new(raw)
    }
}
