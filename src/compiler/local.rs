use super::executor::{BackendError, CompilerBackend};
use crate::source::{CompilerInput, Language};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::Value;
use std::{num::NonZeroUsize, path::PathBuf, process::Stdio};
use tokio::{io::AsyncWriteExt, process::Command, sync::Semaphore};

/// Runs compiler binaries stored at `{compilers_dir}/{solc|vyper}/{version}`.
pub struct LocalCompiler {
    compilers_dir: PathBuf,
    threads_semaphore: Semaphore,
}

impl LocalCompiler {
    pub fn new(compilers_dir: PathBuf, max_threads: NonZeroUsize) -> Self {
        Self {
            compilers_dir,
            threads_semaphore: Semaphore::new(max_threads.get()),
        }
    }

    fn compiler_path(&self, language: Language, version: &str) -> PathBuf {
        self.compilers_dir
            .join(language.compiler_name())
            .join(version)
    }
}

#[async_trait]
impl CompilerBackend for LocalCompiler {
    async fn compile(
        &self,
        language: Language,
        version: &str,
        input: &CompilerInput,
    ) -> Result<Value, BackendError> {
        let compiler = self.compiler_path(language, version);
        if !compiler.is_file() {
            return Err(anyhow!(
                "{} {} is not available at {}",
                language.compiler_name(),
                version,
                compiler.display()
            )
            .into());
        }
        let input = serde_json::to_vec(input).context("failed to serialize compiler input")?;

        let _permit = self
            .threads_semaphore
            .acquire()
            .await
            .context("acquiring compiler permit")?;

        let mut child = Command::new(&compiler)
            .arg("--standard-json")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}", compiler.display()))?;

        let mut stdin = child.stdin.take().context("compiler stdin is not piped")?;
        stdin
            .write_all(&input)
            .await
            .context("failed to write compiler input")?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .context("failed to wait for the compiler")?;
        if !output.status.success() {
            return Err(anyhow!(
                "{} exited with {}: {}",
                compiler.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )
            .into());
        }

        let output = serde_json::from_slice(&output.stdout).context("invalid compiler output")?;
        Ok(output)
    }
}
