use crate::{
    bytecode::compare,
    compiler::{
        CompilationExecutor, CompilationResult, CompileError, CompilerBackend, LocalCompiler,
        RemoteCompiler,
    },
    repository::{MatchRecord, RepositoryWriter, WriteError},
    settings::Settings,
    source::{
        self, ContentFetcher, ContractDescriptor, IpfsGateway, MissingAfterFetch, RawFile,
        ReconcileError, Reconciliation,
    },
};
use ethers_core::types::{Address, Bytes};
use std::{sync::Arc, time::Duration};
use thiserror::Error;

/// Outputs requested in addition to the ones taken from metadata settings.
const OUTPUT_SELECTION: [&str; 6] = [
    "abi",
    "evm.bytecode",
    "evm.deployedBytecode",
    "evm.deployedBytecode.immutableReferences",
    "evm.deployedBytecode.linkReferences",
    "metadata",
];

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error("contract has invalid sources:\n{0}")]
    InvalidSources(String),
    #[error(transparent)]
    MissingAfterFetch(#[from] MissingAfterFetch),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("deployed bytecode does not match the one compiled from {0}")]
    BytecodeMismatch(String),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error("none of the contracts matched: {}", describe_failures(.0))]
    NoMatch(Vec<(String, Error)>),
    #[error("verification timed out after {0:?}")]
    Timeout(Duration),
}

fn describe_failures(failures: &[(String, Error)]) -> String {
    failures
        .iter()
        .map(|(contract, err)| format!("{contract}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Receives progress of every verification. All methods do nothing by default.
pub trait VerificationObserver: Send + Sync {
    fn on_reconciled(&self, _reconciliation: &Reconciliation) {}
    fn on_fetched(
        &self,
        _contract: &ContractDescriptor,
        _result: &Result<(), MissingAfterFetch>,
    ) {
    }
    fn on_compiled(&self, _contract: &ContractDescriptor, _result: &CompilationResult) {}
    fn on_stored(&self, _record: &MatchRecord) {}
}

/// Forwards verification progress to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl VerificationObserver for LogObserver {
    fn on_reconciled(&self, reconciliation: &Reconciliation) {
        for contract in &reconciliation.contracts {
            log::info!("found {}", contract.describe());
        }
        for rejected in &reconciliation.rejected {
            log::warn!("{} rejected: {}", rejected.origin, rejected.reason);
        }
        if !reconciliation.unused_files.is_empty() {
            log::info!("unused files: {}", reconciliation.unused_files.join(", "));
        }
    }

    fn on_fetched(&self, contract: &ContractDescriptor, result: &Result<(), MissingAfterFetch>) {
        match result {
            Ok(()) => log::info!("fetched all missing sources of {}", contract.name()),
            Err(err) => log::warn!("{}: {}", contract.name(), err),
        }
    }

    fn on_compiled(&self, contract: &ContractDescriptor, result: &CompilationResult) {
        log::debug!(
            "{} compiled into {} bytes of deployed bytecode",
            contract.name(),
            result.deployed_bytecode.0.len()
        );
    }

    fn on_stored(&self, record: &MatchRecord) {
        log::info!(
            "{:?} match of {} on chain {} stored at {}",
            record.tier,
            record.address,
            record.chain_id,
            record.storage_path.display()
        );
    }
}

#[derive(Clone, Debug)]
pub struct VerificationRequest {
    pub chain_id: u64,
    pub address: Address,
    pub files: Vec<RawFile>,
    pub deployed_bytecode: Bytes,
    pub force_local: bool,
}

pub struct Verifier {
    executor: CompilationExecutor,
    fetcher: Arc<dyn ContentFetcher>,
    repository: RepositoryWriter,
    observer: Arc<dyn VerificationObserver>,
    timeout: Duration,
}

impl Verifier {
    pub fn new(
        executor: CompilationExecutor,
        fetcher: Arc<dyn ContentFetcher>,
        repository: RepositoryWriter,
        timeout: Duration,
    ) -> Self {
        Self {
            executor,
            fetcher,
            repository,
            observer: Arc::new(LogObserver),
            timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let local = Arc::new(LocalCompiler::new(
            settings.compiler.local.compilers_dir.clone(),
            settings.compiler.local.max_threads,
        ));
        let remote = if settings.compiler.remote.enabled {
            let remote = RemoteCompiler::new(
                settings.compiler.remote.url.clone(),
                settings.compiler.remote.max_response_size,
                settings.compiler.remote.request_timeout,
            )?;
            Some(Arc::new(remote) as Arc<dyn CompilerBackend>)
        } else {
            None
        };
        let fetcher = IpfsGateway::new(
            settings.ipfs.gateway.clone(),
            settings.ipfs.request_timeout,
        )?;

        Ok(Self::new(
            CompilationExecutor::new(remote, local),
            Arc::new(fetcher),
            RepositoryWriter::new(settings.repository.root.clone()),
            settings.verification.timeout(),
        ))
    }

    pub fn with_observer(mut self, observer: Arc<dyn VerificationObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Verifies the uploaded files against the deployed bytecode and stores
    /// the first contract which matches it.
    pub async fn verify(&self, request: VerificationRequest) -> Result<MatchRecord, Error> {
        tokio::time::timeout(self.timeout, self.verify_files(request))
            .await
            .map_err(|_| Error::Timeout(self.timeout))?
    }

    async fn verify_files(&self, request: VerificationRequest) -> Result<MatchRecord, Error> {
        let VerificationRequest {
            chain_id,
            address,
            files,
            deployed_bytecode,
            force_local,
        } = request;
        let reconciliation = source::reconcile(files)?;
        self.observer.on_reconciled(&reconciliation);

        let mut failures = Vec::new();
        for mut contract in reconciliation.contracts {
            let result = self
                .verify_contract(&mut contract, chain_id, address, &deployed_bytecode, force_local)
                .await;
            match result {
                Ok(record) => return Ok(record),
                Err(err) => {
                    log::info!(
                        "{} ({}) did not verify: {}",
                        contract.name(),
                        contract.compiled_path(),
                        err
                    );
                    failures.push((format!("{}:{}", contract.compiled_path(), contract.name()), err));
                }
            }
        }

        if failures.len() == 1 {
            let (_, err) = failures.remove(0);
            return Err(err);
        }
        Err(Error::NoMatch(failures))
    }

    async fn verify_contract(
        &self,
        contract: &mut ContractDescriptor,
        chain_id: u64,
        address: Address,
        deployed_bytecode: &Bytes,
        force_local: bool,
    ) -> Result<MatchRecord, Error> {
        if !contract.invalid().is_empty() {
            return Err(Error::InvalidSources(contract.describe()));
        }
        if !contract.is_valid() {
            let result = contract.fetch_missing(self.fetcher.as_ref()).await;
            self.observer.on_fetched(contract, &result);
            result?;
        }

        let input = contract
            .standard_compiler_input(true)
            .with_output_selection(&OUTPUT_SELECTION);
        let output = self
            .executor
            .compile(
                contract.language(),
                contract.compiler_version(),
                &input,
                force_local,
            )
            .await?;
        let result = output.contract(contract.compiled_path(), contract.name())?;
        self.observer.on_compiled(contract, &result);

        let tier = compare(
            result.deployed_bytecode.as_ref(),
            deployed_bytecode.as_ref(),
            &result.deployment_ranges(),
        )
        .ok_or_else(|| {
            Error::BytecodeMismatch(format!(
                "{}:{}",
                contract.compiled_path(),
                contract.name()
            ))
        })?;
        let record = self
            .repository
            .store_match(tier, chain_id, address, &result, contract)
            .await?;
        self.observer.on_stored(&record);
        Ok(record)
    }
}
