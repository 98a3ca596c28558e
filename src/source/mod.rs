mod compiler_input;
mod contract;
pub mod fetcher;
mod files;
mod hash_index;
pub(crate) mod metadata;
mod reconciler;

pub use compiler_input::{CompilerInput, Source};
pub use contract::{
    ContractDescriptor, InvalidCompilationTarget, InvalidSource, MissingAfterFetch, MissingSource,
};
pub use fetcher::{ContentFetcher, FetchError, IpfsGateway};
pub use files::{explode, is_archive, is_build_info, read_paths, RawFile};
pub use hash_index::{HashIndex, PathContent};
pub use metadata::{Language, Metadata, Recognized};
pub use reconciler::{reconcile, ReconcileError, Reconciliation, RejectedMetadata};
