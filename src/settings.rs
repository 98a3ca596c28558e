use crate::consts::{DEFAULT_IPFS_GATEWAY, DEFAULT_MAX_RESPONSE_SIZE, DEFAULT_REMOTE_COMPILER_URL};
use anyhow::anyhow;
use config::{Config, File};
use serde::{de::IgnoredAny, Deserialize};
use std::{num::NonZeroUsize, path::PathBuf, time::Duration};
use url::Url;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub repository: RepositorySettings,
    pub compiler: CompilerSettings,
    pub ipfs: IpfsSettings,
    pub verification: VerificationSettings,

    // Is required as we deny unknown fields, but allow users provide
    // path to config through PREFIX__CONFIG env variable.
    #[serde(rename = "config")]
    pub config_path: IgnoredAny,
}

impl PartialEq for Settings {
    fn eq(&self, other: &Self) -> bool {
        self.repository == other.repository
            && self.compiler == other.compiler
            && self.ipfs == other.ipfs
            && self.verification == other.verification
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepositorySettings {
    pub root: PathBuf,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("repository"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerSettings {
    pub remote: RemoteCompilerSettings,
    pub local: LocalCompilerSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteCompilerSettings {
    pub enabled: bool,
    pub url: Url,
    /// Largest response body (in bytes) accepted from the remote service.
    pub max_response_size: usize,
    pub request_timeout: u64,
}

impl Default for RemoteCompilerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: Url::try_from(DEFAULT_REMOTE_COMPILER_URL).expect("valid url"),
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            request_timeout: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocalCompilerSettings {
    pub compilers_dir: PathBuf,
    pub max_threads: NonZeroUsize,
}

impl Default for LocalCompilerSettings {
    fn default() -> Self {
        let mut default_dir = std::env::temp_dir();
        default_dir.push("compilers");
        Self {
            compilers_dir: default_dir,
            max_threads: NonZeroUsize::new(4).expect("Is not zero"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IpfsSettings {
    pub gateway: Url,
    pub request_timeout: u64,
}

impl Default for IpfsSettings {
    fn default() -> Self {
        Self {
            gateway: Url::try_from(DEFAULT_IPFS_GATEWAY).expect("valid url"),
            request_timeout: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerificationSettings {
    /// Upper bound for a single verification request, in seconds.
    pub timeout: u64,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self { timeout: 300 }
    }
}

impl VerificationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Settings {
    pub fn new() -> anyhow::Result<Self> {
        let config_path = std::env::var("SOURCE_VERIFIER__CONFIG").ok().map(PathBuf::from);
        Self::build(config_path)
    }

    /// Same as [`Settings::new`], but a config file given explicitly
    /// (e.g. from command line) takes precedence over the env variable.
    /// The file has to exist.
    pub fn with_config_path(path: PathBuf) -> anyhow::Result<Self> {
        if !path.is_file() {
            return Err(anyhow!("config file {} does not exist", path.display()));
        }
        Self::build(Some(path))
    }

    fn build(config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();
        if let Some(config_path) = config_path {
            builder = builder.add_source(File::from(config_path));
        };
        // Use `__` so that it would be possible to address keys with underscores in names (e.g. `max_threads`)
        builder = builder
            .add_source(config::Environment::with_prefix("SOURCE_VERIFIER").separator("__"));

        let settings: Settings = builder.build()?.try_deserialize()?;

        settings.validate()?;

        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.compiler.remote.enabled && self.compiler.remote.max_response_size == 0 {
            return Err(anyhow!(
                "remote compiler is enabled, but `max_response_size` is zero"
            ));
        }
        if self.verification.timeout == 0 {
            return Err(anyhow!("verification `timeout` should be positive"));
        }

        Ok(())
    }
}
