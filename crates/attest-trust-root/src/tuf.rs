//! TUF client for fetching trusted roots
//!
//! The trusted root is distributed as a TUF target. The client is bootstrapped
//! from a `root.json` compiled into this crate (see `repository/`); that is the
//! only trust material that is embedded rather than fetched. Rotating it means
//! replacing the file and cutting a new build.
//!
//! # Example
//!
//! ```no_run
//! use attest_trust_root::{TrustRootProvider, TufConfig, TufTrustRoot};
//!
//! # async fn example() -> Result<(), attest_trust_root::Error> {
//! let provider = TufTrustRoot::new(TufConfig::github());
//! let root = provider.trusted_root().await?;
//! println!("Loaded {} certificate authorities", root.certificate_authorities.len());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tough::{HttpTransport, IntoVec, RepositoryLoader, TargetName};
use url::Url;

use crate::{Error, Result, TrustRootProvider, TrustedRoot};

/// GitHub's TUF repository, which publishes the GitHub and public-good trust roots
pub const DEFAULT_TUF_URL: &str = "https://tuf-repo.github.com";

/// Bootstrap root.json for [`DEFAULT_TUF_URL`]
pub const GITHUB_TUF_ROOT: &[u8] = include_bytes!("../repository/github_tuf_root.json");

/// Target holding the trusted root document
pub const TRUSTED_ROOT_TARGET: &str = "trusted_root.json";

/// Default bound on the whole acquisition, metadata and target included
pub const DEFAULT_TUF_TIMEOUT: Duration = Duration::from_secs(60);

/// Where and how the trusted root is fetched over TUF
#[derive(Debug, Clone)]
pub struct TufConfig {
    /// Repository base URL; metadata lives here, targets under `targets/`
    pub url: String,
    /// Bootstrap root.json used to authenticate the repository
    pub root: Vec<u8>,
    /// Metadata cache; defaults to the per-user cache directory
    pub cache_dir: Option<PathBuf>,
    /// Keep metadata in memory only
    pub disable_cache: bool,
    /// Upper bound on the time spent acquiring the trusted root
    pub timeout: Duration,
}

impl Default for TufConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_TUF_URL.to_string(),
            root: GITHUB_TUF_ROOT.to_vec(),
            cache_dir: None,
            disable_cache: false,
            timeout: DEFAULT_TUF_TIMEOUT,
        }
    }
}

impl TufConfig {
    /// Configuration for GitHub's TUF repository
    pub fn github() -> Self {
        Self::default()
    }

    /// A custom repository bootstrapped from `root`
    pub fn custom(url: impl Into<String>, root: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.cache_dir = Some(dir);
        self
    }

    /// Disable local caching
    pub fn without_cache(mut self) -> Self {
        self.disable_cache = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Trusted root provider backed by a TUF repository
#[derive(Debug, Clone)]
pub struct TufTrustRoot {
    config: TufConfig,
}

impl TufTrustRoot {
    pub fn new(config: TufConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TufConfig {
        &self.config
    }

    /// Read `target_name` from the repository
    ///
    /// Metadata is refreshed and checked against the bootstrap root before the
    /// target is read, so the bytes returned are current and threshold-signed.
    async fn fetch_target(&self, target_name: &str) -> Result<Vec<u8>> {
        let base_url = Url::parse(&self.config.url).map_err(|e| Error::Tuf(e.to_string()))?;
        let metadata_url = base_url.clone();
        let targets_url = base_url
            .join("targets/")
            .map_err(|e| Error::Tuf(e.to_string()))?;

        let mut loader = RepositoryLoader::new(&self.config.root, metadata_url, targets_url)
            .transport(HttpTransport::default());

        if !self.config.disable_cache {
            let cache_dir = self.cache_dir(&base_url)?;
            tokio::fs::create_dir_all(&cache_dir)
                .await
                .map_err(|e| Error::Tuf(format!("cannot create {}: {}", cache_dir.display(), e)))?;
            loader = loader.datastore(cache_dir);
        }

        let repo = loader
            .load()
            .await
            .map_err(|e| Error::Tuf(format!("loading {}: {}", self.config.url, e)))?;

        let target = TargetName::new(target_name)
            .map_err(|e| Error::Tuf(format!("target name {:?}: {}", target_name, e)))?;
        let stream = repo
            .read_target(&target)
            .await
            .map_err(|e| Error::Tuf(format!("reading target {}: {}", target_name, e)))?
            .ok_or_else(|| Error::Tuf(format!("repository has no target {}", target_name)))?;

        stream
            .into_vec()
            .await
            .map_err(|e| Error::Tuf(format!("reading target {}: {}", target_name, e)))
    }

    /// Cache directory for this repository's metadata
    fn cache_dir(&self, base_url: &Url) -> Result<PathBuf> {
        let root = match &self.config.cache_dir {
            Some(dir) => dir.clone(),
            None => directories::ProjectDirs::from("dev", "attest", "attest")
                .ok_or_else(|| Error::Tuf("no home directory for the TUF cache".into()))?
                .cache_dir()
                .join("tuf"),
        };

        // Metadata from different repositories must not share a datastore
        let repo_dir: String = base_url
            .host_str()
            .unwrap_or("local")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
            .collect();
        Ok(root.join(repo_dir))
    }
}

#[async_trait]
impl TrustRootProvider for TufTrustRoot {
    async fn trusted_root(&self) -> Result<TrustedRoot> {
        tracing::debug!(url = %self.config.url, target = TRUSTED_ROOT_TARGET, "fetching trusted root via TUF");

        let bytes = tokio::time::timeout(self.config.timeout, self.fetch_target(TRUSTED_ROOT_TARGET))
            .await
            .map_err(|_| Error::Timeout(self.config.timeout))??;

        let root = TrustedRoot::from_slice(&bytes)?;
        tracing::debug!(
            certificate_authorities = root.certificate_authorities.len(),
            tlogs = root.tlogs.len(),
            timestamp_authorities = root.timestamp_authorities.len(),
            "trusted root loaded"
        );
        Ok(root)
    }
}
