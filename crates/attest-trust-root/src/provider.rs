//! Sources of trusted roots

use crate::{Result, TrustedRoot};
use async_trait::async_trait;
use std::path::PathBuf;

/// Produces the trusted root a verification run is bound to
///
/// Every failure is fatal to the caller's run; implementations never fall
/// back to material they could not authenticate.
#[async_trait]
pub trait TrustRootProvider: Send + Sync {
    async fn trusted_root(&self) -> Result<TrustedRoot>;
}

/// A trusted root supplied out of band: a file or an already-parsed document
///
/// Used for air-gapped environments where the caller distributes the root
/// through its own authenticated channel.
#[derive(Debug, Clone)]
pub enum StaticTrustRoot {
    File(PathBuf),
    Document(TrustedRoot),
}

impl StaticTrustRoot {
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        StaticTrustRoot::File(path.into())
    }
}

impl From<TrustedRoot> for StaticTrustRoot {
    fn from(root: TrustedRoot) -> Self {
        StaticTrustRoot::Document(root)
    }
}

#[async_trait]
impl TrustRootProvider for StaticTrustRoot {
    async fn trusted_root(&self) -> Result<TrustedRoot> {
        match self {
            StaticTrustRoot::File(path) => {
                tracing::debug!(path = %path.display(), "loading trusted root from file");
                TrustedRoot::from_file(path)
            }
            StaticTrustRoot::Document(root) => Ok(root.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_ROOT: &str = r#"{
        "mediaType": "application/vnd.dev.sigstore.trustedroot+json;version=0.1",
        "tlogs": [],
        "certificateAuthorities": [{
            "certChain": {"certificates": [{"rawBytes": "MIIB"}]},
            "validFor": {"start": "2022-04-13T20:06:15.000Z"}
        }]
    }"#;

    #[tokio::test]
    async fn test_file_provider_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trusted_root.json");
        std::fs::write(&path, MINIMAL_ROOT).unwrap();

        let provider = StaticTrustRoot::from_file(&path);
        let first = provider.trusted_root().await.unwrap();
        let second = provider.trusted_root().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.certificate_authorities.len(), 1);
    }

    #[tokio::test]
    async fn test_file_provider_rejects_malformed_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trusted_root.json");
        std::fs::write(&path, "{\"tlogs\": 5}").unwrap();

        let provider = StaticTrustRoot::from_file(&path);
        assert!(provider.trusted_root().await.is_err());
    }

    #[tokio::test]
    async fn test_document_provider() {
        let root = TrustedRoot::from_json(MINIMAL_ROOT).unwrap();
        let provider = StaticTrustRoot::from(root.clone());
        assert_eq!(provider.trusted_root().await.unwrap(), root);
    }
}
