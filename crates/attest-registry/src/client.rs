//! Registry access used by bundle discovery
//!
//! Resolution, authentication and blob pulls go through [`oci_client::Client`].
//! Referrers indexes and manifests are read with a size-capped GET that reuses
//! the client's credentials: the crate's own index type drops `artifactType`
//! and its manifest pulls buffer the whole body.

use crate::error::{Error, Result};
use crate::models::{ImageIndex, ImageManifest, OCI_IMAGE_INDEX, OCI_IMAGE_MANIFEST};
use async_trait::async_trait;
use attest_types::{Descriptor, Digest, HashAlgorithm};
use futures_util::StreamExt;
use oci_client::client::{ClientConfig, ClientProtocol};
use oci_client::secrets::RegistryAuth;
use oci_client::{Client, Reference, RegistryOperation};
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use std::time::Duration;

/// Default cap on any downloaded manifest, index or blob
pub const DEFAULT_MAX_BLOB_SIZE: u64 = 16 * 1024 * 1024;

const USER_AGENT: &str = concat!("attest/", env!("CARGO_PKG_VERSION"));

/// Read-only registry operations needed to discover attestations
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Resolve a reference to the descriptor of its manifest
    async fn resolve(&self, reference: &Reference) -> Result<Descriptor>;

    /// List artifacts whose subject is `subject`
    async fn referrers(&self, reference: &Reference, subject: &Digest) -> Result<ImageIndex>;

    /// Fetch the manifest described by `descriptor`
    async fn manifest(&self, reference: &Reference, descriptor: &Descriptor) -> Result<ImageManifest>;

    /// Download a blob, checking its size and digest against `descriptor`
    async fn blob(&self, reference: &Reference, descriptor: &Descriptor) -> Result<Vec<u8>>;
}

/// Configuration for [`OciRegistry`]
#[derive(Clone)]
pub struct RegistryConfig {
    pub auth: RegistryAuth,
    /// Registries (`host[:port]`) reached over plain HTTP
    pub insecure_registries: Vec<String>,
    /// Cap applied to every downloaded document and blob
    pub max_blob_size: u64,
    pub timeout: Duration,
}

impl std::fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let auth = match &self.auth {
            RegistryAuth::Anonymous => "anonymous",
            RegistryAuth::Basic(..) => "basic",
            RegistryAuth::Bearer(_) => "bearer",
        };
        f.debug_struct("RegistryConfig")
            .field("auth", &auth)
            .field("insecure_registries", &self.insecure_registries)
            .field("max_blob_size", &self.max_blob_size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            auth: RegistryAuth::Anonymous,
            insecure_registries: Vec::new(),
            max_blob_size: DEFAULT_MAX_BLOB_SIZE,
            timeout: Duration::from_secs(30),
        }
    }
}

impl RegistryConfig {
    pub fn with_auth(mut self, auth: RegistryAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_insecure_registry(mut self, registry: impl Into<String>) -> Self {
        self.insecure_registries.push(registry.into());
        self
    }

    pub fn with_max_blob_size(mut self, size: u64) -> Self {
        self.max_blob_size = size;
        self
    }

    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            protocol: ClientProtocol::HttpsExcept(self.insecure_registries.clone()),
            read_timeout: Some(self.timeout),
            connect_timeout: Some(self.timeout),
            user_agent: USER_AGENT,
            ..Default::default()
        }
    }
}

/// Registry client backed by `oci-client`
pub struct OciRegistry {
    client: Client,
    http: reqwest::Client,
    config: RegistryConfig,
}

impl OciRegistry {
    pub fn new(config: RegistryConfig) -> Result<Self> {
        let client = Client::try_from(config.client_config())?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client, http, config })
    }

    fn base_url(&self, reference: &Reference) -> String {
        let registry = reference.resolve_registry();
        let scheme = if self.config.insecure_registries.iter().any(|r| r == registry) {
            "http"
        } else {
            "https"
        };
        format!("{}://{}/v2/{}", scheme, registry, reference.repository())
    }

    /// GET a registry document, reading at most `limit` bytes of it
    ///
    /// Anonymous first; on 401 the client answers the registry's challenge and
    /// the request is repeated once with the resulting credentials.
    async fn get_document(
        &self,
        reference: &Reference,
        url: &str,
        accept: &str,
        limit: u64,
    ) -> Result<(StatusCode, Vec<u8>)> {
        let request = || self.http.get(url).header(ACCEPT, accept);
        let mut response = request().send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let token = self
                .client
                .auth(reference, &self.config.auth, RegistryOperation::Pull)
                .await?;
            tracing::debug!(url, bearer = token.is_some(), "retrying with registry credentials");
            response = match (token, &self.config.auth) {
                (Some(token), _) => request().bearer_auth(token).send().await?,
                (None, RegistryAuth::Basic(username, password)) => {
                    request().basic_auth(username, Some(password)).send().await?
                }
                (None, _) => response,
            };
        }

        let status = response.status();
        if !status.is_success() {
            return Ok((status, Vec::new()));
        }
        let body = read_capped(response, url, limit).await?;
        Ok((status, body))
    }

    async fn get_index(&self, reference: &Reference, url: &str) -> Result<Option<ImageIndex>> {
        let (status, body) = self
            .get_document(reference, url, OCI_IMAGE_INDEX, self.config.max_blob_size)
            .await?;
        match status {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => serde_json::from_slice(&body)
                .map(Some)
                .map_err(|e| Error::InvalidResponse(format!("referrers index {}: {}", url, e))),
            status => Err(Error::status(url, status)),
        }
    }

    /// Cap for content declared by `descriptor`, failing before any request if it is over the limit
    fn declared_limit(&self, descriptor: &Descriptor) -> Result<u64> {
        let limit = self.config.max_blob_size;
        match u64::try_from(descriptor.size) {
            Ok(size) if size <= limit => Ok(size),
            _ => Err(Error::too_large(
                &descriptor.digest,
                descriptor.size.max(0) as u64,
                limit,
            )),
        }
    }
}

/// Read a response body, refusing anything past `limit` bytes
async fn read_capped(mut response: reqwest::Response, url: &str, limit: u64) -> Result<Vec<u8>> {
    if let Some(length) = response.content_length() {
        if length > limit {
            return Err(Error::too_large(url, length, limit));
        }
    }
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let size = (body.len() + chunk.len()) as u64;
        if size > limit {
            return Err(Error::too_large(url, size, limit));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

#[async_trait]
impl RegistryClient for OciRegistry {
    async fn resolve(&self, reference: &Reference) -> Result<Descriptor> {
        let digest = self
            .client
            .fetch_manifest_digest(reference, &self.config.auth)
            .await?;
        let digest: Digest = digest
            .parse()
            .map_err(|e| Error::InvalidResponse(format!("manifest digest {:?}: {}", digest, e)))?;

        if let Some(pinned) = reference.digest() {
            if digest.to_string() != pinned {
                return Err(Error::DigestMismatch {
                    expected: pinned.to_string(),
                    actual: digest.to_string(),
                });
            }
        }

        // A digest lookup says nothing about the manifest's media type or size
        Ok(Descriptor::new(String::new(), digest, 0))
    }

    async fn referrers(&self, reference: &Reference, subject: &Digest) -> Result<ImageIndex> {
        let url = format!("{}/referrers/{}", self.base_url(reference), subject);
        if let Some(index) = self.get_index(reference, &url).await? {
            return Ok(index);
        }

        // Registries without the referrers API publish the index under a tag
        let tag_url = format!("{}/manifests/{}", self.base_url(reference), subject.referrers_tag());
        tracing::debug!(url = %tag_url, "referrers API unavailable, trying tag schema");
        Ok(self.get_index(reference, &tag_url).await?.unwrap_or_default())
    }

    async fn manifest(&self, reference: &Reference, descriptor: &Descriptor) -> Result<ImageManifest> {
        let limit = self.declared_limit(descriptor)?;
        let url = format!("{}/manifests/{}", self.base_url(reference), descriptor.digest);
        let (status, body) = self
            .get_document(reference, &url, OCI_IMAGE_MANIFEST, limit)
            .await?;
        if !status.is_success() {
            return Err(Error::status(&url, status));
        }

        verify_digest(&descriptor.digest, &body)?;
        serde_json::from_slice(&body)
            .map_err(|e| Error::InvalidResponse(format!("manifest {}: {}", descriptor.digest, e)))
    }

    async fn blob(&self, reference: &Reference, descriptor: &Descriptor) -> Result<Vec<u8>> {
        let limit = self.declared_limit(descriptor)?;
        let digest = descriptor.digest.to_string();

        self.client
            .store_auth_if_needed(reference.resolve_registry(), &self.config.auth)
            .await;
        let mut stream = self.client.pull_blob_stream(reference, digest.as_str()).await?;
        if let Some(length) = stream.content_length {
            if length > limit {
                return Err(Error::too_large(&digest, length, limit));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| stream_error(e, &digest))?;
            let size = (body.len() + chunk.len()) as u64;
            if size > limit {
                return Err(Error::too_large(&digest, size, limit));
            }
            body.extend_from_slice(&chunk);
        }

        verify_digest(&descriptor.digest, &body)?;
        Ok(body)
    }
}

/// Surface digest failures reported by the verifying blob stream as mismatches
fn stream_error(err: std::io::Error, digest: &str) -> Error {
    match err
        .into_inner()
        .map(|inner| inner.downcast::<oci_client::errors::DigestError>())
    {
        Some(Ok(digest_error)) => (*digest_error).into(),
        Some(Err(inner)) => Error::InvalidResponse(format!("blob {}: {}", digest, inner)),
        None => Error::InvalidResponse(format!("blob {}: stream failed", digest)),
    }
}

/// Digest of `data` under `algorithm`
pub fn compute_digest(algorithm: HashAlgorithm, data: &[u8]) -> Digest {
    let alg = match algorithm {
        HashAlgorithm::Sha256 => &aws_lc_rs::digest::SHA256,
        HashAlgorithm::Sha384 => &aws_lc_rs::digest::SHA384,
        HashAlgorithm::Sha512 => &aws_lc_rs::digest::SHA512,
    };
    Digest::from_bytes(algorithm, aws_lc_rs::digest::digest(alg, data).as_ref())
}

/// Check downloaded content against the digest it was requested by
pub fn verify_digest(expected: &Digest, data: &[u8]) -> Result<()> {
    let algorithm = expected
        .hash_algorithm()
        .map_err(|e| Error::InvalidResponse(format!("cannot verify {}: {}", expected, e)))?;
    let actual = compute_digest(algorithm, data);
    if !actual.encoded().eq_ignore_ascii_case(expected.encoded()) {
        return Err(Error::DigestMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}
