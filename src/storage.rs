//! Blob storage for uploaded source files.
//!
//! The [`BlobStore`] trait fetches the raw bytes of an uploaded document by
//! bucket and object path. Two backends are provided:
//!
//! - **[`FsBlobStore`]**: reads `<root>/<bucket>/<path>` from local disk.
//! - **[`S3BlobStore`]**: signed `GetObject` against S3 or an S3-compatible
//!   endpoint (MinIO, LocalStack, hosted storage gateways).
//!
//! # S3 credentials
//!
//! - `AWS_ACCESS_KEY_ID` (required)
//! - `AWS_SECRET_ACCESS_KEY` (required)
//! - `AWS_SESSION_TOKEN` (optional)
//!
//! Requests are signed with
//! [AWS Signature Version 4](https://docs.aws.amazon.com/AmazonS3/latest/API/sigv4-auth-using-authorization-header.html)
//! using only `hmac` + `sha2`. Without `endpoint_url` the virtual-hosted
//! form `<bucket>.s3.<region>.amazonaws.com` is used; with one, requests go
//! path-style to `<endpoint>/<bucket>/<key>`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};

use crate::config::StorageConfig;
use crate::error::ApiError;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Download the object at `bucket`/`path`.
    async fn fetch(&self, bucket: &str, path: &str) -> Result<Vec<u8>>;
}

/// Build the configured backend.
///
/// | Config Value | Backend |
/// |-------------|---------|
/// | `"filesystem"` | [`FsBlobStore`] (root defaults to `./data/blobs`) |
/// | `"s3"` | [`S3BlobStore`] |
pub fn create_blob_store(config: &StorageConfig) -> Result<Box<dyn BlobStore>> {
    match config.provider.as_str() {
        "filesystem" => {
            let root = config
                .root
                .clone()
                .unwrap_or_else(|| PathBuf::from("./data/blobs"));
            Ok(Box::new(FsBlobStore::new(root)))
        }
        "s3" => Ok(Box::new(S3BlobStore::from_env(config)?)),
        other => bail!("Unknown storage provider: {}", other),
    }
}

// ============ Filesystem ============

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `bucket`/`path` under the root, refusing anything that could
    /// escape it.
    pub fn resolve(&self, bucket: &str, path: &str) -> Result<PathBuf> {
        let mut resolved = self.root.clone();
        for part in [bucket, path] {
            let rel = Path::new(part.trim_start_matches('/'));
            for component in rel.components() {
                match component {
                    Component::Normal(seg) => resolved.push(seg),
                    Component::CurDir => {}
                    _ => bail!("Invalid object location: {}/{}", bucket, path),
                }
            }
        }
        if resolved == self.root {
            bail!("Empty object location");
        }
        Ok(resolved)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn fetch(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(bucket, path)?;
        tokio::fs::read(&full)
            .await
            .with_context(|| format!("Failed to read blob {}", full.display()))
    }
}

// ============ S3 ============

type HmacSha256 = Hmac<Sha256>;

struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

pub struct S3BlobStore {
    client: reqwest::Client,
    creds: AwsCredentials,
    region: String,
    endpoint_url: Option<String>,
}

impl S3BlobStore {
    pub fn from_env(config: &StorageConfig) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            creds: AwsCredentials::from_env()?,
            region: config.region.clone(),
            endpoint_url: config.endpoint_url.clone(),
        })
    }

    /// Scheme + host for the request, and the canonical URI of the object.
    fn locate(&self, bucket: &str, key: &str) -> (String, String, String) {
        let encoded_key = key
            .trim_start_matches('/')
            .split('/')
            .map(uri_encode)
            .collect::<Vec<_>>()
            .join("/");

        match self.endpoint_url {
            Some(ref endpoint) => {
                let endpoint = endpoint.trim_end_matches('/');
                let (scheme, host) = match endpoint.split_once("://") {
                    Some((scheme, host)) => (scheme, host),
                    None => ("https", endpoint),
                };
                (
                    scheme.to_string(),
                    host.to_string(),
                    format!("/{}/{}", uri_encode(bucket), encoded_key),
                )
            }
            None => (
                "https".to_string(),
                format!("{}.s3.{}.amazonaws.com", bucket, self.region),
                format!("/{}", encoded_key),
            ),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn fetch(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        let (scheme, host, canonical_uri) = self.locate(bucket, path);
        let url = format!("{}://{}{}", scheme, host, canonical_uri);

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex_sha256(b"");

        let mut headers = vec![
            ("host".to_string(), host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "GET\n{}\n\n{}\n{}\n{}",
            canonical_uri, canonical_headers, signed_headers, payload_hash
        );
        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );
        let signing_key =
            derive_signing_key(&self.creds.secret_access_key, &date_stamp, &self.region, "s3");
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        let mut req = self
            .client
            .get(&url)
            .header("Authorization", &authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date);
        if let Some(ref token) = self.creds.session_token {
            req = req.header("x-amz-security-token", token);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("Failed to get s3://{}/{}", bucket, path))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::from_body("storage", status.as_u16(), &body).into());
        }

        Ok(resp.bytes().await?.to_vec())
    }
}

// ============ SigV4 helpers ============

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding; everything but `A-Z a-z 0-9 - _ . ~` is escaped.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}
