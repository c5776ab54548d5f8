//! HTTP client for the two Vault endpoints used during bootstrap.
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::BootstrapError;

/// Header carrying the Vault token on authenticated calls.
pub const TOKEN_HEADER: &str = "X-Vault-Token";

pub struct VaultClient {
    client: reqwest::Client,
    addr: String,
}

impl VaultClient {
    pub fn new(addr: &str) -> Result<Self, BootstrapError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(BootstrapError::Client)?;
        Ok(Self::with_client(client, addr))
    }

    pub fn with_client(client: reqwest::Client, addr: &str) -> Self {
        Self {
            client,
            addr: addr.trim_end_matches('/').to_string(),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// `PUT /v1/sys/init` with a pre-encoded JSON body.
    pub async fn put_init(&self, body: Bytes) -> reqwest::Result<reqwest::Response> {
        self.client
            .put(format!("{}/v1/sys/init", self.addr))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
    }

    /// `POST /v1/sys/mounts/kv` enabling a KV version 2 engine at `kv/`.
    pub async fn mount_kv(&self, token: &str) -> Result<reqwest::Response, BootstrapError> {
        let mut token = HeaderValue::from_str(token).map_err(|_| BootstrapError::InvalidRootToken)?;
        token.set_sensitive(true);

        self.client
            .post(format!("{}/v1/sys/mounts/kv", self.addr))
            .header(TOKEN_HEADER, token)
            .json(&serde_json::json!({ "type": "kv", "options": { "version": "2" } }))
            .send()
            .await
            .map_err(|source| BootstrapError::Vault {
                operation: "mount kv",
                source,
            })
    }
}

/// Body of `PUT /v1/sys/init` for auto-unseal backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InitRequest {
    pub recovery_shares: u32,
    pub recovery_threshold: u32,
}

/// Decoded init payload. Kept as an untyped object so every key Vault returned
/// is persisted as-is.
#[derive(Clone, PartialEq)]
pub struct InitResponse(Map<String, Value>);

impl InitResponse {
    /// Decode a 200 body and require a string `root_token` that can travel in a header.
    pub fn from_slice(body: &[u8]) -> Result<Self, BootstrapError> {
        let map: Map<String, Value> =
            serde_json::from_slice(body).map_err(BootstrapError::MalformedInitResponse)?;
        Self::from_map(map)
    }

    pub fn from_map(map: Map<String, Value>) -> Result<Self, BootstrapError> {
        match map.get("root_token") {
            None => Err(BootstrapError::MissingRootToken),
            Some(Value::String(token)) if HeaderValue::from_str(token).is_ok() => Ok(Self(map)),
            Some(_) => Err(BootstrapError::InvalidRootToken),
        }
    }

    pub fn root_token(&self) -> &str {
        self.0
            .get("root_token")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

// Never print values: the payload holds the root token and recovery keys.
impl fmt::Debug for InitResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitResponse")
            .field("keys", &self.keys())
            .finish()
    }
}
