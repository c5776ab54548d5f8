//! AWS Secrets Manager over its JSON 1.1 protocol, signed with SigV4.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::credentials::CredentialChain;
use super::sigv4::{Credentials, Signer};
use super::{SecretMetadata, SecretStore, StoreError};
use crate::errors::BootstrapError;

const SERVICE: &str = "secretsmanager";
const CONTENT_TYPE_JSON_11: &str = "application/x-amz-json-1.1";

/// Connection settings for Secrets Manager.
#[derive(Debug, Clone)]
pub struct AwsSettings {
    pub region: String,
    pub endpoint: Url,
    pub credentials: CredentialChain,
}

impl AwsSettings {
    pub fn from_env() -> Result<Self, BootstrapError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Region from AWS_REGION / AWS_DEFAULT_REGION, the credential sources the
    /// environment configures, and an optional endpoint override from
    /// AWS_ENDPOINT_URL_SECRETS_MANAGER / AWS_ENDPOINT_URL.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BootstrapError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let region = get("AWS_REGION")
            .or_else(|| get("AWS_DEFAULT_REGION"))
            .ok_or_else(|| {
                BootstrapError::Config("AWS_REGION or AWS_DEFAULT_REGION must be set".into())
            })?;
        let credentials = CredentialChain::from_lookup(&get, &region)?;

        let endpoint = get("AWS_ENDPOINT_URL_SECRETS_MANAGER")
            .or_else(|| get("AWS_ENDPOINT_URL"))
            .unwrap_or_else(|| format!("https://secretsmanager.{}.amazonaws.com", region));
        let endpoint = Url::parse(&endpoint).map_err(|e| {
            BootstrapError::Config(format!("invalid Secrets Manager endpoint {}: {}", endpoint, e))
        })?;

        Ok(Self {
            region,
            endpoint,
            credentials,
        })
    }
}

pub struct SecretsManagerStore {
    client: reqwest::Client,
    settings: AwsSettings,
    credentials: Credentials,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeSecretOutput {
    name: Option<String>,
    #[serde(rename = "ARN")]
    arn: Option<String>,
    /// Epoch seconds, possibly fractional.
    deleted_date: Option<f64>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type")]
    kind: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

impl SecretsManagerStore {
    /// Build the HTTP client and resolve credentials through the configured chain.
    pub async fn connect(settings: AwsSettings) -> Result<Self, BootstrapError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(BootstrapError::Client)?;
        let credentials = settings.credentials.resolve(&client).await?;
        Ok(Self {
            client,
            settings,
            credentials,
        })
    }

    /// Issue one signed action and return the decoded JSON body.
    async fn call(&self, action: &str, payload: Value) -> Result<Value, StoreError> {
        let body = serde_json::to_vec(&payload)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON_11));
        headers.insert(
            "x-amz-target",
            HeaderValue::from_str(&format!("secretsmanager.{}", action))
                .map_err(|e| StoreError::Signing(e.to_string()))?,
        );

        Signer {
            credentials: &self.credentials,
            region: &self.settings.region,
            service: SERVICE,
        }
        .sign("POST", &self.settings.endpoint, &mut headers, &body, Utc::now())
        .map_err(|e| StoreError::Signing(e.to_string()))?;

        let resp = self
            .client
            .post(self.settings.endpoint.clone())
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        debug!(action, status = %status, "secrets manager responded");

        if status.is_success() {
            if bytes.is_empty() {
                return Ok(Value::Object(Default::default()));
            }
            return Ok(serde_json::from_slice(&bytes)?);
        }

        let err: ErrorBody = serde_json::from_slice(&bytes).unwrap_or(ErrorBody {
            kind: None,
            message: None,
        });
        // __type may be namespaced, e.g. "com.amazonaws.secretsmanager#ResourceNotFoundException"
        let code = err
            .kind
            .as_deref()
            .map(|k| k.rsplit('#').next().unwrap_or(k).to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        let message = err
            .message
            .unwrap_or_else(|| String::from_utf8_lossy(&bytes).into_owned());

        if code == "ResourceNotFoundException" {
            return Err(StoreError::NotFound(message));
        }
        Err(StoreError::Service {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

#[async_trait]
impl SecretStore for SecretsManagerStore {
    async fn describe(&self, name: &str) -> Result<SecretMetadata, StoreError> {
        let body = self.call("DescribeSecret", json!({ "SecretId": name })).await?;
        let out: DescribeSecretOutput = serde_json::from_value(body)?;

        Ok(SecretMetadata {
            name: out.name.unwrap_or_else(|| name.to_string()),
            arn: out.arn,
            deleted_date: out.deleted_date.and_then(epoch_to_utc),
        })
    }

    async fn create(&self, name: &str, description: &str, value: &str) -> Result<(), StoreError> {
        self.call(
            "CreateSecret",
            json!({
                "Name": name,
                "Description": description,
                "SecretString": value,
                "ClientRequestToken": uuid::Uuid::new_v4().to_string(),
            }),
        )
        .await?;
        Ok(())
    }

    async fn restore(&self, name: &str) -> Result<(), StoreError> {
        self.call("RestoreSecret", json!({ "SecretId": name })).await?;
        Ok(())
    }

    async fn update(&self, name: &str, value: &str) -> Result<(), StoreError> {
        self.call(
            "UpdateSecret",
            json!({
                "SecretId": name,
                "SecretString": value,
                "ClientRequestToken": uuid::Uuid::new_v4().to_string(),
            }),
        )
        .await?;
        Ok(())
    }
}

fn epoch_to_utc(secs: f64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_endpoint_follows_region() {
        let settings = AwsSettings::from_lookup(lookup(&[
            ("AWS_DEFAULT_REGION", "eu-central-1"),
            ("AWS_ACCESS_KEY_ID", "AKIA"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
        ]))
        .unwrap();

        assert_eq!(settings.region, "eu-central-1");
        assert_eq!(
            settings.endpoint.as_str(),
            "https://secretsmanager.eu-central-1.amazonaws.com/"
        );
        assert_eq!(
            settings.credentials.sources(),
            vec!["environment", "instance metadata"]
        );
    }

    #[test]
    fn test_service_specific_endpoint_wins() {
        let settings = AwsSettings::from_lookup(lookup(&[
            ("AWS_REGION", "us-east-1"),
            ("AWS_ACCESS_KEY_ID", "AKIA"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("AWS_ENDPOINT_URL", "http://localhost:4566"),
            ("AWS_ENDPOINT_URL_SECRETS_MANAGER", "http://localhost:5000"),
        ]))
        .unwrap();
        assert_eq!(settings.endpoint.as_str(), "http://localhost:5000/");
    }

    #[test]
    fn test_missing_region_is_a_config_error() {
        let err = AwsSettings::from_lookup(lookup(&[
            ("AWS_ACCESS_KEY_ID", "AKIA"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
        ]))
        .unwrap_err();
        assert!(matches!(err, BootstrapError::Config(_)));
    }

    #[test]
    fn test_half_set_static_keys_are_rejected() {
        let err = AwsSettings::from_lookup(lookup(&[
            ("AWS_REGION", "us-east-1"),
            ("AWS_ACCESS_KEY_ID", "AKIA"),
        ]))
        .unwrap_err();
        assert!(matches!(err, BootstrapError::Config(_)), "{:?}", err);
    }

    #[test]
    fn test_no_static_keys_falls_through_to_other_sources() {
        let settings = AwsSettings::from_lookup(lookup(&[
            ("AWS_REGION", "us-east-1"),
            ("HOME", "/home/vault"),
            ("AWS_WEB_IDENTITY_TOKEN_FILE", "/var/run/secrets/token"),
            ("AWS_ROLE_ARN", "arn:aws:iam::123456789012:role/bootstrap"),
            ("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI", "/v2/credentials/abc"),
            ("AWS_EC2_METADATA_DISABLED", "true"),
        ]))
        .unwrap();
        assert_eq!(
            settings.credentials.sources(),
            vec!["shared credentials file", "web identity", "container"]
        );
    }

    #[test]
    fn test_debug_output_hides_secret_key() {
        let settings = AwsSettings::from_lookup(lookup(&[
            ("AWS_REGION", "us-east-1"),
            ("AWS_ACCESS_KEY_ID", "AKIA"),
            ("AWS_SECRET_ACCESS_KEY", "super-secret-value"),
        ]))
        .unwrap();
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("super-secret-value"), "{}", debug);
    }

    #[test]
    fn test_epoch_to_utc_keeps_milliseconds() {
        let ts = epoch_to_utc(1_523_477_145.713).unwrap();
        assert_eq!(ts.timestamp(), 1_523_477_145);
        assert_eq!(ts.timestamp_subsec_millis(), 713);
    }
}
