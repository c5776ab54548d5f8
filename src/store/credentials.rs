//! Credential resolution for the Secrets Manager client.
//!
//! Sources are tried in the order the AWS SDKs use: environment, shared credentials
//! file, web identity (IRSA), container endpoint (ECS / EKS Pod Identity), then EC2
//! instance metadata (IMDSv2). Resolution happens once per run; nothing refreshes
//! the credentials afterwards.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use tracing::{debug, info};
use url::{Host, Url};
use zeroize::Zeroizing;

use super::sigv4::Credentials;
use crate::errors::BootstrapError;

const ECS_CONTAINER_HOST: &str = "http://169.254.170.2";
const IMDS_ENDPOINT: &str = "http://169.254.169.254";
const IMDS_TOKEN_TTL_SECS: &str = "21600";
const DEFAULT_SESSION_NAME: &str = "vault-bootstrap";
const STS_API_VERSION: &str = "2011-06-15";

/// Link-local and loopback calls should answer almost immediately; a slow answer
/// means the source is not there.
const METADATA_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Clone)]
enum ContainerAuth {
    Token(Zeroizing<String>),
    File(PathBuf),
}

#[derive(Clone)]
enum Provider {
    Environment(Credentials),
    Profile {
        path: PathBuf,
        profile: String,
    },
    WebIdentity {
        token_file: PathBuf,
        role_arn: String,
        session_name: String,
        sts_endpoint: Url,
    },
    Container {
        uri: Url,
        auth: Option<ContainerAuth>,
    },
    InstanceMetadata {
        endpoint: Url,
    },
}

/// JSON shape served by both the container endpoint and IMDS.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetadataCredentials {
    access_key_id: String,
    secret_access_key: String,
    token: Option<String>,
}

impl Provider {
    fn name(&self) -> &'static str {
        match self {
            Provider::Environment(_) => "environment",
            Provider::Profile { .. } => "shared credentials file",
            Provider::WebIdentity { .. } => "web identity",
            Provider::Container { .. } => "container",
            Provider::InstanceMetadata { .. } => "instance metadata",
        }
    }

    async fn load(&self, client: &reqwest::Client) -> anyhow::Result<Credentials> {
        match self {
            Provider::Environment(credentials) => Ok(credentials.clone()),
            Provider::Profile { path, profile } => {
                let contents = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                parse_profile(&contents, profile)
            }
            Provider::WebIdentity {
                token_file,
                role_arn,
                session_name,
                sts_endpoint,
            } => {
                assume_role_with_web_identity(
                    client,
                    token_file,
                    role_arn,
                    session_name,
                    sts_endpoint,
                )
                .await
            }
            Provider::Container { uri, auth } => {
                container_credentials(client, uri, auth.as_ref()).await
            }
            Provider::InstanceMetadata { endpoint } => {
                instance_credentials(client, endpoint).await
            }
        }
    }
}

/// Ordered list of credential sources configured by the environment.
#[derive(Clone)]
pub struct CredentialChain {
    providers: Vec<Provider>,
}

impl fmt::Debug for CredentialChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialChain")
            .field("sources", &self.sources())
            .finish()
    }
}

impl CredentialChain {
    /// Work out which sources are configured. Nothing is read or fetched yet.
    pub fn from_lookup<F>(get: &F, region: &str) -> Result<Self, BootstrapError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut providers = Vec::new();

        match (get("AWS_ACCESS_KEY_ID"), get("AWS_SECRET_ACCESS_KEY")) {
            (Some(access_key_id), Some(secret_access_key)) => {
                providers.push(Provider::Environment(Credentials {
                    access_key_id,
                    secret_access_key: Zeroizing::new(secret_access_key),
                    session_token: get("AWS_SESSION_TOKEN"),
                }))
            }
            (None, None) => {}
            _ => {
                return Err(BootstrapError::Config(
                    "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set together".into(),
                ))
            }
        }

        let shared_file = get("AWS_SHARED_CREDENTIALS_FILE")
            .map(PathBuf::from)
            .or_else(|| {
                get("HOME").map(|home| PathBuf::from(home).join(".aws").join("credentials"))
            });
        if let Some(path) = shared_file {
            providers.push(Provider::Profile {
                path,
                profile: get("AWS_PROFILE").unwrap_or_else(|| "default".to_string()),
            });
        }

        if let (Some(token_file), Some(role_arn)) =
            (get("AWS_WEB_IDENTITY_TOKEN_FILE"), get("AWS_ROLE_ARN"))
        {
            let sts_endpoint = get("AWS_ENDPOINT_URL_STS")
                .or_else(|| get("AWS_ENDPOINT_URL"))
                .unwrap_or_else(|| format!("https://sts.{}.amazonaws.com", region));
            providers.push(Provider::WebIdentity {
                token_file: PathBuf::from(token_file),
                role_arn,
                session_name: get("AWS_ROLE_SESSION_NAME")
                    .unwrap_or_else(|| DEFAULT_SESSION_NAME.to_string()),
                sts_endpoint: parse_url("AWS_ENDPOINT_URL_STS", &sts_endpoint)?,
            });
        }

        let container_uri = match (
            get("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI"),
            get("AWS_CONTAINER_CREDENTIALS_FULL_URI"),
        ) {
            (Some(relative), _) => Some(format!("{}{}", ECS_CONTAINER_HOST, relative)),
            (None, Some(full)) => Some(full),
            (None, None) => None,
        };
        if let Some(uri) = container_uri {
            let uri = parse_url("AWS_CONTAINER_CREDENTIALS_FULL_URI", &uri)?;
            if !is_allowed_container_uri(&uri) {
                return Err(BootstrapError::Config(format!(
                    "container credentials endpoint {} must use https or a loopback or container host",
                    uri
                )));
            }
            let auth = get("AWS_CONTAINER_AUTHORIZATION_TOKEN_FILE")
                .map(|path| ContainerAuth::File(PathBuf::from(path)))
                .or_else(|| {
                    get("AWS_CONTAINER_AUTHORIZATION_TOKEN")
                        .map(|token| ContainerAuth::Token(Zeroizing::new(token)))
                });
            providers.push(Provider::Container { uri, auth });
        }

        let imds_disabled = get("AWS_EC2_METADATA_DISABLED")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
        if !imds_disabled {
            let endpoint = get("AWS_EC2_METADATA_SERVICE_ENDPOINT")
                .unwrap_or_else(|| IMDS_ENDPOINT.to_string());
            providers.push(Provider::InstanceMetadata {
                endpoint: parse_url("AWS_EC2_METADATA_SERVICE_ENDPOINT", &endpoint)?,
            });
        }

        Ok(Self { providers })
    }

    /// Names of the configured sources, in the order they are tried.
    pub fn sources(&self) -> Vec<&'static str> {
        self.providers.iter().map(Provider::name).collect()
    }

    /// Return credentials from the first source that yields them.
    pub async fn resolve(&self, client: &reqwest::Client) -> Result<Credentials, BootstrapError> {
        let mut failures = Vec::new();

        for provider in &self.providers {
            match provider.load(client).await {
                Ok(credentials) => {
                    info!(
                        source = provider.name(),
                        access_key_id = %credentials.access_key_id,
                        "resolved aws credentials"
                    );
                    return Ok(credentials);
                }
                Err(e) => {
                    debug!(
                        source = provider.name(),
                        error = %format!("{:#}", e),
                        "credential source unavailable"
                    );
                    failures.push(format!("{}: {:#}", provider.name(), e));
                }
            }
        }

        if failures.is_empty() {
            failures.push("no credential source is configured".to_string());
        }
        Err(BootstrapError::Credentials(failures.join("; ")))
    }
}

/// Read one `[profile]` section of an AWS shared credentials file.
pub fn parse_profile(contents: &str, profile: &str) -> anyhow::Result<Credentials> {
    let mut in_section = false;
    let mut found = false;
    let mut access_key_id = None;
    let mut secret_access_key = None;
    let mut session_token = None;

    for line in contents.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = section.trim() == profile;
            found |= in_section;
            continue;
        }
        if !in_section {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "aws_access_key_id" => access_key_id = Some(value),
            "aws_secret_access_key" => secret_access_key = Some(Zeroizing::new(value)),
            "aws_session_token" => session_token = Some(value),
            _ => {}
        }
    }

    if !found {
        bail!("profile [{}] not found", profile);
    }
    match (access_key_id, secret_access_key) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(Credentials {
            access_key_id,
            secret_access_key,
            session_token: session_token.filter(|t| !t.is_empty()),
        }),
        _ => bail!(
            "profile [{}] lacks aws_access_key_id or aws_secret_access_key",
            profile
        ),
    }
}

async fn assume_role_with_web_identity(
    client: &reqwest::Client,
    token_file: &Path,
    role_arn: &str,
    session_name: &str,
    sts_endpoint: &Url,
) -> anyhow::Result<Credentials> {
    let token = Zeroizing::new(
        tokio::fs::read_to_string(token_file)
            .await
            .with_context(|| format!("reading {}", token_file.display()))?,
    );
    let form = Zeroizing::new(format!(
        "Action=AssumeRoleWithWebIdentity&Version={}&RoleArn={}&RoleSessionName={}&WebIdentityToken={}",
        STS_API_VERSION,
        urlencoding::encode(role_arn),
        urlencoding::encode(session_name),
        urlencoding::encode(token.trim()),
    ));

    let resp = client
        .post(sts_endpoint.clone())
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(form.as_bytes().to_vec())
        .send()
        .await
        .context("calling sts AssumeRoleWithWebIdentity")?;
    let status = resp.status();
    let body = Zeroizing::new(resp.text().await.context("reading sts response")?);
    if !status.is_success() {
        bail!(
            "sts AssumeRoleWithWebIdentity returned {}: {}",
            status,
            body.as_str()
        );
    }

    Ok(Credentials {
        access_key_id: xml_text(&body, "AccessKeyId")?.to_string(),
        secret_access_key: Zeroizing::new(xml_text(&body, "SecretAccessKey")?.to_string()),
        session_token: Some(xml_text(&body, "SessionToken")?.to_string()),
    })
}

async fn container_credentials(
    client: &reqwest::Client,
    uri: &Url,
    auth: Option<&ContainerAuth>,
) -> anyhow::Result<Credentials> {
    let mut request = client.get(uri.clone()).timeout(METADATA_TIMEOUT);
    if let Some(auth) = auth {
        let token = match auth {
            ContainerAuth::Token(token) => token.clone(),
            ContainerAuth::File(path) => Zeroizing::new(
                tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?,
            ),
        };
        let mut value = HeaderValue::from_str(token.trim())
            .context("container authorization token is not a valid header value")?;
        value.set_sensitive(true);
        request = request.header(AUTHORIZATION, value);
    }

    let resp = request
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .context("calling container credentials endpoint")?;
    decode_metadata_credentials(resp).await
}

async fn instance_credentials(
    client: &reqwest::Client,
    endpoint: &Url,
) -> anyhow::Result<Credentials> {
    let token = client
        .put(endpoint.join("latest/api/token")?)
        .header("x-aws-ec2-metadata-token-ttl-seconds", IMDS_TOKEN_TTL_SECS)
        .timeout(METADATA_TIMEOUT)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .context("requesting IMDSv2 session token")?;
    let token = Zeroizing::new(token.text().await.context("reading IMDSv2 session token")?);
    let mut token = HeaderValue::from_str(token.trim())
        .context("IMDSv2 session token is not a valid header value")?;
    token.set_sensitive(true);

    let roles_url = endpoint.join("latest/meta-data/iam/security-credentials/")?;
    let roles = client
        .get(roles_url.clone())
        .header("x-aws-ec2-metadata-token", token.clone())
        .timeout(METADATA_TIMEOUT)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .context("listing instance profile roles")?
        .text()
        .await
        .context("reading instance profile roles")?;
    let role = roles
        .lines()
        .map(str::trim)
        .find(|r| !r.is_empty())
        .ok_or_else(|| anyhow!("no IAM role is attached to this instance"))?;

    let resp = client
        .get(roles_url.join(role)?)
        .header("x-aws-ec2-metadata-token", token)
        .timeout(METADATA_TIMEOUT)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .with_context(|| format!("fetching credentials for role {}", role))?;
    decode_metadata_credentials(resp).await
}

async fn decode_metadata_credentials(resp: reqwest::Response) -> anyhow::Result<Credentials> {
    let body: MetadataCredentials = resp
        .json()
        .await
        .context("decoding credentials response")?;
    Ok(Credentials {
        access_key_id: body.access_key_id,
        secret_access_key: Zeroizing::new(body.secret_access_key),
        session_token: body.token.filter(|t| !t.is_empty()),
    })
}

/// Text of the first `<tag>...</tag>` element in an STS XML response.
fn xml_text<'a>(doc: &'a str, tag: &str) -> anyhow::Result<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = doc
        .find(&open)
        .map(|i| i + open.len())
        .ok_or_else(|| anyhow!("sts response has no <{}> element", tag))?;
    let len = doc[start..]
        .find(&close)
        .ok_or_else(|| anyhow!("sts response has an unterminated <{}> element", tag))?;
    Ok(doc[start..start + len].trim())
}

/// Parse an endpoint so that relative joins append to its path.
fn parse_url(key: &str, raw: &str) -> Result<Url, BootstrapError> {
    let raw = if raw.ends_with('/') || Url::parse(raw).is_ok_and(|u| u.path() != "/") {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&raw)
        .map_err(|e| BootstrapError::Config(format!("invalid {} {}: {}", key, raw, e)))
}

fn is_allowed_container_uri(uri: &Url) -> bool {
    if uri.scheme() == "https" {
        return true;
    }
    match uri.host() {
        Some(Host::Ipv4(ip)) => {
            ip.is_loopback()
                || ip == Ipv4Addr::new(169, 254, 170, 2)
                || ip == Ipv4Addr::new(169, 254, 170, 23)
        }
        Some(Host::Ipv6(ip)) => {
            ip.is_loopback() || ip == Ipv6Addr::new(0xfd00, 0x0ec2, 0, 0, 0, 0, 0, 0x23)
        }
        Some(Host::Domain(domain)) => domain == "localhost",
        None => false,
    }
}
