// ═══════════════════════════════════════════════════════════════
// AWS Signature Version 4 (SigV4) Signing
// ═══════════════════════════════════════════════════════════════
//
// Signs Secrets Manager requests with `sha2` + `hmac`. The signature
// covers:
//   - HTTP method, canonical URI, canonical query string
//   - Every header already on the request (sorted, lowercased)
//   - SHA-256 hash of the request body
//
// Reference: https://docs.aws.amazon.com/IAM/latest/UserGuide/reference_aws-signing.html

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};
use url::Url;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// AWS credentials as resolved for one run.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: Zeroizing<String>,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Signs requests for a single service in a single region.
pub struct Signer<'a> {
    pub credentials: &'a Credentials,
    pub region: &'a str,
    pub service: &'a str,
}

impl Signer<'_> {
    /// Inject `host`, `x-amz-date`, `x-amz-content-sha256`, the session token (if any)
    /// and finally `authorization` into `headers`.
    pub fn sign(
        &self,
        method: &str,
        url: &Url,
        headers: &mut HeaderMap,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), anyhow::Error> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let payload_hash = sha256_hex(body);

        headers.insert(reqwest::header::HOST, HeaderValue::from_str(&host_header(url)?)?);
        headers.insert(
            HeaderName::from_static("x-amz-date"),
            HeaderValue::from_str(&amz_date)?,
        );
        headers.insert(
            HeaderName::from_static("x-amz-content-sha256"),
            HeaderValue::from_str(&payload_hash)?,
        );
        if let Some(token) = &self.credentials.session_token {
            let mut value = HeaderValue::from_str(token)?;
            value.set_sensitive(true);
            headers.insert(HeaderName::from_static("x-amz-security-token"), value);
        }
        headers.remove(reqwest::header::AUTHORIZATION);

        let (canonical_headers, signed_headers) = canonical_headers(headers)?;
        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method,
            canonical_uri(url),
            canonical_query(url),
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            sha256_hex(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.credentials.secret_access_key,
            &date_stamp,
            self.region,
            self.service,
        );
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.credentials.access_key_id, credential_scope, signed_headers, signature
        );
        let mut value = HeaderValue::from_str(&authorization)?;
        value.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, value);

        Ok(())
    }
}

/// `host[:port]`, omitting the port when it is the scheme default.
fn host_header(url: &Url) -> Result<String, anyhow::Error> {
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("SigV4: URL has no host"))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn canonical_uri(url: &Url) -> String {
    if url.path().is_empty() {
        "/".to_string()
    } else {
        url.path().to_string()
    }
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Returns (canonical header block, signed header list).
fn canonical_headers(headers: &HeaderMap) -> Result<(String, String), anyhow::Error> {
    let mut names: Vec<&str> = headers.keys().map(HeaderName::as_str).collect();
    names.sort_unstable();
    names.dedup();

    let mut block = String::new();
    for name in &names {
        let values = headers
            .get_all(*name)
            .iter()
            .map(|v| {
                v.to_str()
                    .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
                    .map_err(|_| anyhow::anyhow!("SigV4: header {} is not visible ASCII", name))
            })
            .collect::<Result<Vec<_>, _>>()?;
        block.push_str(&format!("{}:{}\n", name, values.join(",")));
    }

    Ok((block, names.join(";")))
}

/// SHA-256 hash of data, returned as lowercase hex string.
fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], msg: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(msg);
    mac.finalize().into_bytes().to_vec()
}

/// key = HMAC("AWS4" + secret, date) → HMAC(_, region) → HMAC(_, service) → HMAC(_, "aws4_request")
fn derive_signing_key(secret: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let seed = Zeroizing::new(format!("AWS4{}", secret));
    let k_date = hmac_sha256(seed.as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}
