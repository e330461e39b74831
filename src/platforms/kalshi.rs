//! Kalshi trade API client (read side, for settlement).
//!
//! API: `https://api.elections.kalshi.com/trade-api/v2`
//! Auth: three headers per request. The signature is RSA-PSS/SHA-256
//! (salt length = digest length) over `{timestamp_ms}{METHOD}{path}`,
//! where `path` excludes the query string, base64-encoded.

use anyhow::Context;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, Method, Url};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::BlindedSigningKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use super::{MarketSource, MarketStatus};
use crate::types::{normalize_error_body, EngineError};

const SOURCE_NAME: &str = "kalshi";

pub const HEADER_KEY: &str = "KALSHI-ACCESS-KEY";
pub const HEADER_SIGNATURE: &str = "KALSHI-ACCESS-SIGNATURE";
pub const HEADER_TIMESTAMP: &str = "KALSHI-ACCESS-TIMESTAMP";

// ---------------------------------------------------------------------------
// Key handling
// ---------------------------------------------------------------------------

/// Repair a PEM that went through an environment variable.
///
/// Handles surrounding quotes, literal `\n` escapes, CRLF, and bodies that
/// lost their line breaks. A bare base64 body is assumed to be PKCS#8.
pub fn normalize_pem(raw: &str) -> String {
    let mut s = raw.trim().to_string();
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            s = s[1..s.len() - 1].to_string();
        }
    }
    let s = s.replace("\\r\\n", "\n").replace("\\n", "\n").replace("\r\n", "\n");
    let s = s.trim();

    let (label, body) = match (s.find("-----BEGIN "), s.rfind("-----END ")) {
        (Some(begin), Some(end)) if end > begin => {
            let after_begin = &s[begin + "-----BEGIN ".len()..];
            let Some(label_end) = after_begin.find("-----") else {
                return s.to_string();
            };
            let label = after_begin[..label_end].to_string();
            let body_start = begin + "-----BEGIN ".len() + label_end + "-----".len();
            (label, &s[body_start..end])
        }
        _ => ("PRIVATE KEY".to_string(), s),
    };

    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    let mut out = format!("-----BEGIN {label}-----\n");
    for chunk in compact.as_bytes().chunks(64) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out.push_str(&format!("-----END {label}-----\n"));
    out
}

/// Parse PKCS#8 or PKCS#1 PEM.
pub fn parse_private_key(raw: &str) -> Result<RsaPrivateKey, EngineError> {
    let pem = normalize_pem(raw);
    RsaPrivateKey::from_pkcs8_pem(&pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem))
        .map_err(|e| EngineError::Signing(format!("private key could not be parsed: {e}")))
}

/// Canonical string that gets signed.
pub fn signing_message(timestamp_ms: i64, method: &str, path: &str) -> String {
    let path = path.split('?').next().unwrap_or(path);
    format!("{timestamp_ms}{}{path}", method.to_uppercase())
}

/// Auth headers for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedHeaders {
    pub key_id: String,
    pub signature: String,
    pub timestamp_ms: i64,
}

/// Signs requests with a provisioned key.
///
/// The key is parsed on every call so an unparseable key fails that one
/// request, never the process.
pub struct RequestSigner {
    key_id: String,
    private_key: SecretString,
}

impl RequestSigner {
    pub fn new(key_id: String, private_key: SecretString) -> Self {
        Self { key_id, private_key }
    }

    pub fn sign(&self, method: &str, path: &str, timestamp_ms: i64) -> Result<SignedHeaders, EngineError> {
        let key = parse_private_key(self.private_key.expose_secret())?;
        let signing_key = BlindedSigningKey::<Sha256>::new(key);
        let message = signing_message(timestamp_ms, method, path);
        let mut rng = rand::thread_rng();
        let signature = signing_key
            .try_sign_with_rng(&mut rng, message.as_bytes())
            .map_err(|e| EngineError::Signing(e.to_string()))?;
        Ok(SignedHeaders {
            key_id: self.key_id.clone(),
            signature: STANDARD.encode(signature.to_bytes()),
            timestamp_ms,
        })
    }
}

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MarketEnvelope {
    market: ApiMarket,
}

#[derive(Debug, Deserialize)]
struct ApiMarket {
    #[serde(default)]
    ticker: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    result: Option<String>,
}

fn parse_market(ticker: &str, body: &str) -> Result<MarketStatus, EngineError> {
    let env: MarketEnvelope = serde_json::from_str(body)
        .map_err(|e| EngineError::upstream(SOURCE_NAME, format!("invalid market payload for {ticker}: {e}")))?;
    let result = env
        .market
        .result
        .map(|r| r.trim().to_lowercase())
        .filter(|r| !r.is_empty());
    Ok(MarketStatus {
        ticker: if env.market.ticker.is_empty() {
            ticker.to_string()
        } else {
            env.market.ticker
        },
        status: env.market.status.to_lowercase(),
        result,
    })
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct KalshiClient {
    http: Client,
    base_url: Url,
    signer: RequestSigner,
}

impl KalshiClient {
    pub fn new(base_url: &str, signer: RequestSigner, timeout_secs: u64) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("signal-engine/0.1.0")
            .build()
            .context("Failed to build Kalshi HTTP client")?;
        let base_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .with_context(|| format!("Invalid Kalshi base URL: {base_url}"))?;
        Ok(Self { http, base_url, signer })
    }

    fn market_url(&self, ticker: &str) -> Result<Url, EngineError> {
        self.base_url
            .join(&format!("markets/{}", urlencoding::encode(ticker)))
            .map_err(|e| EngineError::upstream(SOURCE_NAME, e.to_string()))
    }

    async fn signed_get(&self, url: Url) -> Result<String, EngineError> {
        let timestamp_ms = chrono::Utc::now().timestamp_millis();
        let headers = self.signer.sign(Method::GET.as_str(), url.path(), timestamp_ms)?;

        let resp = self
            .http
            .get(url)
            .header(HEADER_KEY, &headers.key_id)
            .header(HEADER_SIGNATURE, &headers.signature)
            .header(HEADER_TIMESTAMP, headers.timestamp_ms.to_string())
            .send()
            .await
            .map_err(|e| EngineError::upstream(SOURCE_NAME, e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(EngineError::upstream(
                SOURCE_NAME,
                normalize_error_body(status.as_u16(), &body),
            ));
        }
        Ok(body)
    }
}

#[async_trait]
impl MarketSource for KalshiClient {
    async fn market_status(&self, ticker: &str) -> Result<MarketStatus, EngineError> {
        let url = self.market_url(ticker)?;
        let body = self.signed_get(url).await?;
        let market = parse_market(ticker, &body)?;
        debug!(ticker, status = %market.status, result = ?market.result, "Market fetched");
        Ok(market)
    }
}
