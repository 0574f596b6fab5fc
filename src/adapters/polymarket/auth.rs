//! Builder relayer request authentication.
//!
//! `POLY_SIGNATURE = base64url(HMAC-SHA256(secret, timestamp || method || path || body))`.
//! The HMAC key is the secret string's UTF-8 bytes as issued, never base64-decoded.
//! The body is part of the signed message, so a [`SignedRequest`] owns the exact
//! body bytes that were signed and only hands out shared references to them.

use anyhow::Result;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_ADDRESS: &str = "POLY_ADDRESS";
pub const HEADER_SIGNATURE: &str = "POLY_SIGNATURE";
pub const HEADER_TIMESTAMP: &str = "POLY_TIMESTAMP";
pub const HEADER_API_KEY: &str = "POLY_API_KEY";
pub const HEADER_PASSPHRASE: &str = "POLY_PASSPHRASE";

#[derive(Clone)]
pub struct RelayerCredentials {
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
    /// Signing EOA, not the funder/proxy wallet.
    pub wallet_address: String,
}

impl std::fmt::Debug for RelayerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayerCredentials")
            .field("api_key", &self.api_key)
            .field("wallet_address", &self.wallet_address)
            .finish_non_exhaustive()
    }
}

/// Generate the HMAC-SHA256 signature for one relayer request.
pub fn sign_request(secret: &str, timestamp: i64, method: &str, path: &str, body: &str) -> Result<String> {
    let message = format!("{}{}{}{}", timestamp, method, path, body);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Failed to create HMAC: {}", e))?;
    mac.update(message.as_bytes());
    Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
}

/// A request whose body is frozen at signing time.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    method: &'static str,
    path: String,
    body: String,
    headers: Vec<(&'static str, String)>,
}

impl SignedRequest {
    pub fn new(
        creds: &RelayerCredentials,
        method: &'static str,
        path: impl Into<String>,
        body: String,
        timestamp: i64,
    ) -> Result<Self> {
        let path = path.into();
        let signature = sign_request(&creds.secret, timestamp, method, &path, &body)?;
        let headers = vec![
            (HEADER_ADDRESS, creds.wallet_address.clone()),
            (HEADER_SIGNATURE, signature),
            (HEADER_TIMESTAMP, timestamp.to_string()),
            (HEADER_API_KEY, creds.api_key.clone()),
            (HEADER_PASSPHRASE, creds.passphrase.clone()),
        ];
        Ok(Self {
            method,
            path,
            body,
            headers,
        })
    }

    pub fn method(&self) -> &str {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    #[cfg(test)]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Applies headers and the signed body to a reqwest builder.
    pub fn apply(self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (name, value) in self.headers {
            request = request.header(name, value);
        }
        if !self.body.is_empty() {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(self.body);
        }
        request
    }
}
