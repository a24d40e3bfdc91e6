//! Short-lived ES256 bearer tokens for the App Store Connect API.

use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use revledger_config::settings::MAX_TOKEN_TTL_SECS;
use revledger_config::ResolvedAppStoreCredentials;

use crate::error::IngestError;

pub const AUDIENCE: &str = "appstoreconnect-v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
}

impl Claims {
    /// `ttl_secs` is clamped to the API's 20 minute ceiling.
    pub fn new(issuer_id: &str, now: DateTime<Utc>, ttl_secs: u64) -> Self {
        let ttl = ttl_secs.min(MAX_TOKEN_TTL_SECS) as i64;
        let iat = now.timestamp();
        Self {
            iss: issuer_id.to_string(),
            iat,
            exp: iat + ttl,
            aud: AUDIENCE.to_string(),
        }
    }
}

/// Sign a fresh token. Called once per ingestion run, never cached.
pub fn mint_token(
    creds: &ResolvedAppStoreCredentials,
    now: DateTime<Utc>,
    ttl_secs: u64,
) -> Result<String, IngestError> {
    let claims = Claims::new(&creds.issuer_id, now, ttl_secs);

    let mut header = Header::new(Algorithm::ES256);
    header.kid = Some(creds.key_id.clone());

    let key = EncodingKey::from_ec_pem(creds.private_key_pem.as_bytes())
        .map_err(|e| IngestError::Configuration(format!("invalid App Store private key: {e}")))?;

    encode(&header, &claims, &key)
        .map_err(|e| IngestError::Configuration(format!("cannot sign App Store token: {e}")))
}
