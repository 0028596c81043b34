// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! OAuth access tokens for the storage API.
//!
//! The key file is the JSON document Google issues for either a service
//! account or an authorized user. Service accounts sign a short-lived JWT
//! assertion and exchange it for an access token; authorized users exchange
//! their refresh token. Tokens are cached until shortly before they expire.

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::errors::CredentialsError;

pub const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const REFRESH_TOKEN_GRANT: &str = "refresh_token";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
// Refresh this long before the token endpoint says the token expires.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Clone, Deserialize)]
pub struct AuthorizedUserKey {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUserKey),
}

impl Credentials {
    pub fn from_file(path: &Path) -> Result<Self, CredentialsError> {
        let contents = std::fs::read(path).map_err(|source| CredentialsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &[u8]) -> Result<Self, CredentialsError> {
        Ok(serde_json::from_slice(contents)?)
    }
}

// Never print key material.
impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::ServiceAccount(key) => write!(f, "ServiceAccount({})", key.client_email),
            Credentials::AuthorizedUser(key) => write!(f, "AuthorizedUser({})", key.client_id),
        }
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

struct CachedToken {
    value: String,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at
            .map_or(true, |expires_at| now + EXPIRY_MARGIN < expires_at)
    }
}

enum TokenSource {
    Static,
    ServiceAccount {
        key: ServiceAccountKey,
        signing_key: EncodingKey,
    },
    AuthorizedUser(AuthorizedUserKey),
}

/// Resolves and caches bearer tokens for storage requests.
pub struct TokenProvider {
    source: TokenSource,
    client: reqwest::Client,
    cache: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    /// A provider that always returns `token`. Used for emulators and tests.
    pub fn new_static(token: &str) -> Self {
        TokenProvider {
            source: TokenSource::Static,
            client: reqwest::Client::new(),
            cache: Mutex::new(Some(CachedToken {
                value: token.to_string(),
                expires_at: None,
            })),
        }
    }

    /// Fails if a service account's private key is not a valid RSA PEM key,
    /// so bad credentials are caught before any message is processed.
    pub fn from_credentials(
        credentials: Credentials,
        client: reqwest::Client,
    ) -> Result<Self, CredentialsError> {
        let source = match credentials {
            Credentials::ServiceAccount(key) => {
                let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
                TokenSource::ServiceAccount { key, signing_key }
            }
            Credentials::AuthorizedUser(key) => TokenSource::AuthorizedUser(key),
        };
        Ok(TokenProvider {
            source,
            client,
            cache: Mutex::new(None),
        })
    }

    pub async fn access_token(&self) -> Result<String, CredentialsError> {
        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.as_ref().filter(|t| t.is_fresh(Instant::now())) {
            return Ok(token.value.clone());
        }

        let token = self.fetch().await?;
        let value = token.value.clone();
        *cache = Some(token);
        Ok(value)
    }

    async fn fetch(&self) -> Result<CachedToken, CredentialsError> {
        let (token_uri, form) = match &self.source {
            TokenSource::Static => {
                return Err(CredentialsError::TokenEndpoint {
                    status: reqwest::StatusCode::UNAUTHORIZED,
                    body: "static token missing".to_string(),
                })
            }
            TokenSource::ServiceAccount { key, signing_key } => {
                let iat = Utc::now().timestamp();
                let claims = Claims {
                    iss: &key.client_email,
                    scope: STORAGE_SCOPE,
                    aud: &key.token_uri,
                    iat,
                    exp: iat + ASSERTION_LIFETIME_SECS,
                };
                let assertion =
                    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, signing_key)?;
                (
                    key.token_uri.as_str(),
                    vec![
                        ("grant_type", JWT_BEARER_GRANT.to_string()),
                        ("assertion", assertion),
                    ],
                )
            }
            TokenSource::AuthorizedUser(key) => (
                key.token_uri.as_str(),
                vec![
                    ("grant_type", REFRESH_TOKEN_GRANT.to_string()),
                    ("client_id", key.client_id.clone()),
                    ("client_secret", key.client_secret.clone()),
                    ("refresh_token", key.refresh_token.clone()),
                ],
            ),
        };

        debug!("Requesting access token from {token_uri}");
        let started = Instant::now();
        let response = self.client.post(token_uri).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CredentialsError::TokenEndpoint {
                status,
                body: response.text().await.unwrap_or_default(),
            });
        }

        let token: TokenResponse = response.json().await?;
        Ok(CachedToken {
            value: token.access_token,
            expires_at: Some(started + Duration::from_secs(token.expires_in)),
        })
    }
}

impl Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match &self.source {
            TokenSource::Static => "Static",
            TokenSource::ServiceAccount { .. } => "ServiceAccount",
            TokenSource::AuthorizedUser(_) => "AuthorizedUser",
        };
        write!(f, "TokenProvider({source})")
    }
}
