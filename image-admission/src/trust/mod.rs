// Copyright (c) 2026 The image-admission Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Client for notary trust servers. Retrieves the signed TUF metadata of a
//! repository and reduces it to a [`TrustSummary`].

pub mod keys;
pub mod notary;
pub mod summary;
pub mod token;
pub mod tuf;

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use reqwest::{header::WWW_AUTHENTICATE, Client, StatusCode};
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

use crate::{auth::BasicAuth, config::TrustConfig, reference::ImageRef};

use notary::{endpoint, NotaryRepository, RepositoryMetadata};
pub use summary::{SignedTagRow, TagSignature, TrustSigner, TrustSummary};
use token::{repository_scope, Challenge, GetTokenResponse, Token};

pub type Result<T> = std::result::Result<T, TrustError>;

#[derive(Error, Debug)]
pub enum TrustError {
    #[error("build http client failed")]
    Client {
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid notary server url {url}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} rejected the request credentials")]
    Unauthorized { url: String },

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("malformed authentication challenge from {url}: {reason}")]
    Challenge { url: String, reason: String },

    #[error("malformed token response from {realm}")]
    TokenResponse {
        realm: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("token response from {realm} carries no token")]
    EmptyToken { realm: String },

    #[error("malformed trust metadata for role {role}")]
    Parse {
        role: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("trust metadata for role {role} rejected: {reason}")]
    Metadata { role: String, reason: String },
}

impl TrustError {
    /// Whether the failure happened on the wire, so asking again later may
    /// succeed. Everything else is a protocol or metadata problem.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Status { .. })
    }
}

/// Source of trust data for an image.
#[async_trait]
pub trait SignatureFetcher: Send + Sync {
    /// `Ok(None)` means the repository has no trust data at all, which is a
    /// valid answer and distinct from any error.
    async fn fetch_signature(
        &self,
        image: &ImageRef,
        auth: Option<&BasicAuth>,
        notary_url: &str,
    ) -> Result<Option<TrustSummary>>;
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct TokenKey {
    notary: String,
    gun: String,
    credential: Option<String>,
}

/// Notary client over HTTPS. Tokens are kept per notary server, repository
/// and credential until they expire or the server rejects them.
pub struct TrustClient {
    client: Client,
    tokens: Mutex<HashMap<TokenKey, Token>>,
}

impl TrustClient {
    pub fn new(config: &TrustConfig) -> Result<Self> {
        let mut builder = Client::builder();
        #[cfg(any(feature = "rustls-tls", feature = "native-tls"))]
        {
            builder = builder.danger_accept_invalid_certs(config.insecure_skip_tls_verify);
        }
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|source| TrustError::Client { source })?;

        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    async fn cached_token(&self, key: &TokenKey) -> Option<Token> {
        let tokens = self.tokens.lock().await;
        tokens
            .get(key)
            .filter(|token| token.is_valid(Utc::now()))
            .cloned()
    }

    async fn store_token(&self, key: TokenKey, token: Token) {
        let now = Utc::now();
        let mut tokens = self.tokens.lock().await;
        tokens.retain(|_, cached| cached.is_valid(now));
        tokens.insert(key, token);
    }

    async fn forget_token(&self, key: &TokenKey) {
        self.tokens.lock().await.remove(key);
    }

    /// Call `/v2/` and obtain the credential the notary server wants.
    async fn authenticate(
        &self,
        base: &Url,
        gun: &str,
        auth: Option<&BasicAuth>,
    ) -> Result<Token> {
        let url = endpoint(base, "v2/");
        let mut request = self.client.get(url.clone());
        if let Some(auth) = auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }
        let response = request.send().await.map_err(|source| TrustError::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if status.is_success() {
            debug!("{url} accepted the version check without a token");
            return Ok(auth
                .map(|auth| Token::Basic(auth.encoded()))
                .unwrap_or(Token::Anonymous));
        }
        if status != StatusCode::UNAUTHORIZED {
            return Err(TrustError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let challenges: Vec<Challenge> = response
            .headers()
            .get_all(WWW_AUTHENTICATE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(Challenge::parse)
            .collect();
        let challenge_error = |reason: &str| TrustError::Challenge {
            url: url.to_string(),
            reason: reason.to_string(),
        };
        let Some(challenge) = challenges
            .iter()
            .find(|c| c.is_bearer())
            .or_else(|| challenges.first())
        else {
            return Err(challenge_error("header does not contain WWW-Authenticate"));
        };

        if challenge.is_basic() {
            return match auth {
                Some(auth) => Ok(Token::Basic(auth.encoded())),
                None => Err(challenge_error(
                    "server requires basic auth but no credential is known",
                )),
            };
        }

        let (Some(realm), Some(service)) = (challenge.parameter("realm"), challenge.parameter("service"))
        else {
            return Err(challenge_error("there is no realm or service in parameters"));
        };

        self.request_token(realm, service, gun, auth).await
    }

    async fn request_token(
        &self,
        realm: &str,
        service: &str,
        gun: &str,
        auth: Option<&BasicAuth>,
    ) -> Result<Token> {
        let realm_url = Url::parse(realm).map_err(|e| TrustError::Challenge {
            url: realm.to_string(),
            reason: format!("realm is not a valid url: {e}"),
        })?;
        info!("Fetching token from {realm} for {gun}...");
        let scope = repository_scope(gun);
        let mut request = self
            .client
            .get(realm_url)
            .query(&[("service", service), ("scope", scope.as_str())]);
        if let Some(auth) = auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = request.send().await.map_err(|source| TrustError::Transport {
            url: realm.to_string(),
            source,
        })?;
        if !response.status().is_success() {
            return Err(TrustError::Status {
                url: realm.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body: GetTokenResponse =
            response
                .json()
                .await
                .map_err(|source| TrustError::TokenResponse {
                    realm: realm.to_string(),
                    source,
                })?;
        Token::from_response(body, Utc::now()).ok_or_else(|| TrustError::EmptyToken {
            realm: realm.to_string(),
        })
    }

    async fn token_for(
        &self,
        key: &TokenKey,
        base: &Url,
        auth: Option<&BasicAuth>,
    ) -> Result<Token> {
        if let Some(token) = self.cached_token(key).await {
            return Ok(token);
        }
        let token = self.authenticate(base, &key.gun, auth).await?;
        self.store_token(key.clone(), token.clone()).await;
        Ok(token)
    }

    async fn fetch_metadata(
        &self,
        base: &Url,
        gun: &str,
        token: &Token,
    ) -> Result<Option<RepositoryMetadata>> {
        NotaryRepository::new(&self.client, base, gun, token)
            .fetch(Utc::now())
            .await
    }

    /// Retrieve and reduce the trust data of `image` from `notary_url`.
    pub async fn fetch_trust_summary(
        &self,
        image: &ImageRef,
        auth: Option<&BasicAuth>,
        notary_url: &str,
    ) -> Result<Option<TrustSummary>> {
        let base = Url::parse(notary_url).map_err(|source| TrustError::InvalidUrl {
            url: notary_url.to_string(),
            source,
        })?;
        let gun = image.name_with_host();
        let key = TokenKey {
            notary: base.to_string(),
            gun: gun.clone(),
            credential: auth.map(BasicAuth::encoded),
        };

        let token = self.token_for(&key, &base, auth).await?;
        let metadata = match self.fetch_metadata(&base, &gun, &token).await {
            Err(TrustError::Unauthorized { url }) => {
                info!("{url} rejected the cached credential for {gun}, re-authenticating");
                self.forget_token(&key).await;
                let token = self.token_for(&key, &base, auth).await?;
                self.fetch_metadata(&base, &gun, &token).await?
            }
            other => other?,
        };

        Ok(metadata.map(|metadata| {
            summary::summarize(
                &gun,
                &metadata.targets,
                &metadata.root_keys,
                &metadata.targets_keys,
                &metadata.delegations,
            )
        }))
    }
}

#[async_trait]
impl SignatureFetcher for TrustClient {
    async fn fetch_signature(
        &self,
        image: &ImageRef,
        auth: Option<&BasicAuth>,
        notary_url: &str,
    ) -> Result<Option<TrustSummary>> {
        self.fetch_trust_summary(image, auth, notary_url).await
    }
}
