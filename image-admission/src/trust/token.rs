// Copyright (c) 2026 The image-admission Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Docker registry token authentication, as notary servers implement it:
//! a `WWW-Authenticate: Bearer realm=..,service=..` challenge on `/v2/`
//! answered by a token from the advertised realm.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifetime assumed for a token whose response carries no `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 60;

/// Longer lifetimes are capped.
const MAX_TOKEN_LIFETIME_SECS: i64 = 24 * 60 * 60;

/// One challenge of a `WWW-Authenticate` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
    pub scheme: String,
    pub parameters: HashMap<String, String>,
}

impl Challenge {
    /// Parse `Scheme key="value", key2=value2`. Quoted values may contain
    /// commas and escaped quotes.
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, rest) = match header.split_once(char::is_whitespace) {
            Some((scheme, rest)) => (scheme, rest),
            None => (header, ""),
        };
        if scheme.is_empty() {
            return None;
        }

        let mut parameters = HashMap::new();
        let mut chars = rest.chars().peekable();
        loop {
            while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
                chars.next();
            }

            let mut key = String::new();
            while let Some(&c) = chars.peek() {
                if c == '=' || c == ',' {
                    break;
                }
                key.push(c);
                chars.next();
            }
            if key.trim().is_empty() {
                break;
            }
            if chars.next() != Some('=') {
                return None;
            }

            let mut value = String::new();
            if chars.peek() == Some(&'"') {
                chars.next();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => value.extend(chars.next()),
                        '"' => {
                            closed = true;
                            break;
                        }
                        c => value.push(c),
                    }
                }
                if !closed {
                    return None;
                }
            } else {
                while let Some(&c) = chars.peek() {
                    if c == ',' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
            }
            parameters.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        Some(Self {
            scheme: scheme.to_string(),
            parameters,
        })
    }

    pub fn is_bearer(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("bearer")
    }

    pub fn is_basic(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("basic")
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }
}

/// Body of a token endpoint response. Registries fill either `token` or
/// `access_token`.
#[derive(Deserialize, Debug, PartialEq, Eq, Serialize, Default)]
pub struct GetTokenResponse {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub issued_at: String,
}

/// Credential attached to notary requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    /// The server accepted an unauthenticated version check.
    Anonymous,

    /// Base64 `username:password`.
    Basic(String),

    Bearer {
        value: String,
        expires_at: DateTime<Utc>,
    },
}

impl Token {
    /// Build a bearer token from a token response. `None` if the response
    /// carries no token at all.
    pub fn from_response(response: GetTokenResponse, now: DateTime<Utc>) -> Option<Self> {
        let value = match (response.token.is_empty(), response.access_token.is_empty()) {
            (false, _) => response.token,
            (true, false) => response.access_token,
            (true, true) => return None,
        };

        let issued_at = DateTime::parse_from_rfc3339(&response.issued_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(now);
        let lifetime = match response.expires_in {
            secs if secs > 0 => secs.min(MAX_TOKEN_LIFETIME_SECS),
            _ => DEFAULT_TOKEN_LIFETIME_SECS,
        };

        Some(Self::Bearer {
            value,
            expires_at: issued_at + Duration::seconds(lifetime),
        })
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::Bearer { value, expires_at } => !value.is_empty() && now < *expires_at,
            Self::Basic(value) => !value.is_empty(),
            Self::Anonymous => true,
        }
    }

    /// Value of the `Authorization` header, if any.
    pub fn authorization(&self) -> Option<String> {
        match self {
            Self::Anonymous => None,
            Self::Basic(value) => Some(format!("Basic {value}")),
            Self::Bearer { value, .. } => Some(format!("Bearer {value}")),
        }
    }
}

/// Scope requested for a repository's trust data.
pub fn repository_scope(gun: &str) -> String {
    format!("repository:{gun}:pull,push")
}
