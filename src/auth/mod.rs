//! Pass-through authentication.
//!
//! When a tenant allows it, the connector binds to the directory with the
//! credential presented by the inbound caller instead of the configured service
//! account. This module parses the caller's `Authorization` header into a
//! [`PassThroughCredential`].
//!
//! # Supported schemes
//!
//! * `Basic <base64(username:secret)>`: bind as `username` with `secret`
//! * `Bearer <token>`: bind as the configured username with the token as secret
//!
//! # Example Usage
//!
//! ```rust
//! use scim_ldap_connector::auth::PassThroughCredential;
//!
//! let credential = PassThroughCredential::parse("Basic YmplbnNlbjpzZWNyZXQ=").unwrap();
//! assert_eq!(credential.bind_identity("cn=admin"), ("bjensen", "secret"));
//!
//! let credential = PassThroughCredential::parse("Bearer abc.def").unwrap();
//! assert_eq!(credential.bind_identity("cn=admin"), ("cn=admin", "abc.def"));
//! ```

use crate::error::{ConnectorError, ConnectorResult};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::fmt;

/// Credential extracted from an inbound authorization header.
#[derive(Clone, PartialEq, Eq)]
pub enum PassThroughCredential {
    /// Username and secret from a `Basic` header
    Basic { username: String, secret: String },
    /// Opaque token from a `Bearer` header
    Bearer { token: String },
}

impl PassThroughCredential {
    /// Parse an `Authorization` header value.
    pub fn parse(header: &str) -> ConnectorResult<Self> {
        let header = header.trim();
        let (scheme, value) = header.split_once(' ').ok_or_else(|| {
            ConnectorError::invalid_request("malformed authorization header")
        })?;
        let value = value.trim();
        if value.is_empty() {
            return Err(ConnectorError::invalid_request(
                "authorization header carries no credential",
            ));
        }

        if scheme.eq_ignore_ascii_case("basic") {
            let decoded = STANDARD.decode(value).map_err(|e| {
                ConnectorError::invalid_request(format!("invalid basic credential encoding: {}", e))
            })?;
            let decoded = String::from_utf8(decoded).map_err(|_| {
                ConnectorError::invalid_request("basic credential is not valid UTF-8")
            })?;
            match decoded.split_once(':') {
                Some((username, secret)) if !username.is_empty() => Ok(Self::Basic {
                    username: username.to_string(),
                    secret: secret.to_string(),
                }),
                _ => Err(ConnectorError::invalid_request(
                    "basic credential must be username:password",
                )),
            }
        } else if scheme.eq_ignore_ascii_case("bearer") {
            Ok(Self::Bearer {
                token: value.to_string(),
            })
        } else {
            Err(ConnectorError::invalid_request(format!(
                "unsupported authorization scheme '{}'",
                scheme
            )))
        }
    }

    /// The username and secret to bind with.
    ///
    /// Bearer tokens carry no username, so the tenant's configured username is used.
    pub fn bind_identity<'a>(&'a self, configured_username: &'a str) -> (&'a str, &'a str) {
        match self {
            Self::Basic { username, secret } => (username.as_str(), secret.as_str()),
            Self::Bearer { token } => (configured_username, token.as_str()),
        }
    }
}

impl fmt::Debug for PassThroughCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("secret", &"***REDACTED***")
                .finish(),
            Self::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"***REDACTED***")
                .finish(),
        }
    }
}
