//! Connection configuration and pre-flight validation.
//!
//! [`ConnectionConfig`] describes one broker endpoint: address, realm,
//! serializer, and authentication. It is immutable once built and consumed
//! by every connection attempt. Validation runs before the first attempt:
//! credential/method conflicts and invalid batch limits are configuration
//! errors and never reach the transport.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Cryptosign seeds are 32 raw bytes (64 hex characters); some tooling
/// hands out the 64-byte expanded form (128 hex characters).
const SEED_HEX_LEN: usize = 64;
const EXPANDED_HEX_LEN: usize = 128;

/// Wire serializer negotiated with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Serializer {
    /// JSON serialization.
    Json,
    /// MessagePack serialization.
    Msgpack,
    /// CBOR serialization.
    Cbor,
}

impl Default for Serializer {
    fn default() -> Self {
        Self::Json
    }
}

impl FromStr for Serializer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "msgpack" => Ok(Self::Msgpack),
            "cbor" => Ok(Self::Cbor),
            _ => Err(Error::config(
                "serializer must be one of 'json', 'msgpack', 'cbor'",
            )),
        }
    }
}

impl fmt::Display for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Json => "json",
            Self::Msgpack => "msgpack",
            Self::Cbor => "cbor",
        };
        f.write_str(name)
    }
}

/// Authentication method used when joining the realm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// No credentials.
    Anonymous,
    /// Ticket-based authentication.
    Ticket,
    /// Challenge-response authentication with a shared secret.
    Wampcra,
    /// Ed25519 challenge signing with a private key.
    Cryptosign,
}

impl Default for AuthMethod {
    fn default() -> Self {
        Self::Anonymous
    }
}

impl AuthMethod {
    /// Infers the method from which credential is present.
    ///
    /// Exactly one supplied credential selects its method; none (or an
    /// ambiguous mix) falls back to anonymous, and the conflict is then
    /// caught by [`ConnectionConfig::validate`].
    pub fn infer(private_key: &str, ticket: &str, secret: &str) -> Self {
        if !private_key.is_empty() && ticket.is_empty() && secret.is_empty() {
            Self::Cryptosign
        } else if !ticket.is_empty() && private_key.is_empty() && secret.is_empty() {
            Self::Ticket
        } else if !secret.is_empty() && private_key.is_empty() && ticket.is_empty() {
            Self::Wampcra
        } else {
            Self::Anonymous
        }
    }
}

impl FromStr for AuthMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anonymous" => Ok(Self::Anonymous),
            "ticket" => Ok(Self::Ticket),
            "wampcra" => Ok(Self::Wampcra),
            "cryptosign" => Ok(Self::Cryptosign),
            _ => Err(Error::config(
                "authmethod must be one of 'anonymous', 'ticket', 'wampcra', 'cryptosign'",
            )),
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Anonymous => "anonymous",
            Self::Ticket => "ticket",
            Self::Wampcra => "wampcra",
            Self::Cryptosign => "cryptosign",
        };
        f.write_str(name)
    }
}

/// Everything a [`Connector`](crate::session::Connector) needs to open one
/// session: endpoint address, realm, serializer, and auth material.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Broker endpoint, e.g. `ws://localhost:8080/ws`.
    pub url: String,
    /// Realm to join.
    pub realm: String,
    /// Wire serializer.
    #[serde(default)]
    pub serializer: Serializer,
    /// Authentication id, empty when unset.
    #[serde(default)]
    pub authid: String,
    /// Authentication role, empty when unset.
    #[serde(default)]
    pub authrole: String,
    /// Authentication method; see [`AuthMethod::infer`].
    #[serde(default)]
    pub auth_method: AuthMethod,
    /// Hex-encoded cryptosign private key (cryptosign only).
    #[serde(default)]
    pub private_key: String,
    /// Authentication ticket (ticket only).
    #[serde(default)]
    pub ticket: String,
    /// Shared secret (wampcra only).
    #[serde(default)]
    pub secret: String,
}

impl ConnectionConfig {
    /// Minimal anonymous configuration for the given endpoint and realm.
    pub fn anonymous(url: impl Into<String>, realm: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            realm: realm.into(),
            ..Self::default()
        }
    }

    /// Checks that the supplied credentials are legal for the chosen auth
    /// method. Runs before any connection attempt.
    pub fn validate(&self) -> Result<(), Error> {
        match self.auth_method {
            AuthMethod::Anonymous => {
                if !self.private_key.is_empty() {
                    return Err(Error::config("private key not needed for anonymous auth"));
                }
                if !self.ticket.is_empty() {
                    return Err(Error::config("ticket not needed for anonymous auth"));
                }
                if !self.secret.is_empty() {
                    return Err(Error::config("secret not needed for anonymous auth"));
                }
            }
            AuthMethod::Ticket => {
                if self.ticket.is_empty() {
                    return Err(Error::config("must provide ticket when authmethod is ticket"));
                }
            }
            AuthMethod::Wampcra => {
                if self.secret.is_empty() {
                    return Err(Error::config(
                        "must provide secret when authmethod is wampcra",
                    ));
                }
            }
            AuthMethod::Cryptosign => {
                if self.private_key.is_empty() {
                    return Err(Error::config(
                        "must provide private key when authmethod is cryptosign",
                    ));
                }
                validate_private_key(&self.private_key)?;
            }
        }
        Ok(())
    }
}

/// Cryptosign private keys must be 32 or 64 hex-encoded bytes.
fn validate_private_key(key: &str) -> Result<(), Error> {
    let hex = key.len() == SEED_HEX_LEN || key.len() == EXPANDED_HEX_LEN;
    if !hex || !key.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::config(
            "invalid private key: cryptosign private key must be 32 or 64 hex-encoded bytes",
        ));
    }
    Ok(())
}

/// Rewrites raw-socket scheme shorthand (`rs://`, `rss://`) to `tcp://`,
/// which is what the transport dials. Other schemes pass through.
pub fn sanitize_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("rss") {
        format!("tcp{rest}")
    } else if let Some(rest) = url.strip_prefix("rs") {
        format!("tcp{rest}")
    } else {
        url.to_string()
    }
}

/// Validates the batch limits of a session pool request. Violations are
/// configuration errors, surfaced before the first connection attempt.
pub fn validate_batch_limits(session_count: usize, concurrency: usize) -> Result<(), Error> {
    if session_count < 1 {
        return Err(Error::config("parallel must be greater than zero"));
    }
    if concurrency < 1 {
        return Err(Error::config("concurrency must be greater than zero"));
    }
    Ok(())
}
