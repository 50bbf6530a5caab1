use base64::Engine as _;
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::fmt;

use super::RTSPError;

/// Login and password for a camera
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name
    pub username: String,
    /// Password
    pub password: String,
}

impl Credentials {
    /// Creates a credential pair
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Produces `Authorization` header values after a 401 challenge.
#[derive(Debug, Clone)]
pub enum Authenticator {
    /// RFC 2617 Basic scheme
    Basic {
        /// Credentials sent on every request
        credentials: Credentials,
    },
    /// RFC 2617 Digest scheme
    Digest {
        /// Credentials hashed into every response
        credentials: Credentials,
        /// Protection space from the challenge
        realm: String,
        /// Server nonce
        nonce: String,
        /// First quality of protection offered, if any
        qop: Option<String>,
        /// Client nonce, 8 hex digits
        cnonce: String,
    },
}

impl Authenticator {
    /// Builds an authenticator from a `WWW-Authenticate` header value.
    ///
    /// # Errors
    ///
    /// Fails for schemes other than Basic and Digest, and for a Digest
    /// challenge without `realm` or `nonce`.
    pub fn from_challenge(credentials: Credentials, header: &str) -> Result<Self, RTSPError> {
        let header = header.trim();
        let (scheme, parameters) = header.split_once(' ').unwrap_or((header, ""));

        if scheme.eq_ignore_ascii_case("Basic") {
            return Ok(Authenticator::Basic { credentials });
        }
        if !scheme.eq_ignore_ascii_case("Digest") {
            return Err(RTSPError::BadChallenge(header.to_string()));
        }

        let mut parameters = parse_parameters(parameters);
        let realm = parameters
            .remove("REALM")
            .ok_or_else(|| RTSPError::BadChallenge("\"realm\" parameter is not found".into()))?;
        let nonce = parameters
            .remove("NONCE")
            .ok_or_else(|| RTSPError::BadChallenge("\"nonce\" parameter is not found".into()))?;
        let qop = parameters.remove("QOP").map(|qop| {
            qop.split(',')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string()
        });

        Ok(Authenticator::Digest {
            credentials,
            realm,
            nonce,
            qop,
            cnonce: format!("{:08X}", rand::random::<u32>()),
        })
    }

    /// Header value for one request.
    ///
    /// `nonce_count` is the request's sequence number. `body` only matters
    /// for Digest with `qop=auth-int`.
    pub fn response(&self, nonce_count: u32, uri: &str, method: &str, body: &[u8]) -> String {
        match self {
            Authenticator::Basic { credentials } => {
                let pair = format!("{}:{}", credentials.username, credentials.password);
                format!(
                    "Basic {}",
                    base64::engine::general_purpose::STANDARD.encode(pair)
                )
            }
            Authenticator::Digest {
                credentials,
                realm,
                nonce,
                qop,
                cnonce,
            } => {
                let ha1 = md5_hex(
                    format!("{}:{}:{}", credentials.username, realm, credentials.password)
                        .as_bytes(),
                );

                let qop = qop.as_deref().filter(|qop| !qop.is_empty());
                let mut ha2_argument = format!("{}:{}", method, uri);
                if qop.is_some_and(|qop| qop.eq_ignore_ascii_case("auth-int")) {
                    ha2_argument.push(':');
                    ha2_argument.push_str(&md5_hex(body));
                }
                let ha2 = md5_hex(ha2_argument.as_bytes());

                let mut header = format!(
                    "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", ",
                    credentials.username, realm, nonce, uri
                );
                match qop {
                    None => {
                        let response = md5_hex(format!("{}:{}:{}", ha1, nonce, ha2).as_bytes());
                        header.push_str(&format!("response=\"{}\"", response));
                    }
                    Some(qop) => {
                        let response = md5_hex(
                            format!(
                                "{}:{}:{:08X}:{}:{}:{}",
                                ha1, nonce, nonce_count, cnonce, qop, ha2
                            )
                            .as_bytes(),
                        );
                        header.push_str(&format!(
                            "response=\"{}\", cnonce=\"{}\", nc={:08X}, qop=\"{}\"",
                            response, cnonce, nonce_count, qop
                        ));
                    }
                }
                header
            }
        }
    }
}

fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Splits `name=value, name="quoted, value"` into a map keyed by the
/// upper-cased name.
fn parse_parameters(parameters: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut rest = parameters;

    while let Some((name, value)) = rest.split_once('=') {
        let name = name.trim().trim_start_matches(',').trim().to_ascii_uppercase();
        let value = value.trim_start();

        let (value, remainder) = match value.strip_prefix('"') {
            Some(quoted) => match quoted.split_once('"') {
                Some((value, remainder)) => (value, remainder),
                None => break,
            },
            None => value.split_once(',').unwrap_or((value, "")),
        };

        map.insert(name, value.trim().to_string());
        rest = remainder.trim_start().trim_start_matches(',');
    }
    map
}
