//! Session cookie value encoding, pinned to the client it was issued for.
//!
//! A pinned cookie value has the `{value}@{ip}@{user_agent}` format, so the
//! `@` delimiter is reserved and cannot appear in any of its fields.

use std::{fmt, net::IpAddr, sync::Arc};

use derive_more::{Display, Error, From};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use regex::Regex;
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use tracing as log;

/// Delimiter of the pinned cookie value fields.
pub const DELIMITER: char = '@';

/// Origin of the current HTTP request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClientInfo {
    /// IP address of the client.
    pub ip: Option<IpAddr>,

    /// `User-Agent` of the client.
    pub user_agent: Option<String>,
}

impl ClientInfo {
    /// Creates a new complete [`ClientInfo`].
    #[must_use]
    pub fn new(ip: IpAddr, user_agent: impl Into<String>) -> Self {
        Self {
            ip: Some(ip),
            user_agent: Some(user_agent.into()),
        }
    }
}

/// [`ValueManager`] configuration.
#[derive(Clone, Debug, SmartDefault)]
pub struct Config {
    /// Indicator whether cookie values are pinned to the [`ClientInfo`] they
    /// were issued for.
    #[default(true)]
    pub pin_to_session: bool,

    /// Pattern of IP addresses allowed to present a cookie issued for another
    /// IP address.
    pub allowed_ip_pattern: Option<Regex>,
}

/// Encoder and decoder of session cookie values.
#[derive(Clone, Debug)]
pub struct ValueManager {
    /// [`Config`] of this [`ValueManager`].
    config: Config,

    /// [`CookieCipher`] protecting the encoded values.
    cipher: Arc<dyn CookieCipher>,
}

impl Default for ValueManager {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl ValueManager {
    /// Creates a new [`ValueManager`] not protecting encoded values.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_cipher(config, NoOp)
    }

    /// Creates a new [`ValueManager`] protecting encoded values with the
    /// provided [`CookieCipher`].
    #[must_use]
    pub fn with_cipher(
        config: Config,
        cipher: impl CookieCipher + 'static,
    ) -> Self {
        Self {
            config,
            cipher: Arc::new(cipher),
        }
    }

    /// Returns [`Config`] of this [`ValueManager`].
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Builds a cookie value out of the provided `value` and [`ClientInfo`].
    ///
    /// # Errors
    ///
    /// - [`BuildError::IllegalState`] if pinning is enabled while no complete
    ///   [`ClientInfo`] is provided;
    /// - [`BuildError::ReservedDelimiter`] if any of the pinned fields
    ///   contains [`DELIMITER`];
    /// - [`BuildError::Cipher`] if [`CookieCipher`] fails.
    pub fn build_cookie_value(
        &self,
        value: &str,
        client: Option<&ClientInfo>,
    ) -> Result<String, BuildError> {
        use BuildError as E;

        let compound = if self.config.pin_to_session {
            let client = client.ok_or(E::IllegalState(
                "client info is required to pin a cookie",
            ))?;
            let ip = client
                .ip
                .ok_or(E::IllegalState("client IP address is unknown"))?
                .to_string();
            let user_agent = client
                .user_agent
                .as_deref()
                .filter(|ua| !ua.is_empty())
                .ok_or(E::IllegalState("client `User-Agent` is unknown"))?;

            for field in [value, ip.as_str(), user_agent] {
                if field.contains(DELIMITER) {
                    return Err(E::ReservedDelimiter);
                }
            }
            [value, ip.as_str(), user_agent].join(&DELIMITER.to_string())
        } else {
            value.to_owned()
        };

        self.cipher.encode(&compound).map_err(E::Cipher)
    }

    /// Obtains the original value out of the provided cookie value, checking
    /// it against the provided [`ClientInfo`].
    ///
    /// # Errors
    ///
    /// With [`InvalidCookie`] if the cookie value is malformed, tampered, or
    /// was issued for another client.
    pub fn obtain_cookie_value(
        &self,
        cookie: &str,
        client: Option<&ClientInfo>,
    ) -> Result<String, InvalidCookie> {
        self.decode(cookie, client).map_err(|reason| {
            log::debug!("rejected session cookie: {reason}");
            InvalidCookie { reason }
        })
    }

    /// Decodes the provided cookie value, reporting the exact [`Reason`] of
    /// rejection.
    fn decode(
        &self,
        cookie: &str,
        client: Option<&ClientInfo>,
    ) -> Result<String, Reason> {
        let compound = self.cipher.decode(cookie).map_err(Reason::Cipher)?;
        if !self.config.pin_to_session {
            return Ok(compound);
        }

        let fields = compound.split(DELIMITER).collect::<Vec<_>>();
        let [value, ip, user_agent] = fields[..] else {
            return Err(Reason::Malformed(fields.len()));
        };
        if value.is_empty() || ip.is_empty() || user_agent.is_empty() {
            return Err(Reason::EmptyField);
        }

        let client = client.ok_or(Reason::MissingClientInfo)?;
        let current_ip = client
            .ip
            .ok_or(Reason::MissingClientInfo)?
            .to_string();
        if ip != current_ip && !self.is_allowed_ip(ip, &current_ip) {
            return Err(Reason::IpMismatch {
                expected: ip.to_owned(),
                actual: current_ip,
            });
        }

        let current_user_agent = client
            .user_agent
            .as_deref()
            .ok_or(Reason::MissingClientInfo)?;
        if user_agent != current_user_agent {
            return Err(Reason::UserAgentMismatch {
                expected: user_agent.to_owned(),
                actual: current_user_agent.to_owned(),
            });
        }

        Ok(value.to_owned())
    }

    /// Checks whether any of the provided IP addresses matches the allowed IP
    /// pattern.
    fn is_allowed_ip(&self, embedded: &str, current: &str) -> bool {
        self.config
            .allowed_ip_pattern
            .as_ref()
            .is_some_and(|p| p.is_match(embedded) || p.is_match(current))
    }
}

/// Error of building a cookie value.
#[derive(Debug, Display, Error)]
pub enum BuildError {
    /// Cookie value cannot be pinned in the current state.
    #[display("Illegal state: {_0}")]
    IllegalState(#[error(not(source))] &'static str),

    /// Pinned field contains the reserved [`DELIMITER`].
    #[display("Cookie value fields must not contain `@`")]
    ReservedDelimiter,

    /// [`CookieCipher`] failed to encode the value.
    #[display("Failed to protect cookie value: {_0}")]
    Cipher(CipherError),
}

/// Error of obtaining a value out of an invalid cookie.
///
/// Doesn't expose which check has failed.
#[derive(Debug, Display, Error)]
#[display("Invalid cookie")]
pub struct InvalidCookie {
    /// Exact [`Reason`] of rejection.
    #[error(not(source))]
    reason: Reason,
}

/// Reason of a cookie rejection.
#[derive(Debug, Display)]
enum Reason {
    /// [`CookieCipher`] failed to decode the value.
    #[display("cipher rejected the value: {_0}")]
    Cipher(CipherError),

    /// Wrong number of pinned fields.
    #[display("expected 3 fields, found {_0}")]
    Malformed(usize),

    /// Some of pinned fields is empty.
    #[display("empty field")]
    EmptyField,

    /// No [`ClientInfo`] to check the cookie against.
    #[display("no client info to check against")]
    MissingClientInfo,

    /// Cookie was issued for another IP address.
    #[display("IP address mismatch: expected `{expected}`, found `{actual}`")]
    IpMismatch {
        /// IP address the cookie was issued for.
        expected: String,

        /// IP address of the current client.
        actual: String,
    },

    /// Cookie was issued for another `User-Agent`.
    #[display(
        "`User-Agent` mismatch: expected `{expected}`, found `{actual}`"
    )]
    UserAgentMismatch {
        /// `User-Agent` the cookie was issued for.
        expected: String,

        /// `User-Agent` of the current client.
        actual: String,
    },
}

/// Reversible protection of cookie values.
pub trait CookieCipher: fmt::Debug + Send + Sync {
    /// Protects the provided value.
    ///
    /// # Errors
    ///
    /// If the value cannot be protected.
    fn encode(&self, value: &str) -> Result<String, CipherError>;

    /// Unwraps the provided protected value.
    ///
    /// # Errors
    ///
    /// If the value is not a valid protected one.
    fn decode(&self, value: &str) -> Result<String, CipherError>;
}

/// [`CookieCipher`] leaving values as is.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOp;

impl CookieCipher for NoOp {
    fn encode(&self, value: &str) -> Result<String, CipherError> {
        Ok(value.to_owned())
    }

    fn decode(&self, value: &str) -> Result<String, CipherError> {
        Ok(value.to_owned())
    }
}

/// [`CookieCipher`] signing values as HS256 [JWT]s.
///
/// [JWT]: https://datatracker.ietf.org/doc/html/rfc7519
#[derive(Clone, derive_more::Debug)]
pub struct Signing {
    /// [JWT] encoding key.
    ///
    /// [JWT]: https://datatracker.ietf.org/doc/html/rfc7519
    #[debug(skip)]
    encoding_key: EncodingKey,

    /// [JWT] decoding key.
    ///
    /// [JWT]: https://datatracker.ietf.org/doc/html/rfc7519
    #[debug(skip)]
    decoding_key: DecodingKey,

    /// [`Validation`] of decoded [JWT]s.
    ///
    /// [JWT]: https://datatracker.ietf.org/doc/html/rfc7519
    validation: Validation,
}

impl Signing {
    /// Creates a new [`Signing`] cipher with the provided secret.
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        let secret = secret.expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

/// Claims of a [`Signing`] [JWT].
///
/// [JWT]: https://datatracker.ietf.org/doc/html/rfc7519
#[derive(Debug, Deserialize, Serialize)]
struct Claims {
    /// Signed cookie value.
    value: String,
}

impl CookieCipher for Signing {
    fn encode(&self, value: &str) -> Result<String, CipherError> {
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &Claims {
                value: value.to_owned(),
            },
            &self.encoding_key,
        )
        .map_err(Into::into)
    }

    fn decode(&self, value: &str) -> Result<String, CipherError> {
        Ok(jsonwebtoken::decode::<Claims>(
            value,
            &self.decoding_key,
            &self.validation,
        )?
        .claims
        .value)
    }
}

/// Error of a [`CookieCipher`].
#[derive(Debug, Display, Error, From)]
pub enum CipherError {
    /// [`jsonwebtoken`] error.
    #[display("JSON Web Token error: {_0}")]
    JsonWebToken(jsonwebtoken::errors::Error),
}

#[cfg(test)]
mod spec {
    use std::net::{IpAddr, Ipv4Addr};

    use regex::Regex;
    use secrecy::SecretString;

    use super::{
        BuildError, ClientInfo, Config, Reason, Signing, ValueManager,
    };

    const CLIENT_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
    const USER_AGENT: &str = "Test-Client/1.0.0";
    const VALUE: &str = "cookieValue";

    fn client() -> ClientInfo {
        ClientInfo::new(CLIENT_IP, USER_AGENT)
    }

    fn unpinned() -> ValueManager {
        ValueManager::new(Config {
            pin_to_session: false,
            ..Config::default()
        })
    }

    #[test]
    fn encodes_and_decodes() {
        let mgr = ValueManager::default();

        let encoded = mgr.build_cookie_value(VALUE, Some(&client())).unwrap();
        assert_eq!(encoded, "cookieValue@127.0.0.1@Test-Client/1.0.0");

        let decoded = mgr.obtain_cookie_value(&encoded, Some(&client()));
        assert_eq!(decoded.unwrap(), VALUE);
    }

    #[test]
    fn pinning_requires_complete_client_info() {
        let no_agent = ClientInfo {
            ip: Some(CLIENT_IP),
            user_agent: None,
        };

        assert!(matches!(
            ValueManager::default().build_cookie_value(VALUE, Some(&no_agent)),
            Err(BuildError::IllegalState(_)),
        ));
        assert!(matches!(
            ValueManager::default().build_cookie_value(VALUE, None),
            Err(BuildError::IllegalState(_)),
        ));
        assert_eq!(
            unpinned().build_cookie_value(VALUE, Some(&no_agent)).unwrap(),
            VALUE,
        );
    }

    #[test]
    fn rejects_reserved_delimiter() {
        let agent = ClientInfo::new(CLIENT_IP, "Agent@1.0");

        assert!(matches!(
            ValueManager::default().build_cookie_value(VALUE, Some(&agent)),
            Err(BuildError::ReservedDelimiter),
        ));
        assert!(matches!(
            ValueManager::default().build_cookie_value("a@b", Some(&client())),
            Err(BuildError::ReservedDelimiter),
        ));
    }

    #[test]
    fn no_pinning_returns_raw_value() {
        assert_eq!(
            unpinned().obtain_cookie_value("something", None).unwrap(),
            "something",
        );
    }

    #[test]
    fn rejects_malformed_values() {
        let mgr = ValueManager::default();

        let err = mgr.obtain_cookie_value("something", Some(&client()));
        assert!(matches!(err.unwrap_err().reason, Reason::Malformed(1)));

        let err = mgr.obtain_cookie_value("something@1@", Some(&client()));
        assert!(matches!(err.unwrap_err().reason, Reason::EmptyField));
    }

    #[test]
    fn rejects_other_ip() {
        let err = ValueManager::default()
            .obtain_cookie_value("something@1@agent", Some(&client()))
            .unwrap_err();

        assert!(matches!(err.reason, Reason::IpMismatch { .. }));
        assert_eq!(err.to_string(), "Invalid cookie");
    }

    #[test]
    fn rejects_other_user_agent() {
        let err = ValueManager::default()
            .obtain_cookie_value("something@127.0.0.1@agent", Some(&client()))
            .unwrap_err();

        assert!(matches!(err.reason, Reason::UserAgentMismatch { .. }));
        assert_eq!(err.to_string(), "Invalid cookie");
    }

    #[test]
    fn rejects_missing_client_info() {
        let err = ValueManager::default()
            .obtain_cookie_value("something@127.0.0.1@Test-Client/1.0.0", None)
            .unwrap_err();

        assert!(matches!(err.reason, Reason::MissingClientInfo));
    }

    #[test]
    fn rejects_tampered_ip() {
        let mgr = ValueManager::default();
        let encoded = mgr.build_cookie_value(VALUE, Some(&client())).unwrap();
        let tampered = encoded.replace("127.0.0.1", "10.0.0.1");

        assert!(mgr.obtain_cookie_value(&tampered, Some(&client())).is_err());
    }

    #[test]
    fn allowed_ip_pattern_relaxes_ip_check_only() {
        let mgr = ValueManager::new(Config {
            allowed_ip_pattern: Some(Regex::new(r"^19.*.3.1\d\d").unwrap()),
            ..Config::default()
        });
        let encoded = mgr.build_cookie_value(VALUE, Some(&client())).unwrap();

        let moved = ClientInfo::new("198.127.3.155".parse().unwrap(), USER_AGENT);
        assert_eq!(
            mgr.obtain_cookie_value(&encoded, Some(&moved)).unwrap(),
            VALUE,
        );

        let other = ClientInfo::new("10.0.0.1".parse().unwrap(), USER_AGENT);
        assert!(mgr.obtain_cookie_value(&encoded, Some(&other)).is_err());

        let moved_agent =
            ClientInfo::new("198.127.3.155".parse().unwrap(), "Other/2.0");
        assert!(mgr
            .obtain_cookie_value(&encoded, Some(&moved_agent))
            .is_err());
    }

    #[test]
    fn signed_values_round_trip() {
        let mgr = ValueManager::with_cipher(
            Config::default(),
            Signing::new(&SecretString::from("secret")),
        );

        let encoded = mgr.build_cookie_value(VALUE, Some(&client())).unwrap();
        assert!(!encoded.contains('@'));

        assert_eq!(
            mgr.obtain_cookie_value(&encoded, Some(&client())).unwrap(),
            VALUE,
        );
    }

    #[test]
    fn rejects_unsigned_and_foreign_values() {
        let mgr = ValueManager::with_cipher(
            Config::default(),
            Signing::new(&SecretString::from("secret")),
        );
        let foreign = ValueManager::with_cipher(
            Config::default(),
            Signing::new(&SecretString::from("another")),
        )
        .build_cookie_value(VALUE, Some(&client()))
        .unwrap();

        let err = mgr
            .obtain_cookie_value(
                "cookieValue@127.0.0.1@Test-Client/1.0.0",
                Some(&client()),
            )
            .unwrap_err();
        assert!(matches!(err.reason, Reason::Cipher(_)));
        assert!(mgr.obtain_cookie_value(&foreign, Some(&client())).is_err());
    }
}
