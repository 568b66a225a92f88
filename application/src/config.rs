//! [`Config`]-related definitions.

use std::time;

use axum_client_ip::SecureClientIpSource;
use config::{builder::DefaultState, ConfigBuilder, ConfigError};
use derive_more::{Debug, Display, Error, From};
use regex::Regex;
use secrecy::SecretString;
use serde::Deserialize;
use service::domain::{service::SessionInsensitive, ticket::ExpirationPolicy};
use smart_default::SmartDefault;

/// Application configuration.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: Server,

    /// Tickets configuration.
    #[serde(default)]
    pub ticket: Ticket,

    /// Session cookie configuration.
    #[serde(default)]
    pub cookie: Cookie,

    /// Authentication configuration.
    #[serde(default)]
    pub authentication: Authentication,

    /// Service tasks configuration.
    #[serde(default)]
    pub tasks: Tasks,

    /// Log configuration.
    #[serde(default)]
    pub log: Log,
}

impl Config {
    /// Creates a new [`Config`] by:
    /// - loading it from the provided `path` (if any);
    /// - merging it with the environment variables (if any);
    /// - using default values for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(path: impl AsRef<str>) -> Result<Self, ConfigError> {
        ConfigBuilder::<DefaultState>::default()
            .add_source(config::File::with_name(path.as_ref()).required(false))
            .add_source(config::Environment::with_prefix("CONF").separator("."))
            .build()?
            .try_deserialize()
    }

    /// Longest duration accepted for ticket expiration settings.
    pub const MAX_DURATION: time::Duration =
        time::Duration::from_secs(100 * 365 * 24 * 60 * 60);

    /// Builds the [`service::Config`] out of this [`Config`].
    ///
    /// # Errors
    ///
    /// - If [`Cookie::allowed_ip_pattern`] is not a valid [`Regex`].
    /// - If some ticket expiration duration exceeds [`Config::MAX_DURATION`].
    pub fn service(&self) -> Result<service::Config, InvalidError> {
        let Ticket {
            tgt,
            st,
            id_suffix,
        } = &self.ticket;

        for (name, duration) in [
            ("ticket.tgt.max_time_to_live", tgt.max_time_to_live),
            ("ticket.tgt.time_to_kill", tgt.time_to_kill),
            ("ticket.st.time_to_kill", st.time_to_kill),
        ] {
            if duration > Self::MAX_DURATION {
                return Err(InvalidError::DurationOutOfRange { name });
            }
        }

        let ticket_granting = ExpirationPolicy::TicketGranting {
            max_time_to_live: tgt.max_time_to_live,
            time_to_kill: tgt.time_to_kill,
        };
        Ok(service::Config {
            ticket_granting_ticket_expiration: ticket_granting,
            proxy_granting_ticket_expiration: ticket_granting,
            service_ticket_expiration: ExpirationPolicy::MultiTimeUseOrTimeout {
                number_of_uses: st.number_of_uses,
                time_to_kill: st.time_to_kill,
            },
            only_track_most_recent_session: tgt.only_track_most_recent_session,
            service_session_parameters: st.service_session_parameters.clone(),
            ticket_id_suffix: id_suffix.clone(),
            cookie: service::cookie::Config {
                pin_to_session: self.cookie.pin_to_session,
                allowed_ip_pattern: self
                    .cookie
                    .allowed_ip_pattern
                    .as_deref()
                    .map(Regex::new)
                    .transpose()?,
            },
            cookie_signing: self.cookie.signing_secret.clone().map(|s| {
                service::cookie::Signing::new(&SecretString::from(s))
            }),
            clean_expired_tickets: service::task::clean_expired_tickets::Config {
                interval: self.tasks.clean_expired_tickets.interval,
            },
        })
    }
}

/// Error of building a [`service::Config`] out of a [`Config`].
#[derive(Debug, Display, Error, From)]
pub enum InvalidError {
    /// [`Cookie::allowed_ip_pattern`] is not a valid [`Regex`].
    #[display("invalid `cookie.allowed_ip_pattern`: {_0}")]
    IpPattern(regex::Error),

    /// Duration setting exceeds [`Config::MAX_DURATION`].
    #[display("`{name}` exceeds {:?}", Config::MAX_DURATION)]
    #[from(ignore)]
    DurationOutOfRange {
        /// Name of the setting.
        #[error(not(source))]
        name: &'static str,
    },
}

/// Server configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Server {
    /// Host to bind the server to.
    #[default("0.0.0.0".to_owned())]
    pub host: String,

    /// Port to bind the server to.
    #[default(8080)]
    pub port: u16,

    /// Source of the client IP address used for session cookie pinning.
    ///
    /// Any header source must only be used behind a proxy overwriting that
    /// header.
    #[default(SecureClientIpSource::ConnectInfo)]
    pub client_ip_source: SecureClientIpSource,

    /// [CORS] configuration.
    ///
    /// [CORS]: https://developer.mozilla.org/en-US/docs/Web/HTTP/CORS
    pub cors: Cors,
}

/// [CORS] configuration.
///
/// [CORS]: https://developer.mozilla.org/en-US/docs/Web/HTTP/CORS
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Cors {
    /// List of allowed origins.
    #[default(vec!["*".to_owned()])]
    pub origins: Vec<String>,
}

/// Tickets configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Ticket {
    /// Ticket-granting tickets configuration.
    pub tgt: TicketGranting,

    /// Service tickets configuration.
    pub st: ServiceTicket,

    /// Suffix of generated ticket IDs (usually a node name).
    pub id_suffix: Option<String>,
}

/// Ticket-granting tickets configuration.
#[derive(Clone, Copy, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct TicketGranting {
    /// Hard ceiling of a session lifetime.
    #[default(time::Duration::from_secs(8 * 60 * 60))]
    #[serde(with = "humantime_serde")]
    pub max_time_to_live: time::Duration,

    /// Allowed idle time of a session.
    #[default(time::Duration::from_secs(2 * 60 * 60))]
    #[serde(with = "humantime_serde")]
    pub time_to_kill: time::Duration,

    /// Indicator whether only the most recent service ticket of every
    /// service is tracked.
    #[default(true)]
    pub only_track_most_recent_session: bool,
}

/// Service tickets configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct ServiceTicket {
    /// Number of allowed validations.
    #[default(1)]
    pub number_of_uses: u32,

    /// Time to validate a service ticket in.
    #[default(time::Duration::from_secs(10))]
    #[serde(with = "humantime_serde")]
    pub time_to_kill: time::Duration,

    /// Names of service URL query parameters ignored when matching services.
    #[default(
        SessionInsensitive::DEFAULT_SESSION_PARAMETERS
            .iter()
            .map(|&p| p.to_owned())
            .collect()
    )]
    pub service_session_parameters: Vec<String>,
}

/// Session cookie configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Cookie {
    /// Name of the session cookie.
    #[default("TGC".to_owned())]
    pub name: String,

    /// Indicator whether the session cookie is pinned to the client IP
    /// address and `User-Agent`.
    #[default(true)]
    pub pin_to_session: bool,

    /// Pattern of IP addresses allowed to use a session cookie issued for
    /// another IP address.
    pub allowed_ip_pattern: Option<String>,

    /// Secret to sign the session cookie with.
    #[debug(skip)]
    pub signing_secret: Option<String>,

    /// Indicator whether the session cookie is sent over HTTPS only.
    #[default(true)]
    pub secure: bool,

    /// Maximum age of the session cookie.
    ///
    /// Browser session cookie is issued if not specified.
    #[serde(default, with = "humantime_serde")]
    pub max_age: Option<time::Duration>,
}

/// Authentication configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Authentication {
    /// Name of the request header carrying the user authenticated by an
    /// upstream proxy.
    #[default("Remote-User".to_owned())]
    pub trusted_header: String,
}

/// Service tasks configuration.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Tasks {
    /// `CleanExpiredTickets` task configuration.
    pub clean_expired_tickets: Task,
}

/// Service task configuration.
#[derive(Clone, Copy, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Task {
    /// Task execution interval.
    #[default(time::Duration::from_secs(2 * 60))]
    #[serde(with = "humantime_serde")]
    pub interval: time::Duration,
}

/// Log configuration.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Log {
    /// Log level.
    pub level: LogLevel,
}

/// Log level.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    /// Designates very low priority, often extremely verbose, information.
    Trace,

    /// Designates lower priority information.
    Debug,

    /// Designates useful information.
    #[default]
    Info,

    /// Designates hazardous situations.
    Warn,

    /// Designates very serious errors.
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}
