//! HTTP API definitions.

pub mod login;
pub mod logout;
pub mod proxy;
pub mod validate;

use std::sync::Arc;

use axum::{
    extract::Query,
    routing::{get, post},
    Extension, Router,
};
use axum_client_ip::SecureClientIpSource;
use axum_extra::extract::WithRejection;

use crate::{config, define_error, Error, Service};

/// Settings of the HTTP API.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Session cookie configuration.
    pub cookie: config::Cookie,

    /// Name of the header carrying the user authenticated by an upstream
    /// proxy.
    pub trusted_header: http::HeaderName,

    /// Source of the client IP address.
    pub client_ip_source: SecureClientIpSource,
}

impl Settings {
    /// Creates new [`Settings`] out of the provided [`config`] sections.
    ///
    /// # Errors
    ///
    /// If [`config::Authentication::trusted_header`] is not a valid header
    /// name.
    pub fn new(
        cookie: config::Cookie,
        authentication: &config::Authentication,
        client_ip_source: SecureClientIpSource,
    ) -> Result<Self, http::header::InvalidHeaderName> {
        Ok(Self {
            cookie,
            trusted_header: authentication.trusted_header.parse()?,
            client_ip_source,
        })
    }
}

/// Builds the [`Router`] of the HTTP API over the provided [`Service`].
pub fn router(service: Service, settings: Settings) -> Router {
    Router::new()
        .route("/login", get(login::resume).post(login::authenticate))
        .route("/serviceValidate", get(validate::service_validate))
        .route("/proxy", get(proxy::grant).post(proxy::create))
        .route("/logout", post(logout::logout))
        .layer(settings.client_ip_source.clone().into_extension())
        .layer(Extension(Arc::new(settings)))
        .layer(Extension(service))
}

/// Query parameters of a request, rejected with an [`Error`].
pub type Params<T> = WithRejection<Query<T>, Error>;

define_error! {
    enum RequestError {
        #[code = "INVALID_SERVICE"]
        #[status = BAD_REQUEST]
        #[message = "Service must be a non-blank URL"]
        InvalidService,

        #[code = "INVALID_TICKET_SPEC"]
        #[status = BAD_REQUEST]
        #[message = "Ticket must be a proxy-granting ticket"]
        NotProxyGranting,
    }
}

/// Parses the provided raw service identifier.
///
/// # Errors
///
/// If the identifier is blank.
fn parse_service(
    raw: String,
) -> Result<service::domain::service::Id, Error> {
    service::domain::service::Id::new(raw)
        .ok_or_else(|| RequestError::InvalidService.into())
}
