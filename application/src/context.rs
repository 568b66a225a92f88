//! [`Context`]-related definitions.

use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, RequestPartsExt as _};
use axum_client_ip::SecureClientIp;
use axum_extra::{
    extract::cookie::{Cookie, CookieJar},
    headers::UserAgent,
    TypedHeader,
};
use service::{
    command::{self, Command as _},
    cookie::ClientInfo,
    domain::ticket::TicketGrantingTicket,
};
use tokio::sync::OnceCell;
use tracing as log;

use crate::{error::SessionError, AsError, Error, Service, Settings};

/// Context of an HTTP request.
#[derive(Debug)]
pub struct Context {
    /// [`Service`] instance.
    service: Service,

    /// [`Settings`] of the HTTP API.
    settings: Arc<Settings>,

    /// [`ClientInfo`] of the request.
    client: ClientInfo,

    /// Cookies of the request.
    cookies: CookieJar,

    /// Parts of the HTTP request.
    parts: http::request::Parts,

    /// [`TicketGrantingTicket`] of the current session.
    current_session: OnceCell<TicketGrantingTicket>,
}

impl Context {
    /// Returns [`Service`] instance of this [`Context`].
    #[must_use]
    pub fn service(&self) -> &Service {
        &self.service
    }

    /// Returns [`Settings`] of the HTTP API.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns [`ClientInfo`] of the request.
    #[must_use]
    pub fn client(&self) -> &ClientInfo {
        &self.client
    }

    /// Returns the value of the header set by an upstream authenticating
    /// proxy, if any.
    #[must_use]
    pub fn trusted_user(&self) -> Option<&str> {
        self.parts
            .headers
            .get(&self.settings.trusted_header)
            .and_then(|h| h.to_str().ok())
    }

    /// Returns the session cookie value of the request, if any.
    #[must_use]
    pub fn session_cookie(&self) -> Option<&str> {
        self.cookies
            .get(&self.settings.cookie.name)
            .map(Cookie::value)
    }

    /// Returns [`CookieJar`] setting the provided session cookie value.
    #[must_use]
    pub fn set_session_cookie(&self, value: String) -> CookieJar {
        let config = &self.settings.cookie;
        let mut cookie = Cookie::build((config.name.clone(), value))
            .path("/")
            .http_only(true)
            .secure(config.secure)
            .build();
        cookie.set_max_age(
            config
                .max_age
                .and_then(|age| time::Duration::try_from(age).ok()),
        );
        self.cookies.clone().add(cookie)
    }

    /// Returns [`CookieJar`] removing the session cookie.
    #[must_use]
    pub fn remove_session_cookie(&self) -> CookieJar {
        self.cookies.clone().remove(
            Cookie::build(self.settings.cookie.name.clone()).path("/"),
        )
    }

    /// Returns the [`TicketGrantingTicket`] of the current session.
    ///
    /// # Errors
    ///
    /// Errors if:
    /// - the request has no session cookie;
    /// - the session cookie is invalid, or was issued for another client;
    /// - the session is expired.
    pub async fn current_session(&self) -> Result<&TicketGrantingTicket, Error> {
        self.current_session
            .get_or_try_init(|| async {
                let cookie = self
                    .session_cookie()
                    .ok_or_else(|| {
                        Error::from(SessionError::AuthenticationRequired)
                    })?
                    .to_owned();
                self.service
                    .execute(command::AuthorizeSessionCookie {
                        cookie,
                        client: Some(self.client.clone()),
                    })
                    .await
                    .map_err(AsError::into_error)
            })
            .await
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Context
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut http::request::Parts,
        _: &S,
    ) -> Result<Self, Self::Rejection> {
        let service = parts
            .extensions
            .get::<Service>()
            .cloned()
            .ok_or_else(|| Error::internal(&"missing `Service` extension"))?;
        let settings = parts
            .extensions
            .get::<Arc<Settings>>()
            .cloned()
            .ok_or_else(|| Error::internal(&"missing `Settings` extension"))?;

        let ip = SecureClientIp::from(
            &settings.client_ip_source,
            &parts.headers,
            &parts.extensions,
        )
        .map_err(|e| log::debug!("client IP is unknown: {e}"))
        .ok()
        .map(|ip| ip.0);
        let user_agent = parts
            .extract::<Option<TypedHeader<UserAgent>>>()
            .await
            .unwrap_or_else(|never| match never {})
            .map(|TypedHeader(ua)| ua.as_str().to_owned());
        let cookies = CookieJar::from_headers(&parts.headers);

        Ok(Self {
            service,
            settings,
            client: ClientInfo { ip, user_agent },
            cookies,
            parts: parts.clone(),
            current_session: OnceCell::new(),
        })
    }
}
