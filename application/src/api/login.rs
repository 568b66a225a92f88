//! Login endpoints.

use axum::{extract::Query, Json};
use axum_extra::extract::{CookieJar, WithRejection};
use serde::{Deserialize, Serialize};
use service::{
    command,
    domain::{
        authentication::{Principal, PrincipalId},
        ticket, Authentication,
    },
    Command as _,
};

use crate::{
    api::{self, Params},
    error::SessionError,
    AsError, Context, Error,
};

/// Query parameters of login requests.
#[derive(Debug, Deserialize)]
pub struct LoginParams {
    /// Service to grant a service ticket for, if any.
    pub service: Option<String>,
}

/// Response of login requests.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutput {
    /// ID of the authenticated principal.
    pub principal: String,

    /// ID of the service ticket granted for the requested service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_ticket: Option<String>,
}

/// Establishes a new SSO session for the principal authenticated by the
/// upstream proxy.
///
/// # Errors
///
/// Possible error codes:
/// - `AUTHENTICATION_REQUIRED` - trusted header is missing or blank;
/// - `CLIENT_INFO_REQUIRED` - client IP address or `User-Agent` is unknown;
/// - `INVALID_SERVICE` - requested service is blank.
#[tracing::instrument(
    skip_all,
    fields(http.handler = "login", service = ?params.service),
)]
pub async fn authenticate(
    ctx: Context,
    WithRejection(Query(params), _): Params<LoginParams>,
) -> Result<(CookieJar, Json<LoginOutput>), Error> {
    let principal = ctx
        .trusted_user()
        .and_then(PrincipalId::new)
        .ok_or_else(|| Error::from(SessionError::AuthenticationRequired))?;
    let service = params.service.map(api::parse_service).transpose()?;

    let authentication = Authentication::new(Principal::new(principal))
        .with_attribute("authenticationMethod", ["TrustedHeader"]);
    let output = ctx
        .service()
        .execute(command::CreateTicketGrantingTicket {
            authentication,
            client: Some(ctx.client().clone()),
        })
        .await
        .map_err(AsError::into_error)?;
    let tgt = output.ticket_granting_ticket;

    let service_ticket = match service {
        Some(service) => Some(
            grant_service_ticket(&ctx, tgt.id().clone(), service, true)
                .await?,
        ),
        None => None,
    };

    Ok((
        ctx.set_session_cookie(output.cookie),
        Json(LoginOutput {
            principal: tgt.authentication().principal.id.to_string(),
            service_ticket: service_ticket.map(|id| id.to_string()),
        }),
    ))
}

/// Resumes the existing SSO session of the request, granting a service
/// ticket without asking for credentials.
///
/// # Errors
///
/// Possible error codes:
/// - `AUTHENTICATION_REQUIRED` - request has no session cookie;
/// - `INVALID_SESSION` - session cookie is not recognized;
/// - `INVALID_TICKET` - session is expired;
/// - `INVALID_SERVICE` - requested service is blank.
#[tracing::instrument(
    skip_all,
    fields(http.handler = "login", service = ?params.service),
)]
pub async fn resume(
    ctx: Context,
    WithRejection(Query(params), _): Params<LoginParams>,
) -> Result<Json<LoginOutput>, Error> {
    let service = params.service.map(api::parse_service).transpose()?;
    let tgt = ctx.current_session().await?;

    let service_ticket = match service {
        Some(service) => Some(
            grant_service_ticket(&ctx, tgt.id().clone(), service, false)
                .await?,
        ),
        None => None,
    };

    Ok(Json(LoginOutput {
        principal: tgt.authentication().principal.id.to_string(),
        service_ticket: service_ticket.map(|id| id.to_string()),
    }))
}

/// Grants a new [`ServiceTicket`] by the provided [`TicketGrantingTicket`].
///
/// [`ServiceTicket`]: ticket::ServiceTicket
/// [`TicketGrantingTicket`]: ticket::TicketGrantingTicket
pub(crate) async fn grant_service_ticket(
    ctx: &Context,
    ticket_granting_ticket: ticket::Id,
    service: service::domain::service::Id,
    credentials_provided: bool,
) -> Result<ticket::Id, Error> {
    ctx.service()
        .execute(command::GrantServiceTicket {
            ticket_granting_ticket,
            service,
            credentials_provided,
        })
        .await
        .map(|st| st.id().clone())
        .map_err(AsError::into_error)
}

impl AsError for command::create_ticket_granting_ticket::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Registry(e) => e.try_as_error(),
            Self::Cookie(e) => e.try_as_error(),
        }
    }
}

#[cfg(test)]
mod spec {
    use http::StatusCode;

    use crate::api::spec::{app, json, login, request, send};

    #[tokio::test]
    async fn requires_trusted_header() {
        let app = app();

        let response =
            send(&app, request(http::Method::POST, "/login", "127.0.0.1"))
                .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(response).await["code"], "AUTHENTICATION_REQUIRED");
    }

    #[tokio::test]
    async fn resumes_session_by_cookie() {
        let app = app();
        let (cookie, _) = login(&app, "https://app.example.com").await;

        let response = send(
            &app,
            request(
                http::Method::GET,
                "/login?service=https://other.example.com",
                "127.0.0.1",
            )
            .header(http::header::COOKIE, &cookie),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["principal"], "casuser");
        assert!(body["serviceTicket"].as_str().unwrap().starts_with("ST-"));
    }

    #[tokio::test]
    async fn rejects_cookie_from_another_client() {
        let app = app();
        let (cookie, _) = login(&app, "https://app.example.com").await;

        let response = send(
            &app,
            request(http::Method::GET, "/login", "10.0.0.1")
                .header(http::header::COOKIE, &cookie),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(response).await["code"], "INVALID_SESSION");
    }

    #[tokio::test]
    async fn ignores_forged_forwarded_for() {
        let app = app();
        let (cookie, _) = login(&app, "https://app.example.com").await;

        let response = send(
            &app,
            request(http::Method::GET, "/login", "10.0.0.1")
                .header("X-Forwarded-For", "127.0.0.1")
                .header("X-Real-Ip", "127.0.0.1")
                .header(http::header::COOKIE, &cookie),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(response).await["code"], "INVALID_SESSION");
    }

    #[tokio::test]
    async fn requires_session_cookie() {
        let app = app();

        let response =
            send(&app, request(http::Method::GET, "/login", "127.0.0.1"))
                .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(response).await["code"], "AUTHENTICATION_REQUIRED");
    }
}
