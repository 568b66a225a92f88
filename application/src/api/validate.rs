//! Service ticket validation endpoint.

use axum::{extract::Query, Json};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use service::{
    command::{self, validate_service_ticket::Assertion},
    domain::{authentication::Attributes, Authentication},
    query::get_ticket,
    Command as _,
};

use crate::{
    api::{self, Params},
    AsError, Context, Error,
};

/// Query parameters of a validation request.
#[derive(Debug, Deserialize)]
pub struct ValidateParams {
    /// ID of the service ticket to validate.
    pub ticket: String,

    /// Service presenting the ticket.
    pub service: String,
}

/// Successful validation response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateOutput {
    /// ID of the authenticated principal.
    pub user: String,

    /// Attributes of the authenticated principal.
    pub attributes: Attributes,

    /// Authentications of the whole proxy chain, the primary one first.
    pub authentications: Vec<AuthenticationOutput>,

    /// Indicator whether the ticket was issued on a fresh login.
    pub from_new_login: bool,

    /// Services the ticket was proxied through, the most recent first.
    pub proxies: Vec<String>,
}

/// [`Authentication`] representation in a [`ValidateOutput`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOutput {
    /// ID of the authenticated principal.
    pub principal: String,

    /// Attributes of the authentication event.
    pub attributes: Attributes,

    /// RFC 3339 timestamp of the authentication.
    pub authenticated_at: String,
}

impl From<&Authentication> for AuthenticationOutput {
    fn from(authn: &Authentication) -> Self {
        Self {
            principal: authn.principal.id.to_string(),
            attributes: authn.attributes.clone(),
            authenticated_at: authn.authenticated_at.to_rfc3339(),
        }
    }
}

impl From<Assertion> for ValidateOutput {
    fn from(assertion: Assertion) -> Self {
        let primary = assertion.primary_authentication();
        Self {
            user: primary.principal.id.to_string(),
            attributes: primary.principal.attributes.clone(),
            authentications: assertion
                .chained_authentications()
                .into_iter()
                .map(Into::into)
                .collect(),
            from_new_login: assertion.is_from_new_login(),
            proxies: assertion
                .chain
                .iter()
                .filter_map(|tgt| tgt.proxied_by())
                .map(|p| p.service.to_string())
                .collect(),
        }
    }
}

/// Validates the provided service ticket, consuming it.
///
/// # Errors
///
/// Possible error codes:
/// - `INVALID_TICKET` - ticket is unknown, expired or already consumed;
/// - `INVALID_TICKET_SPEC` - ticket is not a service ticket;
/// - `INVALID_SERVICE` - ticket was granted for another service.
#[tracing::instrument(
    skip_all,
    fields(
        http.handler = "serviceValidate",
        service = %params.service,
        ticket = %params.ticket,
    ),
)]
pub async fn service_validate(
    ctx: Context,
    WithRejection(Query(params), _): Params<ValidateParams>,
) -> Result<Json<ValidateOutput>, Error> {
    let service = api::parse_service(params.service)?;

    let assertion = ctx
        .service()
        .execute(command::ValidateServiceTicket {
            service_ticket: params.ticket.into(),
            service,
        })
        .await
        .map_err(AsError::into_error)?;

    Ok(Json(assertion.into()))
}

impl AsError for get_ticket::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Registry(e) => e.try_as_error(),
            Self::InvalidTicket(e) => e.try_as_error(),
        }
    }
}

#[cfg(test)]
mod spec {
    use http::StatusCode;

    use crate::api::spec::{app, json, login, request, send};

    const SERVICE: &str = "https://app.example.com";

    #[tokio::test]
    async fn validates_ticket_once() {
        let app = app();
        let (_, st) = login(&app, SERVICE).await;
        let uri = format!("/serviceValidate?ticket={st}&service={SERVICE}");

        let response =
            send(&app, request(http::Method::GET, &uri, "127.0.0.1")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["user"], "casuser");
        assert_eq!(body["fromNewLogin"], true);
        assert_eq!(body["proxies"].as_array().unwrap().len(), 0);
        assert_eq!(
            body["authentications"][0]["attributes"]["authenticationMethod"][0],
            "TrustedHeader",
        );

        let response =
            send(&app, request(http::Method::GET, &uri, "127.0.0.1")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(response).await["code"], "INVALID_TICKET");
    }

    #[tokio::test]
    async fn rejects_another_service() {
        let app = app();
        let (_, st) = login(&app, SERVICE).await;

        let response = send(
            &app,
            request(
                http::Method::GET,
                &format!(
                    "/serviceValidate?ticket={st}\
                     &service=https://evil.example.com",
                ),
                "127.0.0.1",
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(response).await["code"], "INVALID_SERVICE");

        let response = send(
            &app,
            request(
                http::Method::GET,
                &format!("/serviceValidate?ticket={st}&service={SERVICE}"),
                "127.0.0.1",
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(response).await["code"], "INVALID_TICKET");
    }

    #[tokio::test]
    async fn rejects_ticket_granting_ticket() {
        let app = app();
        let (cookie, _) = login(&app, SERVICE).await;
        let tgt = cookie
            .split_once('=')
            .and_then(|(_, v)| v.split_once("%40").or(v.split_once('@')))
            .unwrap()
            .0
            .to_owned();

        let response = send(
            &app,
            request(
                http::Method::GET,
                &format!("/serviceValidate?ticket={tgt}&service={SERVICE}"),
                "127.0.0.1",
            ),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["code"], "INVALID_TICKET_SPEC");
    }
}
