//! Proxy endpoints.

use axum::{extract::Query, Json};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use service::{
    command,
    domain::{
        authentication::{Principal, PrincipalId},
        ticket::{self, Kind},
        Authentication,
    },
    Command as _,
};

use crate::{
    api::{self, login::grant_service_ticket, Params, RequestError},
    AsError, Context, Error,
};

/// Query parameters of a proxy-granting ticket request.
#[derive(Debug, Deserialize)]
pub struct CreateParams {
    /// ID of the service ticket validated by the proxying service.
    pub ticket: String,

    /// Proxying service.
    pub service: String,
}

/// Response of a proxy-granting ticket request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOutput {
    /// ID of the issued proxy-granting ticket.
    pub proxy_granting_ticket: String,

    /// ID of the principal the proxying service acts on behalf of.
    pub user: String,
}

/// Validates the provided service ticket and issues a proxy-granting ticket
/// for the proxying service.
///
/// # Errors
///
/// Same as for the `/serviceValidate` endpoint.
#[tracing::instrument(
    skip_all,
    fields(
        http.handler = "proxy",
        service = %params.service,
        ticket = %params.ticket,
    ),
)]
pub async fn create(
    ctx: Context,
    WithRejection(Query(params), _): Params<CreateParams>,
) -> Result<Json<CreateOutput>, Error> {
    let proxy = PrincipalId::new(params.service.clone())
        .ok_or_else(|| Error::from(RequestError::InvalidService))?;
    let service = api::parse_service(params.service)?;

    let authentication = Authentication::new(Principal::new(proxy))
        .with_attribute("authenticationMethod", ["ProxyCallback"]);
    let output = ctx
        .service()
        .execute(command::CreateProxyGrantingTicket {
            service_ticket: params.ticket.into(),
            service,
            authentication,
        })
        .await
        .map_err(AsError::into_error)?;

    Ok(Json(CreateOutput {
        proxy_granting_ticket: output.proxy_granting_ticket.id().to_string(),
        user: output
            .assertion
            .primary_authentication()
            .principal
            .id
            .to_string(),
    }))
}

/// Query parameters of a proxy ticket request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantParams {
    /// ID of the proxy-granting ticket.
    pub pgt: String,

    /// Service to grant a proxy ticket for.
    pub target_service: String,
}

/// Response of a proxy ticket request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantOutput {
    /// ID of the granted proxy ticket.
    pub proxy_ticket: String,
}

/// Grants a proxy ticket for the target service by the provided
/// proxy-granting ticket.
///
/// # Errors
///
/// Possible error codes:
/// - `INVALID_TICKET_SPEC` - ticket is not a proxy-granting ticket;
/// - `INVALID_TICKET` - ticket is unknown or expired;
/// - `INVALID_SERVICE` - target service is blank.
#[tracing::instrument(
    skip_all,
    fields(
        http.handler = "proxy",
        pgt = %params.pgt,
        target_service = %params.target_service,
    ),
)]
pub async fn grant(
    ctx: Context,
    WithRejection(Query(params), _): Params<GrantParams>,
) -> Result<Json<GrantOutput>, Error> {
    let pgt = ticket::Id::from(params.pgt);
    if pgt.kind() != Some(Kind::ProxyGranting) {
        return Err(RequestError::NotProxyGranting.into());
    }
    let target = api::parse_service(params.target_service)?;

    let proxy_ticket = grant_service_ticket(&ctx, pgt, target, false).await?;

    Ok(Json(GrantOutput {
        proxy_ticket: proxy_ticket.to_string(),
    }))
}

#[cfg(test)]
mod spec {
    use http::StatusCode;

    use crate::api::spec::{app, json, login, request, send};

    const PROXY: &str = "https://proxy.example.com";
    const BACKEND: &str = "https://backend.example.com";

    async fn proxy_granting_ticket(app: &axum::Router) -> (String, String) {
        let (cookie, st) = login(app, PROXY).await;

        let response = send(
            app,
            request(
                http::Method::POST,
                &format!("/proxy?ticket={st}&service={PROXY}"),
                "127.0.0.1",
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["user"], "casuser");

        (cookie, body["proxyGrantingTicket"].as_str().unwrap().to_owned())
    }

    #[tokio::test]
    async fn proxies_authentication() {
        let app = app();
        let (_, pgt) = proxy_granting_ticket(&app).await;
        assert!(pgt.starts_with("PGT-"));

        let response = send(
            &app,
            request(
                http::Method::GET,
                &format!("/proxy?pgt={pgt}&targetService={BACKEND}"),
                "127.0.0.1",
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let pt = json(response).await["proxyTicket"]
            .as_str()
            .unwrap()
            .to_owned();

        let response = send(
            &app,
            request(
                http::Method::GET,
                &format!("/serviceValidate?ticket={pt}&service={BACKEND}"),
                "127.0.0.1",
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["user"], "casuser");
        assert_eq!(body["fromNewLogin"], false);
        assert_eq!(body["proxies"], serde_json::json!([PROXY]));
        assert_eq!(body["authentications"][1]["principal"], PROXY);
    }

    #[tokio::test]
    async fn rejects_non_proxy_granting_ticket() {
        let app = app();
        let (_, st) = login(&app, PROXY).await;

        let response = send(
            &app,
            request(
                http::Method::GET,
                &format!("/proxy?pgt={st}&targetService={BACKEND}"),
                "127.0.0.1",
            ),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["code"], "INVALID_TICKET_SPEC");
    }

    #[tokio::test]
    async fn logout_revokes_proxy_granting_tickets() {
        let app = app();
        let (cookie, pgt) = proxy_granting_ticket(&app).await;

        let response = send(
            &app,
            request(http::Method::POST, "/logout", "127.0.0.1")
                .header(http::header::COOKIE, &cookie),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(
            &app,
            request(
                http::Method::GET,
                &format!("/proxy?pgt={pgt}&targetService={BACKEND}"),
                "127.0.0.1",
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(response).await["code"], "INVALID_TICKET");
    }
}
