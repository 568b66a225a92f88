//! Logout endpoint.

use axum::Json;
use axum_extra::extract::CookieJar;
use serde::Serialize;
use service::{command, Command as _};
use tracing as log;

use crate::{AsError, Context, Error};

/// Response of a logout request.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct LogoutOutput {
    /// Number of tickets removed along with the session.
    pub removed: usize,
}

/// Destroys the SSO session of the request (if any) along with all the
/// tickets it has issued, and removes the session cookie.
///
/// # Errors
///
/// If some of the tickets could not be removed.
#[tracing::instrument(skip_all, fields(http.handler = "logout"))]
pub async fn logout(
    ctx: Context,
) -> Result<(CookieJar, Json<LogoutOutput>), Error> {
    let removed = match ctx.current_session().await {
        Ok(tgt) => ctx
            .service()
            .execute(command::DeleteTicket {
                id: tgt.id().clone(),
            })
            .await
            .map_err(AsError::into_error)?,
        Err(e) => {
            log::debug!("no session to destroy: {e}");
            0
        }
    };

    Ok((ctx.remove_session_cookie(), Json(LogoutOutput { removed })))
}

impl AsError for command::delete_ticket::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        None
    }
}

impl AsError for command::authorize_session_cookie::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Registry(e) => e.try_as_error(),
            Self::InvalidCookie(e) => e.try_as_error(),
            Self::InvalidTicket(e) => e.try_as_error(),
        }
    }
}
