//! [`Command`] for authorizing a session cookie.

use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    cookie::{ClientInfo, InvalidCookie},
    domain::ticket::{InvalidTicket, TicketGrantingTicket},
    infra::{registry, Backend},
    query::{get_ticket, GetTicket},
    Service,
};

use super::Command;

/// [`Command`] for resolving a valid [`TicketGrantingTicket`] out of the
/// session cookie presented by the provided client.
#[derive(Clone, Debug)]
pub struct AuthorizeSessionCookie {
    /// Presented session cookie value.
    pub cookie: String,

    /// [`ClientInfo`] of the client presenting the cookie.
    pub client: Option<ClientInfo>,
}

impl<Reg> Command<AuthorizeSessionCookie> for Service<Reg>
where
    Reg: Backend,
{
    type Ok = TicketGrantingTicket;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: AuthorizeSessionCookie,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let AuthorizeSessionCookie { cookie, client } = cmd;

        let id = self
            .cookies()
            .obtain_cookie_value(&cookie, client.as_ref())
            .map_err(tracerr::from_and_wrap!(=> E))?;

        self.execute(GetTicket::<TicketGrantingTicket>::new(id))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
    }
}

/// Error of [`AuthorizeSessionCookie`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Registry`] error.
    ///
    /// [`Registry`]: crate::infra::Registry
    #[display("`Registry` operation failed: {_0}")]
    Registry(registry::Error),

    /// Session cookie is rejected.
    #[display("{_0}")]
    InvalidCookie(InvalidCookie),

    /// [`TicketGrantingTicket`] referred by the session cookie cannot be used.
    #[display("{_0}")]
    InvalidTicket(InvalidTicket),
}

impl From<get_ticket::ExecutionError> for ExecutionError {
    fn from(e: get_ticket::ExecutionError) -> Self {
        match e {
            get_ticket::ExecutionError::Registry(e) => Self::Registry(e),
            get_ticket::ExecutionError::InvalidTicket(e) => {
                Self::InvalidTicket(e)
            }
        }
    }
}

#[cfg(all(test, feature = "memory"))]
mod spec {
    use std::net::{IpAddr, Ipv4Addr};

    use crate::{
        command::{CreateTicketGrantingTicket, DeleteTicket},
        cookie::ClientInfo,
        testing, Command as _,
    };

    use super::{AuthorizeSessionCookie, ExecutionError};

    async fn login(service: &testing::Service) -> String {
        service
            .execute(CreateTicketGrantingTicket {
                authentication: testing::authentication("casuser"),
                client: Some(testing::client()),
            })
            .await
            .unwrap()
            .cookie
    }

    #[tokio::test]
    async fn authorizes_same_client() {
        let service = testing::service();
        let cookie = login(&service).await;

        let tgt = service
            .execute(AuthorizeSessionCookie {
                cookie,
                client: Some(testing::client()),
            })
            .await
            .unwrap();

        assert_eq!(tgt.authentication().principal.id.to_string(), "casuser");
    }

    #[tokio::test]
    async fn rejects_another_client() {
        let service = testing::service();
        let cookie = login(&service).await;

        let err = service
            .execute(AuthorizeSessionCookie {
                cookie,
                client: Some(ClientInfo::new(
                    IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                    "Test-Client/1.0.0",
                )),
            })
            .await
            .unwrap_err();

        assert!(matches!(err.as_ref(), ExecutionError::InvalidCookie(_)));
    }

    #[tokio::test]
    async fn rejects_after_logout() {
        let service = testing::service();
        let cookie = login(&service).await;
        let tgt = service
            .execute(AuthorizeSessionCookie {
                cookie: cookie.clone(),
                client: Some(testing::client()),
            })
            .await
            .unwrap();
        drop(
            service
                .execute(DeleteTicket {
                    id: tgt.id().clone(),
                })
                .await
                .unwrap(),
        );

        let err = service
            .execute(AuthorizeSessionCookie {
                cookie,
                client: Some(testing::client()),
            })
            .await
            .unwrap_err();

        assert!(matches!(err.as_ref(), ExecutionError::InvalidTicket(_)));
    }
}
