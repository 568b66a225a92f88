//! [`Command`] for creating a root [`TicketGrantingTicket`].

use common::DateTime;
use derive_more::{Display, Error, From};
use tracerr::Traced;
use tracing as log;

use crate::{
    cookie::{self, ClientInfo},
    domain::{
        ticket::{Kind, TicketGrantingTicket},
        Authentication,
    },
    infra::{registry, Backend},
    Service,
};

use super::Command;

/// [`Command`] for creating a root [`TicketGrantingTicket`] on a successful
/// primary authentication, along with the session cookie value referring to
/// it.
#[derive(Clone, Debug)]
pub struct CreateTicketGrantingTicket {
    /// [`Authentication`] to create a [`TicketGrantingTicket`] for.
    pub authentication: Authentication,

    /// [`ClientInfo`] to pin the session cookie to.
    pub client: Option<ClientInfo>,
}

/// Output of [`CreateTicketGrantingTicket`] [`Command`].
#[derive(Clone, Debug)]
pub struct Output {
    /// Created [`TicketGrantingTicket`].
    pub ticket_granting_ticket: TicketGrantingTicket,

    /// Session cookie value referring to the created
    /// [`TicketGrantingTicket`].
    pub cookie: String,
}

impl<Reg> Command<CreateTicketGrantingTicket> for Service<Reg>
where
    Reg: Backend,
{
    type Ok = Output;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: CreateTicketGrantingTicket,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CreateTicketGrantingTicket {
            authentication,
            client,
        } = cmd;

        let policy = self.config().ticket_granting_ticket_expiration;
        let now = DateTime::now();
        let tgt = self
            .insert_fresh(Kind::TicketGranting, |id| {
                TicketGrantingTicket::new(
                    id,
                    authentication.clone(),
                    None,
                    policy,
                    now,
                )
            })
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        let cookie = match self
            .cookies()
            .build_cookie_value(tgt.id().as_ref(), client.as_ref())
        {
            Ok(c) => c,
            Err(e) => {
                self.discard(tgt.id()).await;
                return Err(tracerr::new!(E::Cookie(e)));
            }
        };

        log::info!(
            "issued `TicketGrantingTicket(id: {})` for `{}`",
            tgt.id(),
            tgt.authentication().principal.id,
        );
        Ok(Output {
            ticket_granting_ticket: tgt,
            cookie,
        })
    }
}

/// Error of [`CreateTicketGrantingTicket`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Registry`] error.
    ///
    /// [`Registry`]: crate::infra::Registry
    #[display("`Registry` operation failed: {_0}")]
    Registry(registry::Error),

    /// Session cookie value cannot be built.
    #[display("Failed to build session cookie: {_0}")]
    Cookie(cookie::BuildError),
}
