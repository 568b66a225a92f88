//! [`Command`] definition.

pub mod add_ticket;
pub mod authorize_session_cookie;
pub mod create_proxy_granting_ticket;
pub mod create_ticket_granting_ticket;
pub mod delete_ticket;
pub mod grant_service_ticket;
pub mod validate_service_ticket;

use common::operations::{By, Delete, Insert};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{
        ticket::{self, Kind},
        Ticket,
    },
    infra::{registry, Backend},
    Service,
};

/// [`Command`] of the [`Service`].
pub use common::Handler as Command;

pub use self::{
    add_ticket::AddTicket, authorize_session_cookie::AuthorizeSessionCookie,
    create_proxy_granting_ticket::CreateProxyGrantingTicket,
    create_ticket_granting_ticket::CreateTicketGrantingTicket,
    delete_ticket::DeleteTicket, grant_service_ticket::GrantServiceTicket,
    validate_service_ticket::ValidateServiceTicket,
};

/// Maximum number of attempts to store a [`Ticket`] with a freshly generated
/// ID.
const MAX_ID_ATTEMPTS: usize = 3;

impl<Reg: Backend> Service<Reg> {
    /// Stores a new [`Ticket`] made by the provided function out of a freshly
    /// generated ID of the provided [`Kind`].
    ///
    /// Colliding IDs are regenerated up to [`MAX_ID_ATTEMPTS`] times.
    async fn insert_fresh<T>(
        &self,
        kind: Kind,
        mut make: impl FnMut(ticket::Id) -> T,
    ) -> Result<T, Traced<registry::Error>>
    where
        T: Clone + Into<Ticket>,
    {
        let mut attempt = 1;
        loop {
            let ticket = make(self.ids.generate(kind));
            match self.registry().execute(Insert(ticket.clone().into())).await {
                Ok(()) => return Ok(ticket),
                Err(e) if e.as_ref().is_duplicate() && attempt < MAX_ID_ATTEMPTS => {
                    log::warn!("regenerating `{kind}` ticket ID: {e}");
                    attempt += 1;
                }
                Err(e) => return Err(e).map_err(tracerr::wrap!()),
            }
        }
    }

    /// Removes the [`Ticket`] with the provided ID without cascading, only
    /// logging a failure.
    async fn discard(&self, id: &ticket::Id) {
        if let Err(e) = self
            .registry()
            .execute(Delete(By::<Option<Ticket>, _>::new(id.clone())))
            .await
        {
            log::warn!("failed to discard `Ticket(id: {id})`: {e}");
        }
    }
}
