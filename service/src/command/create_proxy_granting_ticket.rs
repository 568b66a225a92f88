//! [`Command`] for creating a proxy-granting [`TicketGrantingTicket`].

use common::DateTime;
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{
        service,
        ticket::{
            self, granting::ProxiedBy, InvalidReason, InvalidTicket, Kind,
            TicketGrantingTicket,
        },
        Authentication, Ticket,
    },
    infra::Backend,
    Service,
};

pub use crate::query::get_ticket::ExecutionError;

use super::{validate_service_ticket::Assertion, Command, ValidateServiceTicket};

/// [`Command`] for creating a child [`TicketGrantingTicket`] on behalf of a
/// proxying service, out of a [`ServiceTicket`] validated by it.
///
/// The validated [`ServiceTicket`] is consumed, and the created
/// [`TicketGrantingTicket`] descends from the one granted it.
///
/// [`ServiceTicket`]: ticket::ServiceTicket
#[derive(Clone, Debug)]
pub struct CreateProxyGrantingTicket {
    /// ID of the [`ServiceTicket`] presented by the proxying service.
    ///
    /// [`ServiceTicket`]: ticket::ServiceTicket
    pub service_ticket: ticket::Id,

    /// Proxying service.
    pub service: service::Id,

    /// [`Authentication`] of the proxying service itself.
    pub authentication: Authentication,
}

/// Output of [`CreateProxyGrantingTicket`] [`Command`].
#[derive(Clone, Debug)]
pub struct Output {
    /// Created proxy-granting [`TicketGrantingTicket`].
    pub proxy_granting_ticket: TicketGrantingTicket,

    /// [`Assertion`] of the consumed [`ServiceTicket`].
    ///
    /// [`ServiceTicket`]: ticket::ServiceTicket
    pub assertion: Assertion,
}

impl<Reg> Command<CreateProxyGrantingTicket> for Service<Reg>
where
    Reg: Backend,
{
    type Ok = Output;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: CreateProxyGrantingTicket,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CreateProxyGrantingTicket {
            service_ticket,
            service,
            authentication,
        } = cmd;

        let assertion = self
            .execute(ValidateServiceTicket {
                service_ticket,
                service: service.clone(),
            })
            .await
            .map_err(tracerr::wrap!())?;
        let parent = assertion.service_ticket.ticket_granting_ticket().clone();

        let policy = self.config().proxy_granting_ticket_expiration;
        let now = DateTime::now();
        let pgt = self
            .insert_fresh(Kind::ProxyGranting, |id| {
                TicketGrantingTicket::new(
                    id,
                    authentication.clone(),
                    Some(ProxiedBy {
                        ticket_granting_ticket: parent.clone(),
                        service: service.clone(),
                    }),
                    policy,
                    now,
                )
            })
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        let tracked = self
            .registry()
            .modify(parent.clone(), |t| match t {
                Ticket::Granting(t) if !t.is_expired(now) => {
                    t.track_proxy_granting_ticket(pgt.id().clone());
                    true
                }
                Ticket::Granting(_) | Ticket::Service(_) => false,
            })
            .await;
        match tracked {
            Ok(Some(true)) => {}
            Ok(Some(false) | None) => {
                self.discard(pgt.id()).await;
                return Err(tracerr::new!(E::InvalidTicket(InvalidTicket::new(
                    parent,
                    InvalidReason::Expired,
                ))));
            }
            Err(e) => {
                self.discard(pgt.id()).await;
                return Err(e).map_err(tracerr::map_from_and_wrap!(=> E));
            }
        }

        log::info!(
            "issued `TicketGrantingTicket(id: {})` to `{service}` proxying \
             `TicketGrantingTicket(id: {parent})`",
            pgt.id(),
        );
        Ok(Output {
            proxy_granting_ticket: pgt,
            assertion,
        })
    }
}
