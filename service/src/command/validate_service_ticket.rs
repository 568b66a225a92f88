//! [`Command`] for validating a [`ServiceTicket`].

use std::sync::Arc;

use common::DateTime;
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{
        service,
        ticket::{
            self, Chain, InvalidReason, InvalidTicket, ServiceTicket,
            Variant as _,
        },
        Authentication, Ticket,
    },
    infra::Backend,
    query::{GetTicket, ResolveChain},
    Service,
};

pub use crate::query::get_ticket::ExecutionError;

use super::Command;

/// [`Command`] for validating a [`ServiceTicket`] presented by a service.
///
/// Every validation counts as a usage, so a [`ServiceTicket`] exhausting its
/// [`ExpirationPolicy`] is removed right away. A [`ServiceTicket`] presented
/// by another service is invalidated.
///
/// [`ExpirationPolicy`]: ticket::ExpirationPolicy
#[derive(Clone, Debug)]
pub struct ValidateServiceTicket {
    /// ID of the [`ServiceTicket`] to validate.
    pub service_ticket: ticket::Id,

    /// Service presenting the [`ServiceTicket`].
    pub service: service::Id,
}

/// Successful [`ServiceTicket`] validation outcome.
#[derive(Clone, Debug)]
pub struct Assertion {
    /// Validated [`ServiceTicket`].
    pub service_ticket: ServiceTicket,

    /// Resolved [`Chain`] of the [`TicketGrantingTicket`] the
    /// [`ServiceTicket`] was granted by.
    ///
    /// [`TicketGrantingTicket`]: ticket::TicketGrantingTicket
    pub chain: Chain,
}

impl Assertion {
    /// Returns the [`Authentication`] of the root of the [`Chain`].
    #[must_use]
    pub fn primary_authentication(&self) -> &Authentication {
        self.chain.primary_authentication()
    }

    /// Returns all the [`Authentication`]s of the [`Chain`], root first.
    #[must_use]
    pub fn chained_authentications(&self) -> Vec<&Authentication> {
        self.chain.authentications()
    }

    /// Indicates whether the [`ServiceTicket`] was granted right after
    /// providing credentials.
    #[must_use]
    pub fn is_from_new_login(&self) -> bool {
        self.service_ticket.is_from_new_login()
    }
}

impl<Reg> Command<ValidateServiceTicket> for Service<Reg>
where
    Reg: Backend,
{
    type Ok = Assertion;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: ValidateServiceTicket,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let ValidateServiceTicket {
            service_ticket: id,
            service,
        } = cmd;

        drop(
            self.execute(GetTicket::<ServiceTicket>::new(id.clone()))
                .await
                .map_err(tracerr::wrap!())?,
        );

        let matcher = Arc::clone(&self.matcher);
        let now = DateTime::now();
        let validated = self
            .registry()
            .modify(id.clone(), |t| match t {
                Ticket::Service(st) if st.is_expired(now) => {
                    Err(InvalidReason::Expired)
                }
                Ticket::Service(st)
                    if !st.is_valid_for(&service, &*matcher) =>
                {
                    st.mark_expired();
                    Err(InvalidReason::ServiceMismatch)
                }
                Ticket::Service(st) => {
                    st.record_usage(now);
                    Ok(st.clone())
                }
                Ticket::Granting(_) => {
                    Err(InvalidReason::WrongType(ServiceTicket::NAME))
                }
            })
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .unwrap_or(Err(InvalidReason::NotFound));

        let consumed = match &validated {
            Ok(st) => st.is_expired(now),
            Err(reason) => matches!(
                reason,
                InvalidReason::Expired | InvalidReason::ServiceMismatch,
            ),
        };
        if consumed {
            self.discard(&id).await;
        }
        let st = validated.map_err(|reason| {
            log::debug!("`{service}` failed to validate `ServiceTicket(id: {id})`: {reason}");
            tracerr::new!(E::InvalidTicket(InvalidTicket::new(
                id.clone(),
                reason,
            )))
        })?;

        let chain = self
            .execute(ResolveChain {
                ticket_granting_ticket: st.ticket_granting_ticket().clone(),
            })
            .await
            .map_err(tracerr::wrap!())?;

        log::info!("`{service}` validated `ServiceTicket(id: {id})`");
        Ok(Assertion {
            service_ticket: st,
            chain,
        })
    }
}
