//! [`ServiceTicket`] definitions.

use common::DateTime;
use serde::{Deserialize, Serialize};

#[cfg(doc)]
use super::TicketGrantingTicket;
use super::{ExpirationPolicy, Id, State};
use crate::domain::service::{self, Matcher};

/// Short-lived [`Ticket`] granted by a [`TicketGrantingTicket`] for a single
/// service, intended to be validated (and so consumed) once.
///
/// [`Ticket`]: super::Ticket
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ServiceTicket {
    /// ID of this [`ServiceTicket`].
    id: Id,

    /// Service this [`ServiceTicket`] was granted for.
    service: service::Id,

    /// ID of the [`TicketGrantingTicket`] owning this [`ServiceTicket`].
    ticket_granting_ticket: Id,

    /// Indicator whether this [`ServiceTicket`] was granted in the same
    /// transaction the user has provided credentials in.
    from_new_login: bool,

    /// [`ExpirationPolicy`] of this [`ServiceTicket`].
    expiration_policy: ExpirationPolicy,

    /// [`State`] of this [`ServiceTicket`].
    state: State,
}

impl ServiceTicket {
    /// Creates a new [`ServiceTicket`].
    ///
    /// Use [`TicketGrantingTicket::grant_service_ticket()`] instead, so the
    /// granting [`TicketGrantingTicket`] tracks it.
    pub(crate) fn new(
        id: Id,
        service: service::Id,
        ticket_granting_ticket: Id,
        from_new_login: bool,
        expiration_policy: ExpirationPolicy,
        now: DateTime,
    ) -> Self {
        Self {
            id,
            service,
            ticket_granting_ticket,
            from_new_login,
            expiration_policy,
            state: State::new(now),
        }
    }

    /// Returns ID of this [`ServiceTicket`].
    #[must_use]
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Returns the service this [`ServiceTicket`] was granted for.
    #[must_use]
    pub fn service(&self) -> &service::Id {
        &self.service
    }

    /// Returns ID of the [`TicketGrantingTicket`] owning this
    /// [`ServiceTicket`].
    #[must_use]
    pub fn ticket_granting_ticket(&self) -> &Id {
        &self.ticket_granting_ticket
    }

    /// Indicates whether this [`ServiceTicket`] was granted in the same
    /// transaction the user has provided credentials in, rather than by
    /// reusing an existing SSO session.
    #[must_use]
    pub fn is_from_new_login(&self) -> bool {
        self.from_new_login
    }

    /// Returns [`State`] of this [`ServiceTicket`].
    #[must_use]
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Checks whether this [`ServiceTicket`] is expired at the provided
    /// moment.
    #[must_use]
    pub fn is_expired(&self, now: DateTime) -> bool {
        self.state.is_marked_expired()
            || self.expiration_policy.is_expired(&self.state, now)
    }

    /// Marks this [`ServiceTicket`] as expired, irreversibly.
    pub fn mark_expired(&mut self) {
        self.state.mark_expired();
    }

    /// Checks whether this [`ServiceTicket`] may be validated by the provided
    /// service.
    #[must_use]
    pub fn is_valid_for<M>(&self, service: &service::Id, matcher: &M) -> bool
    where
        M: Matcher + ?Sized,
    {
        matcher.matches(&self.service, service)
    }

    /// Records a validation of this [`ServiceTicket`] at the provided moment.
    pub fn record_usage(&mut self, now: DateTime) {
        self.state.record_usage(now);
    }
}
