//! [`TicketGrantingTicket`] definitions.

use std::collections::{BTreeMap, BTreeSet};

use common::{unit, DateTime, DateTimeOf};
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};

use crate::domain::{service, Authentication};

#[cfg(doc)]
use super::Ticket;
use super::{ExpirationPolicy, Id, ServiceTicket, SessionTrackingPolicy, State};

/// Long-lived [`Ticket`] issued on successful authentication, granting
/// [`ServiceTicket`]s and, being proxied, child [`TicketGrantingTicket`]s.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TicketGrantingTicket {
    /// ID of this [`TicketGrantingTicket`].
    id: Id,

    /// [`Authentication`] this [`TicketGrantingTicket`] was issued for.
    authentication: Authentication,

    /// Parent of this [`TicketGrantingTicket`], if it was issued on behalf of
    /// a proxying service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    proxied_by: Option<ProxiedBy>,

    /// Outstanding [`ServiceTicket`]s granted by this
    /// [`TicketGrantingTicket`].
    #[serde(default)]
    services: Services,

    /// Child [`TicketGrantingTicket`]s issued on behalf of proxying
    /// services.
    #[serde(default)]
    proxy_granting_tickets: BTreeSet<Id>,

    /// [`ExpirationPolicy`] of this [`TicketGrantingTicket`].
    expiration_policy: ExpirationPolicy,

    /// [`State`] of this [`TicketGrantingTicket`].
    state: State,
}

impl TicketGrantingTicket {
    /// Creates a new [`TicketGrantingTicket`].
    ///
    /// A root [`TicketGrantingTicket`] is created when no [`ProxiedBy`] is
    /// provided. The parent is set only here and never reassigned, which
    /// keeps the hierarchy acyclic.
    #[must_use]
    pub fn new(
        id: Id,
        authentication: Authentication,
        proxied_by: Option<ProxiedBy>,
        expiration_policy: ExpirationPolicy,
        now: DateTime,
    ) -> Self {
        Self {
            id,
            authentication,
            proxied_by,
            services: Services::new(),
            proxy_granting_tickets: BTreeSet::new(),
            expiration_policy,
            state: State::new(now),
        }
    }

    /// Creates a new [`TicketGrantingTicket`] out of a possibly absent
    /// [`Authentication`].
    ///
    /// # Errors
    ///
    /// With [`InvalidArgument`] if no [`Authentication`] is provided.
    pub fn try_new(
        id: Id,
        authentication: Option<Authentication>,
        proxied_by: Option<ProxiedBy>,
        expiration_policy: ExpirationPolicy,
        now: DateTime,
    ) -> Result<Self, InvalidArgument> {
        let authentication = authentication
            .ok_or(InvalidArgument("`Authentication` is required"))?;
        Ok(Self::new(id, authentication, proxied_by, expiration_policy, now))
    }

    /// Returns ID of this [`TicketGrantingTicket`].
    #[must_use]
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Returns [`Authentication`] of this [`TicketGrantingTicket`].
    #[must_use]
    pub fn authentication(&self) -> &Authentication {
        &self.authentication
    }

    /// Returns [`ProxiedBy`] parent of this [`TicketGrantingTicket`], if any.
    #[must_use]
    pub fn proxied_by(&self) -> Option<&ProxiedBy> {
        self.proxied_by.as_ref()
    }

    /// Returns ID of the parent [`TicketGrantingTicket`], if any.
    #[must_use]
    pub fn parent_id(&self) -> Option<&Id> {
        self.proxied_by.as_ref().map(|p| &p.ticket_granting_ticket)
    }

    /// Indicates whether this [`TicketGrantingTicket`] has no parent.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.proxied_by.is_none()
    }

    /// Returns [`State`] of this [`TicketGrantingTicket`].
    #[must_use]
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Returns [`ExpirationPolicy`] of this [`TicketGrantingTicket`].
    #[must_use]
    pub fn expiration_policy(&self) -> &ExpirationPolicy {
        &self.expiration_policy
    }

    /// Checks whether this [`TicketGrantingTicket`] is expired at the
    /// provided moment.
    #[must_use]
    pub fn is_expired(&self, now: DateTime) -> bool {
        self.state.is_marked_expired()
            || self.expiration_policy.is_expired(&self.state, now)
    }

    /// Marks this [`TicketGrantingTicket`] as expired, irreversibly.
    pub fn mark_expired(&mut self) {
        self.state.mark_expired();
    }

    /// Returns outstanding [`ServiceTicket`]s granted by this
    /// [`TicketGrantingTicket`].
    #[must_use]
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Stops tracking all the outstanding [`ServiceTicket`]s.
    ///
    /// Doesn't affect expiration of this [`TicketGrantingTicket`].
    pub fn remove_all_services(&mut self) -> Services {
        std::mem::take(&mut self.services)
    }

    /// Stops tracking the [`ServiceTicket`] with the provided ID.
    pub fn remove_service(&mut self, id: &Id) -> Option<ServiceSession> {
        self.services.remove(id)
    }

    /// Returns IDs of the child [`TicketGrantingTicket`]s issued on behalf of
    /// proxying services.
    #[must_use]
    pub fn proxy_granting_tickets(&self) -> &BTreeSet<Id> {
        &self.proxy_granting_tickets
    }

    /// Remembers a child [`TicketGrantingTicket`] issued on behalf of a
    /// proxying service.
    pub fn track_proxy_granting_ticket(&mut self, id: Id) {
        _ = self.proxy_granting_tickets.insert(id);
    }

    /// Forgets a child [`TicketGrantingTicket`].
    pub fn untrack_proxy_granting_ticket(&mut self, id: &Id) {
        _ = self.proxy_granting_tickets.remove(id);
    }

    /// Grants a new [`ServiceTicket`] for the provided service.
    ///
    /// The granted [`ServiceTicket`] is [`ServiceTicket::is_from_new_login`]
    /// if the `credentials_provided` in the current transaction, or if no
    /// [`ServiceTicket`]s have been granted before.
    ///
    /// The provided [`SessionTrackingPolicy`] decides which of already
    /// tracked [`ServiceTicket`]s are replaced by the new one.
    pub fn grant_service_ticket<P>(
        &mut self,
        id: Id,
        service: service::Id,
        expiration_policy: ExpirationPolicy,
        credentials_provided: bool,
        tracking_policy: &P,
        now: DateTime,
    ) -> Granted
    where
        P: SessionTrackingPolicy + ?Sized,
    {
        let from_new_login = credentials_provided || self.services.is_empty();

        let untracked = tracking_policy
            .apply(&self.services, &service)
            .into_iter()
            .filter(|old| self.services.remove(old).is_some())
            .collect();

        _ = self.services.insert(
            id.clone(),
            ServiceSession {
                service: service.clone(),
                registered_at: now.coerce(),
            },
        );
        self.state.record_usage(now);

        Granted {
            ticket: ServiceTicket::new(
                id,
                service,
                self.id.clone(),
                from_new_login,
                expiration_policy,
                now,
            ),
            untracked,
        }
    }
}

/// Outcome of [`TicketGrantingTicket::grant_service_ticket()`].
#[derive(Clone, Debug)]
pub struct Granted {
    /// Newly granted [`ServiceTicket`].
    pub ticket: ServiceTicket,

    /// IDs of the previously tracked [`ServiceTicket`]s replaced by the new
    /// one.
    pub untracked: Vec<Id>,
}

/// Parent of a proxied [`TicketGrantingTicket`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ProxiedBy {
    /// ID of the parent [`TicketGrantingTicket`].
    pub ticket_granting_ticket: Id,

    /// Service the child [`TicketGrantingTicket`] was issued on behalf of.
    pub service: service::Id,
}

/// Outstanding [`ServiceTicket`]s of a [`TicketGrantingTicket`], by their
/// IDs.
pub type Services = BTreeMap<Id, ServiceSession>;

/// Record of a [`ServiceTicket`] tracked by a [`TicketGrantingTicket`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ServiceSession {
    /// Service the [`ServiceTicket`] was granted for.
    pub service: service::Id,

    /// [`DateTimeOf`] when the [`ServiceTicket`] was granted.
    #[serde(with = "common::datetime::serde::rfc3339")]
    pub registered_at: RegistrationDateTime,
}

/// [`DateTimeOf`] when a [`ServiceSession`] was registered.
pub type RegistrationDateTime =
    DateTimeOf<(ServiceSession, unit::Registration)>;

/// Resolved ancestry of a [`TicketGrantingTicket`].
///
/// Built from a leaf by walking parent IDs until reaching the root:
/// ```rust,ignore
/// let mut chain = Chain::new(leaf);
/// while let Some(id) = chain.missing_parent().cloned() {
///     chain.push_parent(lookup(&id)?)?;
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Chain {
    /// [`TicketGrantingTicket`]s of this [`Chain`], leaf first.
    links: Vec<TicketGrantingTicket>,
}

impl Chain {
    /// Starts a new [`Chain`] from the provided leaf.
    #[must_use]
    pub fn new(leaf: TicketGrantingTicket) -> Self {
        Self { links: vec![leaf] }
    }

    /// Returns ID of the next parent to resolve, if the root is not reached
    /// yet.
    #[must_use]
    pub fn missing_parent(&self) -> Option<&Id> {
        self.top().parent_id()
    }

    /// Appends the resolved parent to this [`Chain`].
    ///
    /// # Errors
    ///
    /// If the provided [`TicketGrantingTicket`] is not the one
    /// [`Chain::missing_parent()`] refers to.
    pub fn push_parent(
        &mut self,
        parent: TicketGrantingTicket,
    ) -> Result<(), BrokenChain> {
        if self.missing_parent() != Some(&parent.id) {
            return Err(BrokenChain(parent.id));
        }
        self.links.push(parent);
        Ok(())
    }

    /// Indicates whether this [`Chain`] is resolved up to its root.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing_parent().is_none()
    }

    /// Returns the root [`TicketGrantingTicket`] of this [`Chain`].
    ///
    /// Returns the leaf itself if it has no parent.
    ///
    /// # Errors
    ///
    /// If this [`Chain`] is not [`Chain::is_complete()`].
    pub fn root(&self) -> Result<&TicketGrantingTicket, BrokenChain> {
        let top = self.top();
        if top.is_root() {
            Ok(top)
        } else {
            Err(BrokenChain(top.id.clone()))
        }
    }

    /// Returns the leaf [`TicketGrantingTicket`] of this [`Chain`].
    #[must_use]
    pub fn leaf(&self) -> &TicketGrantingTicket {
        &self.links[0]
    }

    /// Returns number of parent links between the leaf and the top of this
    /// [`Chain`].
    #[must_use]
    pub fn depth(&self) -> usize {
        self.links.len() - 1
    }

    /// Iterates over the resolved [`TicketGrantingTicket`]s of this
    /// [`Chain`], leaf first.
    pub fn iter(&self) -> impl Iterator<Item = &TicketGrantingTicket> {
        self.links.iter()
    }

    /// Returns [`Authentication`]s of this [`Chain`], root first, ending with
    /// the leaf's one.
    #[must_use]
    pub fn authentications(&self) -> Vec<&Authentication> {
        self.links.iter().rev().map(|t| &t.authentication).collect()
    }

    /// Returns [`Authentication`] of the top-most resolved
    /// [`TicketGrantingTicket`], being the primary one for a complete
    /// [`Chain`].
    #[must_use]
    pub fn primary_authentication(&self) -> &Authentication {
        &self.top().authentication
    }

    /// Returns the top-most resolved [`TicketGrantingTicket`].
    fn top(&self) -> &TicketGrantingTicket {
        self.links.last().unwrap_or_else(|| unreachable!("never empty"))
    }
}

/// Error of constructing a [`TicketGrantingTicket`] out of invalid
/// arguments.
#[derive(Clone, Copy, Debug, Display, Error)]
#[display("Invalid argument: {_0}")]
pub struct InvalidArgument(#[error(not(source))] pub &'static str);

/// Error of a [`Chain`] with a missing or mismatched parent.
#[derive(Clone, Debug, Display, Error)]
#[display("`TicketGrantingTicket(id: {_0})` breaks the chain")]
pub struct BrokenChain(#[error(not(source))] pub Id);
