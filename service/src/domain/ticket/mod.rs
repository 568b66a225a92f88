//! [`Ticket`] definitions.

pub mod expiration;
pub mod granting;
pub mod service;
pub mod tracking;

use std::sync::atomic::{self, AtomicU64};

use common::{unit, DateTime, DateTimeOf};
use derive_more::{AsRef, Display, Error, From, Into};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use uuid::Uuid;

pub use self::{
    expiration::ExpirationPolicy,
    granting::{Chain, TicketGrantingTicket},
    service::ServiceTicket,
    tracking::SessionTrackingPolicy,
};

/// Capability issued by the SSO server.
#[derive(Clone, Debug, Deserialize, Eq, From, PartialEq, Serialize)]
#[serde(tag = "@type")]
pub enum Ticket {
    /// Long-lived [`TicketGrantingTicket`].
    #[serde(rename = "TicketGrantingTicket")]
    Granting(TicketGrantingTicket),

    /// Short-lived [`ServiceTicket`].
    #[serde(rename = "ServiceTicket")]
    Service(ServiceTicket),
}

impl Ticket {
    /// Returns [`Id`] of this [`Ticket`].
    #[must_use]
    pub fn id(&self) -> &Id {
        match self {
            Self::Granting(t) => t.id(),
            Self::Service(t) => t.id(),
        }
    }

    /// Returns [`State`] of this [`Ticket`].
    #[must_use]
    pub fn state(&self) -> &State {
        match self {
            Self::Granting(t) => t.state(),
            Self::Service(t) => t.state(),
        }
    }

    /// Returns [`Id`] of the [`TicketGrantingTicket`] this [`Ticket`] was
    /// issued by, if any.
    #[must_use]
    pub fn parent_id(&self) -> Option<&Id> {
        match self {
            Self::Granting(t) => t.parent_id(),
            Self::Service(t) => Some(t.ticket_granting_ticket()),
        }
    }

    /// Checks whether this [`Ticket`] is expired at the provided moment.
    ///
    /// Once marked as expired, a [`Ticket`] stays expired forever.
    #[must_use]
    pub fn is_expired(&self, now: DateTime) -> bool {
        match self {
            Self::Granting(t) => t.is_expired(now),
            Self::Service(t) => t.is_expired(now),
        }
    }

    /// Marks this [`Ticket`] as expired, irreversibly.
    pub fn mark_expired(&mut self) {
        match self {
            Self::Granting(t) => t.mark_expired(),
            Self::Service(t) => t.mark_expired(),
        }
    }

    /// Returns the name of this [`Ticket`] type, as used in its persisted
    /// representation.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Granting(_) => TicketGrantingTicket::NAME,
            Self::Service(_) => ServiceTicket::NAME,
        }
    }
}

impl TryFrom<Ticket> for TicketGrantingTicket {
    type Error = Ticket;

    fn try_from(ticket: Ticket) -> Result<Self, Self::Error> {
        match ticket {
            Ticket::Granting(t) => Ok(t),
            t @ Ticket::Service(_) => Err(t),
        }
    }
}

impl TryFrom<Ticket> for ServiceTicket {
    type Error = Ticket;

    fn try_from(ticket: Ticket) -> Result<Self, Self::Error> {
        match ticket {
            Ticket::Service(t) => Ok(t),
            t @ Ticket::Granting(_) => Err(t),
        }
    }
}

/// Type of a [`Ticket`] it may be narrowed to.
pub trait Variant: Sized {
    /// Name of this [`Variant`], as used in the persisted representation.
    const NAME: &'static str;

    /// Narrows the provided [`Ticket`] to this [`Variant`].
    ///
    /// # Errors
    ///
    /// Returns the provided [`Ticket`] back if it's not of this [`Variant`].
    fn narrow(ticket: Ticket) -> Result<Self, Ticket>;
}

impl Variant for Ticket {
    const NAME: &'static str = "Ticket";

    fn narrow(ticket: Ticket) -> Result<Self, Ticket> {
        Ok(ticket)
    }
}

impl Variant for TicketGrantingTicket {
    const NAME: &'static str = "TicketGrantingTicket";

    fn narrow(ticket: Ticket) -> Result<Self, Ticket> {
        ticket.try_into()
    }
}

impl Variant for ServiceTicket {
    const NAME: &'static str = "ServiceTicket";

    fn narrow(ticket: Ticket) -> Result<Self, Ticket> {
        ticket.try_into()
    }
}

/// ID of a [`Ticket`].
///
/// Its prefix denotes the [`Kind`] of the [`Ticket`].
#[derive(
    AsRef,
    Clone,
    Debug,
    Deserialize,
    Display,
    Eq,
    From,
    Hash,
    Into,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[as_ref(str, String)]
#[from(&str, String)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    /// Returns [`Kind`] of the [`Ticket`] denoted by the prefix of this
    /// [`Id`], if it's a known one.
    #[must_use]
    pub fn kind(&self) -> Option<Kind> {
        let (prefix, _) = self.0.split_once('-')?;
        prefix.parse().ok()
    }
}

/// Kind of a [`Ticket`], denoted by its [`Id`] prefix.
#[derive(
    AsRefStr, Clone, Copy, Debug, EnumString, Eq, PartialEq, strum::Display,
)]
pub enum Kind {
    /// [`TicketGrantingTicket`] issued on primary authentication.
    #[strum(serialize = "TGT")]
    TicketGranting,

    /// [`TicketGrantingTicket`] issued on behalf of a proxying service.
    #[strum(serialize = "PGT")]
    ProxyGranting,

    /// [`ServiceTicket`].
    #[strum(serialize = "ST")]
    Service,
}

/// Generator of unique [`Ticket`] [`Id`]s.
///
/// Generated [`Id`]s have the `{prefix}-{sequence}-{random}[-{suffix}]`
/// format, where the random part is a v4 UUID backed by the OS CSPRNG, so
/// the collision probability is negligible and doesn't depend on the
/// sequence.
#[derive(Debug, Default)]
pub struct IdGenerator {
    /// Sequence number of the next generated [`Id`].
    sequence: AtomicU64,

    /// Suffix appended to every generated [`Id`] (usually a node name).
    suffix: Option<String>,
}

impl IdGenerator {
    /// Creates a new [`IdGenerator`] appending the provided `suffix` to every
    /// generated [`Id`].
    #[must_use]
    pub fn new(suffix: Option<String>) -> Self {
        Self {
            sequence: AtomicU64::new(0),
            suffix: suffix.filter(|s| !s.is_empty()),
        }
    }

    /// Generates a new unique [`Id`] of the provided [`Kind`].
    #[must_use]
    pub fn generate(&self, kind: Kind) -> Id {
        let seq = self.sequence.fetch_add(1, atomic::Ordering::Relaxed) + 1;
        let random = Uuid::new_v4().simple();
        Id(match &self.suffix {
            Some(suffix) => format!("{kind}-{seq}-{random}-{suffix}"),
            None => format!("{kind}-{seq}-{random}"),
        })
    }
}

/// Usage state shared by all the [`Ticket`]s.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct State {
    /// [`DateTime`] when the [`Ticket`] was created.
    #[serde(with = "common::datetime::serde::rfc3339")]
    pub created_at: CreationDateTime,

    /// [`DateTime`] when the [`Ticket`] was used last time.
    ///
    /// Equals to [`State::created_at`] for never used [`Ticket`]s.
    #[serde(with = "common::datetime::serde::rfc3339")]
    pub last_used_at: UsageDateTime,

    /// [`DateTime`] when the [`Ticket`] was used before the last time.
    #[serde(with = "common::datetime::serde::rfc3339")]
    pub previous_last_used_at: UsageDateTime,

    /// Number of times the [`Ticket`] was used.
    pub uses: u32,

    /// Indicator whether the [`Ticket`] was explicitly marked as expired.
    expired: bool,
}

impl State {
    /// Creates a new [`State`] of a [`Ticket`] created at the provided
    /// moment.
    #[must_use]
    pub fn new(now: DateTime) -> Self {
        Self {
            created_at: now.coerce(),
            last_used_at: now.coerce(),
            previous_last_used_at: now.coerce(),
            uses: 0,
            expired: false,
        }
    }

    /// Records a usage of the [`Ticket`] at the provided moment.
    pub fn record_usage(&mut self, now: DateTime) {
        self.previous_last_used_at = self.last_used_at;
        self.last_used_at = now.coerce();
        self.uses = self.uses.saturating_add(1);
    }

    /// Indicates whether the [`Ticket`] was explicitly marked as expired.
    #[must_use]
    pub fn is_marked_expired(&self) -> bool {
        self.expired
    }

    /// Marks the [`Ticket`] as expired.
    ///
    /// Idempotent and irreversible.
    pub fn mark_expired(&mut self) {
        self.expired = true;
    }
}

/// Self-describing, versioned representation of a [`Ticket`] for durable
/// storages.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Persisted {
    /// Version of the representation format.
    #[serde(rename = "@version")]
    pub version: u16,

    /// Persisted [`Ticket`].
    #[serde(flatten)]
    pub ticket: Ticket,
}

impl Persisted {
    /// Current version of the [`Persisted`] representation format.
    pub const VERSION: u16 = 1;

    /// Unpacks the persisted [`Ticket`], checking the representation
    /// version.
    ///
    /// # Errors
    ///
    /// If the representation version is not supported.
    pub fn into_ticket(self) -> Result<Ticket, UnsupportedVersion> {
        if self.version == Self::VERSION {
            Ok(self.ticket)
        } else {
            Err(UnsupportedVersion(self.version))
        }
    }
}

impl From<Ticket> for Persisted {
    fn from(ticket: Ticket) -> Self {
        Self {
            version: Self::VERSION,
            ticket,
        }
    }
}

/// Error of using a [`Ticket`] which cannot be used anymore.
#[derive(Clone, Debug, Display, Error)]
#[display("`Ticket(id: {id})` is invalid: {reason}")]
pub struct InvalidTicket {
    /// ID of the invalid [`Ticket`].
    #[error(not(source))]
    pub id: Id,

    /// [`InvalidReason`] of the [`Ticket`] being invalid.
    #[error(not(source))]
    pub reason: InvalidReason,
}

impl InvalidTicket {
    /// Creates a new [`InvalidTicket`] error.
    #[must_use]
    pub fn new(id: Id, reason: InvalidReason) -> Self {
        Self { id, reason }
    }
}

/// Reason of a [`Ticket`] being invalid.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum InvalidReason {
    /// [`Ticket`] doesn't exist.
    #[display("not found")]
    NotFound,

    /// [`Ticket`] or any of its ancestors is expired.
    #[display("expired")]
    Expired,

    /// [`Ticket`] is not of the expected type.
    #[display("not a `{_0}`")]
    WrongType(&'static str),

    /// [`ServiceTicket`] was granted for another service.
    #[display("granted for another service")]
    ServiceMismatch,
}

/// Error of unpacking a [`Persisted`] [`Ticket`] of unsupported version.
#[derive(Clone, Copy, Debug, Display, Error)]
#[display("Unsupported `Ticket` representation version: {_0}")]
pub struct UnsupportedVersion(#[error(not(source))] pub u16);

/// [`DateTime`] when a [`Ticket`] was created.
pub type CreationDateTime = DateTimeOf<(Ticket, unit::Creation)>;

/// [`DateTime`] when a [`Ticket`] was used.
pub type UsageDateTime = DateTimeOf<(Ticket, unit::Usage)>;
