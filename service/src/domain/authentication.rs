//! [`Authentication`] definitions.

use std::collections::BTreeMap;

#[cfg(doc)]
use common::DateTime;
use common::{unit, DateTimeOf};
use derive_more::{AsRef, Display, Into};
use serde::{Deserialize, Serialize};

#[cfg(doc)]
use crate::domain::ticket::TicketGrantingTicket;

/// Outcome of a successful credential verification, performed outside of
/// this crate.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Authentication {
    /// [`Principal`] being authenticated.
    pub principal: Principal,

    /// Attributes of the authentication event itself (authentication
    /// method, handler names, etc).
    #[serde(default)]
    pub attributes: Attributes,

    /// [`DateTime`] when the authentication happened.
    #[serde(with = "common::datetime::serde::rfc3339")]
    pub authenticated_at: AuthenticationDateTime,
}

impl Authentication {
    /// Creates a new [`Authentication`] of the provided [`Principal`]
    /// happened right now.
    #[must_use]
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            attributes: Attributes::new(),
            authenticated_at: AuthenticationDateTime::now(),
        }
    }

    /// Adds the provided attribute to this [`Authentication`].
    #[must_use]
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        _ = self
            .attributes
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }
}

/// Authenticated subject.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Principal {
    /// ID of this [`Principal`].
    pub id: PrincipalId,

    /// Attributes resolved for this [`Principal`].
    #[serde(default)]
    pub attributes: Attributes,
}

impl Principal {
    /// Creates a new [`Principal`] without attributes.
    #[must_use]
    pub fn new(id: PrincipalId) -> Self {
        Self {
            id,
            attributes: Attributes::new(),
        }
    }
}

/// ID of a [`Principal`].
#[derive(
    AsRef,
    Clone,
    Debug,
    Deserialize,
    Display,
    Eq,
    Hash,
    Into,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[as_ref(str, String)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Creates a new [`PrincipalId`] if the given `id` is valid.
    ///
    /// [`None`] is returned for blank IDs or IDs surrounded with whitespace.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        (id.trim() == id && !id.is_empty()).then_some(Self(id))
    }
}

/// Multi-valued attributes, ordered by name.
pub type Attributes = BTreeMap<String, Vec<String>>;

/// [`DateTime`] when an [`Authentication`] happened.
///
/// Used as the moment a [`TicketGrantingTicket`] chain link was established.
pub type AuthenticationDateTime = DateTimeOf<(Authentication, unit::Creation)>;
