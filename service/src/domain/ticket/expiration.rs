//! [`ExpirationPolicy`] definitions.

use std::time::Duration;

use common::DateTime;
use serde::{Deserialize, Serialize};

use super::State;

/// Policy deciding whether a [`Ticket`] is expired, given its [`State`].
///
/// Holds no per-ticket state, so a single value may be shared by any number
/// of [`Ticket`]s.
///
/// [`Ticket`]: super::Ticket
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExpirationPolicy {
    /// [`Ticket`] never expires on its own.
    ///
    /// [`Ticket`]: super::Ticket
    NeverExpires,

    /// [`Ticket`] expires after a fixed time since its creation, regardless
    /// of its usage.
    ///
    /// [`Ticket`]: super::Ticket
    HardTimeout {
        /// Time to live since creation.
        #[serde(with = "humantime_serde")]
        time_to_kill: Duration,
    },

    /// [`Ticket`] expires after not being used for the specified time.
    ///
    /// [`Ticket`]: super::Ticket
    Timeout {
        /// Allowed idle time since the last usage.
        #[serde(with = "humantime_serde")]
        time_to_kill: Duration,
    },

    /// [`Ticket`] expires after not being used for the specified time, but
    /// never lives longer than the hard ceiling.
    ///
    /// [`Ticket`]: super::Ticket
    TicketGranting {
        /// Hard ceiling of time to live since creation.
        #[serde(with = "humantime_serde")]
        max_time_to_live: Duration,

        /// Allowed idle time since the last usage.
        #[serde(with = "humantime_serde")]
        time_to_kill: Duration,
    },

    /// [`Ticket`] expires after being used the specified number of times, or
    /// after not being used for the specified time, whichever comes first.
    ///
    /// [`Ticket`]: super::Ticket
    MultiTimeUseOrTimeout {
        /// Number of allowed usages.
        number_of_uses: u32,

        /// Allowed idle time since the last usage.
        #[serde(with = "humantime_serde")]
        time_to_kill: Duration,
    },

    /// [`Ticket`] expires after not being used for the specified time, and
    /// is considered expired while being used again too soon.
    ///
    /// [`Ticket`]: super::Ticket
    ThrottledUseAndTimeout {
        /// Allowed idle time since the last usage.
        #[serde(with = "humantime_serde")]
        time_to_kill: Duration,

        /// Minimal time between two usages.
        #[serde(with = "humantime_serde")]
        time_in_between_uses: Duration,
    },
}

impl ExpirationPolicy {
    /// Default [`ExpirationPolicy`] of [`TicketGrantingTicket`]s.
    ///
    /// [`TicketGrantingTicket`]: super::TicketGrantingTicket
    pub const DEFAULT_TICKET_GRANTING: Self = Self::TicketGranting {
        max_time_to_live: Duration::from_secs(8 * 60 * 60),
        time_to_kill: Duration::from_secs(2 * 60 * 60),
    };

    /// Default [`ExpirationPolicy`] of [`ServiceTicket`]s.
    ///
    /// [`ServiceTicket`]: super::ServiceTicket
    pub const DEFAULT_SERVICE: Self = Self::MultiTimeUseOrTimeout {
        number_of_uses: 1,
        time_to_kill: Duration::from_secs(10),
    };

    /// Checks whether a [`Ticket`] in the provided [`State`] is expired at
    /// the provided moment.
    ///
    /// Doesn't consider the sticky [`State::expired`] flag.
    ///
    /// [`Ticket`]: super::Ticket
    #[must_use]
    pub fn is_expired(&self, state: &State, now: DateTime) -> bool {
        let created_at = state.created_at.coerce::<()>();
        let last_used_at = state.last_used_at.coerce::<()>();

        match *self {
            Self::NeverExpires => false,
            Self::HardTimeout { time_to_kill } => {
                elapsed(created_at, time_to_kill, now)
            }
            Self::Timeout { time_to_kill } => {
                elapsed(last_used_at, time_to_kill, now)
            }
            Self::TicketGranting {
                max_time_to_live,
                time_to_kill,
            } => {
                elapsed(created_at, max_time_to_live, now)
                    || elapsed(last_used_at, time_to_kill, now)
            }
            Self::MultiTimeUseOrTimeout {
                number_of_uses,
                time_to_kill,
            } => {
                state.uses >= number_of_uses
                    || elapsed(last_used_at, time_to_kill, now)
            }
            Self::ThrottledUseAndTimeout {
                time_to_kill,
                time_in_between_uses,
            } => {
                if elapsed(last_used_at, time_to_kill, now) {
                    return true;
                }
                // Never used tickets are not throttled.
                state.uses > 0
                    && !elapsed_or_reached(
                        last_used_at,
                        time_in_between_uses,
                        now,
                    )
            }
        }
    }
}

/// Checks whether the provided `period` since the `start` has passed `now`.
///
/// A deadline beyond the representable range is never reached.
fn elapsed(start: DateTime, period: Duration, now: DateTime) -> bool {
    start.checked_add(period).is_some_and(|deadline| now > deadline)
}

/// Same as [`elapsed()`], but considers the deadline moment itself as passed.
fn elapsed_or_reached(
    start: DateTime,
    period: Duration,
    now: DateTime,
) -> bool {
    start.checked_add(period).is_some_and(|deadline| now >= deadline)
}
