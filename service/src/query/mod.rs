//! [`Query`] definition.

pub mod get_ticket;
pub mod resolve_chain;
pub mod tickets;

/// [`Query`] of the [`Service`].
///
/// [`Service`]: crate::Service
pub use common::Handler as Query;

pub use self::{
    get_ticket::GetTicket, resolve_chain::ResolveChain, tickets::Tickets,
};
