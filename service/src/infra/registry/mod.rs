//! [`Registry`]-related implementations.

#[cfg(feature = "memory")]
pub mod memory;

use std::future::Future;

use common::operations::{All, By, Delete, Insert, Modify, Select, With};
use derive_more::{Display, Error as StdError};
use futures::stream::BoxStream;
use tracerr::Traced;

use crate::domain::{ticket, Ticket};

#[cfg(feature = "memory")]
pub use self::memory::InMemory;

/// Ticket registry operation.
pub use common::Handler as Registry;

/// Lazy stream over a snapshot of the stored [`Ticket`]s.
pub type Tickets = BoxStream<'static, Ticket>;

/// In-place modification of a stored [`Ticket`].
pub type Mutation<'a> = Box<dyn FnOnce(&mut Ticket) + Send + 'a>;

/// [`Registry`] error.
#[derive(Debug, Display, StdError)]
pub enum Error {
    /// Unexpired [`Ticket`] with the same ID is stored already.
    #[display("`Ticket(id: {_0})` already exists")]
    DuplicateTicket(#[error(not(source))] ticket::Id),

    /// Storage backend failed.
    #[display("Registry backend failed: {_0}")]
    Backend(#[error(not(source))] String),
}

impl Error {
    /// Indicates whether this [`Error`] is a [`Error::DuplicateTicket`].
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateTicket(_))
    }
}

/// [`Registry`] supporting all the primitive operations over [`Ticket`]s:
/// - [`Insert`]ing a new [`Ticket`], failing with [`Error::DuplicateTicket`]
///   if an unexpired one with the same ID is stored already;
/// - [`Select`]ing a [`Ticket`] by its ID as is, expired ones included;
/// - [`Delete`]ing a [`Ticket`] by its ID, returning the removed one;
/// - [`Modify`]ing a [`Ticket`] atomically with respect to any other
///   operation on the same ID, reporting whether it was found;
/// - [`Select`]ing [`All`] the stored [`Ticket`]s as [`Tickets`].
///
/// A [`Backend`] is shared by all the concurrently executed operations.
pub trait Backend:
    Send
    + Sync
    + Registry<Insert<Ticket>, Ok = (), Err = Traced<Error>>
    + Registry<
        Select<By<Option<Ticket>, ticket::Id>>,
        Ok = Option<Ticket>,
        Err = Traced<Error>,
    > + Registry<
        Delete<By<Option<Ticket>, ticket::Id>>,
        Ok = Option<Ticket>,
        Err = Traced<Error>,
    > + for<'a> Registry<
        Modify<With<ticket::Id, Mutation<'a>>>,
        Ok = bool,
        Err = Traced<Error>,
    > + Registry<Select<By<Tickets, All>>, Ok = Tickets, Err = Traced<Error>>
{
    /// Applies the provided function to the [`Ticket`] with the provided ID
    /// atomically, returning its result.
    ///
    /// [`None`] is returned if no such [`Ticket`] is stored.
    fn modify<F, R>(
        &self,
        id: ticket::Id,
        f: F,
    ) -> impl Future<Output = Result<Option<R>, Traced<Error>>>
    where
        F: FnOnce(&mut Ticket) -> R + Send,
        R: Send,
    {
        async move {
            let mut out = None;
            let mutation: Mutation<'_> = Box::new(|t| out = Some(f(t)));
            let found = self
                .execute(Modify(With::new(id, mutation)))
                .await
                .map_err(tracerr::wrap!())?;
            debug_assert_eq!(found, out.is_some(), "mutation is applied once");
            Ok(out)
        }
    }
}

impl<T> Backend for T where
    T: Send
        + Sync
        + Registry<Insert<Ticket>, Ok = (), Err = Traced<Error>>
        + Registry<
            Select<By<Option<Ticket>, ticket::Id>>,
            Ok = Option<Ticket>,
            Err = Traced<Error>,
        > + Registry<
            Delete<By<Option<Ticket>, ticket::Id>>,
            Ok = Option<Ticket>,
            Err = Traced<Error>,
        > + for<'a> Registry<
            Modify<With<ticket::Id, Mutation<'a>>>,
            Ok = bool,
            Err = Traced<Error>,
        > + Registry<Select<By<Tickets, All>>, Ok = Tickets, Err = Traced<Error>>
{
}
