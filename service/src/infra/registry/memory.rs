//! In-memory [`Registry`] implementation.

use std::sync::Arc;

use common::{
    operations::{All, By, Delete, Insert, Modify, Select, With},
    DateTime,
};
use dashmap::{mapref::entry::Entry, DashMap};
use futures::stream::{self, StreamExt as _};
use parking_lot::Mutex;
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{ticket, Ticket},
    infra::{
        registry::{self, Mutation, Tickets},
        Registry,
    },
};

/// In-memory [`Registry`] of [`Ticket`]s.
///
/// Operations on different [`Ticket`]s run concurrently, while operations on
/// the same [`Ticket`] are serialized by its [`Slot`] lock.
#[derive(Clone, Debug, Default)]
pub struct InMemory {
    /// Stored [`Ticket`]s by their IDs.
    slots: Arc<DashMap<ticket::Id, Arc<Mutex<Slot>>>>,
}

impl InMemory {
    /// Returns the [`Slot`] of the [`Ticket`] with the provided ID, if any.
    fn slot(&self, id: &ticket::Id) -> Option<Arc<Mutex<Slot>>> {
        self.slots.get(id).map(|s| Arc::clone(s.value()))
    }
}

/// Storage cell of a single [`Ticket`].
#[derive(Debug)]
struct Slot {
    /// Stored [`Ticket`].
    ticket: Ticket,

    /// Indicator whether this [`Slot`] is removed from the [`InMemory`]
    /// storage.
    ///
    /// Operations having obtained an evicted [`Slot`] before its removal
    /// must treat the [`Ticket`] as absent.
    evicted: bool,
}

impl Slot {
    /// Wraps the provided [`Ticket`] into a new shared [`Slot`].
    fn new_shared(ticket: Ticket) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self {
            ticket,
            evicted: false,
        }))
    }
}

impl Registry<Insert<Ticket>> for InMemory {
    type Ok = ();
    type Err = Traced<registry::Error>;

    async fn execute(
        &self,
        Insert(ticket): Insert<Ticket>,
    ) -> Result<Self::Ok, Self::Err> {
        // Shard lock is always taken before a `Slot` lock, never vice versa.
        match self.slots.entry(ticket.id().clone()) {
            Entry::Vacant(e) => {
                _ = e.insert(Slot::new_shared(ticket));
            }
            Entry::Occupied(mut e) => {
                {
                    let mut old = e.get().lock();
                    if !old.evicted && !old.ticket.is_expired(DateTime::now()) {
                        return Err(tracerr::new!(
                            registry::Error::DuplicateTicket(
                                ticket.id().clone()
                            )
                        ));
                    }
                    log::debug!(
                        "overwriting expired `{}(id: {})`",
                        old.ticket.type_name(),
                        old.ticket.id(),
                    );
                    old.evicted = true;
                }
                _ = e.insert(Slot::new_shared(ticket));
            }
        }
        Ok(())
    }
}

impl Registry<Select<By<Option<Ticket>, ticket::Id>>> for InMemory {
    type Ok = Option<Ticket>;
    type Err = Traced<registry::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Ticket>, ticket::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self.slot(&by.into_inner()).and_then(|slot| {
            let slot = slot.lock();
            (!slot.evicted).then(|| slot.ticket.clone())
        }))
    }
}

impl Registry<Delete<By<Option<Ticket>, ticket::Id>>> for InMemory {
    type Ok = Option<Ticket>;
    type Err = Traced<registry::Error>;

    async fn execute(
        &self,
        Delete(by): Delete<By<Option<Ticket>, ticket::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        let Some(slot) = self.slot(&id) else {
            return Ok(None);
        };

        let ticket = {
            let mut slot = slot.lock();
            if slot.evicted {
                return Ok(None);
            }
            slot.evicted = true;
            slot.ticket.clone()
        };
        // A concurrent `Insert` may have replaced the evicted `Slot` already.
        _ = self.slots.remove_if(&id, |_, s| Arc::ptr_eq(s, &slot));

        Ok(Some(ticket))
    }
}

impl<'a> Registry<Modify<With<ticket::Id, Mutation<'a>>>> for InMemory {
    type Ok = bool;
    type Err = Traced<registry::Error>;

    async fn execute(
        &self,
        Modify(with): Modify<With<ticket::Id, Mutation<'a>>>,
    ) -> Result<Self::Ok, Self::Err> {
        let With { by: id, f } = with;
        let Some(slot) = self.slot(&id) else {
            return Ok(false);
        };

        let mut slot = slot.lock();
        if slot.evicted {
            return Ok(false);
        }
        f(&mut slot.ticket);
        Ok(true)
    }
}

impl Registry<Select<By<Tickets, All>>> for InMemory {
    type Ok = Tickets;
    type Err = Traced<registry::Error>;

    async fn execute(
        &self,
        _: Select<By<Tickets, All>>,
    ) -> Result<Self::Ok, Self::Err> {
        let snapshot = self
            .slots
            .iter()
            .filter_map(|e| {
                let slot = e.value().lock();
                (!slot.evicted).then(|| slot.ticket.clone())
            })
            .collect::<Vec<_>>();
        Ok(stream::iter(snapshot).boxed())
    }
}
