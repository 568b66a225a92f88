//! [`Command`] for adding a [`Ticket`].

use common::operations::Insert;
use derive_more::From;
use tracerr::Traced;

use crate::{
    domain::Ticket,
    infra::{registry, Registry},
    Service,
};

use super::Command;

/// [`Command`] for storing the provided [`Ticket`] as is.
///
/// Fails with [`registry::Error::DuplicateTicket`] if an unexpired
/// [`Ticket`] with the same ID is stored already. An expired one is
/// overwritten.
#[derive(Clone, Debug, From)]
pub struct AddTicket {
    /// [`Ticket`] to add.
    pub ticket: Ticket,
}

impl<Reg> Command<AddTicket> for Service<Reg>
where
    Reg: Registry<Insert<Ticket>, Ok = (), Err = Traced<registry::Error>>,
{
    type Ok = ();
    type Err = Traced<registry::Error>;

    async fn execute(
        &self,
        AddTicket { ticket }: AddTicket,
    ) -> Result<Self::Ok, Self::Err> {
        self.registry()
            .execute(Insert(ticket))
            .await
            .map_err(tracerr::wrap!())
    }
}
