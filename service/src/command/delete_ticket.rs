//! [`Command`] for deleting a [`Ticket`] along with everything it has issued.

use common::operations::{By, Delete};
use derive_more::{Display, Error};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{ticket, Ticket},
    infra::Backend,
    Service,
};

use super::Command;

/// [`Command`] for deleting a [`Ticket`].
///
/// Deleting a [`TicketGrantingTicket`] cascades to all the [`ServiceTicket`]s
/// it tracks and all the proxy-granting [`TicketGrantingTicket`]s it has
/// issued, recursively. A deleted proxy-granting [`TicketGrantingTicket`] is
/// forgotten by its parent.
///
/// Returns the number of actually removed [`Ticket`]s.
///
/// [`ServiceTicket`]: ticket::ServiceTicket
/// [`TicketGrantingTicket`]: ticket::TicketGrantingTicket
#[derive(Clone, Debug)]
pub struct DeleteTicket {
    /// ID of the [`Ticket`] to delete.
    pub id: ticket::Id,
}

impl<Reg> Command<DeleteTicket> for Service<Reg>
where
    Reg: Backend,
{
    type Ok = usize;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        DeleteTicket { id }: DeleteTicket,
    ) -> Result<Self::Ok, Self::Err> {
        let mut removed = 0;
        let mut failed = Vec::new();

        let mut pending = vec![id.clone()];
        while let Some(next) = pending.pop() {
            let deleted = self
                .registry()
                .execute(Delete(By::<Option<Ticket>, _>::new(next.clone())))
                .await;
            let ticket = match deleted {
                Ok(Some(t)) => t,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("failed to remove `Ticket(id: {next})`: {e}");
                    failed.push(next);
                    continue;
                }
            };
            removed += 1;

            let Ticket::Granting(tgt) = ticket else {
                continue;
            };
            if next == id {
                if let Some(parent) = tgt.parent_id() {
                    self.forget_proxy_granting_ticket(parent, &id).await;
                }
            }
            pending.extend(tgt.services().keys().cloned());
            pending.extend(tgt.proxy_granting_tickets().iter().cloned());
        }

        if failed.is_empty() {
            log::debug!("removed {removed} tickets issued by `Ticket(id: {id})`");
            Ok(removed)
        } else {
            Err(tracerr::new!(ExecutionError { removed, failed }))
        }
    }
}

impl<Reg: Backend> Service<Reg> {
    /// Makes the parent [`TicketGrantingTicket`] forget the removed
    /// proxy-granting one, only logging a failure.
    ///
    /// [`TicketGrantingTicket`]: ticket::TicketGrantingTicket
    async fn forget_proxy_granting_ticket(
        &self,
        parent: &ticket::Id,
        child: &ticket::Id,
    ) {
        let forgotten = self
            .registry()
            .modify(parent.clone(), |t| {
                if let Ticket::Granting(t) = t {
                    t.untrack_proxy_granting_ticket(child);
                }
            })
            .await;
        if let Err(e) = forgotten {
            log::warn!(
                "`TicketGrantingTicket(id: {parent})` failed to forget \
                 `TicketGrantingTicket(id: {child})`: {e}",
            );
        }
    }
}

/// Error of [`DeleteTicket`] [`Command`] execution, aggregating all the
/// [`Ticket`]s failed to be removed.
#[derive(Debug, Display, Error)]
#[display("Failed to remove {} tickets ({removed} removed): {failed:?}", failed.len())]
pub struct ExecutionError {
    /// Number of the [`Ticket`]s removed nevertheless.
    #[error(not(source))]
    pub removed: usize,

    /// IDs of the [`Ticket`]s failed to be removed.
    #[error(not(source))]
    pub failed: Vec<ticket::Id>,
}

#[cfg(all(test, feature = "memory"))]
mod spec {
    use common::operations::{All, By, Delete, Insert, Modify, Select, With};
    use tracerr::Traced;

    use crate::{
        command::{CreateTicketGrantingTicket, GrantServiceTicket},
        domain::{
            ticket::{self, ServiceTicket, TicketGrantingTicket},
            Ticket,
        },
        infra::{
            registry::{self, Mutation, Tickets},
            InMemory, Registry,
        },
        query::GetTicket,
        testing, Command as _, Config, Service,
    };

    use super::DeleteTicket;

    /// [`InMemory`] registry failing to delete [`ServiceTicket`]s.
    #[derive(Clone, Debug, Default)]
    struct Flaky(InMemory);

    impl Registry<Insert<Ticket>> for Flaky {
        type Ok = ();
        type Err = Traced<registry::Error>;

        async fn execute(&self, op: Insert<Ticket>) -> Result<(), Self::Err> {
            self.0.execute(op).await
        }
    }

    impl Registry<Select<By<Option<Ticket>, ticket::Id>>> for Flaky {
        type Ok = Option<Ticket>;
        type Err = Traced<registry::Error>;

        async fn execute(
            &self,
            op: Select<By<Option<Ticket>, ticket::Id>>,
        ) -> Result<Self::Ok, Self::Err> {
            self.0.execute(op).await
        }
    }

    impl Registry<Delete<By<Option<Ticket>, ticket::Id>>> for Flaky {
        type Ok = Option<Ticket>;
        type Err = Traced<registry::Error>;

        async fn execute(
            &self,
            Delete(by): Delete<By<Option<Ticket>, ticket::Id>>,
        ) -> Result<Self::Ok, Self::Err> {
            let id = by.into_inner();
            if id.to_string().starts_with("ST-") {
                return Err(tracerr::new!(registry::Error::Backend(
                    "connection reset".into(),
                )));
            }
            self.0
                .execute(Delete(By::<Option<Ticket>, _>::new(id)))
                .await
        }
    }

    impl<'a> Registry<Modify<With<ticket::Id, Mutation<'a>>>> for Flaky {
        type Ok = bool;
        type Err = Traced<registry::Error>;

        async fn execute(
            &self,
            op: Modify<With<ticket::Id, Mutation<'a>>>,
        ) -> Result<Self::Ok, Self::Err> {
            self.0.execute(op).await
        }
    }

    impl Registry<Select<By<Tickets, All>>> for Flaky {
        type Ok = Tickets;
        type Err = Traced<registry::Error>;

        async fn execute(
            &self,
            op: Select<By<Tickets, All>>,
        ) -> Result<Self::Ok, Self::Err> {
            self.0.execute(op).await
        }
    }

    async fn session<Reg: crate::infra::Backend>(
        service: &Service<Reg>,
    ) -> (TicketGrantingTicket, Vec<ServiceTicket>) {
        let tgt = service
            .execute(CreateTicketGrantingTicket {
                authentication: testing::authentication("casuser"),
                client: Some(testing::client()),
            })
            .await
            .unwrap()
            .ticket_granting_ticket;
        let mut sts = Vec::new();
        for s in ["https://a.example.com", "https://b.example.com"] {
            sts.push(
                service
                    .execute(GrantServiceTicket {
                        ticket_granting_ticket: tgt.id().clone(),
                        service: testing::service_id(s),
                        credentials_provided: false,
                    })
                    .await
                    .unwrap(),
            );
        }
        (tgt, sts)
    }

    #[tokio::test]
    async fn cascades_to_service_tickets() {
        let service = testing::service();
        let (tgt, sts) = session(&service).await;

        let removed = service
            .execute(DeleteTicket {
                id: tgt.id().clone(),
            })
            .await
            .unwrap();

        assert_eq!(removed, 3);
        for st in &sts {
            assert!(service
                .execute(GetTicket::<ServiceTicket>::new(st.id().clone()))
                .await
                .is_err());
        }
    }

    #[tokio::test]
    async fn removes_nothing_twice() {
        let service = testing::service();
        let (tgt, _) = session(&service).await;
        let delete = DeleteTicket {
            id: tgt.id().clone(),
        };

        assert_eq!(service.execute(delete.clone()).await.unwrap(), 3);
        assert_eq!(service.execute(delete).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn aggregates_cascade_failures() {
        let (service, _) = Service::new(Config::default(), Flaky::default());
        let (tgt, sts) = session(&service).await;

        let err = service
            .execute(DeleteTicket {
                id: tgt.id().clone(),
            })
            .await
            .unwrap_err();

        let err = err.as_ref();
        assert_eq!(err.removed, 1);
        let mut failed = err.failed.clone();
        failed.sort();
        let mut expected =
            sts.iter().map(|st| st.id().clone()).collect::<Vec<_>>();
        expected.sort();
        assert_eq!(failed, expected);
        assert!(service
            .execute(GetTicket::<TicketGrantingTicket>::new(tgt.id().clone()))
            .await
            .is_err());
    }
}
