//! [`Query`] for resolving a [`Chain`] of [`TicketGrantingTicket`]s.

use common::operations::{By, Select};
use tracerr::Traced;

use crate::{
    domain::{
        ticket::{self, Chain, InvalidReason, InvalidTicket, TicketGrantingTicket},
        Ticket,
    },
    infra::Backend,
    Service,
};

pub use super::get_ticket::ExecutionError;
use super::{GetTicket, Query};

/// [`Query`] for resolving the [`Chain`] of a valid [`TicketGrantingTicket`]
/// up to its root.
#[derive(Clone, Debug)]
pub struct ResolveChain {
    /// ID of the leaf [`TicketGrantingTicket`].
    pub ticket_granting_ticket: ticket::Id,
}

impl<Reg> Query<ResolveChain> for Service<Reg>
where
    Reg: Backend,
{
    type Ok = Chain;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        ResolveChain {
            ticket_granting_ticket,
        }: ResolveChain,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let leaf = self
            .execute(GetTicket::<TicketGrantingTicket>::new(
                ticket_granting_ticket,
            ))
            .await
            .map_err(tracerr::wrap!())?;

        let mut chain = Chain::new(leaf);
        while let Some(id) = chain.missing_parent().cloned() {
            let parent = self
                .registry()
                .execute(Select(By::<Option<Ticket>, _>::new(id.clone())))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?;
            // Ancestors are checked already, so a mismatch here means they've
            // been removed concurrently.
            let Some(Ticket::Granting(parent)) = parent else {
                return Err(tracerr::new!(E::InvalidTicket(InvalidTicket::new(
                    id,
                    InvalidReason::NotFound,
                ))));
            };
            chain.push_parent(parent).map_err(|e| {
                tracerr::new!(E::InvalidTicket(InvalidTicket::new(
                    e.0,
                    InvalidReason::NotFound,
                )))
            })?;
        }
        Ok(chain)
    }
}

#[cfg(all(test, feature = "memory"))]
mod spec {
    use common::{operations::Insert, DateTime};

    use crate::{
        domain::ticket::{
            granting::ProxiedBy, ExpirationPolicy, TicketGrantingTicket,
        },
        infra::Registry as _,
        testing, Query as _,
    };

    use super::ResolveChain;

    #[tokio::test]
    async fn resolves_chain_up_to_root() {
        let service = testing::service();
        let mut parent = None;
        for (id, user) in [("TGT-1", "casuser"), ("PGT-2", "first"), ("PGT-3", "second")] {
            let tgt = TicketGrantingTicket::new(
                id.into(),
                testing::authentication(user),
                parent.map(|p: &str| ProxiedBy {
                    ticket_granting_ticket: p.into(),
                    service: testing::service_id("https://proxy.example.com"),
                }),
                ExpirationPolicy::NeverExpires,
                DateTime::now(),
            );
            service.registry().execute(Insert(tgt.into())).await.unwrap();
            parent = Some(id);
        }

        let chain = service
            .execute(ResolveChain {
                ticket_granting_ticket: "PGT-3".into(),
            })
            .await
            .unwrap();

        assert_eq!(chain.depth(), 2);
        assert_eq!(chain.root().unwrap().id().to_string(), "TGT-1");
        let users = chain
            .authentications()
            .into_iter()
            .map(|a| a.principal.id.to_string())
            .collect::<Vec<_>>();
        assert_eq!(users, ["casuser", "first", "second"]);
    }

    #[tokio::test]
    async fn fails_on_missing_parent() {
        let service = testing::service();
        let orphan = TicketGrantingTicket::new(
            "PGT-2".into(),
            testing::authentication("first"),
            Some(ProxiedBy {
                ticket_granting_ticket: "TGT-1".into(),
                service: testing::service_id("https://proxy.example.com"),
            }),
            ExpirationPolicy::NeverExpires,
            DateTime::now(),
        );
        service.registry().execute(Insert(orphan.into())).await.unwrap();

        assert!(service
            .execute(ResolveChain {
                ticket_granting_ticket: "PGT-2".into(),
            })
            .await
            .is_err());
    }
}
