//! [`Query`] for streaming all the valid [`Ticket`]s.

use common::{
    operations::{All, By, Select},
    DateTime,
};
use futures::{future, StreamExt as _};
use tracerr::Traced;

#[cfg(doc)]
use crate::domain::Ticket;
use crate::{
    infra::{registry, Registry},
    Service,
};

use super::Query;

/// [`Query`] for streaming all the stored unexpired [`Ticket`]s.
///
/// The returned stream iterates over a snapshot, so may be consumed while
/// the registry is being modified.
#[derive(Clone, Copy, Debug, Default)]
pub struct Tickets;

impl<Reg> Query<Tickets> for Service<Reg>
where
    Reg: Registry<
        Select<By<registry::Tickets, All>>,
        Ok = registry::Tickets,
        Err = Traced<registry::Error>,
    >,
{
    type Ok = registry::Tickets;
    type Err = Traced<registry::Error>;

    async fn execute(&self, _: Tickets) -> Result<Self::Ok, Self::Err> {
        let now = DateTime::now();
        Ok(self
            .registry()
            .execute(Select(By::new(All)))
            .await
            .map_err(tracerr::wrap!())?
            .filter(move |t| future::ready(!t.is_expired(now)))
            .boxed())
    }
}

#[cfg(all(test, feature = "memory"))]
mod spec {
    use std::time::Duration;

    use common::{operations::Insert, DateTime};
    use futures::StreamExt as _;

    use crate::{
        domain::ticket::{ExpirationPolicy, TicketGrantingTicket},
        infra::Registry as _,
        testing, Query as _,
    };

    use super::Tickets;

    #[tokio::test]
    async fn skips_expired_tickets() {
        let service = testing::service();
        let past = DateTime::now() - Duration::from_secs(60);
        let hard = ExpirationPolicy::HardTimeout {
            time_to_kill: Duration::from_secs(1),
        };
        for (id, policy) in
            [("TGT-1", ExpirationPolicy::NeverExpires), ("TGT-2", hard)]
        {
            let tgt = TicketGrantingTicket::new(
                id.into(),
                testing::authentication("casuser"),
                None,
                policy,
                past,
            );
            service.registry().execute(Insert(tgt.into())).await.unwrap();
        }

        let ids = service
            .execute(Tickets)
            .await
            .unwrap()
            .map(|t| t.id().to_string())
            .collect::<Vec<_>>()
            .await;

        assert_eq!(ids, ["TGT-1"]);
    }
}
