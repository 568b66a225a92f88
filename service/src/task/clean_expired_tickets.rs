//! [`CleanExpiredTickets`] [`Task`].

use std::{convert::Infallible, error::Error, time};

use common::{
    operations::{All, By, Perform, Select, Start},
    DateTime,
};
use futures::{future, StreamExt as _};
use smart_default::SmartDefault;
use tokio::time::interval;
use tracerr::Traced;
use tracing as log;

#[cfg(doc)]
use crate::domain::Ticket;
use crate::{
    command,
    infra::{registry, Backend},
    Service,
};

use super::Task;

/// Configuration for [`CleanExpiredTickets`] [`Task`].
#[derive(Clone, Copy, Debug, SmartDefault)]
pub struct Config {
    /// Interval between expired [`Ticket`]s cleaning.
    #[default(time::Duration::from_secs(2 * 60))]
    pub interval: time::Duration,
}

/// [`Task`] for removing expired [`Ticket`]s along with everything they've
/// issued.
///
/// Expired [`Ticket`]s are rejected on reading anyway, so this [`Task`] only
/// reclaims the storage.
#[derive(Clone, Copy, Debug)]
pub struct CleanExpiredTickets<S> {
    /// [`Config`] of this [`Task`].
    config: Config,

    /// [`Service`] instance.
    service: S,
}

impl<Reg> Task<Start<By<CleanExpiredTickets<Self>, Config>>> for Service<Reg>
where
    CleanExpiredTickets<Service<Reg>>:
        Task<Perform<()>, Ok = usize, Err: Error> + 'static,
    Self: Clone,
{
    type Ok = ();
    type Err = Infallible;

    async fn execute(
        &self,
        Start(by): Start<By<CleanExpiredTickets<Self>, Config>>,
    ) -> Result<Self::Ok, Self::Err> {
        let config = by.into_inner();
        let task = CleanExpiredTickets {
            config,
            service: self.clone(),
        };

        let mut interval = interval(task.config.interval);
        loop {
            let _ = interval.tick().await;
            match task.execute(Perform(())).await {
                Ok(0) => {}
                Ok(n) => log::info!("removed {n} expired tickets"),
                Err(e) => {
                    log::error!("`task::CleanExpiredTickets` failed: {e}");
                }
            }
        }
    }
}

impl<Reg> Task<Perform<()>> for CleanExpiredTickets<Service<Reg>>
where
    Reg: Backend,
{
    type Ok = usize;
    type Err = ExecutionError;

    async fn execute(&self, _: Perform<()>) -> Result<Self::Ok, Self::Err> {
        let now = DateTime::now();
        let expired = self
            .service
            .registry()
            .execute(Select(By::<registry::Tickets, _>::new(All)))
            .await
            .map_err(tracerr::wrap!())?
            .filter(|t| future::ready(t.is_expired(now)))
            .map(|t| t.id().clone())
            .collect::<Vec<_>>()
            .await;

        let mut removed = 0;
        for id in expired {
            match self
                .service
                .execute(command::DeleteTicket { id: id.clone() })
                .await
            {
                Ok(n) => removed += n,
                Err(e) => log::warn!("failed to remove `Ticket(id: {id})`: {e}"),
            }
        }
        Ok(removed)
    }
}

/// Error of [`CleanExpiredTickets`] execution.
pub type ExecutionError = Traced<registry::Error>;

#[cfg(all(test, feature = "memory"))]
mod spec {
    use std::time::Duration;

    use common::{
        operations::{By, Insert, Perform, Select},
        DateTime,
    };

    use crate::{
        domain::{
            ticket::{self, ExpirationPolicy, TicketGrantingTicket},
            Ticket,
        },
        infra::Registry as _,
        testing, Task as _,
    };

    use super::{CleanExpiredTickets, Config};

    #[tokio::test]
    async fn removes_only_expired_tickets() {
        let service = testing::service();
        let past = DateTime::now() - Duration::from_secs(60);
        for (id, policy) in [
            ("TGT-1", ExpirationPolicy::NeverExpires),
            (
                "TGT-2",
                ExpirationPolicy::HardTimeout {
                    time_to_kill: Duration::from_secs(1),
                },
            ),
        ] {
            service
                .registry()
                .execute(Insert(Ticket::from(TicketGrantingTicket::new(
                    id.into(),
                    testing::authentication("casuser"),
                    None,
                    policy,
                    past,
                ))))
                .await
                .unwrap();
        }

        let task = CleanExpiredTickets {
            config: Config::default(),
            service: service.clone(),
        };
        let removed = task.execute(Perform(())).await.unwrap();

        assert_eq!(removed, 1);
        let select = |id: &str| {
            service.registry().execute(Select(
                By::<Option<Ticket>, _>::new(ticket::Id::from(id)),
            ))
        };
        assert!(select("TGT-1").await.unwrap().is_some());
        assert!(select("TGT-2").await.unwrap().is_none());
    }
}
