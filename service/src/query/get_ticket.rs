//! [`Query`] for getting a valid [`Ticket`].

use std::marker::PhantomData;

use common::{
    operations::{By, Delete, Select},
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{
        ticket::{self, InvalidReason, InvalidTicket, Variant},
        Ticket,
    },
    infra::{registry, Backend},
    Service,
};
#[cfg(doc)]
use crate::domain::ticket::TicketGrantingTicket;

use super::Query;

/// [`Query`] for getting a valid [`Ticket`] of the `T` [`Variant`].
///
/// A [`Ticket`] is valid if neither it, nor any of the
/// [`TicketGrantingTicket`]s it descends from, is expired. Invalid
/// [`Ticket`]s are evicted from the registry once read.
#[derive(Debug)]
pub struct GetTicket<T = Ticket> {
    /// ID of the [`Ticket`] to get.
    pub id: ticket::Id,

    /// Expected [`Variant`] of the [`Ticket`].
    _variant: PhantomData<fn() -> T>,
}

impl<T> GetTicket<T> {
    /// Creates a new [`GetTicket`] [`Query`] for the provided ID.
    #[must_use]
    pub fn new(id: impl Into<ticket::Id>) -> Self {
        Self {
            id: id.into(),
            _variant: PhantomData,
        }
    }
}

impl<T> Clone for GetTicket<T> {
    fn clone(&self) -> Self {
        Self::new(self.id.clone())
    }
}

impl<Reg, T> Query<GetTicket<T>> for Service<Reg>
where
    Reg: Backend,
    T: Variant,
{
    type Ok = T;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        GetTicket { id, .. }: GetTicket<T>,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let now = DateTime::now();
        let ticket = self
            .registry()
            .execute(Select(By::<Option<Ticket>, _>::new(id.clone())))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or_else(|| InvalidTicket::new(id.clone(), InvalidReason::NotFound))
            .map_err(tracerr::from_and_wrap!(=> E))?;

        let valid = !ticket.is_expired(now)
            && self
                .has_valid_ancestors(&ticket, now)
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?;
        if !valid {
            log::debug!("evicting expired `{}(id: {id})`", ticket.type_name());
            drop(
                self.registry()
                    .execute(Delete(By::<Option<Ticket>, _>::new(id.clone())))
                    .await
                    .map_err(tracerr::map_from_and_wrap!(=> E))?,
            );
            return Err(tracerr::new!(E::InvalidTicket(InvalidTicket::new(
                id,
                InvalidReason::Expired,
            ))));
        }

        T::narrow(ticket).map_err(|_| {
            tracerr::new!(E::InvalidTicket(InvalidTicket::new(
                id,
                InvalidReason::WrongType(T::NAME),
            )))
        })
    }
}

impl<Reg: Backend> Service<Reg> {
    /// Checks whether all the [`TicketGrantingTicket`]s the provided
    /// [`Ticket`] descends from exist and are not expired.
    async fn has_valid_ancestors(
        &self,
        ticket: &Ticket,
        now: DateTime,
    ) -> Result<bool, Traced<registry::Error>> {
        let mut parent = ticket.parent_id().cloned();
        while let Some(id) = parent {
            let ancestor = self
                .registry()
                .execute(Select(By::<Option<Ticket>, _>::new(id)))
                .await
                .map_err(tracerr::wrap!())?;
            match ancestor {
                Some(Ticket::Granting(t)) if !t.is_expired(now) => {
                    parent = t.parent_id().cloned();
                }
                Some(Ticket::Granting(_) | Ticket::Service(_)) | None => {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

/// Error of [`GetTicket`] [`Query`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Registry`] error.
    ///
    /// [`Registry`]: crate::infra::Registry
    #[display("`Registry` operation failed: {_0}")]
    Registry(registry::Error),

    /// [`Ticket`] cannot be used.
    #[display("{_0}")]
    InvalidTicket(InvalidTicket),
}

#[cfg(all(test, feature = "memory"))]
mod spec {
    use std::time::Duration;

    use common::{
        operations::{By, Insert, Select},
        DateTime,
    };

    use crate::{
        domain::{
            ticket::{
                self, granting::ProxiedBy, ExpirationPolicy, InvalidReason,
                ServiceTicket, TicketGrantingTicket,
            },
            Ticket,
        },
        infra::Registry as _,
        testing, Query as _,
    };

    use super::{ExecutionError, GetTicket};

    fn reason(err: &ExecutionError) -> InvalidReason {
        match err {
            ExecutionError::InvalidTicket(e) => e.reason,
            ExecutionError::Registry(e) => panic!("unexpected error: {e}"),
        }
    }

    async fn insert(
        service: &testing::Service,
        id: &str,
        parent: Option<&str>,
        policy: ExpirationPolicy,
        created_at: DateTime,
    ) {
        let tgt = TicketGrantingTicket::new(
            id.into(),
            testing::authentication("casuser"),
            parent.map(|p| ProxiedBy {
                ticket_granting_ticket: p.into(),
                service: testing::service_id("https://proxy.example.com"),
            }),
            policy,
            created_at,
        );
        service.registry().execute(Insert(tgt.into())).await.unwrap();
    }

    #[tokio::test]
    async fn gets_valid_ticket() {
        let service = testing::service();
        insert(&service, "TGT-1", None, ExpirationPolicy::NeverExpires, DateTime::now()).await;

        let tgt = service
            .execute(GetTicket::<TicketGrantingTicket>::new("TGT-1"))
            .await
            .unwrap();
        let any = service.execute(GetTicket::<Ticket>::new("TGT-1")).await;

        assert_eq!(tgt.id(), &ticket::Id::from("TGT-1"));
        assert!(any.is_ok());
    }

    #[tokio::test]
    async fn rejects_absent_ticket() {
        let service = testing::service();

        let err = service
            .execute(GetTicket::<Ticket>::new("TGT-404"))
            .await
            .unwrap_err();

        assert_eq!(reason(err.as_ref()), InvalidReason::NotFound);
    }

    #[tokio::test]
    async fn rejects_wrong_type() {
        let service = testing::service();
        insert(&service, "TGT-1", None, ExpirationPolicy::NeverExpires, DateTime::now()).await;

        let err = service
            .execute(GetTicket::<ServiceTicket>::new("TGT-1"))
            .await
            .unwrap_err();

        assert_eq!(
            reason(err.as_ref()),
            InvalidReason::WrongType("ServiceTicket"),
        );
    }

    #[tokio::test]
    async fn evicts_expired_ticket() {
        let service = testing::service();
        let policy = ExpirationPolicy::HardTimeout {
            time_to_kill: Duration::from_secs(1),
        };
        insert(&service, "TGT-1", None, policy, DateTime::now() - Duration::from_secs(5)).await;

        let err = service
            .execute(GetTicket::<Ticket>::new("TGT-1"))
            .await
            .unwrap_err();

        assert_eq!(reason(err.as_ref()), InvalidReason::Expired);
        assert!(service
            .registry()
            .execute(Select(By::<Option<Ticket>, _>::new(ticket::Id::from(
                "TGT-1"
            ))))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn rejects_descendants_of_expired_ticket() {
        let service = testing::service();
        let policy = ExpirationPolicy::HardTimeout {
            time_to_kill: Duration::from_secs(1),
        };
        insert(&service, "TGT-1", None, policy, DateTime::now() - Duration::from_secs(5)).await;
        insert(&service, "PGT-2", Some("TGT-1"), ExpirationPolicy::NeverExpires, DateTime::now()).await;
        insert(&service, "PGT-3", Some("PGT-2"), ExpirationPolicy::NeverExpires, DateTime::now()).await;

        let err = service
            .execute(GetTicket::<TicketGrantingTicket>::new("PGT-3"))
            .await
            .unwrap_err();

        assert_eq!(reason(err.as_ref()), InvalidReason::Expired);
    }
}
