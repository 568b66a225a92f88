//! [`Command`] for granting a [`ServiceTicket`].

use std::sync::Arc;

use common::{operations::Insert, DateTime};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{
        service,
        ticket::{
            self, InvalidReason, InvalidTicket, Kind, ServiceTicket,
            TicketGrantingTicket, Variant as _,
        },
        Ticket,
    },
    infra::Backend,
    query::GetTicket,
    Service,
};

pub use crate::query::get_ticket::ExecutionError;

use super::{Command, MAX_ID_ATTEMPTS};

/// [`Command`] for granting a new [`ServiceTicket`] by a valid
/// [`TicketGrantingTicket`].
///
/// Previously granted [`ServiceTicket`]s of the same service may stop being
/// tracked by the [`TicketGrantingTicket`], according to the configured
/// [`SessionTrackingPolicy`].
///
/// [`SessionTrackingPolicy`]: ticket::SessionTrackingPolicy
#[derive(Clone, Debug)]
pub struct GrantServiceTicket {
    /// ID of the granting [`TicketGrantingTicket`].
    pub ticket_granting_ticket: ticket::Id,

    /// Service to grant a [`ServiceTicket`] for.
    pub service: service::Id,

    /// Indicator whether credentials were provided in the current
    /// transaction.
    pub credentials_provided: bool,
}

impl<Reg> Command<GrantServiceTicket> for Service<Reg>
where
    Reg: Backend,
{
    type Ok = ServiceTicket;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: GrantServiceTicket,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let GrantServiceTicket {
            ticket_granting_ticket: tgt_id,
            service,
            credentials_provided,
        } = cmd;

        drop(
            self.execute(GetTicket::<TicketGrantingTicket>::new(tgt_id.clone()))
                .await
                .map_err(tracerr::wrap!())?,
        );

        let policy = self.config().service_ticket_expiration;
        let tracking_policy = Arc::clone(&self.tracking_policy);
        let mut attempt = 1;
        loop {
            let id = self.ids.generate(Kind::Service);
            let now = DateTime::now();
            let granted = self
                .registry()
                .modify(tgt_id.clone(), |t| match t {
                    Ticket::Granting(t) if !t.is_expired(now) => {
                        Ok(t.grant_service_ticket(
                            id.clone(),
                            service.clone(),
                            policy,
                            credentials_provided,
                            &*tracking_policy,
                            now,
                        ))
                    }
                    Ticket::Granting(_) => Err(InvalidReason::Expired),
                    Ticket::Service(_) => Err(InvalidReason::WrongType(
                        TicketGrantingTicket::NAME,
                    )),
                })
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?
                .unwrap_or(Err(InvalidReason::NotFound))
                .map_err(|reason| {
                    tracerr::new!(E::InvalidTicket(InvalidTicket::new(
                        tgt_id.clone(),
                        reason,
                    )))
                })?;
            for old in &granted.untracked {
                log::debug!(
                    "`TicketGrantingTicket(id: {tgt_id})` stopped tracking \
                     `ServiceTicket(id: {old})`",
                );
            }

            let st = granted.ticket;
            let Err(e) = self
                .registry()
                .execute(Insert(Ticket::from(st.clone())))
                .await
            else {
                log::debug!(
                    "`TicketGrantingTicket(id: {tgt_id})` granted \
                     `ServiceTicket(id: {id})` for `{service}`",
                );
                return Ok(st);
            };

            // Replaced sessions are not restored.
            let rollback = self
                .registry()
                .modify(tgt_id.clone(), |t| {
                    if let Ticket::Granting(t) = t {
                        _ = t.remove_service(&id);
                    }
                })
                .await;
            if let Err(re) = rollback {
                log::warn!(
                    "failed to untrack `ServiceTicket(id: {id})` from \
                     `TicketGrantingTicket(id: {tgt_id})`: {re}",
                );
            }

            if e.as_ref().is_duplicate() && attempt < MAX_ID_ATTEMPTS {
                log::warn!("regenerating `{}` ticket ID: {e}", Kind::Service);
                attempt += 1;
                continue;
            }
            return Err(e).map_err(tracerr::map_from_and_wrap!(=> E));
        }
    }
}

#[cfg(all(test, feature = "memory"))]
mod spec {
    use std::{sync::Arc, thread};

    use futures::executor::block_on;

    use crate::{
        command::CreateTicketGrantingTicket,
        domain::ticket::{InvalidReason, Kind, TicketGrantingTicket},
        query::GetTicket,
        testing, Command as _, Config,
    };

    use super::{ExecutionError, GrantServiceTicket};

    async fn login(service: &testing::Service) -> TicketGrantingTicket {
        service
            .execute(CreateTicketGrantingTicket {
                authentication: testing::authentication("casuser"),
                client: Some(testing::client()),
            })
            .await
            .unwrap()
            .ticket_granting_ticket
    }

    fn grant(tgt: &TicketGrantingTicket, service: &str) -> GrantServiceTicket {
        GrantServiceTicket {
            ticket_granting_ticket: tgt.id().clone(),
            service: testing::service_id(service),
            credentials_provided: false,
        }
    }

    async fn tracked(
        service: &testing::Service,
        tgt: &TicketGrantingTicket,
    ) -> usize {
        service
            .execute(GetTicket::<TicketGrantingTicket>::new(tgt.id().clone()))
            .await
            .unwrap()
            .services()
            .len()
    }

    #[tokio::test]
    async fn grants_tracked_ticket() {
        let service = testing::service();
        let tgt = login(&service).await;

        let st = service
            .execute(grant(&tgt, "https://app.example.com"))
            .await
            .unwrap();

        assert_eq!(st.id().kind(), Some(Kind::Service));
        assert_eq!(st.ticket_granting_ticket(), tgt.id());
        assert!(st.is_from_new_login());
        let tgt = service
            .execute(GetTicket::<TicketGrantingTicket>::new(tgt.id().clone()))
            .await
            .unwrap();
        assert!(tgt.services().contains_key(st.id()));
        assert_eq!(tgt.state().uses, 1);
    }

    #[tokio::test]
    async fn only_first_grant_is_from_new_login() {
        let service = testing::service();
        let tgt = login(&service).await;

        let first = service
            .execute(grant(&tgt, "https://app.example.com"))
            .await
            .unwrap();
        let second = service
            .execute(grant(&tgt, "https://other.example.com"))
            .await
            .unwrap();
        let renewed = service
            .execute(GrantServiceTicket {
                credentials_provided: true,
                ..grant(&tgt, "https://other.example.com")
            })
            .await
            .unwrap();

        assert!(first.is_from_new_login());
        assert!(!second.is_from_new_login());
        assert!(renewed.is_from_new_login());
    }

    #[tokio::test]
    async fn tracks_most_recent_session() {
        let service = testing::service();
        let tgt = login(&service).await;

        for s in [
            "https://app.example.com/cas",
            "https://app.example.com/cas;jsessionid=42",
            "https://app.example.com/cas?ticket=ST-1",
            "https://other.example.com",
        ] {
            drop(service.execute(grant(&tgt, s)).await.unwrap());
        }

        assert_eq!(tracked(&service, &tgt).await, 2);
    }

    #[tokio::test]
    async fn tracks_all_sessions() {
        let service = testing::service_with(Config {
            only_track_most_recent_session: false,
            ..Config::default()
        });
        let tgt = login(&service).await;

        for _ in 0..3 {
            drop(
                service
                    .execute(grant(&tgt, "https://app.example.com"))
                    .await
                    .unwrap(),
            );
        }

        assert_eq!(tracked(&service, &tgt).await, 3);
    }

    #[tokio::test]
    async fn rejects_service_ticket_as_granting() {
        let service = testing::service();
        let tgt = login(&service).await;
        let st = service
            .execute(grant(&tgt, "https://app.example.com"))
            .await
            .unwrap();

        let err = service
            .execute(GrantServiceTicket {
                ticket_granting_ticket: st.id().clone(),
                ..grant(&tgt, "https://app.example.com")
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err.as_ref(),
            ExecutionError::InvalidTicket(e)
                if e.reason == InvalidReason::WrongType("TicketGrantingTicket"),
        ));
    }

    #[tokio::test]
    async fn grants_from_spawned_task() {
        let service = testing::service();
        let tgt = login(&service).await;
        let cmd = grant(&tgt, "https://app.example.com");

        let st = tokio::spawn(async move { service.execute(cmd).await })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(st.id().kind(), Some(Kind::Service));
    }

    #[test]
    fn concurrent_grants_keep_one_session() {
        let service = Arc::new(testing::service());
        let tgt = block_on(login(&service));

        let handles = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                let cmd = grant(&tgt, "https://app.example.com");
                thread::spawn(move || block_on(service.execute(cmd)).unwrap())
            })
            .collect::<Vec<_>>();
        for h in handles {
            drop(h.join().unwrap());
        }

        assert_eq!(block_on(tracked(&service, &tgt)), 1);
    }
}
