//! [`SessionTrackingPolicy`] definitions.

#[cfg(doc)]
use super::{ServiceTicket, TicketGrantingTicket};
use super::{granting::Services, Id};
use crate::domain::service::{self, Matcher, SessionInsensitive};

/// Policy deciding which [`ServiceTicket`]s tracked by a
/// [`TicketGrantingTicket`] are replaced by a newly granted one.
pub trait SessionTrackingPolicy {
    /// Returns IDs of the tracked [`ServiceTicket`]s to stop tracking before
    /// tracking a new one for the `candidate` service.
    fn apply(&self, services: &Services, candidate: &service::Id) -> Vec<Id>;
}

/// [`SessionTrackingPolicy`] keeping at most one [`ServiceTicket`] per
/// logical service, the most recent one.
#[derive(Clone, Debug, Default)]
pub struct TrackMostRecent<M = SessionInsensitive> {
    /// [`Matcher`] deciding whether two services are the same one.
    matcher: M,
}

impl<M> TrackMostRecent<M> {
    /// Creates a new [`TrackMostRecent`] policy with the provided
    /// [`Matcher`].
    #[must_use]
    pub fn new(matcher: M) -> Self {
        Self { matcher }
    }
}

impl<M: Matcher> SessionTrackingPolicy for TrackMostRecent<M> {
    fn apply(&self, services: &Services, candidate: &service::Id) -> Vec<Id> {
        services
            .iter()
            .filter(|(_, s)| self.matcher.matches(&s.service, candidate))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// [`SessionTrackingPolicy`] tracking every granted [`ServiceTicket`], so a
/// service may have multiple concurrent sessions.
#[derive(Clone, Copy, Debug, Default)]
pub struct TrackAll;

impl SessionTrackingPolicy for TrackAll {
    fn apply(&self, _: &Services, _: &service::Id) -> Vec<Id> {
        vec![]
    }
}

#[cfg(test)]
mod spec {
    use common::DateTime;

    use crate::domain::{
        service::{self, Exact},
        ticket::granting::{ServiceSession, Services},
    };

    use super::{SessionTrackingPolicy as _, TrackAll, TrackMostRecent};

    fn services(entries: &[(&str, &str)]) -> Services {
        entries
            .iter()
            .map(|(id, s)| {
                (
                    (*id).into(),
                    ServiceSession {
                        service: service::Id::new(*s).unwrap(),
                        registered_at: DateTime::now().coerce(),
                    },
                )
            })
            .collect()
    }

    fn svc(s: &str) -> service::Id {
        service::Id::new(s).unwrap()
    }

    #[test]
    fn most_recent_removes_equivalent_services() {
        let tracked = services(&[
            ("ST-1", "https://app.example.com/a;jsessionid=1"),
            ("ST-2", "https://app.example.com/a?jsessionid=2"),
            ("ST-3", "https://app.example.com/b"),
        ]);

        let mut removed = TrackMostRecent::<service::SessionInsensitive>::default()
            .apply(&tracked, &svc("https://app.example.com/a"));
        removed.sort();

        assert_eq!(removed, vec!["ST-1".into(), "ST-2".into()]);
    }

    #[test]
    fn most_recent_respects_matcher() {
        let tracked = services(&[("ST-1", "https://app.example.com/a;x=1")]);

        let removed = TrackMostRecent::new(Exact)
            .apply(&tracked, &svc("https://app.example.com/a"));

        assert!(removed.is_empty());
    }

    #[test]
    fn all_removes_nothing() {
        let tracked = services(&[("ST-1", "https://app.example.com/a")]);

        assert!(TrackAll
            .apply(&tracked, &svc("https://app.example.com/a"))
            .is_empty());
    }
}
