//! Service contains the ticket lifecycle logic of the SSO server.
//!
//! List of available Cargo features:
#![doc = document_features::document_features!()]
#![deny(
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::all,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code
)]
#![forbid(non_ascii_idents)]
#![warn(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    clippy::pedantic,
    clippy::wildcard_enum_match_arm,
    deprecated_in_future,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    unused_crate_dependencies,
    unused_import_braces,
    unused_labels,
    unused_lifetimes,
    unused_qualifications,
    unused_results
)]

pub mod command;
pub mod cookie;
pub mod domain;
pub mod infra;
pub mod query;
pub mod task;
#[cfg(all(test, feature = "memory"))]
mod testing;

use std::{error::Error, sync::Arc};

use common::operations::{By, Start};
use derive_more::Debug;
use smart_default::SmartDefault;

use self::domain::{
    service::{Matcher, SessionInsensitive},
    ticket::{
        tracking::{TrackAll, TrackMostRecent},
        ExpirationPolicy, IdGenerator, SessionTrackingPolicy,
    },
};
#[cfg(doc)]
use self::{
    domain::ticket::{ServiceTicket, TicketGrantingTicket},
    infra::Registry,
};

pub use self::{command::Command, query::Query, task::Task};

/// [`Service`] configuration.
#[derive(Clone, Debug, SmartDefault)]
pub struct Config {
    /// [`ExpirationPolicy`] of root [`TicketGrantingTicket`]s.
    #[default(ExpirationPolicy::DEFAULT_TICKET_GRANTING)]
    pub ticket_granting_ticket_expiration: ExpirationPolicy,

    /// [`ExpirationPolicy`] of proxied [`TicketGrantingTicket`]s.
    #[default(ExpirationPolicy::DEFAULT_TICKET_GRANTING)]
    pub proxy_granting_ticket_expiration: ExpirationPolicy,

    /// [`ExpirationPolicy`] of [`ServiceTicket`]s.
    #[default(ExpirationPolicy::DEFAULT_SERVICE)]
    pub service_ticket_expiration: ExpirationPolicy,

    /// Indicator whether a [`TicketGrantingTicket`] tracks only the most
    /// recent [`ServiceTicket`] of every service.
    #[default(true)]
    pub only_track_most_recent_session: bool,

    /// Names of service URL query parameters ignored when matching services.
    #[default(
        SessionInsensitive::DEFAULT_SESSION_PARAMETERS
            .iter()
            .map(|&p| p.to_owned())
            .collect()
    )]
    pub service_session_parameters: Vec<String>,

    /// Suffix of generated ticket IDs (usually a node name).
    pub ticket_id_suffix: Option<String>,

    /// [`cookie::ValueManager`] configuration.
    pub cookie: cookie::Config,

    /// [`cookie::Signing`] cipher of session cookie values, if any.
    pub cookie_signing: Option<cookie::Signing>,

    /// [`task::CleanExpiredTickets`] configuration.
    pub clean_expired_tickets: task::clean_expired_tickets::Config,
}

/// Domain service.
#[derive(Clone, Debug)]
pub struct Service<Reg> {
    /// Configuration of this [`Service`].
    config: Config,

    /// [`Registry`] of this [`Service`].
    registry: Reg,

    /// Generator of ticket IDs.
    ids: Arc<IdGenerator>,

    /// Manager of session cookie values.
    cookies: cookie::ValueManager,

    /// [`Matcher`] of service IDs.
    #[debug(skip)]
    matcher: Arc<dyn Matcher + Send + Sync>,

    /// [`SessionTrackingPolicy`] applied on granting [`ServiceTicket`]s.
    #[debug(skip)]
    tracking_policy: Arc<dyn SessionTrackingPolicy + Send + Sync>,
}

impl<Reg> Service<Reg> {
    /// Creates a new [`Service`] with the provided parameters.
    pub fn new(config: Config, registry: Reg) -> (Self, task::Background)
    where
        Self: Task<
                Start<
                    By<
                        task::CleanExpiredTickets<Self>,
                        task::clean_expired_tickets::Config,
                    >,
                >,
                Ok = (),
                Err: Error,
            > + Clone
            + 'static,
    {
        let matcher: Arc<dyn Matcher + Send + Sync> = Arc::new(
            SessionInsensitive::new(&config.service_session_parameters),
        );
        let tracking_policy: Arc<dyn SessionTrackingPolicy + Send + Sync> =
            if config.only_track_most_recent_session {
                Arc::new(TrackMostRecent::new(Arc::clone(&matcher)))
            } else {
                Arc::new(TrackAll)
            };
        let cookies = match config.cookie_signing.clone() {
            Some(cipher) => {
                cookie::ValueManager::with_cipher(config.cookie.clone(), cipher)
            }
            None => cookie::ValueManager::new(config.cookie.clone()),
        };

        let this = Service {
            ids: Arc::new(IdGenerator::new(config.ticket_id_suffix.clone())),
            config,
            registry,
            cookies,
            matcher,
            tracking_policy,
        };

        let mut bg = task::Background::default();
        let svc = this.clone();
        bg.spawn("clean_expired_tickets", async move {
            svc.execute(Start(By::new(svc.config().clean_expired_tickets)))
                .await
        });

        (this, bg)
    }

    /// Returns [`Config`] of this [`Service`].
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns [`Registry`] of this [`Service`].
    #[must_use]
    pub fn registry(&self) -> &Reg {
        &self.registry
    }

    /// Returns [`cookie::ValueManager`] of this [`Service`].
    #[must_use]
    pub fn cookies(&self) -> &cookie::ValueManager {
        &self.cookies
    }
}
