//! Helpers for testing [`Service`] operations.

use std::net::{IpAddr, Ipv4Addr};

use crate::{
    cookie::ClientInfo,
    domain::{
        authentication::{Principal, PrincipalId},
        service, Authentication,
    },
    infra::InMemory,
    Config,
};

/// [`crate::Service`] backed by the [`InMemory`] registry.
pub(crate) type Service = crate::Service<InMemory>;

/// Creates a new [`Service`] with the default [`Config`].
pub(crate) fn service() -> Service {
    service_with(Config::default())
}

/// Creates a new [`Service`] with the provided [`Config`].
///
/// Background tasks are not run.
pub(crate) fn service_with(config: Config) -> Service {
    Service::new(config, InMemory::default()).0
}

/// Creates a new [`Authentication`] of the provided user.
pub(crate) fn authentication(user: &str) -> Authentication {
    Authentication::new(Principal::new(
        PrincipalId::new(user).expect("valid principal ID"),
    ))
}

/// Parses the provided [`service::Id`].
pub(crate) fn service_id(id: &str) -> service::Id {
    service::Id::new(id).expect("valid service ID")
}

/// Returns [`ClientInfo`] of a typical test client.
pub(crate) fn client() -> ClientInfo {
    ClientInfo::new(IpAddr::V4(Ipv4Addr::LOCALHOST), "Test-Client/1.0.0")
}
