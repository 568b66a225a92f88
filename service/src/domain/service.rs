//! [`Id`] of a target service and its matching strategies.

use std::{borrow::Cow, collections::BTreeSet, sync::Arc};

use derive_more::{AsRef, Display, Into};
use serde::{Deserialize, Serialize};
use url::{form_urlencoded, Url};

/// Identifier of a target service a [`ServiceTicket`] is granted for.
///
/// Usually an URL the user agent is redirected back to, but treated as an
/// opaque string where it's not.
///
/// [`ServiceTicket`]: crate::domain::ticket::ServiceTicket
#[derive(
    AsRef,
    Clone,
    Debug,
    Deserialize,
    Display,
    Eq,
    Hash,
    Into,
    PartialEq,
    Serialize,
)]
#[as_ref(str, String)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    /// Creates a new [`Id`] if the given `id` is valid.
    ///
    /// [`None`] is returned for blank identifiers.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        (!id.trim().is_empty()).then_some(Self(id))
    }
}

/// Strategy deciding whether two service [`Id`]s denote the same logical
/// service.
pub trait Matcher {
    /// Checks whether the provided service [`Id`]s are equivalent.
    fn matches(&self, a: &Id, b: &Id) -> bool;
}

impl<M: Matcher + ?Sized> Matcher for Arc<M> {
    fn matches(&self, a: &Id, b: &Id) -> bool {
        (**self).matches(a, b)
    }
}

/// [`Matcher`] comparing service [`Id`]s literally.
#[derive(Clone, Copy, Debug, Default)]
pub struct Exact;

impl Matcher for Exact {
    fn matches(&self, a: &Id, b: &Id) -> bool {
        a == b
    }
}

/// [`Matcher`] ignoring session-scoped parts of service URLs.
///
/// Two URLs match if their scheme, host, effective port, path and
/// identifying query parameters are equal. Ignored parts are:
/// - fragments;
/// - `;`-delimited path parameters (`/app;JSESSIONID=...`);
/// - trailing slashes of the path;
/// - query parameters named as one of the session parameters;
/// - query parameters without a value (`?test`).
///
/// Identifiers that cannot be parsed as URLs are compared literally.
#[derive(Clone, Debug)]
pub struct SessionInsensitive {
    /// Lowercase names of session-scoped query parameters.
    session_parameters: BTreeSet<String>,
}

impl SessionInsensitive {
    /// Default names of session-scoped query parameters.
    pub const DEFAULT_SESSION_PARAMETERS: &'static [&'static str] = &[
        "aspsessionid",
        "jsessionid",
        "phpsessid",
        "session_id",
        "sessionid",
        "sid",
        "ticket",
    ];

    /// Creates a new [`SessionInsensitive`] matcher ignoring the provided
    /// query parameters (case-insensitively).
    #[must_use]
    pub fn new<I, S>(session_parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            session_parameters: session_parameters
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Normalizes the provided service [`Id`] into its comparable form.
    ///
    /// [`None`] is returned if the [`Id`] is not an URL.
    fn normalize(&self, id: &Id) -> Option<Normalized> {
        let raw: &str = id.as_ref();
        let raw = raw.split_once('#').map_or(raw, |(before, _)| before);
        let (location, query) = raw
            .split_once('?')
            .map_or((raw, None), |(l, q)| (l, Some(q)));

        let url = Url::parse(&strip_path_parameters(location)).ok()?;
        if url.cannot_be_a_base() {
            return None;
        }

        let path = url.path().trim_end_matches('/').to_owned();
        let query = query
            .map(|q| {
                form_urlencoded::parse(q.as_bytes())
                    .filter(|(name, value)| {
                        !value.is_empty()
                            && !self
                                .session_parameters
                                .contains(&name.to_lowercase())
                    })
                    .map(|(n, v)| (n.into_owned(), v.into_owned()))
                    .collect::<BTreeSet<_>>()
            })
            .unwrap_or_default();

        Some(Normalized {
            scheme: url.scheme().to_owned(),
            host: url.host_str().map(str::to_lowercase),
            port: url.port_or_known_default(),
            path,
            query,
        })
    }
}

impl Default for SessionInsensitive {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SESSION_PARAMETERS)
    }
}

impl Matcher for SessionInsensitive {
    fn matches(&self, a: &Id, b: &Id) -> bool {
        match (self.normalize(a), self.normalize(b)) {
            (Some(a), Some(b)) => a == b,
            (None, None) => a == b,
            (Some(_), None) | (None, Some(_)) => false,
        }
    }
}

/// Comparable form of a service URL.
#[derive(Debug, Eq, PartialEq)]
struct Normalized {
    /// Lowercase scheme of the URL.
    scheme: String,

    /// Lowercase host of the URL, if any.
    host: Option<String>,

    /// Explicit or scheme-default port of the URL.
    port: Option<u16>,

    /// Path without path parameters and trailing slashes.
    path: String,

    /// Identifying query parameters.
    query: BTreeSet<(String, String)>,
}

/// Removes `;`-delimited parameters from every segment of the provided
/// URL location (everything before its query).
fn strip_path_parameters(location: &str) -> Cow<'_, str> {
    if !location.contains(';') {
        return Cow::Borrowed(location);
    }
    Cow::Owned(
        location
            .split('/')
            .map(|segment| {
                segment.split_once(';').map_or(segment, |(s, _)| s)
            })
            .collect::<Vec<_>>()
            .join("/"),
    )
}

#[cfg(test)]
mod spec {
    use super::{Exact, Id, Matcher as _, SessionInsensitive};

    fn id(s: &str) -> Id {
        Id::new(s).unwrap()
    }

    fn same(a: &str, b: &str) -> bool {
        SessionInsensitive::default().matches(&id(a), &id(b))
    }

    #[test]
    fn rejects_blank_ids() {
        assert!(Id::new("").is_none());
        assert!(Id::new("   ").is_none());
        assert!(Id::new("https://example.com").is_some());
    }

    #[test]
    fn ignores_session_parameters() {
        assert!(same("http://host.com?test", "http://host.com;JSESSIONID=xxx"));
        assert!(same(
            "https://app.example.com/cas?jsessionid=1",
            "https://app.example.com/cas?JSESSIONID=2",
        ));
        assert!(same(
            "https://app.example.com/cas/;jsessionid=1?lang=en",
            "https://app.example.com/cas?lang=en#top",
        ));
        assert!(same("https://APP.example.com/", "https://app.example.com"));
        assert!(same("https://app.example.com:443/x", "https://app.example.com/x"));
    }

    #[test]
    fn distinguishes_services() {
        assert!(!same("http://host.com/webapp1", "http://host.com/webapp2"));
        assert!(!same("http://host.com/app", "http://other.com/app"));
        assert!(!same("http://host.com:8080/app", "http://host.com:8081/app"));
        assert!(!same("http://host.com/app?tenant=a", "http://host.com/app?tenant=b"));
        assert!(!same("http://host.com/app", "https://host.com/app"));
    }

    #[test]
    fn query_parameters_distinguish_services() {
        assert!(!same("http://host.com/webapp1", "http://host.com/webapp1?test=true"));
        assert!(same(
            "http://host.com/webapp1?test=true",
            "http://host.com/webapp1?test=true&ticket=ST-1",
        ));
    }

    #[test]
    fn compares_opaque_ids_literally() {
        assert!(same("urn:service:one", "urn:service:one"));
        assert!(!same("urn:service:one", "urn:service:two"));
        assert!(!same("opaque", "http://opaque"));
    }

    #[test]
    fn exact_matcher() {
        assert!(Exact.matches(&id("http://host.com"), &id("http://host.com")));
        assert!(!Exact.matches(&id("http://host.com?a"), &id("http://host.com")));
    }

    #[test]
    fn custom_session_parameters() {
        let matcher = SessionInsensitive::new(["token"]);
        assert!(matcher.matches(
            &id("http://host.com/app?token=1"),
            &id("http://host.com/app?token=2"),
        ));
        assert!(!matcher.matches(
            &id("http://host.com/app?jsessionid=1"),
            &id("http://host.com/app?jsessionid=2"),
        ));
    }
}
