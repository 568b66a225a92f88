//! [`Error`]-related definitions.

use std::fmt;

use axum::{
    extract::rejection::QueryRejection,
    response::{IntoResponse, Response},
    Json,
};
use derive_more::Error as StdError;
use itertools::Itertools as _;
use serde::Serialize;
use service::{
    cookie::{self, InvalidCookie},
    domain::ticket::{InvalidReason, InvalidTicket},
    infra::registry,
};
use tracerr::{Trace, Traced};
use tracing as log;

/// Defines a new error type.
#[expect(clippy::module_name_repetitions, reason = "more readable")]
#[macro_export]
macro_rules! define_error {
    (
        enum $name:ident {
            $(
                #[code = $code:literal]
                #[status = $status_code:ident]
                #[message = $message:literal]
                $variant:ident
            ),* $(,)?
        }
    ) => {
        /// Error type.
        #[derive(
            Clone,
            Copy,
            Debug,
            ::derive_more::Display,
            ::derive_more::Error
        )]
        #[repr(u16)]
        pub enum $name {
            $(
                #[display($message)]
                #[doc = $message]
                $variant,
            )*
        }

        impl From<$name> for $crate::Error {
            fn from(err: $name) -> Self {
                match err {
                    $(
                        $name::$variant => Self {
                            code: $code,
                            status_code: ::http::StatusCode::$status_code,
                            message: $message.to_string(),
                            backtrace: None,
                        },
                    )*
                }
            }
        }
    };
}

/// HTTP API [`Error`].
#[derive(Clone, Debug, StdError)]
pub struct Error {
    /// [`Error`] code.
    pub code: Code,

    /// [`http::StatusCode`] of this [`Error`].
    pub status_code: http::StatusCode,

    /// Backtrace of this [`Error`].
    #[error(not(backtrace))]
    pub backtrace: Option<Trace>,

    /// [`Error`] message.
    pub message: String,
}

impl Error {
    /// Create a new [`Error`] representing an internal server error.
    #[must_use]
    pub fn internal(msg: &impl ToString) -> Self {
        Self {
            code: "INTERNAL_SERVER_ERROR",
            status_code: http::StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.to_string(),
            backtrace: None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            code,
            status_code: _,
            backtrace,
            message,
        } = self;

        write!(
            f,
            "[{code}]: {message}{}",
            backtrace
                .iter()
                .format_with("\n", |trace, f| f(&format_args!("{trace}"))),
        )
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        /// JSON body of an [`Error`] response.
        #[derive(Serialize)]
        struct Body {
            /// [`Error`] code.
            code: Code,

            /// [`Error`] message.
            message: String,
        }

        if self.status_code.is_server_error() {
            log::error!("{self}");
        }
        (
            self.status_code,
            Json(Body {
                code: self.code,
                message: self.message,
            }),
        )
            .into_response()
    }
}

/// [`Error`] code.
pub type Code = &'static str;

/// Helper trait for converting types into [`Error`]s.
pub trait AsError {
    /// Tries to convert the type into an [`Error`].
    ///
    /// [`None`] is returned if the type cannot be converted into an [`Error`].
    fn try_as_error(&self) -> Option<Error>;

    /// Converts the type into an [`Error`].
    fn as_error(&self) -> Error
    where
        Self: fmt::Display,
    {
        self.try_as_error()
            .unwrap_or_else(|| Error::internal(&self))
    }

    /// Converts the type into an [`Error`] by consuming it.
    fn into_error(self) -> Error
    where
        Self: fmt::Display + Sized,
    {
        self.as_error()
    }
}

impl<E: AsError> AsError for Traced<E> {
    fn try_as_error(&self) -> Option<Error> {
        let mut error = self.as_ref().try_as_error()?;
        error.backtrace = Some(self.trace().clone());
        Some(error)
    }
}

impl AsError for QueryRejection {
    fn try_as_error(&self) -> Option<Error> {
        Some(Error {
            code: "BAD_REQUEST",
            status_code: http::StatusCode::BAD_REQUEST,
            message: self.body_text(),
            backtrace: None,
        })
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        rejection.into_error()
    }
}

impl AsError for registry::Error {
    fn try_as_error(&self) -> Option<Error> {
        None
    }
}

impl AsError for InvalidTicket {
    fn try_as_error(&self) -> Option<Error> {
        define_error! {
            enum Error {
                #[code = "INVALID_TICKET"]
                #[status = UNAUTHORIZED]
                #[message = "Ticket is not recognized"]
                NotRecognized,

                #[code = "INVALID_TICKET"]
                #[status = UNAUTHORIZED]
                #[message = "Ticket is expired"]
                Expired,

                #[code = "INVALID_TICKET_SPEC"]
                #[status = BAD_REQUEST]
                #[message = "Ticket is of unexpected type"]
                WrongType,

                #[code = "INVALID_SERVICE"]
                #[status = UNAUTHORIZED]
                #[message = "Ticket was issued for another service"]
                ServiceMismatch,
            }
        }

        Some(
            match self.reason {
                InvalidReason::NotFound => Error::NotRecognized,
                InvalidReason::Expired => Error::Expired,
                InvalidReason::WrongType(_) => Error::WrongType,
                InvalidReason::ServiceMismatch => Error::ServiceMismatch,
            }
            .into(),
        )
    }
}

impl AsError for InvalidCookie {
    fn try_as_error(&self) -> Option<Error> {
        Some(SessionError::InvalidSession.into())
    }
}

impl AsError for cookie::BuildError {
    fn try_as_error(&self) -> Option<Error> {
        define_error! {
            enum Error {
                #[code = "CLIENT_INFO_REQUIRED"]
                #[status = BAD_REQUEST]
                #[message = "Client IP address and `User-Agent` are required"]
                ClientInfoRequired,
            }
        }

        match self {
            Self::IllegalState(_) | Self::ReservedDelimiter => {
                Some(Error::ClientInfoRequired.into())
            }
            Self::Cipher(_) => None,
        }
    }
}

define_error! {
    enum SessionError {
        #[code = "AUTHENTICATION_REQUIRED"]
        #[status = UNAUTHORIZED]
        #[message = "Authentication required"]
        AuthenticationRequired,

        #[code = "INVALID_SESSION"]
        #[status = UNAUTHORIZED]
        #[message = "Session is not recognized"]
        InvalidSession,
    }
}
