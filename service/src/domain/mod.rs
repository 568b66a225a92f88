//! Domain definitions.

pub mod authentication;
pub mod service;
pub mod ticket;

pub use self::{authentication::Authentication, ticket::Ticket};
