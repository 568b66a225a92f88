//! Infrastructure layer.

pub mod registry;

#[cfg(feature = "memory")]
pub use self::registry::InMemory;
pub use self::registry::{Backend, Registry};
