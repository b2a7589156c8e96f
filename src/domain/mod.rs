//! Domain layer: entities, value objects and the persistence ports.
//!
//! Nothing in here performs IO. Entity methods validate and apply state
//! changes in memory; the stores in `infrastructure` make them durable and
//! atomic.

/// Declares a transparent `u64` identifier newtype.
macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

pub mod account;
pub mod actor;
pub mod commission;
pub mod config;
pub mod money;
pub mod order;
pub mod payment;
pub mod ports;
pub mod withdrawal;
