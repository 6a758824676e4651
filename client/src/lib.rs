//! # Tandem Client
//! Predicting client endpoint for a tandem synchronization core: drives the
//! session state machine, submits actions speculatively, replays the
//! server's committed operations in order, and verifies checksums.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod client;
mod client_config;
pub mod connection;
mod error;
mod events;

pub use client::{Client, PendingHandle};
pub use client_config::ClientConfig;
pub use connection::{transition, ConnectionState, Lifecycle, SessionInput};
pub use error::{ConnectError, SubmitError};
pub use events::ClientEvent;
