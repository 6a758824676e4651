//! # Tandem Server
//! The authoritative endpoint of a tandem deployment. Owns the model of
//! record for every granted session, commits actions in a single total
//! order, and reports a checksum for each committed operation so clients
//! can prove they replayed it identically.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod error;
mod events;
mod server;
mod server_config;
mod session;

pub use error::PushError;
pub use events::ServerEvent;
pub use server::Server;
pub use server_config::ServerConfig;
pub use session::ClientKey;
