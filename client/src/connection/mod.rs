pub mod state;

pub use state::{transition, ConnectionState, Lifecycle, SessionInput};
