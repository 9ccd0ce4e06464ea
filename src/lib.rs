// Progress and score-history core for a term-sorting learning game.
// The binary in main.rs is a thin operator CLI over these modules; the
// benches and integration tests import them through this crate root.

pub mod config;
pub mod content;
pub mod engine;
pub mod error;
pub mod logging;
pub mod remote;
pub mod service;
pub mod session;
pub mod store;
pub mod wizard;

pub use error::{FlowError, ProgressError, ProgressResult, RemoteError};
