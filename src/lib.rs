//! vault-bootstrap library crate, for the binary and for integration testing.
//!
//! Re-exports modules needed by integration tests in `tests/`.

pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod store;
pub mod vault;

pub use bootstrap::{run_bootstrap, BootstrapOptions, BootstrapOutcome};
pub use errors::BootstrapError;
