//! External Collaborators
//!
//! Narrow traits for the services the engine consumes but does not own,
//! with in-process implementations for tests and local runs.

pub mod cache;
pub mod oracle;

pub use cache::{CacheError, CacheLookup, MemoryCache};
pub use oracle::{EnergyBalance, IdentityOracle, MemoryOracle, OracleError};
