//! lighthouse-core — shared protocol types, stake verification, and the
//! demo embedding. All other Lighthouse crates depend on this one.

pub mod addr;
pub mod config;
pub mod embedding;
pub mod protocol;
pub mod stake;

pub use protocol::{AddrInfo, RegistryRequest, RegistryResponse, ServiceCard, StakeProof};
pub use stake::{verify_stake, ReplayGuard, StakeError};
