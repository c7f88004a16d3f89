//! lighthouse-services — authoritative registry state and the optional
//! external collaborators (Redis persistence, Qdrant semantic index).

pub mod semantic;
pub mod state;
pub mod store;

pub use semantic::{QdrantIndex, SearchHit, SemanticError};
pub use state::{RegistrationRecord, RegistryState, ServiceGroup, LIVENESS_TTL_SECS};
pub use store::{RedisStore, StoreError};
