//! lighthoused — the Lighthouse registry daemon, as a library.
//!
//! The binary in `main.rs` wires these pieces to an iroh endpoint, the
//! REST API, and the background loops. Exposed as a library so the
//! dispatch path can be exercised by integration tests without a live
//! network.

pub mod advertise;
pub mod gc;
pub mod keys;
pub mod restore;
pub mod rpc;
