//! Request aggregate - domain model and state transitions.
//!
//! This module contains the core domain logic for requests:
//! - Request types and statuses (typestate pattern)
//! - State transition methods
//! - Value objects (RequestData, RequestType, etc.)

pub mod state;
pub mod transitions;

// Re-export commonly used types
pub use state::*;
