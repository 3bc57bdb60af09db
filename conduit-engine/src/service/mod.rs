//! Service Module
//!
//! Business logic layer of the engine.
//! Services orchestrate between the registry and pipelines.

pub mod capabilities;
pub mod coordinator;

pub use capabilities::{CapabilitiesService, StandardCapabilitiesService};
pub use coordinator::Coordinator;
