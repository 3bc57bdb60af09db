//! Repository Module
//!
//! State layer of the engine. Pipelines live in memory only; the registry
//! is the single place where they are stored and looked up.

pub mod registry;

pub use registry::Registry;
