//! Core domain types
//!
//! These types describe pipelines as the engine tracks them and as clients
//! see them. The engine owns the live state; everything here is plain data.

pub mod engine;
pub mod pipeline;
