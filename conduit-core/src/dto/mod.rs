//! Data Transfer Objects for the engine HTTP API

pub mod pipeline;
