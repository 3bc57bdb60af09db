//! Conduit Core
//!
//! Core types and helpers shared by the Conduit engine, client and CLI.
//!
//! This crate contains:
//! - Domain types: pipeline identity, status and representation
//! - DTOs: request parameters and engine metadata exchanged over HTTP
//! - Parsing helpers for the `delay` and `params` query parameters

pub mod domain;
pub mod dto;
pub mod duration;
pub mod params;
