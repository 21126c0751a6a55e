//! services/api/src/lib.rs
//!
//! Library crate for the `api` service: configuration, the database adapter
//! and the web layer. The binaries under `src/bin` wire these together.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
