//! services/api/src/lib.rs
//!
//! The `api` service library: configuration, port adapters, the generation
//! pipelines and the web surface. The binaries in `src/bin` wire these together.

pub mod adapters;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod web;

#[cfg(test)]
pub(crate) mod test_support;
