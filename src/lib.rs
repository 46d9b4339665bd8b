//! routescout: route discovery and manifest synthesis
//!
//! This crate onboards an already-built HTTP service onto a hosting platform
//! by finding out which endpoints it serves and writing them down as a
//! passthrough route manifest.
//!
//! # Discovery Model
//!
//! Services are never trusted to report readiness. A port that accepts a TCP
//! connection is reachable; a schema that parses is discovered; anything else
//! falls back to the routes the operator declared.
//!
//! # Architecture
//!
//! - **Routes**: route model, normalization, filtering and merging (no I/O)
//! - **Portwait**: TCP reachability polling
//! - **Probe**: HTTP probing for OpenAPI/Swagger documents
//! - **Supervisor**: process/container launch, log capture and teardown
//! - **Manifest**: atomic manifest writes and consumer-side loading
//! - **Service**: TOML service specifications
//! - **Config**: hierarchical TOML configuration
//! - **Pipeline**: one discovery run, start to finish
//! - **Platform**: client for the hosting platform's CLI

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod cli;
pub mod cli_handler;
pub mod config;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod platform;
pub mod portwait;
pub mod probe;
pub mod routes;
pub mod service;
pub mod supervisor;
