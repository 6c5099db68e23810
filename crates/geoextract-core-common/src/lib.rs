//! Common types and traits shared across `GeoExtract` crates.
//!
//! This crate provides the seams between the extraction pipeline in
//! `geoextract-core` and the container drivers that implement them,
//! preventing a dependency from drivers on the pipeline itself.

pub mod capabilities;
pub mod connection;

// Re-export commonly used types
pub use capabilities::{Capabilities, SupportStatus};
pub use connection::{Connection, ConnectionOptions, ConnectionProvider, TextEncoding};
