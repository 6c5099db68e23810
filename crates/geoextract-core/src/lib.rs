//! `geoextract-core` extracts vector layers and rasters from GIS project
//! containers reached through a SQL driver.
//!
//! This crate includes:
//! - **Query shaping**: topology-filtered queries with a collision-free geometry alias.
//! - **Geometry decoding**: WKB blobs into typed `geo-types` collections.
//! - **Coordinate translation**: container WKT into PROJ parameter strings, directly or
//!   through a side-car file round trip.
//! - **Raster reconstruction**: georeferenced grids from tabular pixel records.
//!
//! The `operations` module exposes [`SpatialExtractor`], which drives the pipeline
//! against any [`ConnectionProvider`](geoextract_core_common::ConnectionProvider).

pub mod crs;
pub mod error;
pub mod geometry;
pub mod operations;
pub mod options;
pub mod query;
pub mod raster;
pub mod types;

pub use crs::{CoordinateTranslator, ProjectionDescriptor, select_translator};
pub use error::{ConfigError, ExtractError, Result};
pub use geometry::GeometryCollection;
pub use operations::{ScopedConnection, SpatialExtractor, SpatialLayer, VectorOutput};
pub use options::{ExtractOptions, RowOrder};
pub use raster::{RasterGeoreference, RasterGrid};
pub use types::TopologyKind;
