//! Custom error types for `GeoExtract` operations.
//!
//! This module provides structured error handling using `thiserror`. Every
//! failure is fatal to the extraction call that raised it: nothing is retried
//! and no partial result is returned.

use thiserror::Error;

use crate::types::TopologyKind;

/// Boxed error from an external collaborator (driver, format reader).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for `GeoExtract` operations.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The data source could not be opened.
    #[error("Failed to open data source '{locator}': {source}")]
    Connection {
        /// The data source locator
        locator: String,
        /// The underlying driver error
        #[source]
        source: BoxError,
    },

    /// Query execution failed in the driver.
    #[error("Query failed: {source}\n  query: {query}")]
    Query {
        /// The query text that was executed
        query: String,
        /// The underlying driver error
        #[source]
        source: BoxError,
    },

    /// A spatial object was requested from a query that returned no rows.
    #[error("Query against '{table}' returned no rows; cannot build a spatial layer")]
    EmptyResult {
        /// The queried table
        table: String,
    },

    /// A binary geometry blob could not be decoded.
    #[error("Malformed geometry at row {row}: {message}")]
    Decode {
        /// Zero-based row index of the offending blob
        row: usize,
        /// Description of the decoding problem
        message: String,
    },

    /// A decoded geometry does not match the requested topology.
    #[error("Geometry at row {row} is a {found}, expected {expected} topology")]
    TypeMismatch {
        /// Zero-based row index of the offending geometry
        row: usize,
        /// The requested topology
        expected: TopologyKind,
        /// The geometry type found
        found: String,
    },

    /// Coordinate-system text could not be turned into a projection.
    #[error("Cannot resolve projection: {message}")]
    Projection {
        /// Why the projection is unresolvable
        message: String,
    },

    /// The raster probe was missing or degenerate.
    #[error("Invalid raster georeference for '{component}': {message}")]
    Georeference {
        /// The raster component
        component: String,
        /// What is wrong with the probe
        message: String,
    },

    /// A required capability is not available in this build.
    #[error("{capability} support is not available")]
    Capability {
        /// The missing capability
        capability: String,
    },

    /// Configuration errors
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// Generic errors from collaborators outside the taxonomy above
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration errors.
///
/// These errors occur when options, identifiers or query overrides are
/// invalid, before any data is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid option value
    #[error("Invalid {option} option: {message}")]
    InvalidOption {
        /// The option name
        option: String,
        /// Why it's invalid
        message: String,
    },

    /// Required option is missing
    #[error("Missing required option: {option}")]
    MissingRequired {
        /// The missing option name
        option: String,
    },

    /// Options conflict with each other
    #[error("Conflicting options: {options}")]
    ConflictingOptions {
        /// Description of the conflicting options
        options: String,
    },

    /// A query override or generated query is unusable
    #[error("Invalid query: {message}")]
    InvalidQuery {
        /// Why the query is unusable
        message: String,
    },

    /// Topology name is not one of area, line or point
    #[error("Unknown topology kind '{name}'; expected one of area, line, point")]
    UnknownTopology {
        /// The rejected name
        name: String,
    },
}

/// Type alias for Results using `ExtractError`.
pub type Result<T> = std::result::Result<T, ExtractError>;

impl ExtractError {
    /// Get a user-friendly error message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Query { source, .. } => format!("Query error: {source}"),
            Self::Configuration(e) => format!("Configuration error: {e}"),
            Self::Other(e) => format!("Error: {e}"),
            _ => self.to_string(),
        }
    }

    /// Get recovery suggestions if available.
    #[must_use]
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::Connection { .. } => {
                Some("Check that the locator points at an existing project file.".to_string())
            },
            Self::EmptyResult { .. } => Some(
                "Check the topology kind, or extract without the spatial flag to inspect the table."
                    .to_string(),
            ),
            Self::TypeMismatch { .. } => {
                Some("Request the topology kind that matches the stored geometries.".to_string())
            },
            Self::Projection { .. } => Some(
                "Assign a coordinate system to the component, or allow unknown projections."
                    .to_string(),
            ),
            Self::Capability { .. } => {
                Some("Rebuild with the corresponding cargo feature enabled.".to_string())
            },
            Self::Configuration(ConfigError::UnknownTopology { .. }) => {
                Some("Use one of: area, line, point.".to_string())
            },
            _ => None,
        }
    }

    /// Check if this error is potentially recoverable.
    ///
    /// Only configuration errors can be fixed by retrying with different
    /// parameters; every other failure is structural.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

/// Extension trait for attaching extraction context to collaborator errors.
pub trait ExtractErrorExt<T> {
    /// Wrap an error raised while opening `locator`.
    ///
    /// # Errors
    ///
    /// Returns an [`ExtractError::Connection`] if the underlying operation fails.
    fn with_connection_context(self, locator: &str) -> Result<T>;

    /// Wrap an error raised while executing `query`.
    ///
    /// # Errors
    ///
    /// Returns an [`ExtractError::Query`] if the underlying operation fails.
    fn with_query_context(self, query: &str) -> Result<T>;
}

impl<T> ExtractErrorExt<T> for anyhow::Result<T> {
    fn with_connection_context(self, locator: &str) -> Result<T> {
        self.map_err(|e| ExtractError::Connection {
            locator: locator.to_string(),
            source: e.into(),
        })
    }

    fn with_query_context(self, query: &str) -> Result<T> {
        self.map_err(|e| ExtractError::Query {
            query: query.to_string(),
            source: e.into(),
        })
    }
}

/// Helper to create an [`ExtractError::Projection`].
#[must_use]
pub fn projection_error(message: impl Into<String>) -> ExtractError {
    ExtractError::Projection {
        message: message.into(),
    }
}

/// Helper to create a [`ConfigError::InvalidQuery`].
#[must_use]
pub fn invalid_query(message: impl Into<String>) -> ExtractError {
    ExtractError::Configuration(ConfigError::InvalidQuery {
        message: message.into(),
    })
}
