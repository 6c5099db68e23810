//! Options controlling an extraction.

use geoextract_core_common::ConnectionOptions;

use crate::error::{ConfigError, Result};

/// Order in which the container returns raster rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowOrder {
    /// First row returned is the northernmost.
    #[default]
    TopDown,
    /// First row returned is the southernmost.
    BottomUp,
}

/// Options for [`SpatialExtractor`](crate::operations::SpatialExtractor).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractOptions {
    /// Options passed to the connection provider
    pub connection: ConnectionOptions,
    /// Tag results with the unknown projection instead of failing when the
    /// coordinate system cannot be resolved (default: false)
    pub allow_unknown_projection: bool,
    /// Row order of raster pixel values (default: top-down)
    pub raster_row_order: RowOrder,
    /// Raster column holding pixel values; discovered when unset
    pub pixel_column: Option<String>,
}

impl ExtractOptions {
    /// Create new extract options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection options
    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionOptions) -> Self {
        self.connection = connection;
        self
    }

    /// Set whether an unresolvable projection is tolerated
    #[must_use]
    pub fn with_allow_unknown_projection(mut self, allow: bool) -> Self {
        self.allow_unknown_projection = allow;
        self
    }

    /// Set the raster row order
    #[must_use]
    pub fn with_raster_row_order(mut self, order: RowOrder) -> Self {
        self.raster_row_order = order;
        self
    }

    /// Set the raster pixel-value column
    #[must_use]
    pub fn with_pixel_column(mut self, column: impl Into<String>) -> Self {
        self.pixel_column = Some(column.into());
        self
    }

    /// Checks the options before a connection is opened.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the connection escapes quotes, which
    /// breaks the coordinate-system lookup, or the pixel column is blank.
    pub fn validate(&self) -> Result<()> {
        if !self.connection.preserves_literal_quotes() {
            return Err(ConfigError::ConflictingOptions {
                options: "escape_quotes must be disabled; coordinate-system lookups embed \
                          double-quoted literals"
                    .to_string(),
            }
            .into());
        }
        if let Some(column) = &self.pixel_column
            && column.trim().is_empty()
        {
            return Err(ConfigError::InvalidOption {
                option: "pixel_column".to_string(),
                message: "column name is blank".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
