//! Raster georeferencing and grid reconstruction.
//!
//! A raster component is a table of pixel records. One probe query reports
//! the grid origin, cell size and dimensions; a second query returns pixel
//! values ordered by row then column. The grid is rebuilt from both.

use arrow_array::cast::AsArray;
use arrow_array::types::Float64Type;
use arrow_array::{Array, RecordBatch};
use arrow_cast::cast;
use arrow_schema::DataType;
use geo_types::{Rect, coord};

use crate::crs::ProjectionDescriptor;
use crate::error::{ExtractError, Result, invalid_query};
use crate::options::RowOrder;
use crate::query::quote_identifier;

/// Pixel column used when none is configured and the component has one.
pub const DEFAULT_PIXEL_COLUMN: &str = "Height (I)";

/// Intrinsic columns locating a pixel rather than carrying its value.
pub const COORDINATE_COLUMNS: [&str; 4] = ["X (I)", "Y (I)", "Center X (I)", "Center Y (I)"];

const PROBE_COLUMNS: [&str; 6] = ["origin_x", "origin_y", "ncol", "nrow", "dx", "dy"];

/// Builds the probe query returning a raster's origin, dimensions and cell size.
///
/// # Errors
///
/// Returns a configuration error if the component name cannot be embedded.
pub fn raster_probe_query(component: &str) -> Result<String> {
    let table = quote_identifier(component)?;
    if component.contains('"') {
        return Err(invalid_query(format!(
            "component '{component}' contains a double quote"
        )));
    }
    Ok(format!(
        "SELECT TOP 1 Min([Center X (I)]) - PixelWidth(\"{component}\" AS COMPONENT) / 2 AS [origin_x], \
         Max([Center Y (I)]) AS [origin_y], \
         Max([X (I)]) + 1 AS [ncol], \
         Max([Y (I)]) + 1 AS [nrow], \
         PixelWidth(\"{component}\" AS COMPONENT) AS [dx], \
         PixelHeight(\"{component}\" AS COMPONENT) AS [dy] \
         FROM {table}"
    ))
}

/// Builds the query returning one sample row, for schema discovery.
///
/// # Errors
///
/// Returns a configuration error if the component name cannot be quoted.
pub fn raster_schema_query(component: &str) -> Result<String> {
    Ok(format!("SELECT TOP 1 * FROM {}", quote_identifier(component)?))
}

/// Builds the query returning every pixel value, ordered by row then column.
///
/// # Errors
///
/// Returns a configuration error if an identifier cannot be quoted.
pub fn pixel_values_query(component: &str, pixel_column: &str) -> Result<String> {
    Ok(format!(
        "SELECT {} FROM {} ORDER BY [Y (I)], [X (I)]",
        quote_identifier(pixel_column)?,
        quote_identifier(component)?
    ))
}

/// Picks the column holding pixel values.
///
/// An explicit choice wins. Otherwise [`DEFAULT_PIXEL_COLUMN`] is used when
/// present, else the first column that is not a pixel coordinate.
#[must_use]
pub fn select_pixel_column(columns: &[String], explicit: Option<&str>) -> Option<String> {
    if let Some(column) = explicit {
        return columns
            .iter()
            .find(|name| name.as_str() == column)
            .cloned();
    }
    columns
        .iter()
        .find(|name| name.as_str() == DEFAULT_PIXEL_COLUMN)
        .or_else(|| {
            columns
                .iter()
                .find(|name| !COORDINATE_COLUMNS.contains(&name.as_str()))
        })
        .cloned()
}

/// Origin, cell size and dimensions of a raster grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterGeoreference {
    /// X coordinate of the grid's left edge
    pub origin_x: f64,
    /// Y coordinate reported for the top pixel row
    pub origin_y: f64,
    /// Number of columns
    pub ncol: usize,
    /// Number of rows
    pub nrow: usize,
    /// Cell width
    pub dx: f64,
    /// Cell height
    pub dy: f64,
}

impl RasterGeoreference {
    /// Reads the georeference from the first row of a probe result.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Georeference`] if the probe has no rows, a
    /// column is missing or null, a value is non-finite or non-positive, or
    /// the grid has more cells than can be addressed.
    pub fn from_probe(component: &str, probe: &RecordBatch) -> Result<Self> {
        let invalid = |message: String| ExtractError::Georeference {
            component: component.to_string(),
            message,
        };
        if probe.num_rows() == 0 {
            return Err(invalid("probe query returned no rows".to_string()));
        }

        let mut values = [0.0_f64; PROBE_COLUMNS.len()];
        for (slot, name) in values.iter_mut().zip(PROBE_COLUMNS) {
            let column = probe
                .column_by_name(name)
                .ok_or_else(|| invalid(format!("probe is missing column '{name}'")))?;
            let column = cast(column, &DataType::Float64)
                .map_err(|e| invalid(format!("column '{name}' is not numeric: {e}")))?;
            let column = column.as_primitive::<Float64Type>();
            if column.is_null(0) {
                return Err(invalid(format!("column '{name}' is null")));
            }
            let value = column.value(0);
            if !value.is_finite() {
                return Err(invalid(format!("column '{name}' is not finite")));
            }
            *slot = value;
        }

        let [origin_x, origin_y, ncol, nrow, dx, dy] = values;
        let ncol = dimension(ncol)
            .ok_or_else(|| invalid(format!("column count {ncol} is not a positive integer")))?;
        let nrow = dimension(nrow)
            .ok_or_else(|| invalid(format!("row count {nrow} is not a positive integer")))?;
        if ncol.checked_mul(nrow).is_none() {
            return Err(invalid(format!("{ncol} x {nrow} grid has too many cells")));
        }
        if dx <= 0.0 || dy <= 0.0 {
            return Err(invalid(format!("cell size {dx} x {dy} is not positive")));
        }

        Ok(Self {
            origin_x,
            origin_y,
            ncol,
            nrow,
            dx,
            dy,
        })
    }

    /// Number of cells in the grid, saturating at `usize::MAX`.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.ncol.saturating_mul(self.nrow)
    }

    /// Spatial extent of the grid.
    ///
    /// The reported y origin is taken as the top-row reference; the top edge
    /// lies one cell height above it and the bottom edge `nrow - 1` cells
    /// below it.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn extent(&self) -> Rect<f64> {
        let min_x = self.origin_x;
        let max_x = self.origin_x + self.ncol as f64 * self.dx;
        let min_y = self.origin_y - (self.nrow - 1) as f64 * self.dy;
        let max_y = self.origin_y + self.dy;
        Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y })
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn dimension(value: f64) -> Option<usize> {
    (value.is_finite() && value >= 1.0 && value.fract() == 0.0 && value < usize::MAX as f64)
        .then_some(value as usize)
}

/// Reads a pixel column as `f64` values, mapping nulls to NaN.
///
/// # Errors
///
/// Returns [`ExtractError::Georeference`] if the column is missing or not
/// numeric.
pub fn pixel_values(component: &str, batch: &RecordBatch, column: &str) -> Result<Vec<f64>> {
    let invalid = |message: String| ExtractError::Georeference {
        component: component.to_string(),
        message,
    };
    let array = batch
        .column_by_name(column)
        .ok_or_else(|| invalid(format!("pixel query is missing column '{column}'")))?;
    let array = cast(array, &DataType::Float64)
        .map_err(|e| invalid(format!("pixel column '{column}' is not numeric: {e}")))?;
    Ok(array
        .as_primitive::<Float64Type>()
        .iter()
        .map(|value| value.unwrap_or(f64::NAN))
        .collect())
}

/// An empty grid awaiting its pixel values.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterSkeleton {
    component: String,
    georeference: RasterGeoreference,
    projection: ProjectionDescriptor,
}

impl RasterSkeleton {
    /// Creates a skeleton for `component`.
    #[must_use]
    pub fn new(
        component: impl Into<String>,
        georeference: RasterGeoreference,
        projection: ProjectionDescriptor,
    ) -> Self {
        Self {
            component: component.into(),
            georeference,
            projection,
        }
    }

    /// Fills the skeleton with `values`, given in `order`.
    ///
    /// The returned grid always stores rows top-down.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Georeference`] if the number of values does not
    /// match the grid dimensions.
    pub fn populate(self, mut values: Vec<f64>, order: RowOrder) -> Result<RasterGrid> {
        let expected = self.georeference.cell_count();
        if values.len() != expected {
            return Err(ExtractError::Georeference {
                component: self.component,
                message: format!(
                    "expected {expected} pixel values for a {} x {} grid, got {}",
                    self.georeference.ncol,
                    self.georeference.nrow,
                    values.len()
                ),
            });
        }

        if order == RowOrder::BottomUp {
            values = values
                .chunks(self.georeference.ncol)
                .rev()
                .flatten()
                .copied()
                .collect();
        }

        Ok(RasterGrid {
            component: self.component,
            georeference: self.georeference,
            projection: self.projection,
            values,
        })
    }
}

/// A georeferenced grid of pixel values, stored row-major from the top row.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid {
    component: String,
    georeference: RasterGeoreference,
    projection: ProjectionDescriptor,
    values: Vec<f64>,
}

impl RasterGrid {
    /// Name of the source component.
    #[must_use]
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Grid placement and size.
    #[must_use]
    pub fn georeference(&self) -> &RasterGeoreference {
        &self.georeference
    }

    /// Projection of the grid coordinates.
    #[must_use]
    pub fn projection(&self) -> &ProjectionDescriptor {
        &self.projection
    }

    /// Spatial extent of the grid.
    #[must_use]
    pub fn extent(&self) -> Rect<f64> {
        self.georeference.extent()
    }

    /// All values, row-major from the top row.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value at `row` (from the top) and `col`, if inside the grid.
    #[must_use]
    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.georeference.nrow || col >= self.georeference.ncol {
            return None;
        }
        self.values.get(row * self.georeference.ncol + col).copied()
    }
}
