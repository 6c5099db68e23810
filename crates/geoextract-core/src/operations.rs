//! Extraction of spatial layers from project containers.
//!
//! [`SpatialExtractor`] ties the pipeline together: it opens a connection
//! through a [`ConnectionProvider`], issues the generated queries, decodes
//! geometry, resolves the coordinate system and assembles the result. Every
//! call holds exactly one connection and releases it before returning.

use std::ops::{Deref, DerefMut};

use arrow_array::cast::AsArray;
use arrow_array::{Array, RecordBatch};
use arrow_cast::cast;
use arrow_schema::DataType;
use geoextract_core_common::{
    Capabilities, Connection, ConnectionOptions, ConnectionProvider, SupportStatus,
};
use log::{debug, info, warn};

use crate::crs::{CoordinateTranslator, ProjectionDescriptor, select_translator};
use crate::error::{
    ConfigError, ExtractError, ExtractErrorExt, Result, invalid_query, projection_error,
};
use crate::geometry::{GeometryCollection, decode_geometry_column, sole_binary_column};
use crate::options::ExtractOptions;
use crate::query::{
    Projection, attribute_columns, build_query, coordinate_system_query, random_alias_candidates,
    synthetic_alias,
};
use crate::raster::{
    RasterGeoreference, RasterGrid, RasterSkeleton, pixel_values, pixel_values_query,
    raster_probe_query, raster_schema_query, select_pixel_column,
};
use crate::types::TopologyKind;

/// A connection that is handed back to its provider when dropped.
///
/// The guard closes the connection exactly once, whichever way the holding
/// scope is left.
pub struct ScopedConnection<'p, P: ConnectionProvider> {
    provider: &'p P,
    connection: Option<P::Connection>,
}

impl<'p, P: ConnectionProvider> ScopedConnection<'p, P> {
    /// Opens a connection to `locator` through `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Connection`] if the provider cannot open the
    /// data source.
    pub fn open(provider: &'p P, locator: &str, options: &ConnectionOptions) -> Result<Self> {
        let connection = provider
            .open(locator, options)
            .with_connection_context(locator)?;
        debug!("Opened connection to {locator}");
        Ok(Self {
            provider,
            connection: Some(connection),
        })
    }
}

impl<P: ConnectionProvider> Deref for ScopedConnection<'_, P> {
    type Target = P::Connection;

    fn deref(&self) -> &Self::Target {
        match &self.connection {
            Some(connection) => connection,
            // Only taken in drop.
            None => unreachable!("connection used after release"),
        }
    }
}

impl<P: ConnectionProvider> DerefMut for ScopedConnection<'_, P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.connection {
            Some(connection) => connection,
            None => unreachable!("connection used after release"),
        }
    }
}

impl<P: ConnectionProvider> Drop for ScopedConnection<'_, P> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.provider.close(connection);
            debug!("Released connection");
        }
    }
}

/// A vector layer: typed geometries, their attributes and the shared projection.
///
/// Row `i` of `attributes` describes geometry `i`.
#[derive(Debug, Clone)]
pub struct SpatialLayer {
    /// Geometries, in query order
    pub geometries: GeometryCollection,
    /// Attribute table, without the synthetic geometry column
    pub attributes: RecordBatch,
    /// Projection of every geometry
    pub projection: ProjectionDescriptor,
}

impl SpatialLayer {
    /// Number of features in the layer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    /// Returns `true` if the layer has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    /// Topology of the layer's geometries.
    #[must_use]
    pub fn kind(&self) -> TopologyKind {
        self.geometries.kind()
    }
}

/// Result of a vector extraction.
#[derive(Debug, Clone)]
pub enum VectorOutput {
    /// A spatial layer, when geometry was requested.
    Spatial(SpatialLayer),
    /// The raw query result.
    Table(RecordBatch),
}

impl VectorOutput {
    /// Returns the spatial layer, if this is one.
    #[must_use]
    pub fn into_spatial(self) -> Option<SpatialLayer> {
        match self {
            VectorOutput::Spatial(layer) => Some(layer),
            VectorOutput::Table(_) => None,
        }
    }

    /// Returns the raw table, if this is one.
    #[must_use]
    pub fn into_table(self) -> Option<RecordBatch> {
        match self {
            VectorOutput::Spatial(_) => None,
            VectorOutput::Table(batch) => Some(batch),
        }
    }
}

/// Extracts vector layers and rasters from project containers.
pub struct SpatialExtractor<P: ConnectionProvider> {
    provider: P,
    translator: Box<dyn CoordinateTranslator>,
    capabilities: Capabilities,
    options: ExtractOptions,
}

impl<P: ConnectionProvider> SpatialExtractor<P> {
    /// Creates an extractor using the capabilities compiled into this build.
    #[must_use]
    pub fn new(provider: P, options: ExtractOptions) -> Self {
        Self::with_capabilities(provider, Capabilities::detect(), options)
    }

    /// Creates an extractor for explicit capabilities.
    ///
    /// The coordinate translator is picked from `capabilities` here, once.
    #[must_use]
    pub fn with_capabilities(
        provider: P,
        capabilities: Capabilities,
        options: ExtractOptions,
    ) -> Self {
        Self {
            provider,
            translator: select_translator(&capabilities),
            capabilities,
            options,
        }
    }

    /// Replaces the coordinate translator.
    #[must_use]
    pub fn with_translator(mut self, translator: Box<dyn CoordinateTranslator>) -> Self {
        self.translator = translator;
        self
    }

    /// Capabilities the extractor was built with.
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Options applied to every extraction.
    #[must_use]
    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// The connection provider.
    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Name of the coordinate translator in use.
    #[must_use]
    pub fn translator_name(&self) -> &'static str {
        self.translator.name()
    }

    /// Extracts `table` from the container at `locator`.
    ///
    /// With `spatial` set, the result is a [`SpatialLayer`] of `kind`
    /// geometries; otherwise the query result is returned as is. A
    /// `query_override` replaces the generated query verbatim. In spatial
    /// mode the override must yield either the generated alias column or a
    /// single binary column to decode.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid options or an unusable
    /// override, [`ExtractError::EmptyResult`] if a spatial query returns no
    /// rows, and decode, projection, connection or query errors from the
    /// respective pipeline stage.
    pub fn read_vector(
        &self,
        locator: &str,
        table: &str,
        query_override: Option<&str>,
        spatial: bool,
        kind: TopologyKind,
    ) -> Result<VectorOutput> {
        self.options.validate()?;
        info!("Extracting {kind} features from [{table}] in {locator}");

        let mut connection =
            ScopedConnection::open(&self.provider, locator, &self.options.connection)?;

        if !spatial {
            let sql = build_query(table, kind, query_override, Projection::All)?;
            debug!("Query: {sql}");
            let batch = connection.execute(&sql).with_query_context(&sql)?;
            info!("Read {} row(s) from [{table}]", batch.num_rows());
            return Ok(VectorOutput::Table(batch));
        }

        let columns = connection
            .column_names(table)
            .with_query_context(&format!("column listing of [{table}]"))?;
        let attributes = attribute_columns(&columns);
        let alias = synthetic_alias(&columns, random_alias_candidates())?;
        let sql = build_query(
            table,
            kind,
            query_override,
            Projection::Spatial {
                columns: &attributes,
                alias: &alias,
            },
        )?;
        debug!("Query: {sql}");

        let mut batch = connection.execute(&sql).with_query_context(&sql)?;
        if batch.num_rows() == 0 {
            return Err(ExtractError::EmptyResult {
                table: table.to_string(),
            });
        }

        let geometry_index = geometry_column(&batch, &alias, query_override.is_some())?;
        let projection = self.resolve_projection(&mut connection, table)?;
        let decoded = decode_geometry_column(batch.column(geometry_index), kind, projection)?;
        batch.remove_column(geometry_index);

        info!(
            "Extracted {} {kind} feature(s) from [{table}]",
            decoded.geometries.len()
        );
        Ok(VectorOutput::Spatial(SpatialLayer {
            geometries: decoded.geometries,
            attributes: batch,
            projection: decoded.projection,
        }))
    }

    /// Reads the raster `surface` from the container at `locator`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Capability`] if raster support is absent,
    /// [`ExtractError::Georeference`] for a missing or degenerate probe or a
    /// pixel count that does not fill the grid, and configuration, projection,
    /// connection or query errors from the respective pipeline stage.
    pub fn read_raster(&self, locator: &str, surface: &str) -> Result<RasterGrid> {
        match self.capabilities.raster {
            SupportStatus::Supported => {},
            SupportStatus::Inactive => {
                warn!("Raster support is inactive; attempting to read [{surface}] anyway");
            },
            SupportStatus::NotSupported => {
                return Err(ExtractError::Capability {
                    capability: "Raster".to_string(),
                });
            },
        }
        self.options.validate()?;
        info!("Extracting raster [{surface}] from {locator}");

        let mut connection =
            ScopedConnection::open(&self.provider, locator, &self.options.connection)?;

        let sql = raster_schema_query(surface)?;
        let sample = connection.execute(&sql).with_query_context(&sql)?;
        let columns: Vec<String> = sample
            .schema()
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect();
        let pixel_column = select_pixel_column(&columns, self.options.pixel_column.as_deref())
            .ok_or_else(|| match &self.options.pixel_column {
                Some(column) => ConfigError::InvalidOption {
                    option: "pixel_column".to_string(),
                    message: format!("[{surface}] has no column '{column}'"),
                },
                None => ConfigError::MissingRequired {
                    option: "pixel_column".to_string(),
                },
            })?;
        debug!("Reading pixel values from [{pixel_column}]");

        let sql = pixel_values_query(surface, &pixel_column)?;
        let pixels = connection.execute(&sql).with_query_context(&sql)?;
        let values = pixel_values(surface, &pixels, &pixel_column)?;

        let sql = raster_probe_query(surface)?;
        debug!("Query: {sql}");
        let probe = connection.execute(&sql).with_query_context(&sql)?;
        let georeference = RasterGeoreference::from_probe(surface, &probe)?;

        let projection = self.resolve_projection(&mut connection, surface)?;
        let grid = RasterSkeleton::new(surface, georeference, projection)
            .populate(values, self.options.raster_row_order)?;

        info!(
            "Extracted {} x {} raster [{surface}]",
            georeference.ncol, georeference.nrow
        );
        Ok(grid)
    }

    /// Looks up and translates the coordinate system of `component`.
    fn resolve_projection(
        &self,
        connection: &mut ScopedConnection<'_, P>,
        component: &str,
    ) -> Result<ProjectionDescriptor> {
        let sql = coordinate_system_query(component)?;
        let batch = connection.execute(&sql).with_query_context(&sql)?;

        let resolved = coordinate_system_text(&batch)
            .and_then(|wkt| self.translator.translate(&wkt));
        match resolved {
            Ok(projection) => {
                debug!("Projection of [{component}]: {projection}");
                Ok(projection)
            },
            Err(ExtractError::Projection { message }) if self.options.allow_unknown_projection => {
                warn!("Projection of [{component}] is unknown: {message}");
                Ok(ProjectionDescriptor::unknown())
            },
            Err(err) => Err(err),
        }
    }
}

/// Finds the column to decode geometry from.
fn geometry_column(batch: &RecordBatch, alias: &str, overridden: bool) -> Result<usize> {
    if let Ok(index) = batch.schema().index_of(alias) {
        return Ok(index);
    }
    if overridden && let Some(index) = sole_binary_column(batch) {
        return Ok(index);
    }
    let message = if overridden {
        "query override yields neither the geometry alias nor a single binary column"
    } else {
        "query result is missing the geometry column"
    };
    Err(invalid_query(message))
}

/// Reads the WKT returned by the coordinate-system lookup.
fn coordinate_system_text(batch: &RecordBatch) -> Result<String> {
    if batch.num_rows() == 0 {
        return Err(projection_error("coordinate-system lookup returned no rows"));
    }
    let column = batch
        .column_by_name("crs")
        .ok_or_else(|| projection_error("coordinate-system lookup has no [crs] column"))?;
    let column = cast(column, &DataType::Utf8)
        .map_err(|e| projection_error(format!("coordinate system is not text: {e}")))?;
    let column = column.as_string::<i32>();
    if column.is_null(0) || column.value(0).trim().is_empty() {
        return Err(projection_error("component has no coordinate system"));
    }
    Ok(column.value(0).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use arrow_array::{ArrayRef, BinaryArray, StringArray};
    use std::cell::Cell;
    use std::sync::Arc;

    struct NullConnection;

    impl Connection for NullConnection {
        fn execute(&mut self, _sql: &str) -> anyhow::Result<RecordBatch> {
            Err(anyhow!("no tables"))
        }

        fn column_names(&mut self, _table: &str) -> anyhow::Result<Vec<String>> {
            Err(anyhow!("no tables"))
        }
    }

    #[derive(Default)]
    struct CountingProvider {
        fail_open: bool,
        opened: Cell<usize>,
        closed: Cell<usize>,
    }

    impl ConnectionProvider for CountingProvider {
        type Connection = NullConnection;

        fn open(&self, locator: &str, _options: &ConnectionOptions) -> anyhow::Result<NullConnection> {
            if self.fail_open {
                return Err(anyhow!("{locator} not found"));
            }
            self.opened.set(self.opened.get() + 1);
            Ok(NullConnection)
        }

        fn close(&self, _connection: NullConnection) {
            self.closed.set(self.closed.get() + 1);
        }
    }

    #[test]
    fn test_scoped_connection_closes_once() {
        let provider = CountingProvider::default();
        {
            let mut connection =
                ScopedConnection::open(&provider, "a.map", &ConnectionOptions::default()).unwrap();
            assert!(connection.execute("SELECT 1").is_err());
        }
        assert_eq!(provider.opened.get(), 1);
        assert_eq!(provider.closed.get(), 1);
    }

    #[test]
    fn test_failed_open_closes_nothing() {
        let provider = CountingProvider {
            fail_open: true,
            ..CountingProvider::default()
        };
        let err = ScopedConnection::open(&provider, "missing.map", &ConnectionOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, ExtractError::Connection { .. }));
        assert_eq!(provider.closed.get(), 0);
    }

    #[test]
    fn test_query_error_releases_connection() {
        let extractor = SpatialExtractor::new(CountingProvider::default(), ExtractOptions::default());
        let err = extractor
            .read_vector("a.map", "Roads", None, false, TopologyKind::Line)
            .unwrap_err();
        assert!(matches!(err, ExtractError::Query { .. }));
        assert_eq!(extractor.provider().closed.get(), 1);
    }

    #[test]
    fn test_escape_quotes_fails_before_open() {
        let options = ExtractOptions::new()
            .with_connection(ConnectionOptions::new().with_escape_quotes(true));
        let extractor = SpatialExtractor::new(CountingProvider::default(), options);
        let err = extractor
            .read_vector("a.map", "Roads", None, true, TopologyKind::Line)
            .unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(extractor.provider().opened.get(), 0);
    }

    #[test]
    fn test_raster_not_supported() {
        let caps = Capabilities::detect().with_raster(SupportStatus::NotSupported);
        let extractor =
            SpatialExtractor::with_capabilities(CountingProvider::default(), caps, ExtractOptions::default());
        let err = extractor.read_raster("a.map", "Terrain").unwrap_err();
        assert!(matches!(err, ExtractError::Capability { .. }));
        assert_eq!(extractor.provider().opened.get(), 0);
    }

    #[test]
    fn test_geometry_column_resolution() {
        let batch = RecordBatch::try_from_iter(vec![
            ("Name", Arc::new(StringArray::from(vec!["a"])) as ArrayRef),
            ("Shape", Arc::new(BinaryArray::from(vec![&b"\x01"[..]])) as ArrayRef),
        ])
        .unwrap();
        assert_eq!(geometry_column(&batch, "Shape", false).unwrap(), 1);
        assert_eq!(geometry_column(&batch, "geom_x", true).unwrap(), 1);
        assert!(geometry_column(&batch, "geom_x", false).is_err());

        let no_binary = batch.project(&[0]).unwrap();
        let err = geometry_column(&no_binary, "geom_x", true).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_coordinate_system_text() {
        let batch = RecordBatch::try_from_iter(vec![(
            "crs",
            Arc::new(StringArray::from(vec![Some("GEOGCS[\"x\"]")])) as ArrayRef,
        )])
        .unwrap();
        assert_eq!(coordinate_system_text(&batch).unwrap(), "GEOGCS[\"x\"]");

        let blank = RecordBatch::try_from_iter(vec![(
            "crs",
            Arc::new(StringArray::from(vec![Some(" ")])) as ArrayRef,
        )])
        .unwrap();
        assert!(matches!(
            coordinate_system_text(&blank),
            Err(ExtractError::Projection { .. })
        ));
    }
}
