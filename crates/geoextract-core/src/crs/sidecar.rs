//! Side-car round-trip translation.
//!
//! Used when direct translation is unavailable: a one-point dataset is written
//! next to a `.prj` file holding the WKT, then read back through a format
//! reader that resolves projections from side-car files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use geo_types::Point;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, JsonValue, Value};

use super::wkt;
use super::{CoordinateTranslator, ProjectionDescriptor, proj_definition};
use crate::error::{Result, projection_error};

/// Dataset handed to a [`DatasetFormat`] writer.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeDataset {
    /// Point features, in order
    pub points: Vec<Point<f64>>,
    /// Coordinate system text stored in the side-car file
    pub crs_wkt: Option<String>,
}

/// Dataset returned by a [`DatasetFormat`] reader.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDataset {
    /// Point features, in order
    pub points: Vec<Point<f64>>,
    /// Projection resolved from the side-car file, if any
    pub projection: Option<ProjectionDescriptor>,
}

/// A file format that stores its projection in a `.prj` side-car.
///
/// `base` is a path without extension; implementations derive the data and
/// side-car file names from it.
pub trait DatasetFormat: Send + Sync {
    /// Writes `dataset` and its side-car.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be written.
    fn write_dataset(&self, base: &Path, dataset: &ProbeDataset) -> anyhow::Result<()>;

    /// Reads a dataset and resolves its projection from the side-car.
    ///
    /// # Errors
    ///
    /// Returns an error if the data file cannot be read or parsed. A missing
    /// or unresolvable side-car is not an error; the projection is `None`.
    fn read_dataset(&self, base: &Path) -> anyhow::Result<ResolvedDataset>;
}

/// `GeoJSON` data file with an ESRI-style `.prj` side-car.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoJsonSidecar;

impl GeoJsonSidecar {
    fn data_path(base: &Path) -> PathBuf {
        base.with_extension("geojson")
    }

    fn prj_path(base: &Path) -> PathBuf {
        base.with_extension("prj")
    }
}

impl DatasetFormat for GeoJsonSidecar {
    fn write_dataset(&self, base: &Path, dataset: &ProbeDataset) -> anyhow::Result<()> {
        let features = dataset
            .points
            .iter()
            .enumerate()
            .map(|(idx, point)| {
                let mut properties = JsonObject::new();
                properties.insert("id".to_string(), JsonValue::from(idx));
                Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(Value::Point(vec![point.x(), point.y()]))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();
        let collection = GeoJson::FeatureCollection(FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        });

        let data_path = Self::data_path(base);
        fs::write(&data_path, collection.to_string())
            .with_context(|| format!("writing {}", data_path.display()))?;

        if let Some(wkt) = &dataset.crs_wkt {
            let prj_path = Self::prj_path(base);
            fs::write(&prj_path, wkt).with_context(|| format!("writing {}", prj_path.display()))?;
        }
        Ok(())
    }

    fn read_dataset(&self, base: &Path) -> anyhow::Result<ResolvedDataset> {
        let data_path = Self::data_path(base);
        let text = fs::read_to_string(&data_path)
            .with_context(|| format!("reading {}", data_path.display()))?;
        let geojson: GeoJson = text
            .parse()
            .with_context(|| format!("parsing {}", data_path.display()))?;

        let GeoJson::FeatureCollection(collection) = geojson else {
            return Err(anyhow!("{} is not a feature collection", data_path.display()));
        };
        let points = collection
            .features
            .into_iter()
            .map(|feature| match feature.geometry.map(|g| g.value) {
                Some(Value::Point(position)) if position.len() >= 2 => {
                    Ok(Point::new(position[0], position[1]))
                },
                _ => Err(anyhow!("{} holds a non-point feature", data_path.display())),
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let prj_path = Self::prj_path(base);
        let projection = match fs::read_to_string(&prj_path) {
            Ok(wkt) => resolve_prj(&wkt),
            Err(err) => {
                log::debug!("No side-car projection at {}: {err}", prj_path.display());
                None
            },
        };

        Ok(ResolvedDataset { points, projection })
    }
}

fn resolve_prj(text: &str) -> Option<ProjectionDescriptor> {
    let resolved = wkt::parse(text)
        .and_then(|root| proj_definition(&root))
        .and_then(ProjectionDescriptor::new);
    match resolved {
        Ok(descriptor) => Some(descriptor),
        Err(err) => {
            log::debug!("Side-car projection is unresolvable: {err}");
            None
        },
    }
}

/// Translates WKT by writing and re-reading a throwaway side-car dataset.
#[derive(Debug, Clone, Default)]
pub struct SidecarRoundTrip<F = GeoJsonSidecar> {
    format: F,
}

impl<F: DatasetFormat> SidecarRoundTrip<F> {
    /// Creates a round-trip translator over `format`.
    #[must_use]
    pub fn new(format: F) -> Self {
        Self { format }
    }
}

impl<F: DatasetFormat> CoordinateTranslator for SidecarRoundTrip<F> {
    fn name(&self) -> &'static str {
        "sidecar"
    }

    fn translate(&self, wkt: &str) -> Result<ProjectionDescriptor> {
        if wkt.trim().is_empty() {
            return Err(projection_error("coordinate system text is empty"));
        }

        let dir = tempfile::Builder::new()
            .prefix("geoextract-crs")
            .tempdir()
            .map_err(|e| projection_error(format!("cannot create a temporary directory: {e}")))?;
        let base = dir.path().join("probe");

        let dataset = ProbeDataset {
            points: vec![Point::new(0.0, 0.0)],
            crs_wkt: Some(wkt.to_string()),
        };
        self.format
            .write_dataset(&base, &dataset)
            .map_err(|e| projection_error(format!("side-car write failed: {e:#}")))?;
        let resolved = self
            .format
            .read_dataset(&base)
            .map_err(|e| projection_error(format!("side-car read failed: {e:#}")))?;

        if resolved.points.len() != dataset.points.len() {
            return Err(projection_error(format!(
                "side-car dataset came back with {} features",
                resolved.points.len()
            )));
        }
        resolved
            .projection
            .ok_or_else(|| projection_error("side-car dataset has no resolvable projection"))
    }
}
