//! Decoding of well-known binary geometry columns into typed collections.

use arrow_array::cast::AsArray;
use arrow_array::{Array, ArrayRef, RecordBatch};
use arrow_schema::DataType;
use geo_types::{Geometry, MultiLineString, MultiPolygon, Point};
use geozero::ToGeo;
use geozero::wkb::Wkb;

use crate::crs::ProjectionDescriptor;
use crate::error::{ExtractError, Result};
use crate::types::TopologyKind;

/// Geometries of a single topology, in query order.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryCollection {
    /// Area features; single polygons are promoted to one-member multipolygons.
    Polygons(Vec<MultiPolygon<f64>>),
    /// Line features; single lines are promoted to one-member multilines.
    Lines(Vec<MultiLineString<f64>>),
    /// Point features.
    Points(Vec<Point<f64>>),
}

impl GeometryCollection {
    /// Number of geometries.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            GeometryCollection::Polygons(items) => items.len(),
            GeometryCollection::Lines(items) => items.len(),
            GeometryCollection::Points(items) => items.len(),
        }
    }

    /// Returns `true` if the collection holds no geometries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Topology of the collection.
    #[must_use]
    pub fn kind(&self) -> TopologyKind {
        match self {
            GeometryCollection::Polygons(_) => TopologyKind::Area,
            GeometryCollection::Lines(_) => TopologyKind::Line,
            GeometryCollection::Points(_) => TopologyKind::Point,
        }
    }

    fn empty(kind: TopologyKind, capacity: usize) -> Self {
        match kind {
            TopologyKind::Area => GeometryCollection::Polygons(Vec::with_capacity(capacity)),
            TopologyKind::Line => GeometryCollection::Lines(Vec::with_capacity(capacity)),
            TopologyKind::Point => GeometryCollection::Points(Vec::with_capacity(capacity)),
        }
    }

    /// Appends `geometry`, checking it against the collection's topology.
    fn push(&mut self, row: usize, geometry: Geometry<f64>) -> Result<()> {
        let mismatch = |geometry: &Geometry<f64>, expected| ExtractError::TypeMismatch {
            row,
            expected,
            found: geometry_type_name(geometry).to_string(),
        };

        match (self, geometry) {
            (GeometryCollection::Polygons(items), Geometry::Polygon(polygon)) => {
                items.push(MultiPolygon::new(vec![polygon]));
            },
            (GeometryCollection::Polygons(items), Geometry::MultiPolygon(polygons)) => {
                items.push(polygons);
            },
            (GeometryCollection::Lines(items), Geometry::LineString(line)) => {
                items.push(MultiLineString::new(vec![line]));
            },
            (GeometryCollection::Lines(items), Geometry::MultiLineString(lines)) => {
                items.push(lines);
            },
            (GeometryCollection::Points(items), Geometry::Point(point)) => {
                items.push(point);
            },
            (GeometryCollection::Points(items), Geometry::MultiPoint(points))
                if points.0.len() == 1 =>
            {
                items.push(points.0[0]);
            },
            (collection, other) => return Err(mismatch(&other, collection.kind())),
        }
        Ok(())
    }
}

/// A decoded geometry collection tagged with its projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedGeometries {
    /// The geometries, in row order
    pub geometries: GeometryCollection,
    /// Projection shared by every geometry
    pub projection: ProjectionDescriptor,
}

/// Decodes a WKB column into geometries of the requested topology.
///
/// Decoding is all-or-nothing: the first null or malformed blob, or the first
/// geometry of the wrong topology, fails the whole column.
///
/// # Errors
///
/// Returns [`ExtractError::Decode`] for a null, malformed or non-binary
/// column entry, and [`ExtractError::TypeMismatch`] for a geometry that does
/// not match `kind`.
pub fn decode_geometry_column(
    column: &ArrayRef,
    kind: TopologyKind,
    projection: ProjectionDescriptor,
) -> Result<ProjectedGeometries> {
    let blobs: Vec<Option<&[u8]>> = match column.data_type() {
        DataType::Binary => column.as_binary::<i32>().iter().collect(),
        DataType::LargeBinary => column.as_binary::<i64>().iter().collect(),
        DataType::BinaryView => column.as_binary_view().iter().collect(),
        other => {
            return Err(ExtractError::Decode {
                row: 0,
                message: format!("geometry column has type {other}, expected binary"),
            });
        },
    };

    let mut geometries = GeometryCollection::empty(kind, blobs.len());
    for (row, blob) in blobs.into_iter().enumerate() {
        let blob = blob.ok_or_else(|| ExtractError::Decode {
            row,
            message: "geometry is null".to_string(),
        })?;
        geometries.push(row, decode_wkb(row, blob)?)?;
    }

    Ok(ProjectedGeometries {
        geometries,
        projection,
    })
}

/// Decodes one WKB blob.
///
/// # Errors
///
/// Returns [`ExtractError::Decode`] if the blob is empty or malformed.
pub fn decode_wkb(row: usize, blob: &[u8]) -> Result<Geometry<f64>> {
    if blob.is_empty() {
        return Err(ExtractError::Decode {
            row,
            message: "geometry blob is empty".to_string(),
        });
    }
    Wkb(blob.to_vec()).to_geo().map_err(|e| ExtractError::Decode {
        row,
        message: e.to_string(),
    })
}

/// Returns the first binary column of `batch`, if exactly one exists.
#[must_use]
pub fn sole_binary_column(batch: &RecordBatch) -> Option<usize> {
    let mut binary = batch
        .schema()
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, field)| {
            matches!(
                field.data_type(),
                DataType::Binary | DataType::LargeBinary | DataType::BinaryView
            )
        })
        .map(|(idx, _)| idx)
        .collect::<Vec<_>>();
    if binary.len() == 1 { binary.pop() } else { None }
}

fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}
