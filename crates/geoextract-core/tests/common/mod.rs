//! In-memory project container used by the integration tests.
//!
//! Responses are canned Arrow batches matched against query text. A batch
//! column named [`GEOMETRY_PLACEHOLDER`] is renamed to whatever alias the
//! extractor generated, so spatial queries can be answered without knowing
//! the random alias up front.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use arrow_array::{ArrayRef, BinaryArray, Float64Array, Int32Array, RecordBatch, StringArray};
use arrow_schema::{Field, Schema};
use geo_types::Geometry;
use geoextract_core_common::{Connection, ConnectionOptions, ConnectionProvider};
use geozero::{CoordDimensions, ToWkb};

/// Column name standing in for the generated geometry alias.
pub const GEOMETRY_PLACEHOLDER: &str = "@geometry";

pub const ESRI_WGS84: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

pub const ESRI_MGA55: &str = r#"PROJCS["GDA_1994_MGA_Zone_55",GEOGCS["GCS_GDA_1994",DATUM["D_GDA_1994",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["False_Easting",500000.0],PARAMETER["False_Northing",10000000.0],PARAMETER["Central_Meridian",147.0],PARAMETER["Scale_Factor",0.9996],PARAMETER["Latitude_Of_Origin",0.0],UNIT["Meter",1.0]]"#;

#[derive(Default)]
struct State {
    columns: HashMap<String, Vec<String>>,
    responses: Vec<(String, RecordBatch)>,
    queries: Vec<String>,
}

/// A container plus the bookkeeping of every connection opened against it.
#[derive(Default)]
pub struct MockProvider {
    state: Rc<RefCell<State>>,
    opened: Cell<usize>,
    closed: Cell<usize>,
    fail_open: bool,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider whose data source never opens.
    pub fn unreachable() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Declares the column listing of `table`.
    pub fn with_table(self, table: &str, columns: &[&str]) -> Self {
        self.state.borrow_mut().columns.insert(
            table.to_string(),
            columns.iter().map(ToString::to_string).collect(),
        );
        self
    }

    /// Answers any query containing `needle` with `batch`.
    ///
    /// Responses are tried in registration order.
    pub fn with_response(self, needle: &str, batch: RecordBatch) -> Self {
        self.state
            .borrow_mut()
            .responses
            .push((needle.to_string(), batch));
        self
    }

    /// Answers the coordinate-system lookup of `component`.
    pub fn with_crs(self, component: &str, wkt: Option<&str>) -> Self {
        let needle = format!("CoordSys(\"{component}\" AS COMPONENT)");
        self.with_response(&needle, crs_batch(wkt))
    }

    pub fn opened(&self) -> usize {
        self.opened.get()
    }

    pub fn closed(&self) -> usize {
        self.closed.get()
    }

    /// Every query executed so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.state.borrow().queries.clone()
    }
}

pub struct MockConnection {
    state: Rc<RefCell<State>>,
}

impl Connection for MockConnection {
    fn execute(&mut self, sql: &str) -> Result<RecordBatch> {
        let mut state = self.state.borrow_mut();
        state.queries.push(sql.to_string());
        let batch = state
            .responses
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, batch)| batch.clone())
            .ok_or_else(|| anyhow!("no table answers '{sql}'"))?;

        match generated_alias(sql) {
            Some(alias) => rename_placeholder(&batch, alias),
            None => Ok(batch),
        }
    }

    fn column_names(&mut self, table: &str) -> Result<Vec<String>> {
        self.state
            .borrow()
            .columns
            .get(table)
            .cloned()
            .ok_or_else(|| anyhow!("table '{table}' does not exist"))
    }
}

impl ConnectionProvider for MockProvider {
    type Connection = MockConnection;

    fn open(&self, locator: &str, _options: &ConnectionOptions) -> Result<MockConnection> {
        if self.fail_open {
            return Err(anyhow!("cannot open '{locator}'"));
        }
        self.opened.set(self.opened.get() + 1);
        Ok(MockConnection {
            state: Rc::clone(&self.state),
        })
    }

    fn close(&self, _connection: MockConnection) {
        self.closed.set(self.closed.get() + 1);
    }
}

fn generated_alias(sql: &str) -> Option<&str> {
    let (_, rest) = sql.split_once("CGeomWKB(Geom([ID])) AS [")?;
    rest.split_once(']').map(|(alias, _)| alias)
}

fn rename_placeholder(batch: &RecordBatch, alias: &str) -> Result<RecordBatch> {
    let fields: Vec<Field> = batch
        .schema()
        .fields()
        .iter()
        .map(|field| {
            if field.name() == GEOMETRY_PLACEHOLDER {
                field.as_ref().clone().with_name(alias)
            } else {
                field.as_ref().clone()
            }
        })
        .collect();
    Ok(RecordBatch::try_new(
        Arc::new(Schema::new(fields)),
        batch.columns().to_vec(),
    )?)
}

pub fn crs_batch(wkt: Option<&str>) -> RecordBatch {
    RecordBatch::try_from_iter(vec![(
        "crs",
        Arc::new(StringArray::from(vec![wkt])) as ArrayRef,
    )])
    .unwrap()
}

pub fn wkb(geometry: Geometry<f64>) -> Vec<u8> {
    geometry.to_wkb(CoordDimensions::xy()).unwrap()
}

/// Builds a feature batch with `ID`, `Name` and the geometry placeholder.
pub fn feature_batch(names: &[&str], blobs: Vec<Vec<u8>>) -> RecordBatch {
    let ids: Vec<i32> = (1..=names.len()).map(|id| i32::try_from(id).unwrap()).collect();
    let blobs: Vec<&[u8]> = blobs.iter().map(Vec::as_slice).collect();
    RecordBatch::try_from_iter(vec![
        ("ID", Arc::new(Int32Array::from(ids)) as ArrayRef),
        ("Name", Arc::new(StringArray::from(names.to_vec())) as ArrayRef),
        (
            GEOMETRY_PLACEHOLDER,
            Arc::new(BinaryArray::from(blobs)) as ArrayRef,
        ),
    ])
    .unwrap()
}

/// Builds a one-row raster probe result.
pub fn probe_batch(
    origin_x: f64,
    origin_y: f64,
    ncol: i32,
    nrow: i32,
    dx: f64,
    dy: f64,
) -> RecordBatch {
    RecordBatch::try_from_iter(vec![
        ("origin_x", Arc::new(Float64Array::from(vec![origin_x])) as ArrayRef),
        ("origin_y", Arc::new(Float64Array::from(vec![origin_y])) as ArrayRef),
        ("ncol", Arc::new(Int32Array::from(vec![ncol])) as ArrayRef),
        ("nrow", Arc::new(Int32Array::from(vec![nrow])) as ArrayRef),
        ("dx", Arc::new(Float64Array::from(vec![dx])) as ArrayRef),
        ("dy", Arc::new(Float64Array::from(vec![dy])) as ArrayRef),
    ])
    .unwrap()
}
