//! Data types shared by the extraction pipeline.

use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, ExtractError};

/// Topology of the geometries to extract from a drawing.
///
/// The kind decides the row filter applied to the query and the concrete
/// geometry type of the reconstructed layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopologyKind {
    /// Polygonal geometries.
    Area,
    /// Linear geometries.
    Line,
    /// Point geometries.
    Point,
}

impl TopologyKind {
    /// All topology kinds, in declaration order.
    pub const ALL: [TopologyKind; 3] = [TopologyKind::Area, TopologyKind::Line, TopologyKind::Point];

    /// Returns the lower-case name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TopologyKind::Area => "area",
            TopologyKind::Line => "line",
            TopologyKind::Point => "point",
        }
    }
}

impl fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopologyKind {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "area" => Ok(TopologyKind::Area),
            "line" => Ok(TopologyKind::Line),
            "point" => Ok(TopologyKind::Point),
            _ => Err(ConfigError::UnknownTopology {
                name: s.to_string(),
            }
            .into()),
        }
    }
}
