//! Coordinate-system translation.
//!
//! A project container reports each component's coordinate system as WKT in
//! whatever dialect it was created with. Extraction needs a portable PROJ
//! parameter string instead. Two strategies produce one:
//!
//! - [`DirectTranslator`] converts the text in-process (cargo feature
//!   `direct-crs`).
//! - [`SidecarRoundTrip`] writes a throwaway dataset with the WKT as a `.prj`
//!   side-car and reads the projection back through a format reader.
//!
//! The strategy is chosen once from [`Capabilities`] by
//! [`select_translator`] and injected into the extractor.

use std::collections::BTreeMap;
use std::fmt;

use geoextract_core_common::Capabilities;

use crate::error::{Result, projection_error};

#[cfg(feature = "direct-crs")]
mod direct;
mod sidecar;
pub mod wkt;

#[cfg(feature = "direct-crs")]
pub use direct::DirectTranslator;
pub use sidecar::{DatasetFormat, GeoJsonSidecar, ProbeDataset, ResolvedDataset, SidecarRoundTrip};

/// Relative tolerance used when comparing numeric projection parameters.
const PARAMETER_TOLERANCE: f64 = 1e-9;

/// Parameters that carry no meaning for equivalence.
const IGNORED_PARAMETERS: [&str; 3] = ["no_defs", "type", "wktext"];

/// Alternative PROJ spellings and the key they stand for.
const PARAMETER_ALIASES: [(&str, &str); 1] = [("k", "k_0")];

/// Portable description of a coordinate reference system.
///
/// Holds a PROJ parameter string, or the explicit unknown marker when the
/// caller accepted extraction without a resolvable projection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectionDescriptor {
    definition: Option<String>,
}

impl ProjectionDescriptor {
    /// Wraps a PROJ parameter string.
    ///
    /// # Errors
    ///
    /// Returns a projection error if `definition` does not name a projection
    /// with `+proj=`.
    pub fn new(definition: impl Into<String>) -> Result<Self> {
        let definition = definition.into().trim().to_string();
        let has_proj = definition
            .split_whitespace()
            .any(|token| token.starts_with("+proj="));
        if !has_proj {
            return Err(projection_error(format!(
                "'{definition}' is not a PROJ parameter string"
            )));
        }
        Ok(Self {
            definition: Some(definition),
        })
    }

    /// The unknown-projection marker.
    #[must_use]
    pub fn unknown() -> Self {
        Self { definition: None }
    }

    /// Returns `true` for the unknown-projection marker.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.definition.is_none()
    }

    /// Returns the PROJ string, or `None` for the unknown marker.
    #[must_use]
    pub fn as_proj_str(&self) -> Option<&str> {
        self.definition.as_deref()
    }

    /// Parses the `+key=value` terms of the definition.
    ///
    /// Flags without a value (`+south`, `+no_defs`) map to `None`. Alias
    /// keys such as `k` are reported under their canonical name (`k_0`).
    #[must_use]
    pub fn parameters(&self) -> BTreeMap<String, Option<String>> {
        self.definition
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .filter_map(|token| token.strip_prefix('+'))
            .map(|term| match term.split_once('=') {
                Some((key, value)) => (canonical_key(key).to_string(), Some(value.to_string())),
                None => (canonical_key(term).to_string(), None),
            })
            .collect()
    }

    /// Returns `true` if both descriptors name the same projection.
    ///
    /// Parameter order and bookkeeping flags are ignored; numeric values are
    /// compared with a small relative tolerance.
    #[must_use]
    pub fn is_equivalent(&self, other: &Self) -> bool {
        if self.is_unknown() || other.is_unknown() {
            return self.is_unknown() && other.is_unknown();
        }

        let significant = |descriptor: &Self| {
            let mut params = descriptor.parameters();
            params.retain(|key, _| !IGNORED_PARAMETERS.contains(&key.as_str()));
            params
        };
        let (left, right) = (significant(self), significant(other));
        left.len() == right.len()
            && left.iter().all(|(key, value)| {
                right
                    .get(key)
                    .is_some_and(|other_value| values_match(value.as_deref(), other_value.as_deref()))
            })
    }
}

fn canonical_key(key: &str) -> &str {
    PARAMETER_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map_or(key, |&(_, canonical)| canonical)
}

fn values_match(left: Option<&str>, right: Option<&str>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(a), Some(b)) => match (a.parse::<f64>(), b.parse::<f64>()) {
            (Ok(x), Ok(y)) => (x - y).abs() <= PARAMETER_TOLERANCE * x.abs().max(y.abs()).max(1.0),
            _ if a.contains(',') && b.contains(',') => {
                let (xs, ys): (Vec<_>, Vec<_>) = (a.split(',').collect(), b.split(',').collect());
                xs.len() == ys.len()
                    && xs
                        .iter()
                        .zip(&ys)
                        .all(|(x, y)| values_match(Some(*x), Some(*y)))
            },
            _ => a.eq_ignore_ascii_case(b),
        },
        _ => false,
    }
}

impl fmt::Display for ProjectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.definition.as_deref().unwrap_or("unknown"))
    }
}

/// Builds the PROJ string for a parsed coordinate system.
///
/// The WKT parameters win. A root EPSG authority is only looked up when
/// they cannot be expressed, and only with the `direct-crs` feature.
pub(crate) fn proj_definition(root: &wkt::WktNode) -> Result<String> {
    match wkt::to_proj_string(root) {
        Ok(definition) => Ok(definition),
        Err(err) => authority_definition(root).ok_or(err),
    }
}

#[cfg(feature = "direct-crs")]
fn authority_definition(root: &wkt::WktNode) -> Option<String> {
    direct::epsg_definition(root)
}

#[cfg(not(feature = "direct-crs"))]
fn authority_definition(_root: &wkt::WktNode) -> Option<String> {
    None
}

/// Converts coordinate-system text into a [`ProjectionDescriptor`].
pub trait CoordinateTranslator: Send + Sync {
    /// Short strategy name, for logging.
    fn name(&self) -> &'static str;

    /// Translates `wkt` into a portable projection.
    ///
    /// # Errors
    ///
    /// Returns a projection error if the text is empty, unparseable or names
    /// a coordinate system that cannot be expressed as a PROJ string.
    fn translate(&self, wkt: &str) -> Result<ProjectionDescriptor>;
}

impl<T: CoordinateTranslator + ?Sized> CoordinateTranslator for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn translate(&self, wkt: &str) -> Result<ProjectionDescriptor> {
        (**self).translate(wkt)
    }
}

/// Picks the translation strategy for the given capabilities.
///
/// Direct translation is used when it is supported; every other status
/// falls back to the side-car round trip.
#[must_use]
pub fn select_translator(capabilities: &Capabilities) -> Box<dyn CoordinateTranslator> {
    let translator = if capabilities.direct_projection.is_supported() {
        direct_translator()
    } else {
        None
    };
    let translator =
        translator.unwrap_or_else(|| Box::new(SidecarRoundTrip::<GeoJsonSidecar>::default()));
    log::debug!("Using {} coordinate-system translation", translator.name());
    translator
}

#[cfg(feature = "direct-crs")]
fn direct_translator() -> Option<Box<dyn CoordinateTranslator>> {
    Some(Box::new(DirectTranslator::new()))
}

#[cfg(not(feature = "direct-crs"))]
fn direct_translator() -> Option<Box<dyn CoordinateTranslator>> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoextract_core_common::SupportStatus;

    #[test]
    fn test_descriptor_requires_proj() {
        assert!(ProjectionDescriptor::new("+proj=longlat +datum=WGS84").is_ok());
        assert!(ProjectionDescriptor::new("EPSG:4326").is_err());
        assert!(ProjectionDescriptor::new("").is_err());
    }

    #[test]
    fn test_parameters() {
        let descriptor =
            ProjectionDescriptor::new("+proj=utm +zone=55 +south +ellps=GRS80 +no_defs").unwrap();
        let params = descriptor.parameters();
        assert_eq!(params.get("zone"), Some(&Some("55".to_string())));
        assert_eq!(params.get("south"), Some(&None));
        assert_eq!(params.len(), 5);
    }

    #[test]
    fn test_equivalence_ignores_order_and_bookkeeping() {
        let a = ProjectionDescriptor::new("+proj=longlat +datum=WGS84 +no_defs").unwrap();
        let b = ProjectionDescriptor::new("+datum=WGS84 +proj=longlat +type=crs").unwrap();
        assert!(a.is_equivalent(&b));
    }

    #[test]
    fn test_equivalence_numeric_tolerance() {
        let a = ProjectionDescriptor::new("+proj=tmerc +lon_0=147 +k_0=0.9996 +towgs84=0,0,0").unwrap();
        let b = ProjectionDescriptor::new("+proj=tmerc +lon_0=147.0 +k_0=0.99960000000001 +towgs84=0.0,0,0").unwrap();
        let c = ProjectionDescriptor::new("+proj=tmerc +lon_0=141 +k_0=0.9996 +towgs84=0,0,0").unwrap();
        assert!(a.is_equivalent(&b));
        assert!(!a.is_equivalent(&c));
    }

    #[test]
    fn test_scale_factor_alias() {
        let short = ProjectionDescriptor::new(
            "+proj=tmerc +lat_0=49 +lon_0=-2 +k=0.9996012717 +x_0=400000 +y_0=-100000 +ellps=airy +units=m +no_defs",
        )
        .unwrap();
        let long = ProjectionDescriptor::new(
            "+proj=tmerc +lat_0=49 +lon_0=-2 +k_0=0.9996012717 +x_0=400000 +y_0=-100000 +ellps=airy +units=m +no_defs",
        )
        .unwrap();
        assert_eq!(short.parameters().get("k_0"), Some(&Some("0.9996012717".to_string())));
        assert!(!short.parameters().contains_key("k"));
        assert!(short.is_equivalent(&long));
    }

    #[test]
    fn test_unknown_marker() {
        let unknown = ProjectionDescriptor::unknown();
        assert!(unknown.is_unknown());
        assert_eq!(unknown.to_string(), "unknown");
        assert!(unknown.parameters().is_empty());
        assert!(unknown.is_equivalent(&ProjectionDescriptor::unknown()));
        let known = ProjectionDescriptor::new("+proj=longlat +datum=WGS84").unwrap();
        assert!(!unknown.is_equivalent(&known));
    }

    #[test]
    fn test_select_translator_falls_back_to_sidecar() {
        let caps = Capabilities::detect().with_direct_projection(SupportStatus::Inactive);
        assert_eq!(select_translator(&caps).name(), "sidecar");

        let caps = Capabilities::detect().with_direct_projection(SupportStatus::NotSupported);
        assert_eq!(select_translator(&caps).name(), "sidecar");
    }

    #[cfg(feature = "direct-crs")]
    #[test]
    fn test_select_translator_prefers_direct() {
        let caps = Capabilities::detect().with_direct_projection(SupportStatus::Supported);
        assert_eq!(select_translator(&caps).name(), "direct");
    }
}
