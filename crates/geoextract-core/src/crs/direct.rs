//! In-process WKT to PROJ translation.

use proj4rs::proj::Proj;

use super::wkt::{self, WktNode};
use super::{CoordinateTranslator, ProjectionDescriptor, proj_definition};
use crate::error::Result;

/// Translates WKT in-process.
///
/// The PROJ string is built from the WKT parameters. A coordinate system
/// whose parameters cannot be expressed falls back to its EPSG authority,
/// looked up in the `crs-definitions` database and checked with `proj4rs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectTranslator;

impl DirectTranslator {
    /// Creates a direct translator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CoordinateTranslator for DirectTranslator {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn translate(&self, wkt: &str) -> Result<ProjectionDescriptor> {
        let root = wkt::parse(wkt)?;
        ProjectionDescriptor::new(proj_definition(&root)?)
    }
}

/// Looks up the PROJ string for a root `AUTHORITY["EPSG", code]`.
///
/// Definitions `proj4rs` cannot instantiate are discarded.
pub(super) fn epsg_definition(root: &WktNode) -> Option<String> {
    let (authority, code) = root.authority()?;
    if !authority.eq_ignore_ascii_case("EPSG") {
        return None;
    }
    let definition = code
        .parse::<u16>()
        .ok()
        .and_then(crs_definitions::from_code)
        .map(|def| def.proj4)?;
    let definition = definition
        .split_whitespace()
        .filter(|term| *term != "+type=crs")
        .collect::<Vec<_>>()
        .join(" ");

    match Proj::from_proj_string(&definition) {
        Ok(_) => {
            log::debug!("Resolved EPSG:{code} from the authority database");
            Some(definition)
        },
        Err(e) => {
            log::debug!("PROJ rejected EPSG:{code} '{definition}': {e:?}");
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ESRI_WGS84: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

    #[test]
    fn test_translate_esri_geographic() {
        let descriptor = DirectTranslator::new().translate(ESRI_WGS84).unwrap();
        assert_eq!(
            descriptor.as_proj_str(),
            Some("+proj=longlat +datum=WGS84 +no_defs")
        );
    }

    #[test]
    fn test_translate_epsg_authority() {
        let wkt = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]]"#;
        let descriptor = DirectTranslator::new().translate(wkt).unwrap();
        let params = descriptor.parameters();
        assert_eq!(params.get("proj"), Some(&Some("longlat".to_string())));
        assert!(!params.contains_key("type"));
    }

    #[test]
    fn test_authority_used_when_parameters_unsupported() {
        let wkt = r#"PROJCS["Unnamed",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433]],PROJECTION["Some_Unlisted_Method"],UNIT["metre",1],AUTHORITY["EPSG","32633"]]"#;
        let descriptor = DirectTranslator::new().translate(wkt).unwrap();
        let params = descriptor.parameters();
        assert_eq!(params.get("proj"), Some(&Some("utm".to_string())));
        assert_eq!(params.get("zone"), Some(&Some("33".to_string())));

        let without_authority = wkt.replace(r#",AUTHORITY["EPSG","32633"]"#, "");
        let err = DirectTranslator::new().translate(&without_authority).unwrap_err();
        assert!(err.to_string().contains("Some_Unlisted_Method"));
    }

    #[test]
    fn test_parameters_win_over_authority() {
        let wkt = r#"GEOGCS["Relabelled",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433],AUTHORITY["EPSG","4269"]]"#;
        let descriptor = DirectTranslator::new().translate(wkt).unwrap();
        assert_eq!(
            descriptor.as_proj_str(),
            Some("+proj=longlat +datum=WGS84 +no_defs")
        );
    }

    #[test]
    fn test_translate_rejects_empty_and_garbage() {
        let translator = DirectTranslator::new();
        assert!(translator.translate("").is_err());
        assert!(translator.translate("not a coordinate system").is_err());
    }
}
