//! Well-known text coordinate-system parsing and PROJ string synthesis.
//!
//! Accepts WKT1 as written by OGC software and the ESRI `.prj` dialect
//! (`D_` datum prefixes, underscored parameter names). The tree is kept
//! generic; only [`to_proj_string`] knows what the keywords mean.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::error::{Result, projection_error};

/// Feet per metre conversions recognised as named PROJ units.
const US_SURVEY_FOOT: f64 = 0.304_800_609_601_219_2;
const INTERNATIONAL_FOOT: f64 = 0.3048;

/// Order in which projection parameters are emitted.
const PARAMETER_ORDER: [&str; 8] = ["lat_0", "lat_1", "lat_2", "lat_ts", "lon_0", "k_0", "x_0", "y_0"];

/// A single value inside a WKT node.
#[derive(Debug, Clone, PartialEq)]
pub enum WktValue {
    /// Double-quoted text.
    Text(String),
    /// Numeric literal.
    Number(f64),
    /// Bare word such as an axis direction.
    Keyword(String),
    /// Nested node.
    Node(WktNode),
}

/// A `KEYWORD[value, ...]` node.
#[derive(Debug, Clone, PartialEq)]
pub struct WktNode {
    /// Node keyword, as written
    pub keyword: String,
    /// Node values, in order
    pub values: Vec<WktValue>,
}

impl WktNode {
    /// Returns `true` if the node keyword matches `keyword`, ignoring case.
    #[must_use]
    pub fn is(&self, keyword: &str) -> bool {
        self.keyword.eq_ignore_ascii_case(keyword)
    }

    /// Returns the node's name (its first value, when that is text).
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self.values.first() {
            Some(WktValue::Text(name)) => Some(name),
            _ => None,
        }
    }

    /// Returns the value at `index` when it is numeric.
    #[must_use]
    pub fn number(&self, index: usize) -> Option<f64> {
        match self.values.get(index) {
            Some(WktValue::Number(value)) => Some(*value),
            _ => None,
        }
    }

    /// Iterates over the direct child nodes with the given keyword.
    pub fn children<'a, 'k>(&'a self, keyword: &'k str) -> impl Iterator<Item = &'a WktNode> {
        self.values.iter().filter_map(move |value| match value {
            WktValue::Node(node) if node.is(keyword) => Some(node),
            _ => None,
        })
    }

    /// Returns the first direct child node with the given keyword.
    #[must_use]
    pub fn child(&self, keyword: &str) -> Option<&WktNode> {
        self.values.iter().find_map(|value| match value {
            WktValue::Node(node) if node.is(keyword) => Some(node),
            _ => None,
        })
    }

    /// Returns the `(authority, code)` pair of a direct `AUTHORITY` child.
    #[must_use]
    pub fn authority(&self) -> Option<(String, String)> {
        let node = self.child("AUTHORITY")?;
        let authority = node.name()?.to_string();
        let code = match node.values.get(1)? {
            WktValue::Text(code) => code.trim().to_string(),
            WktValue::Number(code) => format_number(*code),
            _ => return None,
        };
        Some((authority, code))
    }
}

/// Parses WKT text into a node tree.
///
/// # Errors
///
/// Returns a projection error if the text is empty or not well-formed.
pub fn parse(text: &str) -> Result<WktNode> {
    if text.trim().is_empty() {
        return Err(projection_error("coordinate system text is empty"));
    }

    let mut parser = Parser {
        chars: text.chars().collect(),
        pos: 0,
    };
    let root = parser.node()?;
    parser.skip_whitespace();
    if parser.pos < parser.chars.len() {
        return Err(parser.error("unexpected text after the root node"));
    }
    Ok(root)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn error(&self, message: &str) -> crate::error::ExtractError {
        projection_error(format!("malformed WKT at character {}: {message}", self.pos))
    }

    fn word(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn node(&mut self) -> Result<WktNode> {
        self.skip_whitespace();
        let keyword = self.word();
        if keyword.is_empty() {
            return Err(self.error("expected a keyword"));
        }
        self.skip_whitespace();
        self.node_body(keyword)
    }

    fn node_body(&mut self, keyword: String) -> Result<WktNode> {
        let close = match self.bump() {
            Some('[') => ']',
            Some('(') => ')',
            _ => return Err(self.error("expected '[' or '('")),
        };

        let mut values = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(close) {
            self.pos += 1;
            return Ok(WktNode { keyword, values });
        }

        loop {
            values.push(self.value()?);
            self.skip_whitespace();
            match self.bump() {
                Some(',') => {},
                Some(c) if c == close => break,
                _ => return Err(self.error("expected ',' or a closing bracket")),
            }
        }
        Ok(WktNode { keyword, values })
    }

    fn value(&mut self) -> Result<WktValue> {
        self.skip_whitespace();
        match self.peek() {
            Some('"') => self.text().map(WktValue::Text),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => {
                self.number().map(WktValue::Number)
            },
            Some(c) if c.is_ascii_alphabetic() => {
                let word = self.word();
                self.skip_whitespace();
                if matches!(self.peek(), Some('[' | '(')) {
                    self.node_body(word).map(WktValue::Node)
                } else {
                    Ok(WktValue::Keyword(word))
                }
            },
            _ => Err(self.error("expected a value")),
        }
    }

    fn text(&mut self) -> Result<String> {
        self.pos += 1;
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') if self.peek() == Some('"') => {
                    self.pos += 1;
                    text.push('"');
                },
                Some('"') => return Ok(text),
                Some(c) => text.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn number(&mut self) -> Result<f64> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        {
            self.pos += 1;
        }
        let literal: String = self.chars[start..self.pos].iter().collect();
        literal
            .parse()
            .map_err(|_| self.error(&format!("invalid number '{literal}'")))
    }
}

/// Converts a parsed coordinate system into a PROJ parameter string.
///
/// # Errors
///
/// Returns a projection error if the coordinate system type, datum or
/// projection method is not supported.
pub fn to_proj_string(root: &WktNode) -> Result<String> {
    if root.is("PROJCS") {
        projected(root)
    } else if root.is("GEOGCS") {
        geographic(root)
    } else if root.is("COMPD_CS") {
        let horizontal = root
            .child("PROJCS")
            .or_else(|| root.child("GEOGCS"))
            .ok_or_else(|| projection_error("compound coordinate system has no horizontal part"))?;
        to_proj_string(horizontal)
    } else {
        Err(projection_error(format!(
            "unsupported coordinate system type '{}'",
            root.keyword
        )))
    }
}

fn geographic(geogcs: &WktNode) -> Result<String> {
    let mut parts = vec!["+proj=longlat".to_string()];
    parts.extend(datum_parts(geogcs)?);
    parts.push("+no_defs".to_string());
    Ok(parts.join(" "))
}

fn projected(projcs: &WktNode) -> Result<String> {
    let geogcs = projcs
        .child("GEOGCS")
        .ok_or_else(|| projection_error("projected coordinate system has no GEOGCS"))?;
    let method = projcs
        .child("PROJECTION")
        .and_then(WktNode::name)
        .ok_or_else(|| projection_error("projected coordinate system has no PROJECTION"))?;
    let proj = projection_method(method)?;
    let to_meter = projcs
        .child("UNIT")
        .and_then(|unit| unit.number(1))
        .unwrap_or(1.0);

    let mut params: BTreeMap<&'static str, f64> = BTreeMap::new();
    for parameter in projcs.children("PARAMETER") {
        let (Some(name), Some(value)) = (parameter.name(), parameter.number(1)) else {
            continue;
        };
        match parameter_key(&normalize(name)) {
            Some(key @ ("x_0" | "y_0")) => {
                // PROJ takes false origins in metres whatever the linear unit.
                params.insert(key, ((value * to_meter) * 1e6).round() / 1e6);
            },
            Some(key) => {
                params.insert(key, value);
            },
            None => log::debug!("ignoring WKT parameter '{name}' for {proj}"),
        }
    }

    if proj == "merc" && !params.contains_key("lat_ts") {
        if let Some(lat_1) = params.remove("lat_1") {
            params.insert("lat_ts", lat_1);
        }
    }
    if proj == "lcc" && !params.contains_key("lat_1") {
        if let Some(&lat_0) = params.get("lat_0") {
            params.insert("lat_1", lat_0);
        }
    }

    let mut parts = match utm_zone(proj, &params, to_meter) {
        Some((zone, south)) => {
            let mut parts = vec!["+proj=utm".to_string(), format!("+zone={zone}")];
            if south {
                parts.push("+south".to_string());
            }
            parts
        },
        None => {
            let mut parts = vec![format!("+proj={proj}")];
            for key in PARAMETER_ORDER {
                if let Some(value) = params.get(key) {
                    parts.push(format!("+{key}={}", format_number(*value)));
                }
            }
            parts
        },
    };

    parts.extend(datum_parts(geogcs)?);
    parts.push(unit_part(to_meter));
    parts.push("+no_defs".to_string());
    Ok(parts.join(" "))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn utm_zone(proj: &str, params: &BTreeMap<&'static str, f64>, to_meter: f64) -> Option<(u32, bool)> {
    if proj != "tmerc" || (to_meter - 1.0).abs() > 1e-12 {
        return None;
    }
    let get = |key: &str, default: f64| params.get(key).copied().unwrap_or(default);
    let south = match get("y_0", 0.0) {
        y if y.abs() < 1e-6 => false,
        y if (y - 10_000_000.0).abs() < 1e-6 => true,
        _ => return None,
    };
    if get("lat_0", 0.0).abs() > 1e-12
        || (get("k_0", 1.0) - 0.9996).abs() > 1e-12
        || (get("x_0", 0.0) - 500_000.0).abs() > 1e-6
    {
        return None;
    }

    let zone = (get("lon_0", 0.0) + 183.0) / 6.0;
    if (zone - zone.round()).abs() > 1e-9 || !(1.0..=60.0).contains(&zone) {
        return None;
    }
    Some((zone.round() as u32, south))
}

fn datum_parts(geogcs: &WktNode) -> Result<Vec<String>> {
    let datum = geogcs
        .child("DATUM")
        .ok_or_else(|| projection_error("geographic coordinate system has no DATUM"))?;
    let name = datum.name().unwrap_or_default();
    let stripped = name
        .strip_prefix("D_")
        .or_else(|| name.strip_prefix("d_"))
        .unwrap_or(name);

    let mut parts = match normalize(stripped).as_str() {
        "wgs1984" | "wgs84" | "worldgeodeticsystem1984" => {
            return Ok(vec!["+datum=WGS84".to_string()]);
        },
        "northamerican1983" | "northamericandatum1983" | "nad83" => {
            return Ok(vec!["+datum=NAD83".to_string()]);
        },
        "northamerican1927" | "northamericandatum1927" | "nad27" => {
            return Ok(vec!["+datum=NAD27".to_string()]);
        },
        "gda1994" | "gda2020" | "geocentricdatumofaustralia1994" | "geocentricdatumofaustralia2020"
        | "etrs1989" | "europeanterrestrialreferencesystem1989" => {
            return Ok(vec![
                "+ellps=GRS80".to_string(),
                "+towgs84=0,0,0,0,0,0,0".to_string(),
            ]);
        },
        _ => {
            let spheroid = datum
                .child("SPHEROID")
                .or_else(|| datum.child("ELLIPSOID"))
                .ok_or_else(|| projection_error(format!("datum '{name}' has no SPHEROID")))?;
            ellipsoid_parts(spheroid)?
        },
    };

    if let Some(towgs84) = datum.child("TOWGS84") {
        let terms: Vec<String> = towgs84
            .values
            .iter()
            .filter_map(|value| match value {
                WktValue::Number(n) => Some(format_number(*n)),
                _ => None,
            })
            .collect();
        if !terms.is_empty() {
            parts.push(format!("+towgs84={}", terms.join(",")));
        }
    }

    if let Some(meridian) = geogcs.child("PRIMEM").and_then(|pm| pm.number(1))
        && meridian != 0.0
    {
        parts.push(format!("+pm={}", format_number(meridian)));
    }

    Ok(parts)
}

fn ellipsoid_parts(spheroid: &WktNode) -> Result<Vec<String>> {
    let name = spheroid.name().unwrap_or_default();
    let known = match normalize(name).as_str() {
        "wgs84" | "wgs1984" => Some("WGS84"),
        "wgs72" | "wgs1972" => Some("WGS72"),
        "grs1980" | "grs80" => Some("GRS80"),
        "international1924" | "international1909" => Some("intl"),
        "clarke1866" => Some("clrk66"),
        "airy1830" => Some("airy"),
        "bessel1841" => Some("bessel"),
        "krassovsky1940" | "krasovsky1940" => Some("krass"),
        _ => None,
    };
    if let Some(ellps) = known {
        return Ok(vec![format!("+ellps={ellps}")]);
    }

    let a = spheroid
        .number(1)
        .filter(|a| *a > 0.0)
        .ok_or_else(|| projection_error(format!("spheroid '{name}' has no semi-major axis")))?;
    let rf = spheroid.number(2).unwrap_or(0.0);
    let mut parts = vec![format!("+a={}", format_number(a))];
    if rf == 0.0 {
        parts.push(format!("+b={}", format_number(a)));
    } else {
        parts.push(format!("+rf={}", format_number(rf)));
    }
    Ok(parts)
}

fn projection_method(method: &str) -> Result<&'static str> {
    let proj = match normalize(method).as_str() {
        "transversemercator" | "gausskruger" => "tmerc",
        "mercator" | "mercator1sp" | "mercator2sp" => "merc",
        "lambertconformalconic" | "lambertconformalconic1sp" | "lambertconformalconic2sp" => "lcc",
        "albers" | "albersconicequalarea" => "aea",
        "lambertazimuthalequalarea" => "laea",
        "stereographic" | "polarstereographic" => "stere",
        "obliquestereographic" | "doublestereographic" => "sterea",
        "equidistantconic" => "eqdc",
        "equirectangular" | "platecarree" | "equidistantcylindrical" => "eqc",
        "sinusoidal" => "sinu",
        "mollweide" => "moll",
        "azimuthalequidistant" => "aeqd",
        "cassini" | "cassinisoldner" => "cass",
        "polyconic" | "americanpolyconic" => "poly",
        "robinson" => "robin",
        _ => {
            return Err(projection_error(format!(
                "unsupported projection method '{method}'"
            )));
        },
    };
    Ok(proj)
}

fn parameter_key(name: &str) -> Option<&'static str> {
    let key = match name {
        "falseeasting" => "x_0",
        "falsenorthing" => "y_0",
        "centralmeridian"
        | "longitudeofcenter"
        | "longitudeofnaturalorigin"
        | "longitudeoforigin"
        | "longitudeofprojectioncenter" => "lon_0",
        "latitudeoforigin"
        | "latitudeofcenter"
        | "latitudeofnaturalorigin"
        | "latitudeofprojectioncenter" => "lat_0",
        "standardparallel1" | "latitudeof1ststandardparallel" => "lat_1",
        "standardparallel2" | "latitudeof2ndstandardparallel" => "lat_2",
        "latitudeoftruescale" | "latitudeofstandardparallel" => "lat_ts",
        "scalefactor" | "scalefactoratnaturalorigin" => "k_0",
        _ => return None,
    };
    Some(key)
}

/// Lower-cases and drops everything but letters and digits.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn unit_part(to_meter: f64) -> String {
    if (to_meter - 1.0).abs() < 1e-12 {
        "+units=m".to_string()
    } else if (to_meter - US_SURVEY_FOOT).abs() < 1e-12 {
        "+units=us-ft".to_string()
    } else if (to_meter - INTERNATIONAL_FOOT).abs() < 1e-12 {
        "+units=ft".to_string()
    } else {
        format!("+to_meter={}", format_number(to_meter))
    }
}

/// Formats a number without a trailing `.0` for integral values.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn format_number(value: f64) -> String {
    let mut out = String::new();
    if value.fract() == 0.0 && value.abs() < 1e15 {
        let _ = write!(out, "{}", value as i64);
    } else {
        let _ = write!(out, "{value}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const ESRI_MGA55: &str = r#"PROJCS["GDA_1994_MGA_Zone_55",GEOGCS["GCS_GDA_1994",DATUM["D_GDA_1994",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["False_Easting",500000.0],PARAMETER["False_Northing",10000000.0],PARAMETER["Central_Meridian",147.0],PARAMETER["Scale_Factor",0.9996],PARAMETER["Latitude_Of_Origin",0.0],UNIT["Meter",1.0]]"#;

    fn translate(text: &str) -> String {
        to_proj_string(&parse(text).unwrap()).unwrap()
    }

    #[test]
    fn test_parse_nested_nodes() {
        let root = parse(r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563]],AXIS["Lat",NORTH]]"#).unwrap();
        assert!(root.is("geogcs"));
        assert_eq!(root.name(), Some("WGS 84"));
        let spheroid = root.child("DATUM").unwrap().child("SPHEROID").unwrap();
        assert_eq!(spheroid.number(1), Some(6_378_137.0));
        let axis = root.child("AXIS").unwrap();
        assert_eq!(axis.values[1], WktValue::Keyword("NORTH".to_string()));
    }

    #[test]
    fn test_parse_parentheses_and_escaped_quotes() {
        let root = parse(r#"LOCAL_CS("Site ""A""", UNIT("m", 1))"#).unwrap();
        assert_eq!(root.name(), Some("Site \"A\""));
        assert_eq!(root.child("UNIT").unwrap().number(1), Some(1.0));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse("").is_err());
        assert!(parse("GEOGCS[\"x\"").is_err());
        assert!(parse("GEOGCS[\"x\"] trailing").is_err());
        assert!(parse("[\"x\"]").is_err());
    }

    #[test]
    fn test_authority() {
        let root = parse(r#"GEOGCS["WGS 84",AUTHORITY["EPSG","4326"]]"#).unwrap();
        assert_eq!(
            root.authority(),
            Some(("EPSG".to_string(), "4326".to_string()))
        );
        let root = parse(r#"GEOGCS["WGS 84",AUTHORITY["EPSG",4326]]"#).unwrap();
        assert_eq!(root.authority().unwrap().1, "4326");
    }

    #[test]
    fn test_geographic_wgs84() {
        let proj = translate(
            r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#,
        );
        assert_eq!(proj, "+proj=longlat +datum=WGS84 +no_defs");
    }

    #[test]
    fn test_utm_south_detection() {
        assert_eq!(
            translate(ESRI_MGA55),
            "+proj=utm +zone=55 +south +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs"
        );
    }

    #[test]
    fn test_lambert_conformal_conic_in_us_feet() {
        let proj = translate(
            r#"PROJCS["NAD_1983_StatePlane_Test",GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Lambert_Conformal_Conic"],PARAMETER["False_Easting",6561666.666666666],PARAMETER["False_Northing",1640416.666666667],PARAMETER["Central_Meridian",-120.5],PARAMETER["Standard_Parallel_1",43.0],PARAMETER["Standard_Parallel_2",45.5],PARAMETER["Latitude_Of_Origin",41.75],UNIT["Foot_US",0.3048006096012192]]"#,
        );
        assert!(proj.starts_with("+proj=lcc +lat_0=41.75 +lat_1=43 +lat_2=45.5 +lon_0=-120.5 +x_0=2000000 +y_0=500000 "));
        assert!(proj.ends_with("+datum=NAD83 +units=us-ft +no_defs"));
    }

    #[test]
    fn test_custom_spheroid_with_towgs84_and_prime_meridian() {
        let proj = translate(
            r#"GEOGCS["Custom",DATUM["Custom_Datum",SPHEROID["Custom",6378388,297],TOWGS84[-87,-98,-121,0,0,0,0]],PRIMEM["Paris",2.33722917],UNIT["degree",0.0174532925199433]]"#,
        );
        assert_eq!(
            proj,
            "+proj=longlat +a=6378388 +rf=297 +towgs84=-87,-98,-121,0,0,0,0 +pm=2.33722917 +no_defs"
        );
    }

    #[test]
    fn test_sphere_and_to_meter() {
        let proj = translate(
            r#"PROJCS["Sphere_Sinusoidal",GEOGCS["GCS_Sphere",DATUM["D_Sphere",SPHEROID["Sphere",6371000.0,0.0]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Sinusoidal"],PARAMETER["Central_Meridian",0.0],UNIT["Kilometre",1000.0]]"#,
        );
        assert_eq!(
            proj,
            "+proj=sinu +lon_0=0 +a=6371000 +b=6371000 +to_meter=1000 +no_defs"
        );
    }

    #[test]
    fn test_compound_uses_horizontal_part() {
        let text = format!(r#"COMPD_CS["With height",{ESRI_MGA55},VERT_CS["AHD",VERT_DATUM["AHD",2005]]]"#);
        assert!(translate(&text).starts_with("+proj=utm +zone=55 +south"));
    }

    #[test]
    fn test_unsupported_method_fails() {
        let text = ESRI_MGA55.replace("Transverse_Mercator", "Bonne_Variant");
        let err = to_proj_string(&parse(&text).unwrap()).unwrap_err();
        assert!(err.to_string().contains("Bonne_Variant"));
    }

    #[test]
    fn test_local_cs_unsupported() {
        let root = parse(r#"LOCAL_CS["Site",UNIT["m",1]]"#).unwrap();
        assert!(to_proj_string(&root).is_err());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(500_000.0), "500000");
        assert_eq!(format_number(-120.5), "-120.5");
        assert_eq!(format_number(0.9996), "0.9996");
    }
}
