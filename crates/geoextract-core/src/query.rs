//! Query shaping for topology-filtered extraction.
//!
//! Queries are plain text in the container's SQL dialect. Identifiers are
//! bracket-quoted, intrinsic columns carry an `(I)` marker, and geometry is
//! exported as WKB through `CGeomWKB`. The functions named in the generated
//! text are opaque to this crate; the driver evaluates them.

use std::collections::HashSet;

use uuid::Uuid;

use crate::error::{ConfigError, Result, invalid_query};
use crate::types::TopologyKind;

/// Marker carried by intrinsic (container-maintained) column names.
pub const INTERNAL_COLUMN_MARKER: &str = "(I)";

/// Expression exporting a record's geometry as well-known binary.
pub const GEOMETRY_EXPRESSION: &str = "CGeomWKB(Geom([ID]))";

/// Upper bound on alias candidates tried before giving up.
pub const MAX_ALIAS_ATTEMPTS: usize = 16;

impl TopologyKind {
    /// Returns the row filter selecting records of this topology.
    #[must_use]
    pub fn predicate(&self) -> &'static str {
        match self {
            TopologyKind::Area => "IsArea([ID])",
            TopologyKind::Line => "IsLine([ID])",
            TopologyKind::Point => "IsPoint([ID])",
        }
    }
}

/// Column selection for a generated query.
#[derive(Debug, Clone, Copy)]
pub enum Projection<'a> {
    /// Every column, as stored.
    All,
    /// Real attribute columns plus the geometry exported under `alias`.
    Spatial {
        /// Attribute columns to select, in order
        columns: &'a [String],
        /// Synthetic alias carrying the geometry
        alias: &'a str,
    },
}

/// Returns `true` if `name` is an intrinsic column maintained by the container.
#[must_use]
pub fn is_internal_column(name: &str) -> bool {
    name.contains(INTERNAL_COLUMN_MARKER)
}

/// Keeps the real attribute columns of `columns`, in order.
#[must_use]
pub fn attribute_columns(columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .filter(|name| !is_internal_column(name))
        .cloned()
        .collect()
}

/// Bracket-quotes an identifier.
///
/// # Errors
///
/// Returns a configuration error if the identifier is empty or contains a
/// closing bracket, neither of which can be quoted in this dialect.
pub fn quote_identifier(name: &str) -> Result<String> {
    if name.trim().is_empty() {
        return Err(invalid_query("identifier is empty"));
    }
    if name.contains(']') {
        return Err(invalid_query(format!(
            "identifier '{name}' contains ']' and cannot be quoted"
        )));
    }
    Ok(format!("[{name}]"))
}

/// Renders a column selection.
///
/// # Errors
///
/// Returns a configuration error if any identifier cannot be quoted.
pub fn build_projection(projection: Projection<'_>) -> Result<String> {
    match projection {
        Projection::All => Ok("*".to_string()),
        Projection::Spatial { columns, alias } => {
            let mut parts = columns
                .iter()
                .map(|column| quote_identifier(column))
                .collect::<Result<Vec<_>>>()?;
            parts.push(format!(
                "{GEOMETRY_EXPRESSION} AS {}",
                quote_identifier(alias)?
            ));
            Ok(parts.join(", "))
        },
    }
}

/// Builds the extraction query for `table`.
///
/// A supplied `query_override` is returned unchanged. Otherwise the query
/// selects `projection` from `table`, filtered to rows of `kind`.
///
/// # Errors
///
/// Returns a configuration error if the override is blank or an identifier
/// cannot be quoted.
///
/// # Examples
///
/// ```
/// use geoextract_core::query::{Projection, build_query};
/// use geoextract_core::types::TopologyKind;
///
/// let sql = build_query("Roads", TopologyKind::Line, None, Projection::All).unwrap();
/// assert_eq!(sql, "SELECT * FROM [Roads] WHERE IsLine([ID])");
/// ```
pub fn build_query(
    table: &str,
    kind: TopologyKind,
    query_override: Option<&str>,
    projection: Projection<'_>,
) -> Result<String> {
    if let Some(query) = query_override {
        if query.trim().is_empty() {
            return Err(invalid_query("query override is blank"));
        }
        return Ok(query.to_string());
    }

    Ok(format!(
        "SELECT {} FROM {} WHERE {}",
        build_projection(projection)?,
        quote_identifier(table)?,
        kind.predicate()
    ))
}

/// Builds the lookup returning a component's coordinate system as WKT.
///
/// The component name is embedded as a double-quoted literal, so the
/// connection must not escape quote characters.
///
/// # Errors
///
/// Returns a configuration error if the component name cannot be embedded.
pub fn coordinate_system_query(component: &str) -> Result<String> {
    if component.contains('"') {
        return Err(invalid_query(format!(
            "component '{component}' contains a double quote"
        )));
    }
    Ok(format!(
        "SELECT TOP 1 CoordSysToWKT(CoordSys(\"{component}\" AS COMPONENT)) AS [crs] FROM {}",
        quote_identifier(component)?
    ))
}

/// Picks a geometry alias that collides with none of `existing`.
///
/// Comparison is case-insensitive, matching identifier resolution in the
/// container. At most [`MAX_ALIAS_ATTEMPTS`] candidates are tried.
///
/// # Errors
///
/// Returns a configuration error if every candidate tried collides or the
/// candidates run out.
pub fn synthetic_alias<S, I>(existing: &[S], candidates: I) -> Result<String>
where
    S: AsRef<str>,
    I: IntoIterator<Item = String>,
{
    let taken: HashSet<String> = existing
        .iter()
        .map(|name| name.as_ref().to_lowercase())
        .collect();

    candidates
        .into_iter()
        .take(MAX_ALIAS_ATTEMPTS)
        .find(|candidate| {
            !candidate.is_empty()
                && !candidate.contains(']')
                && !taken.contains(&candidate.to_lowercase())
        })
        .ok_or_else(|| {
            ConfigError::InvalidOption {
                option: "geometry alias".to_string(),
                message: format!(
                    "no collision-free alias found among {MAX_ALIAS_ATTEMPTS} candidates"
                ),
            }
            .into()
        })
}

/// Endless stream of random alias candidates.
pub fn random_alias_candidates() -> impl Iterator<Item = String> {
    std::iter::repeat_with(|| format!("geom_{}", Uuid::new_v4().simple()))
}
