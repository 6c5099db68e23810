//! Capability registry for optional extraction features.
//!
//! Raster extraction and direct coordinate-system translation depend on
//! optional support in the running build. This module reports the status of
//! each capability so that callers can pick a translation strategy once at
//! configuration time and so that raster extraction can refuse to start when
//! it has no chance of succeeding.

/// Support status for a single capability.
///
/// Mirrors the three states a capability can be in at run time: usable,
/// present but not switched on in this process, or absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportStatus {
    /// The capability is available and active.
    Supported,
    /// The capability is present but not fully activated in-process.
    Inactive,
    /// The capability is not available at all.
    NotSupported,
}

impl SupportStatus {
    /// Returns `true` if the capability is available and active.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        matches!(self, SupportStatus::Supported)
    }

    /// Returns `true` if the capability is present, whether active or not.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self, SupportStatus::NotSupported)
    }

    /// Returns the string representation of this support status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            SupportStatus::Supported => "Supported",
            SupportStatus::Inactive => "Inactive",
            SupportStatus::NotSupported => "Not Supported",
        }
    }

    const fn from_enabled(enabled: bool) -> Self {
        if enabled {
            SupportStatus::Supported
        } else {
            SupportStatus::NotSupported
        }
    }
}

/// Capabilities of the running build.
///
/// `raster` gates raster extraction; `direct_projection` decides whether
/// coordinate-system text is translated in-process or through the side-car
/// file round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Support status for raster extraction.
    pub raster: SupportStatus,
    /// Support status for direct WKT to projection-string translation.
    pub direct_projection: SupportStatus,
}

impl Capabilities {
    /// Reports the capabilities compiled into this build.
    #[must_use]
    pub const fn detect() -> Self {
        Self {
            raster: SupportStatus::from_enabled(cfg!(feature = "raster")),
            direct_projection: SupportStatus::from_enabled(cfg!(feature = "direct-crs")),
        }
    }

    /// Overrides the raster capability status.
    #[must_use]
    pub fn with_raster(mut self, status: SupportStatus) -> Self {
        self.raster = status;
        self
    }

    /// Overrides the direct projection capability status.
    #[must_use]
    pub fn with_direct_projection(mut self, status: SupportStatus) -> Self {
        self.direct_projection = status;
        self
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::detect()
    }
}
