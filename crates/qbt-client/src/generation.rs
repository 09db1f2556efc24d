//! Wire-generation tag and the legacy-version mapping.

use std::fmt;

/// First legacy API number announced by servers that also speak the
/// versioned `/api/v2` path scheme.
pub const V2_MIN_LEGACY_VERSION: i64 = 18;

/// One of the two mutually incompatible wire-protocol generations exposed
/// by the server. Resolved once per client and never invalidated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ApiGeneration {
    /// Legacy path scheme: `/command/*`, `/query/*`, `/login`.
    V1,
    /// Versioned path scheme: `/api/v2/<module>/<action>`.
    V2,
}

impl ApiGeneration {
    /// Maps the integer answered by the legacy version endpoint to a
    /// generation.
    pub fn from_legacy_version(version: i64) -> Self {
        if version >= V2_MIN_LEGACY_VERSION {
            ApiGeneration::V2
        } else {
            ApiGeneration::V1
        }
    }
}

impl fmt::Display for ApiGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiGeneration::V1 => write!(f, "v1"),
            ApiGeneration::V2 => write!(f, "v2"),
        }
    }
}
