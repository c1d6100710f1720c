use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures surfaced from the location and place services to the presentation layer.
///
/// Raw transport errors are converted into one of these at the component boundary, the
/// strings carry the rendered cause for display.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum LocateError {
    /// The user refused foreground location access
    #[error("Permission to access location was denied")]
    PermissionDenied,

    /// A query could not be built from the given input
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The request never produced a usable response
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The provider answered with something we couldn't make sense of
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// No route could be obtained for the selected place
    #[error("Route unavailable: {0}")]
    RouteUnavailable(String),

    /// The geocoding provider failed
    #[error("Geocoding failed: {0}")]
    GeocodeError(String),

    /// The platform could not produce a position fix
    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),
}

impl LocateError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    /// Render an `anyhow` chain (including context) into a single line
    pub(crate) fn describe(err: &anyhow::Error) -> String {
        format!("{err:#}")
    }
}
