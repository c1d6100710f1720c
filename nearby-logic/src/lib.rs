mod discovery;
mod error;
mod explorer;
mod geocode;
mod location;
mod query;
mod route;
mod sequence;
mod settings;
mod speed;
mod tracker;

pub use discovery::{
    Place, PlaceDiscoveryService, PlaceProvider, UNKNOWN_CATEGORY, UNNAMED_PLACE, parse_places,
};
pub use error::LocateError;
pub use explorer::{CenterSource, Explorer, ExplorerUiState, LocationStatus, StateUpdateSender};
pub use geocode::{GeocodeProvider, GeocodeResolver, GeocodeResult};
pub use location::{
    Coordinate, LocationService, PermissionState, Position, RawReading, UtcDT, WatchId,
    WatchOptions, WatchStream,
};
pub use query::{CategoryTag, PlaceQuery, default_categories};
pub use route::{
    ActiveRoute, DirectionsProvider, RouteGeometry, RouteOutcome, RouteRequest,
    RouteRequestCoordinator,
};
pub use sequence::{RequestSequence, RequestToken};
pub use settings::ExplorerSettings;
pub use speed::{DisplaySpeed, SpeedWindow, estimate};
pub use tracker::{PositionTracker, TrackingHandle};

pub mod prelude {
    use anyhow::Error as AnyhowError;
    use std::result::Result as StdResult;
    pub type Result<T = (), E = AnyhowError> = StdResult<T, E>;
    pub use anyhow::Context;
}
