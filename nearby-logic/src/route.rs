use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{
    discovery::Place,
    error::LocateError,
    location::Coordinate,
    prelude::*,
    sequence::{RequestSequence, RequestToken},
};

/// Origin and destination closer than this are treated as the same point
const SAME_POINT_METERS: f64 = 0.5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Ordered points describing a path, empty for a zero-length route
pub struct RouteGeometry {
    pub points: Vec<Coordinate>,
}

impl RouteGeometry {
    pub fn new(points: Vec<Coordinate>) -> Self {
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sum of the great-circle legs between consecutive points
    pub fn length_meters(&self) -> f64 {
        self.points
            .windows(2)
            .map(|leg| leg[0].distance_to(&leg[1]))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub origin: Coordinate,
    pub destination: Coordinate,
    /// [Place::id] of the destination
    pub destination_id: String,
}

impl RouteRequest {
    pub fn to_place(origin: Coordinate, place: &Place) -> Self {
        Self {
            origin,
            destination: place.coordinate(),
            destination_id: place.id.clone(),
        }
    }

    fn is_degenerate(&self) -> bool {
        self.origin.distance_to(&self.destination) < SAME_POINT_METERS
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// The route currently shown on the map
pub struct ActiveRoute {
    pub request: RouteRequest,
    pub geometry: RouteGeometry,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// The route is now the active one
    Applied(RouteGeometry),
    /// A newer request was issued while this one was in flight, its response was dropped
    Superseded,
}

/// Source of route geometries between two points
pub trait DirectionsProvider: Send + Sync {
    fn directions(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> impl Future<Output = Result<RouteGeometry>> + Send;
}

/// Owns the single active route, newer requests always win over older ones
pub struct RouteRequestCoordinator<D: DirectionsProvider> {
    provider: D,
    sequence: RequestSequence,
    active: RwLock<Option<ActiveRoute>>,
}

impl<D: DirectionsProvider> RouteRequestCoordinator<D> {
    pub fn new(provider: D) -> Self {
        Self {
            provider,
            sequence: RequestSequence::new(),
            active: RwLock::new(None),
        }
    }

    pub fn provider(&self) -> &D {
        &self.provider
    }

    /// Snapshot of the active route
    pub async fn active(&self) -> Option<ActiveRoute> {
        self.active.read().await.clone()
    }

    /// Drop the active route, also invalidates anything still in flight
    pub async fn clear(&self) {
        self.sequence.issue();
        *self.active.write().await = None;
    }

    async fn apply(&self, token: RequestToken, route: ActiveRoute) -> RouteOutcome {
        let mut active = self.active.write().await;
        if self.sequence.is_latest(token) {
            let geometry = route.geometry.clone();
            *active = Some(route);
            RouteOutcome::Applied(geometry)
        } else {
            debug!(
                "Dropping route to {} from a superseded request",
                route.request.destination_id
            );
            RouteOutcome::Superseded
        }
    }

    pub async fn request_route(
        &self,
        origin: Coordinate,
        destination: &Place,
    ) -> Result<RouteOutcome, LocateError> {
        let request = RouteRequest::to_place(origin, destination);
        let token = self.sequence.issue();

        if request.is_degenerate() {
            debug!("Origin is at {}, using an empty route", destination.id);
            let route = ActiveRoute {
                request,
                geometry: RouteGeometry::default(),
            };
            return Ok(self.apply(token, route).await);
        }

        match self
            .provider
            .directions(request.origin, request.destination)
            .await
        {
            Ok(geometry) => {
                info!(
                    "Got route to {} ({} points, {:.0}m)",
                    destination.name,
                    geometry.points.len(),
                    geometry.length_meters()
                );
                Ok(self.apply(token, ActiveRoute { request, geometry }).await)
            }
            Err(_) if !self.sequence.is_latest(token) => Ok(RouteOutcome::Superseded),
            Err(why) => {
                warn!("Failed to get route to {}: {why:#}", destination.name);
                Err(LocateError::RouteUnavailable(LocateError::describe(&why)))
            }
        }
    }
}
