use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast::error::RecvError};
use tokio_util::sync::CancellationToken;

use crate::{
    discovery::{Place, PlaceDiscoveryService, PlaceProvider},
    error::LocateError,
    geocode::{GeocodeProvider, GeocodeResolver, GeocodeResult},
    location::{Coordinate, LocationService, Position},
    prelude::*,
    query::PlaceQuery,
    route::{ActiveRoute, DirectionsProvider, RouteOutcome, RouteRequestCoordinator},
    sequence::{RequestSequence, RequestToken},
    settings::ExplorerSettings,
    speed::{DisplaySpeed, SpeedWindow},
    tracker::PositionTracker,
};

/// Notified whenever the explorer's state changed and the UI should refresh
pub trait StateUpdateSender {
    fn send_update(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// What places are being discovered around
pub enum CenterSource {
    /// Follow the device's position
    Live,
    /// A point the user searched for
    Manual(Coordinate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationStatus {
    /// Tracking hasn't been started yet
    Unknown,
    Tracking,
    /// The user refused location access, only manual searches work
    Denied,
    /// The platform couldn't start a watch
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Snapshot of everything the map screen shows
pub struct ExplorerUiState {
    pub location_status: LocationStatus,
    pub position: Option<Position>,
    pub speed: DisplaySpeed,
    pub center: Coordinate,
    pub center_source: CenterSource,
    pub places: Vec<Place>,
    pub route: Option<ActiveRoute>,
    pub last_error: Option<LocateError>,
}

struct ExplorerState {
    location_status: LocationStatus,
    position: Option<Position>,
    speed: SpeedWindow,
    center: Coordinate,
    center_source: CenterSource,
    /// Where the last live discovery was started from
    discovered_at: Option<Coordinate>,
    /// Token of the live cycle started from `discovered_at`
    live_cycle: Option<RequestToken>,
    places: Vec<Place>,
    last_error: Option<LocateError>,
}

impl ExplorerState {
    fn start_live_cycle(&mut self, center: Coordinate, seq: &RequestSequence) -> RequestToken {
        let token = seq.issue();
        self.discovered_at = Some(center);
        self.live_cycle = Some(token);
        token
    }

    /// A live cycle that didn't land shouldn't count as done, the next sample retries it
    fn forget_live_cycle(&mut self, token: RequestToken) {
        if self.live_cycle == Some(token) {
            self.discovered_at = None;
            self.live_cycle = None;
        }
    }
}

/// Marks a search as running until dropped
struct PendingSearch<'a>(&'a AtomicUsize);

impl<'a> PendingSearch<'a> {
    fn start(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for PendingSearch<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A map session: follows the device, keeps nearby places fresh and routes to the one the user
/// picks. Drive it with [Explorer::main_loop] and act on it with the other methods while that runs.
pub struct Explorer<L, P, D, G, S>
where
    L: LocationService,
    P: PlaceProvider,
    D: DirectionsProvider,
    G: GeocodeProvider,
    S: StateUpdateSender,
{
    settings: ExplorerSettings,
    tracker: PositionTracker<L>,
    discovery: PlaceDiscoveryService<P>,
    routes: RouteRequestCoordinator<D>,
    geocoder: GeocodeResolver<G>,
    discovery_seq: RequestSequence,
    search_seq: RequestSequence,
    pending_searches: AtomicUsize,
    state: RwLock<ExplorerState>,
    state_update_sender: S,
    cancel: CancellationToken,
}

impl<L, P, D, G, S> Explorer<L, P, D, G, S>
where
    L: LocationService,
    P: PlaceProvider,
    D: DirectionsProvider,
    G: GeocodeProvider,
    S: StateUpdateSender,
{
    pub fn new(
        settings: ExplorerSettings,
        location: Arc<L>,
        places: P,
        directions: D,
        geocoder: G,
        state_update_sender: S,
    ) -> Self {
        let state = ExplorerState {
            location_status: LocationStatus::Unknown,
            position: None,
            speed: SpeedWindow::new(settings.speed_window),
            center: settings.fallback_center,
            center_source: CenterSource::Live,
            discovered_at: None,
            live_cycle: None,
            places: Vec::new(),
            last_error: None,
        };

        Self {
            tracker: PositionTracker::new(location, settings.tracking),
            discovery: PlaceDiscoveryService::new(places, settings.retry_discovery),
            routes: RouteRequestCoordinator::new(directions),
            geocoder: GeocodeResolver::new(geocoder),
            discovery_seq: RequestSequence::new(),
            search_seq: RequestSequence::new(),
            pending_searches: AtomicUsize::new(0),
            state: RwLock::new(state),
            state_update_sender,
            cancel: CancellationToken::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &ExplorerSettings {
        &self.settings
    }

    pub fn tracker(&self) -> &PositionTracker<L> {
        &self.tracker
    }

    pub async fn get_ui_state(&self) -> ExplorerUiState {
        let route = self.routes.active().await;
        let state = self.state.read().await;
        ExplorerUiState {
            location_status: state.location_status,
            position: state.position,
            speed: state.speed.current(),
            center: state.center,
            center_source: state.center_source,
            places: state.places.clone(),
            route,
            last_error: state.last_error.clone(),
        }
    }

    async fn record_error(&self, err: &LocateError) {
        self.state.write().await.last_error = Some(err.clone());
        self.state_update_sender.send_update();
    }

    async fn run_discovery(
        &self,
        token: RequestToken,
        center: Coordinate,
    ) -> Result<(), LocateError> {
        let query = match PlaceQuery::build(
            center,
            self.settings.radius_meters.into(),
            self.settings.categories.clone(),
        ) {
            Ok(query) => query,
            Err(why) => {
                self.record_error(&why).await;
                return Err(why);
            }
        };

        let res = self.discovery.discover(&query).await;

        let mut state = self.state.write().await;
        if !self.discovery_seq.is_latest(token) {
            debug!("Discarding places from a superseded discovery cycle");
            state.forget_live_cycle(token);
            return Ok(());
        }
        match res {
            Ok(mut places) => {
                Place::sort_by_distance(&mut places, &center);
                state.places = places;
                state.last_error = None;
                drop(state);
                self.state_update_sender.send_update();
                Ok(())
            }
            Err(why) => {
                warn!(
                    "Discovery around ({}, {}) failed: {why}",
                    center.latitude, center.longitude
                );
                state.last_error = Some(why.clone());
                state.forget_live_cycle(token);
                drop(state);
                self.state_update_sender.send_update();
                Err(why)
            }
        }
    }

    /// Run one discovery cycle around `center`, replacing the shown places if it succeeds.
    /// A failed cycle leaves the previous places in place.
    pub async fn discover_around(&self, center: Coordinate) -> Result<(), LocateError> {
        let token = self.discovery_seq.issue();
        self.run_discovery(token, center).await
    }

    /// Geocode `text` and discover places around the first match.
    ///
    /// Returns `Ok(None)` if nothing matched or a newer search was started in the meantime.
    /// Live rediscovery is held back while the lookup runs.
    pub async fn search(&self, text: &str) -> Result<Option<GeocodeResult>, LocateError> {
        let text = text.trim();
        if text.is_empty() {
            let why = LocateError::invalid("Search text is empty");
            self.record_error(&why).await;
            return Err(why);
        }

        let search = self.search_seq.issue();
        let _pending = PendingSearch::start(&self.pending_searches);

        let found = match self.geocoder.resolve_first(text).await {
            Ok(found) => found,
            Err(why) => {
                self.record_error(&why).await;
                return Err(why);
            }
        };

        let Some(found) = found else {
            info!("No match for \"{text}\"");
            return Ok(None);
        };

        if !self.search_seq.is_latest(search) {
            debug!("Discarding superseded search for \"{text}\"");
            return Ok(None);
        }

        let center = found.coordinate();
        let mut state = self.state.write().await;
        state.center = center;
        state.center_source = CenterSource::Manual(center);
        let token = self.discovery_seq.issue();
        drop(state);
        self.state_update_sender.send_update();

        self.run_discovery(token, center).await?;
        Ok(Some(found))
    }

    /// Go back to following the device, discovers around the latest fix right away
    pub async fn resume_live(&self) -> Result<(), LocateError> {
        let mut state = self.state.write().await;
        state.center_source = CenterSource::Live;
        let position = state.position;
        let cycle = position.map(|p| {
            let center = p.coordinate();
            state.center = center;
            (state.start_live_cycle(center, &self.discovery_seq), center)
        });
        drop(state);
        self.state_update_sender.send_update();

        match cycle {
            Some((token, center)) => self.run_discovery(token, center).await,
            None => Ok(()),
        }
    }

    /// Route from the current position to the discovered place with the given id
    pub async fn select_place(&self, id: &str) -> Result<RouteOutcome, LocateError> {
        let state = self.state.read().await;
        let origin = state.position.map(|p| p.coordinate());
        let place = state.places.iter().find(|p| p.id == id).cloned();
        drop(state);

        let res = match (origin, place) {
            (None, _) => Err(LocateError::PositionUnavailable(
                "No position fix yet".to_string(),
            )),
            (_, None) => Err(LocateError::invalid(format!("Unknown place {id}"))),
            (Some(origin), Some(place)) => self.routes.request_route(origin, &place).await,
        };

        match &res {
            Ok(RouteOutcome::Applied(_)) => self.state_update_sender.send_update(),
            Ok(RouteOutcome::Superseded) => {}
            Err(why) => self.record_error(why).await,
        }

        res
    }

    pub async fn clear_route(&self) {
        self.routes.clear().await;
        self.state_update_sender.send_update();
    }

    pub async fn quit(&self) {
        self.cancel.cancel();
    }

    async fn on_position(&self, position: Position) {
        let mut state = self.state.write().await;

        if state
            .position
            .is_some_and(|prev| position.timestamp < prev.timestamp)
        {
            return;
        }

        state.position = Some(position);
        state.speed.push(&position);
        state.location_status = LocationStatus::Tracking;

        let here = position.coordinate();
        let source = state.center_source;
        let cycle = match source {
            CenterSource::Live => {
                state.center = here;
                let due = state.discovered_at.is_none_or(|last| {
                    last.distance_to(&here) >= self.settings.rediscover_distance_meters
                });
                let searching = self.pending_searches.load(Ordering::SeqCst) > 0;
                if due && searching {
                    debug!("Holding back live discovery while a search runs");
                }
                (due && !searching).then(|| state.start_live_cycle(here, &self.discovery_seq))
            }
            CenterSource::Manual(_) => None,
        };
        drop(state);
        self.state_update_sender.send_update();

        if let Some(token) = cycle {
            // Already recorded for the UI, the loop carries on regardless
            let _ = self.run_discovery(token, here).await;
        }
    }

    /// Follow the device until [Explorer::quit] is called.
    ///
    /// If tracking can't start the loop keeps running so searches and routing to searched
    /// places still work.
    pub async fn main_loop(&self) -> Result {
        let mut positions = self.tracker.subscribe();

        let handle = match self.tracker.watch().await {
            Ok(handle) => {
                self.state.write().await.location_status = LocationStatus::Tracking;
                self.state_update_sender.send_update();
                Some(handle)
            }
            Err(why) => {
                warn!("Live tracking unavailable: {why}");
                let mut state = self.state.write().await;
                state.location_status = match why {
                    LocateError::PermissionDenied => LocationStatus::Denied,
                    _ => LocationStatus::Unavailable,
                };
                state.last_error = Some(why);
                drop(state);
                self.state_update_sender.send_update();
                None
            }
        };

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                msg = positions.recv(), if handle.is_some() => match msg {
                    Ok(position) => self.on_position(position).await,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Explorer skipped {skipped} position samples");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }

        if let Some(handle) = handle {
            self.tracker.stop(handle).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeDelta, Utc};
    use tokio::{task::yield_now, test};

    use super::*;
    use crate::{
        discovery::UNNAMED_PLACE,
        location::UtcDT,
        tests::{CountingSender, MockDirections, MockGeocoder, MockLocation, MockPlaces},
    };

    type TestExplorer =
        Explorer<MockLocation, MockPlaces, MockDirections, MockGeocoder, CountingSender>;

    const START: Coordinate = MockLocation::FIX;

    const TWO_PLACES: &str = r#"{"elements": [
        {"id": 1, "lat": 37.7890, "lon": -122.4330, "tags": {"amenity": "restaurant", "name": "Far"}},
        {"id": 2, "lat": 37.7883, "lon": -122.4324, "tags": {"shop": "books"}}
    ]}"#;

    const ONE_PLACE: &str = r#"{"elements": [
        {"id": 3, "lat": 37.7886, "lon": -122.4327, "tags": {"amenity": "cafe", "name": "Corner"}}
    ]}"#;

    fn japantown() -> GeocodeResult {
        GeocodeResult {
            latitude: 37.7885,
            longitude: -122.4326,
            label: Some("Japantown".to_string()),
        }
    }

    struct Harness {
        explorer: Arc<TestExplorer>,
        location: Arc<MockLocation>,
        sender: CountingSender,
        base: UtcDT,
    }

    impl Harness {
        fn new(location: MockLocation, places: MockPlaces, geocoder: MockGeocoder) -> Self {
            let location = Arc::new(location);
            let sender = CountingSender::default();
            let explorer = Explorer::new(
                ExplorerSettings::default(),
                location.clone(),
                places,
                MockDirections::straight(),
                geocoder,
                sender.clone(),
            );
            Self {
                explorer: Arc::new(explorer),
                location,
                sender,
                base: Utc::now(),
            }
        }

        fn granted(body: &str) -> Self {
            Self::new(
                MockLocation::granted(),
                MockPlaces::ok(body),
                MockGeocoder::with(vec![]),
            )
        }

        async fn start(&self) -> tokio::task::JoinHandle<Result> {
            let explorer = self.explorer.clone();
            let handle = tokio::spawn(async move { explorer.main_loop().await });
            settle().await;
            handle
        }

        /// Move to `meters` north of the start, `secs` after the harness was made
        async fn move_to(&self, meters: f64, secs: i64, speed: Option<f64>) {
            let lat = START.latitude + meters / 111_195.0;
            self.location
                .push(lat, START.longitude, speed, self.base + TimeDelta::seconds(secs))
                .await;
            settle().await;
        }

        fn place_calls(&self) -> usize {
            self.explorer.discovery.provider().calls()
        }
    }

    async fn settle() {
        for _ in 0..50 {
            yield_now().await;
        }
    }

    #[test]
    async fn test_live_discovery_follows_position() {
        let harness = Harness::granted(TWO_PLACES);
        let main = harness.start().await;

        assert_eq!(harness.location.watches_started(), 1);
        assert_eq!(
            harness.explorer.get_ui_state().await.location_status,
            LocationStatus::Tracking
        );

        harness.move_to(0.0, 0, Some(1.95)).await;

        let ui = harness.explorer.get_ui_state().await;
        assert_eq!(harness.place_calls(), 1);
        assert_eq!(ui.places.len(), 2);
        // Closest first
        assert_eq!(ui.places[0].id, "2");
        assert_eq!(ui.places[0].name, UNNAMED_PLACE);
        assert_eq!(ui.speed.to_string(), "7 km/h");
        assert_eq!(ui.center, START);
        assert_eq!(ui.center_source, CenterSource::Live);

        // Small moves don't refresh places
        harness.move_to(20.0, 2, None).await;
        assert_eq!(harness.place_calls(), 1);
        assert_eq!(harness.explorer.get_ui_state().await.speed.to_string(), "0 km/h");

        harness.move_to(150.0, 4, None).await;
        assert_eq!(harness.place_calls(), 2);

        harness.explorer.quit().await;
        main.await.unwrap().unwrap();
        assert_eq!(harness.location.active_watches(), 0);
        assert!(harness.sender.count() > 0);
    }

    #[test]
    async fn test_denied_still_serves_search() {
        let harness = Harness::new(
            MockLocation::denied(),
            MockPlaces::ok(TWO_PLACES),
            MockGeocoder::with(vec![GeocodeResult {
                latitude: 37.7885,
                longitude: -122.4326,
                label: Some("Japantown".to_string()),
            }]),
        );
        let main = harness.start().await;

        let ui = harness.explorer.get_ui_state().await;
        assert_eq!(ui.location_status, LocationStatus::Denied);
        assert_eq!(ui.last_error, Some(LocateError::PermissionDenied));
        assert_eq!(ui.center, ExplorerSettings::default().fallback_center);
        assert_eq!(harness.place_calls(), 0);

        let found = harness.explorer.search("Japantown").await.unwrap().unwrap();
        assert_eq!(found.label.as_deref(), Some("Japantown"));

        let ui = harness.explorer.get_ui_state().await;
        assert_eq!(ui.center_source, CenterSource::Manual(found.coordinate()));
        assert_eq!(ui.places.len(), 2);
        assert_eq!(ui.last_error, None);

        let res = harness.explorer.select_place("1").await;
        assert!(matches!(res, Err(LocateError::PositionUnavailable(_))));

        harness.explorer.quit().await;
        main.await.unwrap().unwrap();
    }

    #[test]
    async fn test_search_without_match() {
        let harness = Harness::granted(TWO_PLACES);
        assert_eq!(harness.explorer.search("Atlantis").await, Ok(None));
        assert_eq!(harness.place_calls(), 0);

        let res = harness.explorer.search("  ").await;
        assert!(matches!(res, Err(LocateError::InvalidQuery(_))));
        assert!(matches!(
            harness.explorer.get_ui_state().await.last_error,
            Some(LocateError::InvalidQuery(_))
        ));
    }

    #[test]
    async fn test_failed_discovery_keeps_places() {
        let harness = Harness::granted(TWO_PLACES);
        harness.explorer.discover_around(START).await.unwrap();
        assert_eq!(harness.explorer.get_ui_state().await.places.len(), 2);

        // Retried once, so both attempts have to fail
        harness.explorer.discovery.provider().fail_next(2);
        let res = harness.explorer.discover_around(START).await;
        assert!(matches!(res, Err(LocateError::NetworkError(_))));

        let ui = harness.explorer.get_ui_state().await;
        assert_eq!(ui.places.len(), 2);
        assert!(matches!(ui.last_error, Some(LocateError::NetworkError(_))));

        harness.explorer.discovery.provider().set_body("garbage");
        let res = harness.explorer.discover_around(START).await;
        assert!(matches!(res, Err(LocateError::ParseError(_))));
        assert_eq!(harness.explorer.get_ui_state().await.places.len(), 2);
    }

    #[test]
    async fn test_empty_discovery_replaces_places() {
        let harness = Harness::granted(TWO_PLACES);
        harness.explorer.discover_around(START).await.unwrap();
        harness
            .explorer
            .discovery
            .provider()
            .set_body(r#"{"elements": []}"#);
        harness.explorer.discover_around(START).await.unwrap();
        assert!(harness.explorer.get_ui_state().await.places.is_empty());
    }

    #[test]
    async fn test_select_place() {
        let harness = Harness::granted(TWO_PLACES);
        let main = harness.start().await;
        harness.move_to(0.0, 0, None).await;

        let res = harness.explorer.select_place("404").await;
        assert!(matches!(res, Err(LocateError::InvalidQuery(_))));

        let outcome = harness.explorer.select_place("1").await.unwrap();
        let RouteOutcome::Applied(geometry) = outcome else {
            panic!("Route not applied");
        };
        assert_eq!(geometry.points.first(), Some(&START));

        let ui = harness.explorer.get_ui_state().await;
        let route = ui.route.expect("No route in UI state");
        assert_eq!(route.request.destination_id, "1");

        harness.explorer.clear_route().await;
        assert!(harness.explorer.get_ui_state().await.route.is_none());

        harness.explorer.quit().await;
        main.await.unwrap().unwrap();
    }

    #[test]
    async fn test_manual_center_until_resumed() {
        let harness = Harness::new(
            MockLocation::granted(),
            MockPlaces::ok(TWO_PLACES),
            MockGeocoder::with(vec![GeocodeResult {
                latitude: 48.1,
                longitude: -1.68,
                label: None,
            }]),
        );
        let main = harness.start().await;
        harness.move_to(0.0, 0, None).await;
        assert_eq!(harness.place_calls(), 1);

        harness.explorer.search("Rennes").await.unwrap();
        assert_eq!(harness.place_calls(), 2);

        // Far moves don't pull the center back while searching
        harness.move_to(500.0, 5, None).await;
        let ui = harness.explorer.get_ui_state().await;
        assert_eq!(harness.place_calls(), 2);
        assert_eq!(ui.center, Coordinate::new(48.1, -1.68));

        harness.explorer.resume_live().await.unwrap();
        let ui = harness.explorer.get_ui_state().await;
        assert_eq!(harness.place_calls(), 3);
        assert_eq!(ui.center_source, CenterSource::Live);
        assert_eq!(ui.center, ui.position.unwrap().coordinate());

        harness.explorer.quit().await;
        main.await.unwrap().unwrap();
    }

    #[test]
    async fn test_newer_discovery_wins() {
        tokio::time::pause();
        let harness = Harness::new(
            MockLocation::granted(),
            MockPlaces::ok(TWO_PLACES).with_delays([Duration::from_secs(5)]),
            MockGeocoder::with(vec![]),
        );

        let older = tokio::spawn({
            let explorer = harness.explorer.clone();
            async move { explorer.discover_around(START).await }
        });
        settle().await;
        assert_eq!(harness.place_calls(), 1);

        harness.explorer.discovery.provider().set_body(ONE_PLACE);
        harness.explorer.discover_around(START).await.unwrap();
        assert_eq!(harness.explorer.get_ui_state().await.places.len(), 1);

        // The slow cycle lands afterwards and is dropped
        older.await.unwrap().unwrap();
        let ui = harness.explorer.get_ui_state().await;
        assert_eq!(ui.places.len(), 1);
        assert_eq!(ui.places[0].name, "Corner");
    }

    #[test]
    async fn test_search_supersedes_live_cycle() {
        tokio::time::pause();
        let harness = Harness::new(
            MockLocation::granted(),
            MockPlaces::ok(TWO_PLACES).with_delays([Duration::from_secs(5)]),
            MockGeocoder::with(vec![japantown()]),
        );
        let main = harness.start().await;
        harness.move_to(0.0, 0, None).await;
        assert_eq!(harness.place_calls(), 1);

        harness.explorer.discovery.provider().set_body(ONE_PLACE);
        let found = harness.explorer.search("Japantown").await.unwrap();
        assert_eq!(found, Some(japantown()));
        assert_eq!(harness.explorer.get_ui_state().await.places.len(), 1);

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        let ui = harness.explorer.get_ui_state().await;
        assert_eq!(ui.places.len(), 1);
        assert_eq!(ui.center_source, CenterSource::Manual(japantown().coordinate()));

        harness.explorer.quit().await;
        main.await.unwrap().unwrap();
    }

    #[test]
    async fn test_rejected_search_keeps_live_cycle() {
        tokio::time::pause();
        let harness = Harness::new(
            MockLocation::granted(),
            MockPlaces::ok(TWO_PLACES).with_delays([Duration::from_secs(5)]),
            MockGeocoder::failing(),
        );
        let main = harness.start().await;
        harness.move_to(0.0, 0, None).await;
        assert_eq!(harness.place_calls(), 1);

        let res = harness.explorer.search("   ").await;
        assert!(matches!(res, Err(LocateError::InvalidQuery(_))));
        let res = harness.explorer.search("Japantown").await;
        assert!(matches!(res, Err(LocateError::GeocodeError(_))));
        assert!(harness.explorer.get_ui_state().await.places.is_empty());

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        let ui = harness.explorer.get_ui_state().await;
        assert_eq!(ui.places.len(), 2);
        assert_eq!(ui.center_source, CenterSource::Live);
        assert_eq!(ui.last_error, None);
        assert_eq!(harness.place_calls(), 1);

        harness.explorer.quit().await;
        main.await.unwrap().unwrap();
    }

    #[test]
    async fn test_unmatched_search_keeps_live_cycle() {
        tokio::time::pause();
        let harness = Harness::new(
            MockLocation::granted(),
            MockPlaces::ok(TWO_PLACES).with_delays([Duration::from_secs(5)]),
            MockGeocoder::with(vec![]),
        );
        let main = harness.start().await;
        harness.move_to(0.0, 0, None).await;

        assert_eq!(harness.explorer.search("Atlantis").await, Ok(None));

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(harness.explorer.get_ui_state().await.places.len(), 2);

        harness.explorer.quit().await;
        main.await.unwrap().unwrap();
    }

    #[test]
    async fn test_live_tick_waits_for_search() {
        tokio::time::pause();
        let harness = Harness::new(
            MockLocation::granted(),
            MockPlaces::ok(TWO_PLACES),
            MockGeocoder::with(vec![japantown()]).with_delay(Duration::from_secs(5)),
        );
        let main = harness.start().await;

        let search = tokio::spawn({
            let explorer = harness.explorer.clone();
            async move { explorer.search("Japantown").await }
        });
        settle().await;
        assert_eq!(harness.explorer.geocoder.provider().calls(), 1);

        harness.move_to(0.0, 0, None).await;
        assert_eq!(harness.place_calls(), 0);
        assert_eq!(harness.explorer.get_ui_state().await.center, START);

        let found = search.await.unwrap().unwrap();
        assert_eq!(found, Some(japantown()));
        let ui = harness.explorer.get_ui_state().await;
        assert_eq!(harness.place_calls(), 1);
        assert_eq!(ui.places.len(), 2);
        assert_eq!(ui.center_source, CenterSource::Manual(japantown().coordinate()));

        harness.explorer.quit().await;
        main.await.unwrap().unwrap();
    }

    #[test]
    async fn test_newer_search_wins() {
        tokio::time::pause();
        let harness = Harness::new(
            MockLocation::denied(),
            MockPlaces::ok(TWO_PLACES),
            MockGeocoder::with(vec![japantown()]).with_delay(Duration::from_secs(5)),
        );

        let older = tokio::spawn({
            let explorer = harness.explorer.clone();
            async move { explorer.search("Japan").await }
        });
        settle().await;

        let newer = harness.explorer.search("Japantown").await.unwrap();
        assert_eq!(newer, Some(japantown()));
        assert_eq!(older.await.unwrap(), Ok(None));
        assert_eq!(harness.place_calls(), 1);
    }

    #[test]
    async fn test_failed_live_cycle_retried() {
        let harness = Harness::new(
            MockLocation::granted(),
            MockPlaces::failing(2, TWO_PLACES),
            MockGeocoder::with(vec![]),
        );
        let main = harness.start().await;

        harness.move_to(0.0, 0, None).await;
        let ui = harness.explorer.get_ui_state().await;
        assert_eq!(harness.place_calls(), 2);
        assert!(ui.places.is_empty());
        assert!(matches!(ui.last_error, Some(LocateError::NetworkError(_))));

        // Well under the rediscover distance, retried because the last cycle never landed
        harness.move_to(20.0, 2, None).await;
        let ui = harness.explorer.get_ui_state().await;
        assert_eq!(harness.place_calls(), 3);
        assert_eq!(ui.places.len(), 2);
        assert_eq!(ui.last_error, None);

        harness.move_to(40.0, 4, None).await;
        assert_eq!(harness.place_calls(), 3);

        harness.explorer.quit().await;
        main.await.unwrap().unwrap();
    }
}
