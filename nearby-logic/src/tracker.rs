use std::sync::Arc;

use log::{error, info, warn};
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        watch,
    },
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::LocateError,
    location::{
        LocationService, PermissionState, Position, WatchOptions, WatchStream, permission_error,
    },
};

/// How many samples a subscriber may fall behind before it starts skipping
const UPDATE_BUFFER: usize = 32;

/// Handle to a running position watch, pass it to [PositionTracker::stop] to end it
pub struct TrackingHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl TrackingHandle {
    fn inactive() -> Self {
        let cancel = CancellationToken::new();
        cancel.cancel();
        Self {
            cancel,
            tasks: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && self.tasks.iter().any(|t| !t.is_finished())
    }
}

/// Decides which platform readings become [Position]s
struct SampleGate {
    options: WatchOptions,
    last: Option<Position>,
}

impl SampleGate {
    fn new(options: WatchOptions) -> Self {
        Self {
            options,
            last: None,
        }
    }

    fn admit(&mut self, position: Position) -> bool {
        if let Some(last) = self.last {
            if position.timestamp < last.timestamp {
                warn!(
                    "Dropping out of order position sample ({} < {})",
                    position.timestamp, last.timestamp
                );
                return false;
            }
            let elapsed = (position.timestamp - last.timestamp)
                .to_std()
                .unwrap_or_default();
            let moved = last.coordinate().distance_to(&position.coordinate());
            if elapsed < self.options.min_interval || moved < self.options.min_distance_meters {
                return false;
            }
        }
        self.last = Some(position);
        true
    }
}

/// Owns the location permission and the platform watch, fans samples out to subscribers.
///
/// Only the tracker ever writes the current position, everyone else reads snapshots via
/// [PositionTracker::current] or a [PositionTracker::subscribe] receiver. A subscriber that
/// falls behind skips samples, it never holds up the tracker.
pub struct PositionTracker<L: LocationService> {
    location: Arc<L>,
    options: WatchOptions,
    updates: broadcast::Sender<Position>,
    latest: Arc<watch::Sender<Option<Position>>>,
}

impl<L: LocationService> PositionTracker<L> {
    pub fn new(location: Arc<L>, options: WatchOptions) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);
        let (latest, _) = watch::channel(None);
        Self {
            location,
            options,
            updates,
            latest: Arc::new(latest),
        }
    }

    pub fn options(&self) -> WatchOptions {
        self.options
    }

    /// Receive every position emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Position> {
        self.updates.subscribe()
    }

    /// Latest emitted position, if any
    pub fn current(&self) -> Option<Position> {
        *self.latest.borrow()
    }

    async fn ensure_permission(&self) -> Result<(), LocateError> {
        match self.location.request_permission().await {
            Ok(PermissionState::Granted) => Ok(()),
            Ok(PermissionState::Denied) => {
                warn!("Location permission denied");
                Err(LocateError::PermissionDenied)
            }
            Err(why) => Err(permission_error(why)),
        }
    }

    /// Read the position a single time, doesn't touch the live stream
    pub async fn locate_once(&self) -> Result<Position, LocateError> {
        self.ensure_permission().await?;
        self.location
            .current_position()
            .await
            .map(Position::from)
            .map_err(|err| LocateError::PositionUnavailable(LocateError::describe(&err)))
    }

    /// Ask for permission and begin the continuous watch, samples go to subscribers
    pub async fn watch(&self) -> Result<TrackingHandle, LocateError> {
        self.ensure_permission().await?;

        let stream = self
            .location
            .watch_position(self.options)
            .await
            .map_err(|err| LocateError::PositionUnavailable(LocateError::describe(&err)))?;

        info!(
            "Started position watch {} (every {:?}, {}m)",
            stream.id, self.options.min_interval, self.options.min_distance_meters
        );

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Self::watch_loop(
            self.location.clone(),
            stream,
            SampleGate::new(self.options),
            self.updates.clone(),
            self.latest.clone(),
            cancel.clone(),
        ));

        Ok(TrackingHandle {
            cancel,
            tasks: vec![task],
        })
    }

    /// Callback flavour of [PositionTracker::watch].
    ///
    /// `on_error` is called at most once, if starting fails. `on_update` is only ever called
    /// after a successful start.
    pub async fn start<U, E>(&self, on_update: U, on_error: E) -> TrackingHandle
    where
        U: Fn(Position) + Send + 'static,
        E: FnOnce(LocateError),
    {
        let mut rx = self.subscribe();
        let mut handle = match self.watch().await {
            Ok(handle) => handle,
            Err(why) => {
                on_error(why);
                return TrackingHandle::inactive();
            }
        };

        let cancel = handle.cancel.clone();
        handle.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,

                    msg = rx.recv() => match msg {
                        Ok(position) => on_update(position),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("Position callback fell behind, skipped {skipped} samples");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        }));

        handle
    }

    /// End a watch and release it on the platform side
    pub async fn stop(&self, handle: TrackingHandle) {
        handle.cancel.cancel();
        for task in handle.tasks {
            if let Err(why) = task.await {
                error!("Position watch task failed: {why:?}");
            }
        }
    }

    async fn watch_loop(
        location: Arc<L>,
        mut stream: WatchStream,
        mut gate: SampleGate,
        updates: broadcast::Sender<Position>,
        latest: Arc<watch::Sender<Option<Position>>>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                reading = stream.readings.recv() => {
                    let Some(reading) = reading else {
                        info!("Platform ended position watch {}", stream.id);
                        break;
                    };
                    let position = Position::from(reading);
                    if gate.admit(position) {
                        latest.send_replace(Some(position));
                        // Nobody listening is fine
                        let _ = updates.send(position);
                    }
                }
            }
        }

        location.clear_watch(stream.id);
    }
}
