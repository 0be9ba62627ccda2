use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::config::EngineConfig;
use crate::error::{TripError, TripResult};
use crate::types::{current_timestamp, PositionFix};

/// Event delivered by a position subscription
#[derive(Clone, Debug, PartialEq)]
pub enum GeoEvent {
    Fix(PositionFix),
    Failure(TripError),
}

/// Subscription options passed to the platform source
#[derive(Clone, Debug, PartialEq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// Zero means never reuse a cached fix
    pub maximum_age: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(10),
            maximum_age: Duration::ZERO,
        }
    }
}

impl From<&EngineConfig> for WatchOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            high_accuracy: config.high_accuracy,
            timeout: Duration::from_secs_f64(config.watch_timeout_secs.max(0.0)),
            maximum_age: Duration::from_secs_f64(config.maximum_age_secs.max(0.0)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// Continuous-position primitive of the platform
///
/// `watch` registers a subscription that pushes events into `tx` until
/// `clear_watch` is called with the returned id.
pub trait PositionSource: Send {
    fn watch(&mut self, options: &WatchOptions, tx: UnboundedSender<GeoEvent>)
        -> TripResult<WatchId>;

    fn clear_watch(&mut self, id: WatchId);
}

impl<T: PositionSource + ?Sized> PositionSource for Box<T> {
    fn watch(&mut self, options: &WatchOptions, tx: UnboundedSender<GeoEvent>)
        -> TripResult<WatchId> {
        (**self).watch(options, tx)
    }

    fn clear_watch(&mut self, id: WatchId) {
        (**self).clear_watch(id)
    }
}

/// Cancellable event source over a [`PositionSource`]
///
/// Only one subscription is held at a time. `stop` releases it exactly once
/// and drops the receiving end, so nothing queued before the stop is
/// delivered afterwards.
pub struct GeoSampler<S: PositionSource> {
    source: S,
    options: WatchOptions,
    watch: Option<WatchId>,
    events: Option<UnboundedReceiver<GeoEvent>>,
}

impl<S: PositionSource> GeoSampler<S> {
    pub fn new(source: S, options: WatchOptions) -> Self {
        Self {
            source,
            options,
            watch: None,
            events: None,
        }
    }

    /// Subscribe to the source, replacing any existing subscription
    pub fn start(&mut self) -> TripResult<()> {
        self.stop();

        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.source.watch(&self.options, tx)?;
        log::debug!("Position watch {:?} started", id);
        self.watch = Some(id);
        self.events = Some(rx);
        Ok(())
    }

    /// Release the subscription; returns whether one was held
    pub fn stop(&mut self) -> bool {
        self.events = None;
        match self.watch.take() {
            Some(id) => {
                self.source.clear_watch(id);
                log::debug!("Position watch {:?} released", id);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.watch.is_some()
    }

    /// Next queued event without waiting
    pub fn try_next(&mut self) -> Option<GeoEvent> {
        self.events.as_mut().and_then(|rx| rx.try_recv().ok())
    }

    /// Wait for the next event
    ///
    /// Pends forever while stopped. A source that drops its sender yields
    /// a `PositionUnavailable` failure.
    pub async fn next_event(&mut self) -> GeoEvent {
        match self.events.as_mut() {
            Some(rx) => match rx.recv().await {
                Some(event) => event,
                None => {
                    self.events = None;
                    GeoEvent::Failure(TripError::PositionUnavailable(
                        "position source closed".to_string(),
                    ))
                }
            },
            None => std::future::pending().await,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: PositionSource> Drop for GeoSampler<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Source whose events are pushed by hand; used by tests and embedders that
/// receive fixes from their own platform callbacks
#[derive(Clone, Default)]
pub struct ManualSource {
    inner: Arc<Mutex<ManualInner>>,
}

#[derive(Default)]
struct ManualInner {
    next_id: u64,
    active: Option<(WatchId, UnboundedSender<GeoEvent>)>,
    watch_calls: u32,
    clear_calls: u32,
    unsupported: bool,
}

impl ManualSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source that reports no location capability at all
    pub fn unsupported() -> Self {
        let source = Self::default();
        if let Ok(mut inner) = source.inner.lock() {
            inner.unsupported = true;
        }
        source
    }

    /// Deliver an event to the active subscription; false if none is active
    pub fn emit(&self, event: GeoEvent) -> bool {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.active.as_ref().map(|(_, tx)| tx.send(event).is_ok()))
            .unwrap_or(false)
    }

    pub fn emit_fix(&self, fix: PositionFix) -> bool {
        self.emit(GeoEvent::Fix(fix))
    }

    pub fn watch_calls(&self) -> u32 {
        self.inner.lock().map(|i| i.watch_calls).unwrap_or(0)
    }

    pub fn clear_calls(&self) -> u32 {
        self.inner.lock().map(|i| i.clear_calls).unwrap_or(0)
    }
}

impl PositionSource for ManualSource {
    fn watch(
        &mut self,
        _options: &WatchOptions,
        tx: UnboundedSender<GeoEvent>,
    ) -> TripResult<WatchId> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| TripError::PositionUnavailable("source lock poisoned".to_string()))?;
        if inner.unsupported {
            return Err(TripError::Unsupported);
        }
        inner.next_id += 1;
        inner.watch_calls += 1;
        let id = WatchId(inner.next_id);
        inner.active = Some((id, tx));
        Ok(id)
    }

    fn clear_watch(&mut self, id: WatchId) {
        if let Ok(mut inner) = self.inner.lock() {
            if inner.active.as_ref().map(|(active, _)| *active) == Some(id) {
                inner.active = None;
                inner.clear_calls += 1;
            }
        }
    }
}

/// Straight-line ride at constant speed, one fix per `period`
///
/// Stands in for a real receiver when no hardware is present.
pub struct SimulatedSource {
    pub start: (f64, f64),
    /// Heading in degrees clockwise from north
    pub bearing_deg: f64,
    pub speed_mps: f64,
    pub period: Duration,
    next_id: u64,
    task: Option<(WatchId, JoinHandle<()>)>,
}

impl SimulatedSource {
    pub fn new(start: (f64, f64), bearing_deg: f64, speed_mps: f64, period: Duration) -> Self {
        Self {
            start,
            bearing_deg,
            speed_mps,
            period,
            next_id: 0,
            task: None,
        }
    }

    /// Coordinates after travelling `distance_km` from `start`
    pub fn position_after(&self, distance_km: f64) -> (f64, f64) {
        let r = crate::distance::EARTH_RADIUS_KM;
        let delta = distance_km / r;
        let theta = self.bearing_deg.to_radians();
        let lat1 = self.start.0.to_radians();
        let lon1 = self.start.1.to_radians();

        let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
        let lon2 = lon1
            + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());
        (lat2.to_degrees(), lon2.to_degrees())
    }
}

impl PositionSource for SimulatedSource {
    fn watch(
        &mut self,
        _options: &WatchOptions,
        tx: UnboundedSender<GeoEvent>,
    ) -> TripResult<WatchId> {
        self.next_id += 1;
        let id = WatchId(self.next_id);

        let route = SimulatedSource::new(self.start, self.bearing_deg, self.speed_mps, self.period);
        let step_km = self.speed_mps * self.period.as_secs_f64() / 1000.0;
        let mut ticker = interval(self.period);

        let handle = tokio::spawn(async move {
            let mut fix_count = 0u64;
            loop {
                ticker.tick().await;
                let (lat, lon) = route.position_after(step_km * fix_count as f64);
                let fix = PositionFix::new(lat, lon, Some(route.speed_mps), current_timestamp());
                if tx.send(GeoEvent::Fix(fix)).is_err() {
                    log::debug!("[gps] subscription closed after {} fixes", fix_count);
                    break;
                }
                fix_count += 1;
            }
        });

        if let Some((_, old)) = self.task.replace((id, handle)) {
            old.abort();
        }
        Ok(id)
    }

    fn clear_watch(&mut self, id: WatchId) {
        if let Some((active, handle)) = self.task.take() {
            if active == id {
                handle.abort();
            } else {
                self.task = Some((active, handle));
            }
        }
    }
}
