use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::analysis::{AnalysisGateway, CoachingOutcome};
use crate::engine::{AnalysisTrigger, EngineEvent, ManualAnalysis, TripEngine};
use crate::error::{TripError, TripResult};
use crate::geo_sampler::PositionSource;
use crate::live_status::TripSnapshot;
use crate::mileage::MileageResult;
use crate::range::FuelState;
use crate::types::SpeedSample;
use crate::voice::VoiceOutput;

/// Snapshot shared with the dashboard and status writer
pub type SharedSnapshot = Arc<RwLock<TripSnapshot>>;

/// User actions delivered to the runtime
#[derive(Debug)]
pub enum Command {
    Start,
    Stop,
    ResetDistance,
    Refill(FuelState),
    SetVoice(bool),
    Analyze,
    ReserveReached(oneshot::Sender<TripResult<MileageResult>>),
    Snapshot(oneshot::Sender<TripSnapshot>),
    Shutdown,
}

/// Cloneable front end for a running [`TripRuntime`]
#[derive(Clone)]
pub struct RuntimeHandle {
    tx: mpsc::Sender<Command>,
}

impl RuntimeHandle {
    pub async fn send(&self, command: Command) -> TripResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| TripError::InvalidInput("runtime has shut down".to_string()))
    }

    pub async fn snapshot(&self) -> TripResult<TripSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx)).await?;
        rx.await
            .map_err(|_| TripError::InvalidInput("runtime has shut down".to_string()))
    }

    pub async fn reserve_reached(&self) -> TripResult<MileageResult> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::ReserveReached(tx)).await?;
        rx.await
            .map_err(|_| TripError::InvalidInput("runtime has shut down".to_string()))?
    }
}

/// Owns a [`TripEngine`] and drives it from position events, a periodic
/// tick, user commands and finished analysis requests
pub struct TripRuntime<S: PositionSource, V: VoiceOutput> {
    engine: TripEngine<S, V>,
    gateway: Arc<dyn AnalysisGateway>,
    events: Option<mpsc::UnboundedSender<EngineEvent>>,
    shared: Option<SharedSnapshot>,
}

impl<S, V> TripRuntime<S, V>
where
    S: PositionSource + 'static,
    V: VoiceOutput + 'static,
{
    pub fn new(engine: TripEngine<S, V>, gateway: Arc<dyn AnalysisGateway>) -> Self {
        Self {
            engine,
            gateway,
            events: None,
            shared: None,
        }
    }

    /// Forward every engine event to `tx`
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Publish a fresh snapshot into `shared` after each step
    pub fn with_shared_snapshot(mut self, shared: SharedSnapshot) -> Self {
        self.shared = Some(shared);
        self
    }

    /// Spawn onto the current tokio runtime
    pub fn spawn(self) -> (RuntimeHandle, tokio::task::JoinHandle<TripEngine<S, V>>) {
        let (tx, rx) = mpsc::channel(32);
        let handle = tokio::spawn(self.run(rx));
        (RuntimeHandle { tx }, handle)
    }

    /// Run until `Shutdown` or every command sender is dropped; returns the
    /// engine for final inspection
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) -> TripEngine<S, V> {
        let (done_tx, mut done_rx) =
            mpsc::unbounded_channel::<(AnalysisTrigger, CoachingOutcome)>();
        let mut ticker = interval(self.engine.config().tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = self.engine.next_geo_event() => {
                    let out = self.engine.on_geo_event(event, Instant::now());
                    self.dispatch(out, &done_tx);
                }
                _ = ticker.tick() => {
                    let out = self.engine.tick(Instant::now());
                    self.dispatch(out, &done_tx);
                }
                Some((trigger, outcome)) = done_rx.recv() => {
                    let out = self.engine.complete_analysis(trigger, outcome);
                    self.dispatch(out, &done_tx);
                }
                command = commands.recv() => {
                    match command {
                        None | Some(Command::Shutdown) => break,
                        Some(command) => self.handle_command(command, &done_tx),
                    }
                }
            }
            if let Some((shared, snapshot)) = self.pending_publish() {
                *shared.write().await = snapshot;
            }
        }

        self.engine.shutdown();
        if let Some((shared, snapshot)) = self.pending_publish() {
            *shared.write().await = snapshot;
        }
        log::info!("Trip runtime stopped");
        self.engine
    }

    fn handle_command(
        &mut self,
        command: Command,
        done_tx: &mpsc::UnboundedSender<(AnalysisTrigger, CoachingOutcome)>,
    ) {
        let now = Instant::now();
        match command {
            Command::Start => {
                if let Err(e) = self.engine.start(now) {
                    self.emit(EngineEvent::TrackingFailed(e));
                }
            }
            Command::Stop => self.engine.stop(),
            Command::ResetDistance => self.engine.reset_distance(),
            Command::Refill(fuel) => {
                if let Err(e) = self.engine.set_fuel(fuel) {
                    log::warn!("Refill rejected: {}", e);
                    self.emit(EngineEvent::Notice(e.user_message()));
                }
            }
            Command::SetVoice(enabled) => self.engine.set_voice_enabled(enabled, now),
            Command::Analyze => match self.engine.request_analysis() {
                ManualAnalysis::Dispatch(samples) => {
                    self.spawn_analysis(AnalysisTrigger::Manual, samples, done_tx)
                }
                ManualAnalysis::Declined(message) => self.emit(EngineEvent::Notice(message)),
                ManualAnalysis::Busy => log::debug!("Analysis already in progress"),
            },
            Command::ReserveReached(reply) => {
                let _ = reply.send(self.engine.reserve_reached());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.engine.snapshot());
            }
            Command::Shutdown => {}
        }
    }

    fn dispatch(
        &mut self,
        events: Vec<EngineEvent>,
        done_tx: &mpsc::UnboundedSender<(AnalysisTrigger, CoachingOutcome)>,
    ) {
        for event in events {
            if let EngineEvent::AnalysisRequested { trigger, samples } = &event {
                self.spawn_analysis(*trigger, samples.clone(), done_tx);
            }
            self.emit(event);
        }
    }

    fn spawn_analysis(
        &self,
        trigger: AnalysisTrigger,
        samples: Vec<SpeedSample>,
        done_tx: &mpsc::UnboundedSender<(AnalysisTrigger, CoachingOutcome)>,
    ) {
        let gateway = Arc::clone(&self.gateway);
        let done_tx = done_tx.clone();
        log::debug!("Analysis requested ({:?}, {} samples)", trigger, samples.len());
        tokio::spawn(async move {
            let outcome = gateway.analyze(&samples).await;
            let _ = done_tx.send((trigger, outcome));
        });
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn pending_publish(&self) -> Option<(SharedSnapshot, TripSnapshot)> {
        self.shared
            .as_ref()
            .map(|shared| (Arc::clone(shared), self.engine.snapshot()))
    }
}
