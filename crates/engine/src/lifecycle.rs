use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use common::{
    EngineCommand, EngineEvent, EngineState, FeedEvent, SessionConfig, MAX_CADENCE_SECS,
};

use crate::session::{Changes, Session, SessionSnapshot};

/// Cloneable handle passed to other crates (Telegram, API, advisory).
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    state: Arc<RwLock<EngineState>>,
    snapshot_rx: watch::Receiver<Arc<SessionSnapshot>>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl EngineHandle {
    pub async fn send(&self, cmd: EngineCommand) {
        let _ = self.command_tx.send(cmd).await;
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    /// Latest published session view.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver notified on every published snapshot.
    pub fn watch_snapshot(&self) -> watch::Receiver<Arc<SessionSnapshot>> {
        self.snapshot_rx.clone()
    }

    /// Subscribe to the engine event broadcast.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }
}

/// The decision engine task.
///
/// Feed events, cadence ticks, settlement polls and commands are all
/// multiplexed onto this one task, so every session mutation runs to
/// completion before the next event is looked at. Timers exist only while
/// they are allowed to fire: the cadence while running and connected, the
/// settlement poller while running.
pub struct Engine {
    session: Session,
    state: Arc<RwLock<EngineState>>,
    command_rx: mpsc::Receiver<EngineCommand>,
    #[allow(dead_code)] // kept to prevent channel close
    command_tx: mpsc::Sender<EngineCommand>,
    feed_rx: mpsc::Receiver<FeedEvent>,
    feed_open: bool,
    event_tx: broadcast::Sender<EngineEvent>,
    snapshot_tx: watch::Sender<Arc<SessionSnapshot>>,
    cadence: Option<Interval>,
    poller: Option<Interval>,
}

impl Engine {
    pub fn new(config: SessionConfig, feed_rx: mpsc::Receiver<FeedEvent>) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (event_tx, _) = broadcast::channel(1024);
        let state = Arc::new(RwLock::new(EngineState::Stopped));
        let session = Session::new(config);
        let (snapshot_tx, snapshot_rx) =
            watch::channel(Arc::new(session.snapshot(EngineState::Stopped)));

        let handle = EngineHandle {
            command_tx: command_tx.clone(),
            state: state.clone(),
            snapshot_rx,
            event_tx: event_tx.clone(),
        };

        let engine = Engine {
            session,
            state,
            command_rx,
            command_tx,
            feed_rx,
            feed_open: true,
            event_tx,
            snapshot_tx,
            cadence: None,
            poller: None,
        };

        (engine, handle)
    }

    /// Run the engine. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!(
            mode = %self.session.config().mode,
            "Engine initialized in Stopped state. Waiting for Start command."
        );

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            warn!("Engine command channel closed: shutting down");
                            break;
                        }
                    }
                }

                event = self.feed_rx.recv(), if self.feed_open => {
                    match event {
                        Some(event) => self.handle_feed(event).await,
                        None => {
                            warn!("Price feed channel closed");
                            self.feed_open = false;
                            self.handle_feed(FeedEvent::Disconnected).await;
                        }
                    }
                }

                _ = next_tick(&mut self.cadence) => self.on_cadence_tick().await,

                _ = next_tick(&mut self.poller) => self.on_settle_poll(),
            }
        }

        self.cadence = None;
        self.poller = None;
    }

    async fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Start => {
                if self.current_state().await == EngineState::Running {
                    info!("Engine already running");
                    return;
                }
                info!(
                    period = ?self.session.cadence_period(),
                    connected = self.session.connected(),
                    "Starting decision generation"
                );
                self.set_state(EngineState::Running).await;
            }

            EngineCommand::Stop => {
                if self.current_state().await == EngineState::Stopped {
                    // Idempotent; still make sure nothing is scheduled.
                    self.refresh_timers(EngineState::Stopped);
                    return;
                }
                info!("Engine stopping: cancelling scheduler and poller");
                self.set_state(EngineState::Stopped).await;
            }

            EngineCommand::Reset => {
                info!("Session reset");
                if self.current_state().await != EngineState::Stopped {
                    self.set_state(EngineState::Stopped).await;
                }
                self.session.reset();
                self.emit(EngineEvent::SessionReset);
                self.publish(EngineState::Stopped);
            }

            EngineCommand::SetCadence(value) => {
                let state = self.current_state().await;
                if state == EngineState::Running {
                    warn!(value, "Cadence change ignored while running; stop first");
                    return;
                }
                if let Err(e) = SessionConfig::check_cadence(value) {
                    warn!(error = %e, "Cadence change rejected");
                    return;
                }
                self.session.set_cadence(value);
                info!(
                    value,
                    period = ?self.session.cadence_period(),
                    "Cadence updated"
                );
                self.publish(state);
            }
        }
    }

    async fn handle_feed(&mut self, event: FeedEvent) {
        let state = self.current_state().await;
        match event {
            FeedEvent::Tick(point) => {
                if !self.session.record_price(point) {
                    debug!(value = point.value, "Ignoring invalid price");
                    return;
                }
            }
            FeedEvent::Connected | FeedEvent::Disconnected => {
                let connected = event == FeedEvent::Connected;
                if connected == self.session.connected() {
                    return;
                }
                info!(connected, "Feed status changed");
                self.session.set_connected(connected);
                self.refresh_timers(state);
                self.emit(EngineEvent::FeedStatus { connected });
            }
        }
        self.publish(state);
    }

    async fn on_cadence_tick(&mut self) {
        let state = self.current_state().await;
        if state != EngineState::Running || !self.session.connected() {
            return;
        }
        let changes = self.session.generate(Utc::now());
        if changes.is_empty() {
            debug!("Cadence tick produced no decision");
            return;
        }
        self.emit_changes(changes);
        self.publish(state);
    }

    fn on_settle_poll(&mut self) {
        let resolved = self.session.settle(Utc::now());
        if resolved.is_empty() {
            return;
        }
        self.emit_changes(Changes {
            opened: Vec::new(),
            resolved,
        });
        self.publish(EngineState::Running);
    }

    async fn current_state(&self) -> EngineState {
        *self.state.read().await
    }

    async fn set_state(&mut self, state: EngineState) {
        *self.state.write().await = state;
        self.refresh_timers(state);
        self.emit(EngineEvent::StateChanged { state });
        self.publish(state);
    }

    /// Acquire or release timer handles for the current lifecycle state.
    /// An already-scheduled cadence keeps its period.
    fn refresh_timers(&mut self, state: EngineState) {
        let running = state == EngineState::Running;

        if running && self.session.connected() {
            if self.cadence.is_none() {
                self.cadence = Some(periodic(self.session.cadence_period(), MissedTickBehavior::Delay));
            }
        } else {
            self.cadence = None;
        }

        if running {
            if self.poller.is_none() {
                let poll = Duration::from_millis(self.session.config().settle_poll_ms);
                self.poller = Some(periodic(poll, MissedTickBehavior::Skip));
            }
        } else {
            self.poller = None;
        }
    }

    fn emit_changes(&self, changes: Changes) {
        for decision in changes.opened {
            self.emit(EngineEvent::DecisionOpened { decision });
        }
        for decision in changes.resolved {
            self.emit(EngineEvent::DecisionResolved { decision });
        }
    }

    fn emit(&self, event: EngineEvent) {
        // Ignore send errors (no active receivers)
        let _ = self.event_tx.send(event);
    }

    fn publish(&self, state: EngineState) {
        self.snapshot_tx
            .send_replace(Arc::new(self.session.snapshot(state)));
    }
}

/// Longest timer period the engine will schedule.
const MAX_TIMER_PERIOD: Duration = Duration::from_secs(MAX_CADENCE_SECS);

/// Interval whose first tick is one full period from now.
fn periodic(period: Duration, behavior: MissedTickBehavior) -> Interval {
    let period = period.clamp(Duration::from_millis(1), MAX_TIMER_PERIOD);
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(behavior);
    interval
}

/// Resolves on the next tick, or never when no timer is held.
async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
