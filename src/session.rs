//! Session supervisor
//!
//! Runs one grid controller per `(user, symbol)` on its own tokio task. Each
//! session gets an exchange client built from its own credentials and shares
//! nothing mutable with other sessions.
//!
//! Stopping a session flips its shutdown signal and waits for the task. The
//! signal is only observed between ticks, so a tick already in flight runs to
//! completion. Orders already on the exchange are left alone.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::exchange::{ClientFactory, Credentials, ExchangeError};
use crate::grid::{EventSink, GridConfig, GridController, GridError, GridState};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub user: String,
    pub symbol: String,
}

impl SessionKey {
    pub fn new(user: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            symbol: symbol.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user, self.symbol)
    }
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("a session for {0} is already active")]
    AlreadyRunning(SessionKey),

    #[error("no active session for {0}")]
    NotFound(SessionKey),

    #[error("could not connect session to exchange: {0}")]
    Connect(#[from] ExchangeError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("session task for {0} terminated abnormally")]
    TaskFailed(SessionKey),
}

/// Token identifying a started session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    key: SessionKey,
}

impl SessionHandle {
    pub fn key(&self) -> &SessionKey {
        &self.key
    }
}

struct RunningSession {
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<GridState>,
    task: JoinHandle<()>,
}

enum Slot {
    Starting,
    Running(RunningSession),
}

type SessionMap = Arc<Mutex<HashMap<SessionKey, Slot>>>;

fn lock(sessions: &SessionMap) -> MutexGuard<'_, HashMap<SessionKey, Slot>> {
    sessions.lock().unwrap_or_else(|e| e.into_inner())
}

/// Frees a reserved key if startup fails or the start future is dropped
struct Reservation {
    sessions: SessionMap,
    key: SessionKey,
    armed: bool,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed {
            lock(&self.sessions).remove(&self.key);
        }
    }
}

pub struct SessionSupervisor {
    factory: Arc<dyn ClientFactory>,
    sessions: SessionMap,
}

impl SessionSupervisor {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a grid session.
    ///
    /// Returns once the controller is running. Startup failures (filters,
    /// open orders, price) are returned here and nothing keeps running.
    pub async fn start(
        &self,
        user: impl Into<String>,
        credentials: Credentials,
        symbol: impl Into<String>,
        config: GridConfig,
        sink: Arc<dyn EventSink>,
    ) -> Result<SessionHandle, SupervisorError> {
        let key = SessionKey::new(user, symbol);

        let mut reservation = {
            let mut sessions = lock(&self.sessions);
            if sessions.contains_key(&key) {
                return Err(SupervisorError::AlreadyRunning(key));
            }
            sessions.insert(key.clone(), Slot::Starting);
            Reservation {
                sessions: self.sessions.clone(),
                key: key.clone(),
                armed: true,
            }
        };

        info!(session = %key, "Starting grid session");
        let client = self.factory.connect(&credentials)?;
        let controller = GridController::start(key.symbol.clone(), config, client, sink).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(GridState::Running);
        let task = tokio::spawn(run_session(key.clone(), controller, shutdown_rx, state_tx));

        lock(&self.sessions).insert(
            key.clone(),
            Slot::Running(RunningSession {
                shutdown: shutdown_tx,
                state: state_rx,
                task,
            }),
        );
        reservation.armed = false;

        Ok(SessionHandle { key })
    }

    /// Stop a session and wait for its task to finish
    pub async fn stop(&self, handle: &SessionHandle) -> Result<(), SupervisorError> {
        let running = {
            let mut sessions = lock(&self.sessions);
            match sessions.remove(&handle.key) {
                Some(Slot::Running(running)) => running,
                Some(Slot::Starting) => {
                    sessions.insert(handle.key.clone(), Slot::Starting);
                    return Err(SupervisorError::NotFound(handle.key.clone()));
                }
                None => return Err(SupervisorError::NotFound(handle.key.clone())),
            }
        };

        info!(session = %handle.key, "Stopping grid session");
        // The task may already be gone; joining below reports that.
        let _ = running.shutdown.send(true);
        running.task.await.map_err(|e| {
            error!(session = %handle.key, "Session task failed: {}", e);
            SupervisorError::TaskFailed(handle.key.clone())
        })
    }

    /// Stop every running session
    pub async fn stop_all(&self) -> Vec<(SessionKey, Result<(), SupervisorError>)> {
        let mut results = Vec::new();
        for key in self.sessions() {
            let handle = SessionHandle { key: key.clone() };
            results.push((key, self.stop(&handle).await));
        }
        results
    }

    /// Keys of all sessions that are starting or running
    pub fn sessions(&self) -> Vec<SessionKey> {
        let mut keys: Vec<_> = lock(&self.sessions).keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn state(&self, key: &SessionKey) -> Option<GridState> {
        match lock(&self.sessions).get(key)? {
            Slot::Starting => Some(GridState::Initializing),
            Slot::Running(running) => Some(*running.state.borrow()),
        }
    }

    pub fn is_running(&self, key: &SessionKey) -> bool {
        self.state(key) == Some(GridState::Running)
    }
}

async fn run_session(
    key: SessionKey,
    mut controller: GridController,
    mut shutdown: watch::Receiver<bool>,
    state: watch::Sender<GridState>,
) {
    let period = controller.config().poll_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(session = %key, period_ms = period.as_millis() as u64, "Polling loop started");

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                match controller.tick().await {
                    Ok(report) => {
                        if !report.errors.is_empty() {
                            warn!(
                                session = %key,
                                errors = report.errors.len(),
                                "Tick completed with recovered errors"
                            );
                        }
                    }
                    Err(e) => warn!(session = %key, "Tick aborted: {}", e),
                }
            }
        }
    }

    controller.stop();
    let _ = state.send(GridState::Stopped);
    info!(session = %key, ticks = controller.ticks(), "Polling loop ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{PaperExchange, PaperFactory};
    use crate::grid::{CollectSink, SymbolFilters};
    use rust_decimal_macros::dec;

    fn supervisor() -> (SessionSupervisor, Arc<PaperExchange>) {
        let ex = Arc::new(PaperExchange::new());
        for sym in ["BTCUSDT", "ETHUSDT"] {
            ex.set_price(sym, dec!(100));
            ex.set_filters(
                sym,
                SymbolFilters::new(dec!(0.001), dec!(0.001), dec!(0.01), dec!(0.01), dec!(5))
                    .unwrap(),
            );
        }
        let factory = Arc::new(PaperFactory::new(ex.clone()));
        (SessionSupervisor::new(factory), ex)
    }

    fn creds() -> Credentials {
        Credentials::new("key", "secret")
    }

    #[tokio::test]
    async fn test_duplicate_session_rejected() {
        let (sup, _ex) = supervisor();
        let sink = Arc::new(CollectSink::new());

        let handle = sup
            .start("alice", creds(), "BTCUSDT", GridConfig::default(), sink.clone())
            .await
            .unwrap();
        let dup = sup
            .start("alice", creds(), "BTCUSDT", GridConfig::default(), sink.clone())
            .await;
        assert!(matches!(dup, Err(SupervisorError::AlreadyRunning(_))));

        // Same symbol, different user is fine
        sup.start("bob", creds(), "BTCUSDT", GridConfig::default(), sink)
            .await
            .unwrap();
        assert_eq!(sup.sessions().len(), 2);

        sup.stop(&handle).await.unwrap();
        assert!(!sup.is_running(handle.key()));
    }

    #[tokio::test]
    async fn test_failed_start_releases_key() {
        let (sup, _ex) = supervisor();
        let sink = Arc::new(CollectSink::new());

        let err = sup
            .start("alice", creds(), "DOGEUSDT", GridConfig::default(), sink.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Grid(GridError::Startup { .. })));
        assert!(sup.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_stop_unknown_session() {
        let (sup, _ex) = supervisor();
        let handle = SessionHandle {
            key: SessionKey::new("nobody", "BTCUSDT"),
        };
        assert!(matches!(
            sup.stop(&handle).await,
            Err(SupervisorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_all() {
        let (sup, _ex) = supervisor();
        let sink = Arc::new(CollectSink::new());
        for sym in ["BTCUSDT", "ETHUSDT"] {
            sup.start("alice", creds(), sym, GridConfig::default(), sink.clone())
                .await
                .unwrap();
        }

        let results = sup.stop_all().await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert!(sup.sessions().is_empty());
    }
}
