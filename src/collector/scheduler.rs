//! Collection unit scheduler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use strum_macros::Display;
use tokio::sync::{Mutex, RwLock};
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::collector::{Collector, CollectorError, clamp_interval};
use crate::exposition::{MergedFragment, RegistryFragment, SharedRegistry};

/// Default timeout for graceful shutdown (5 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle state of a collection unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum UnitState {
    /// Accepted, instruments not yet created.
    Created,
    /// Instruments created and merged into the shared registry.
    Registered,
    /// Polling.
    Running,
    /// Cancellation observed, fragment being removed.
    Cancelled,
    /// Fragment removed from the shared registry; task finished or panicked.
    Stopped,
}

/// Metadata about a collection unit.
#[derive(Debug, Clone)]
pub struct UnitInfo {
    /// Unit UUID.
    pub id: uuid::Uuid,
    /// Collector name.
    pub name: String,
    /// Polling interval.
    pub interval: Duration,
    pub state: UnitState,
}

type Units = Arc<RwLock<HashMap<uuid::Uuid, UnitInfo>>>;

/// Unit tasks and the unit each task runs.
#[derive(Default)]
struct UnitTasks {
    set: JoinSet<()>,
    owners: HashMap<tokio::task::Id, uuid::Uuid>,
}

/// Runs one task per collector, each on its own interval.
///
/// Every unit polls once immediately, then once per tick. Polls of one unit
/// never overlap: a slow device delays the next tick. Cancellation is
/// observed between polls; an in-flight poll completes first.
pub struct Scheduler {
    registry: SharedRegistry,
    cancel: CancellationToken,
    tasks: Mutex<UnitTasks>,
    units: Units,
}

impl Scheduler {
    /// Create a scheduler that merges unit fragments into `registry`.
    pub fn new(registry: SharedRegistry) -> Self {
        Self {
            registry,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(UnitTasks::default()),
            units: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field(
                "unit_count",
                &self.units.try_read().map(|u| u.len()).unwrap_or(0),
            )
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Register a collector's instruments and start polling.
    ///
    /// # Errors
    /// Returns `CollectorError` if the collector cannot create its
    /// instruments or they clash with already merged metrics. Nothing is
    /// merged in that case.
    pub async fn spawn(
        &self,
        mut collector: Box<dyn Collector>,
        interval: Duration,
    ) -> Result<uuid::Uuid, CollectorError> {
        if self.cancel.is_cancelled() {
            return Err(CollectorError::Scheduler(
                "scheduler is shutting down".to_string(),
            ));
        }

        let interval = clamp_interval(interval);
        let name = collector.name().to_string();
        let id = uuid::Uuid::new_v4();
        self.units.write().await.insert(
            id,
            UnitInfo {
                id,
                name: name.clone(),
                interval,
                state: UnitState::Created,
            },
        );

        let mut fragment = RegistryFragment::new(name.clone());
        let merged = collector
            .register(&mut fragment)
            .and_then(|()| {
                self.registry.merge(fragment).map_err(|e| {
                    CollectorError::Registration(format!("unit '{name}': {e}"))
                })
            });
        let merged = match merged {
            Ok(merged) => merged,
            Err(e) => {
                tracing::error!(unit = %name, error = %e, "Registration failed");
                self.units.write().await.remove(&id);
                return Err(e);
            }
        };
        set_state(&self.units, id, UnitState::Registered).await;

        let mut tasks = self.tasks.lock().await;
        let handle = tasks.set.spawn(run_unit(
            id,
            collector,
            interval,
            merged,
            self.cancel.child_token(),
            Arc::clone(&self.units),
        ));
        tasks.owners.insert(handle.id(), id);
        drop(tasks);

        tracing::info!(unit = %name, unit_id = %id, interval = ?interval, "Collection unit registered");
        Ok(id)
    }

    /// List all units.
    pub async fn list_units(&self) -> Vec<UnitInfo> {
        self.reap().await;
        self.units.read().await.values().cloned().collect()
    }

    /// Get the number of units.
    pub async fn unit_count(&self) -> usize {
        self.reap().await;
        self.units.read().await.len()
    }

    /// Collect unit tasks that already ended so a panicked unit shows as
    /// stopped.
    async fn reap(&self) {
        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.set.try_join_next() {
            if let Err(e) = result {
                let owner = tasks.owners.remove(&e.id());
                unit_task_failed(&self.units, owner, &e).await;
            }
        }
    }

    /// Token cancelled when shutdown begins.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Gracefully shutdown with the default timeout.
    pub async fn shutdown(self) -> Result<(), CollectorError> {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Cancel every unit and wait for all of them to stop.
    ///
    /// Units still running after `timeout` are aborted; their registry
    /// fragments are removed either way.
    pub async fn shutdown_with_timeout(self, timeout: Duration) -> Result<(), CollectorError> {
        let unit_count = self.units.read().await.len();
        self.cancel.cancel();

        let UnitTasks {
            set: mut tasks,
            mut owners,
        } = self.tasks.into_inner();
        let units = &self.units;
        let drained = tokio::time::timeout(timeout, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    unit_task_failed(units, owners.remove(&e.id()), &e).await;
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                unit_count,
                remaining = tasks.len(),
                "Scheduler shutdown timed out, aborting remaining units"
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
            for unit in self.units.write().await.values_mut() {
                unit.state = UnitState::Stopped;
            }
        } else {
            tracing::info!(unit_count, "Scheduler shutdown complete");
        }
        Ok(())
    }
}

async fn set_state(units: &Units, id: uuid::Uuid, state: UnitState) {
    if let Some(unit) = units.write().await.get_mut(&id) {
        unit.state = state;
    }
}

/// A unit task ended without returning. Its fragment was unmerged when the
/// task's future was dropped.
async fn unit_task_failed(units: &Units, owner: Option<uuid::Uuid>, err: &JoinError) {
    let Some(id) = owner else {
        tracing::warn!(error = %err, "Collection unit task failed");
        return;
    };
    let mut units = units.write().await;
    let Some(unit) = units.get_mut(&id) else {
        return;
    };
    unit.state = UnitState::Stopped;
    if err.is_panic() {
        tracing::error!(unit = %unit.name, unit_id = %id, "Collection unit panicked");
    } else {
        tracing::warn!(unit = %unit.name, unit_id = %id, error = %err, "Collection unit task failed");
    }
}

/// Poll loop of one unit.
///
/// `merged` is owned by the task so an aborted task still unmerges on drop.
async fn run_unit(
    id: uuid::Uuid,
    collector: Box<dyn Collector>,
    interval: Duration,
    merged: MergedFragment,
    cancel: CancellationToken,
    units: Units,
) {
    let name = collector.name().to_string();
    set_state(&units, id, UnitState::Running).await;
    tracing::debug!(unit = %name, "Collection unit running");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => run_collection(collector.as_ref(), &name).await,
        }
    }

    set_state(&units, id, UnitState::Cancelled).await;
    if let Err(e) = merged.unmerge() {
        tracing::warn!(unit = %name, error = %e, "Failed to unregister metrics");
    }
    set_state(&units, id, UnitState::Stopped).await;
    tracing::info!(unit = %name, "Collection unit stopped");
}

/// Execute a single poll and log the result.
async fn run_collection(collector: &dyn Collector, name: &str) {
    let start = Instant::now();
    tracing::debug!(unit = %name, "Running collection");

    let result = collector.collect().await;
    let duration_ms = start.elapsed().as_millis();

    match result {
        Ok(()) => tracing::debug!(unit = %name, duration_ms, "Collection succeeded"),
        Err(e) => tracing::error!(unit = %name, duration_ms, error = %e, "Collection failed"),
    }
}
