/// Orchestrator module - coordinates all components
///
/// The orchestrator is the core coordinator that:
/// - Wires the executor, scheduler, dispatcher and stores together
/// - Keeps scheduled monitors in line with the monitor source
/// - Applies monitor lifecycle events as they arrive
/// - Runs retention cleanup in the background
pub mod retention;


pub use retention::{RetentionCleanup, RetentionPolicy};

use anyhow::Result;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::database::{HeartbeatStore, LibsqlRepository, MonitorSource, initialize_database};
use crate::events::{BroadcastPublisher, EventPublisher};
use crate::models::{Monitor, MonitorId};
use crate::monitoring::{
    MaintenanceWindows, MonitoringExecutor, MonitoringScheduler, PushIngress, SchedulerDeps, SchedulerSettings,
    StatusBoard,
};
use crate::notifications::{NotificationDispatcher, SenderRegistry};
use crate::pool::open_pool;
use crate::uptime::{SteppedBuckets, UptimeAggregator};

/// Change to a monitor made by whoever owns monitor definitions
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Upserted(Monitor),
    Paused(MonitorId),
    Resumed(MonitorId),
    Deleted(MonitorId),
}

/// Pluggable parts of the engine
pub struct Components {
    pub source: Arc<dyn MonitorSource>,
    pub store: Arc<dyn HeartbeatStore>,
    pub executor: MonitoringExecutor,
    pub senders: SenderRegistry,
    pub publisher: Arc<dyn EventPublisher>,
}

/// Main orchestrator for the Uppe service
pub struct Orchestrator {
    config: Arc<Config>,
    source: Arc<dyn MonitorSource>,
    store: Arc<dyn HeartbeatStore>,
    scheduler: MonitoringScheduler,
    maintenance: Arc<MaintenanceWindows>,
    uptime: Arc<UptimeAggregator>,
}

impl Orchestrator {
    pub fn new(config: Config, components: Components) -> Self {
        let Components { source, store, executor, senders, publisher } = components;
        let config = Arc::new(config);

        let maintenance = Arc::new(MaintenanceWindows::new());
        let dispatcher = NotificationDispatcher::new(
            Arc::clone(&source),
            Arc::clone(&store),
            senders,
            config.notifications.send_timeout(),
        );

        let deps = SchedulerDeps {
            executor: Arc::new(executor),
            store: Arc::clone(&store),
            dispatcher: Arc::new(dispatcher),
            events: publisher,
            maintenance: maintenance.clone(),
            statuses: Arc::new(StatusBoard::new()),
        };
        let settings = SchedulerSettings {
            max_concurrent_probes: config.scheduler.max_concurrent_probes,
            push_grace: config.scheduler.push_grace(),
            ..Default::default()
        };

        let uptime = UptimeAggregator::new(Arc::clone(&store))
            .with_policy(Arc::new(SteppedBuckets::new(config.uptime.max_chart_points)));

        Self {
            config,
            source,
            store,
            scheduler: MonitoringScheduler::new(deps, settings),
            maintenance,
            uptime: Arc::new(uptime),
        }
    }

    /// Build an engine on the configured libsql database
    pub async fn from_config(config: Config) -> Result<Self> {
        info!(path = %config.database.path.display(), "Opening database");
        let pool = open_pool(&config.database.path, config.database.pool_size).await?;

        let conn = pool.get().await?;
        info!("Initializing database schema...");
        initialize_database(&conn).await?;
        drop(conn);

        let repository = Arc::new(LibsqlRepository::new(pool));
        let components = Components {
            source: repository.clone(),
            store: repository,
            executor: MonitoringExecutor::new()?,
            senders: SenderRegistry::with_defaults(),
            publisher: Arc::new(BroadcastPublisher::default()),
        };
        Ok(Self::new(config, components))
    }

    pub fn scheduler(&self) -> &MonitoringScheduler {
        &self.scheduler
    }

    pub fn push_ingress(&self) -> PushIngress {
        PushIngress::new(self.scheduler.clone())
    }

    pub fn uptime(&self) -> Arc<UptimeAggregator> {
        Arc::clone(&self.uptime)
    }

    /// Bring scheduled monitors in line with the monitor source and refresh
    /// maintenance windows. Returns how many monitors are scheduled.
    pub async fn reconcile(&self) -> Result<usize> {
        match self.source.maintenance_windows().await {
            Ok(windows) => self.maintenance.replace(windows),
            Err(e) => warn!(error = %e, "Failed to refresh maintenance windows, keeping previous set"),
        }

        let monitors = self.source.active_monitors().await?;
        let active: HashSet<MonitorId> = monitors.iter().map(|m| m.id).collect();

        for stale in self.scheduler.scheduled_ids().into_iter().filter(|id| !active.contains(id)) {
            debug!(monitor_id = stale, "Monitor no longer active");
            self.scheduler.remove(stale);
        }

        for monitor in monitors {
            if self.scheduler.monitor(monitor.id).as_ref() == Some(&monitor) {
                continue;
            }
            self.schedule(monitor);
        }

        Ok(self.scheduler.scheduled_ids().len())
    }

    fn schedule(&self, monitor: Monitor) {
        let monitor_id = monitor.id;
        if let Err(e) = self.scheduler.schedule(monitor) {
            warn!(monitor_id, error = %e, "Rejected monitor configuration");
            self.scheduler.remove(monitor_id);
        }
    }

    pub async fn handle_event(&self, event: MonitorEvent) {
        match event {
            MonitorEvent::Upserted(monitor) => self.schedule(monitor),
            MonitorEvent::Paused(monitor_id) => {
                if !self.scheduler.pause(monitor_id) {
                    debug!(monitor_id, "Pause for a monitor that is not scheduled");
                }
            }
            MonitorEvent::Resumed(monitor_id) => {
                if self.scheduler.resume(monitor_id) {
                    return;
                }
                match self.source.monitor(monitor_id).await {
                    Ok(Some(mut monitor)) => {
                        monitor.active = true;
                        self.schedule(monitor);
                    }
                    Ok(None) => warn!(monitor_id, "Resume for an unknown monitor"),
                    Err(e) => error!(monitor_id, error = %e, "Failed to load resumed monitor"),
                }
            }
            MonitorEvent::Deleted(monitor_id) => {
                self.scheduler.remove(monitor_id);
            }
        }
    }

    /// Run until `shutdown` resolves: load monitors, apply events, reconcile
    /// periodically and prune old heartbeats.
    pub async fn run(&self, mut events: mpsc::Receiver<MonitorEvent>, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!("Starting Uppe orchestrator...");

        let scheduled = self.reconcile().await?;
        info!(scheduled, "Monitors loaded");

        let retention = RetentionCleanup::new(Arc::clone(&self.store), (&self.config.retention).into());
        let retention_handle = retention.start_periodic_cleanup();

        let mut reload = tokio::time::interval(self.config.scheduler.reload_interval());
        reload.set_missed_tick_behavior(MissedTickBehavior::Delay);
        reload.tick().await;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(event) = events.recv() => self.handle_event(event).await,
                _ = reload.tick() => {
                    if let Err(e) = self.reconcile().await {
                        warn!(error = %e, "Monitor reload failed");
                    }
                }
            }
        }

        info!("Shutting down orchestrator");
        retention_handle.abort();
        self.scheduler.shutdown();
        Ok(())
    }
}
