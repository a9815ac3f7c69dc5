use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::clock::HeartbeatClock;
use super::executor::MonitoringExecutor;
use super::maintenance::MaintenanceSchedule;
use super::push::PushError;
use super::state::{Cadence, MonitorState, Observation, RetryPolicy, transition};
use super::status::StatusBoard;
use super::types::{ConfigError, ProbeContext, ProbeResult, StatusLookup};
use crate::database::HeartbeatStore;
use crate::events::{EventPublisher, publish_heartbeat};
use crate::models::{Heartbeat, HeartbeatStatus, Monitor, MonitorId};
use crate::notifications::NotificationDispatcher;

pub const MAINTENANCE_MESSAGE: &str = "Under maintenance";

/// Lifecycle of a monitor task, observable through [`MonitoringScheduler::watch_state`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Running,
    Paused,
    Stopped,
}

#[derive(Debug)]
enum TaskCommand {
    Pause,
    Resume,
    Push(ProbeResult),
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Probes allowed in flight at once across all monitors
    pub max_concurrent_probes: usize,
    /// Slack added to a push monitor's interval before it is declared Down
    pub push_grace: Duration,
    pub clock: HeartbeatClock,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self { max_concurrent_probes: 256, push_grace: Duration::from_secs(5), clock: HeartbeatClock::Wall }
    }
}

/// Collaborators every monitor task uses
pub struct SchedulerDeps {
    pub executor: Arc<MonitoringExecutor>,
    pub store: Arc<dyn HeartbeatStore>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub events: Arc<dyn EventPublisher>,
    pub maintenance: Arc<dyn MaintenanceSchedule>,
    pub statuses: Arc<StatusBoard>,
}

struct Shared {
    deps: SchedulerDeps,
    permits: Semaphore,
    push_grace: Duration,
    clock: HeartbeatClock,
}

impl Shared {
    /// How long to wait after a cycle start before the next one
    fn wait_for(&self, monitor: &Monitor, cadence: Cadence) -> Duration {
        let base = match cadence {
            Cadence::Normal => monitor.interval(),
            Cadence::Retry => monitor.retry_interval(),
        };
        if monitor.is_push() { base + self.push_grace } else { base }
    }
}

struct TaskHandle {
    config: watch::Sender<Monitor>,
    commands: mpsc::UnboundedSender<TaskCommand>,
    state: Arc<watch::Sender<TaskState>>,
    join: JoinHandle<()>,
}

#[derive(Default)]
struct Registry {
    tasks: HashMap<MonitorId, TaskHandle>,
    push_tokens: HashMap<String, MonitorId>,
}

impl Registry {
    fn index_token(&mut self, monitor: &Monitor) {
        self.push_tokens.retain(|_, id| *id != monitor.id);
        if let Some(token) = monitor.push_token.as_ref().filter(|_| monitor.is_push()) {
            self.push_tokens.insert(token.clone(), monitor.id);
        }
    }
}

/// Monitoring scheduler - one timed task per monitor on the shared runtime
#[derive(Clone)]
pub struct MonitoringScheduler {
    shared: Arc<Shared>,
    registry: Arc<Mutex<Registry>>,
}

impl MonitoringScheduler {
    /// Create a new monitoring scheduler
    pub fn new(deps: SchedulerDeps, settings: SchedulerSettings) -> Self {
        let shared = Shared {
            deps,
            permits: Semaphore::new(settings.max_concurrent_probes.max(1)),
            push_grace: settings.push_grace,
            clock: settings.clock,
        };
        Self { shared: Arc::new(shared), registry: Arc::new(Mutex::new(Registry::default())) }
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn executor(&self) -> &MonitoringExecutor {
        &self.shared.deps.executor
    }

    /// Start a task for the monitor, or hand the new definition to its running task.
    /// Inactive monitors get a paused task.
    pub fn schedule(&self, monitor: Monitor) -> Result<(), ConfigError> {
        self.shared.deps.executor.validate(&monitor)?;

        let mut registry = self.registry();
        registry.index_token(&monitor);

        if let Some(handle) = registry.tasks.get(&monitor.id) {
            debug!(monitor_id = monitor.id, "Updating scheduled monitor");
            handle.config.send_replace(monitor);
            return Ok(());
        }

        let monitor_id = monitor.id;
        let (config_tx, config_rx) = watch::channel(monitor);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let state = Arc::new(watch::Sender::new(TaskState::Created));

        let task = MonitorTask {
            shared: Arc::clone(&self.shared),
            config: config_rx,
            commands: command_rx,
            state: Arc::clone(&state),
            machine: MonitorState::default(),
            last_beat: None,
        };
        let join = tokio::spawn(task.run());

        info!(monitor_id, "Scheduled monitor");
        registry.tasks.insert(monitor_id, TaskHandle { config: config_tx, commands: command_tx, state, join });
        Ok(())
    }

    /// Replace the definition of a scheduled monitor; `Ok(false)` if it is not scheduled
    pub fn update(&self, monitor: Monitor) -> Result<bool, ConfigError> {
        self.shared.deps.executor.validate(&monitor)?;

        let mut registry = self.registry();
        if !registry.tasks.contains_key(&monitor.id) {
            return Ok(false);
        }
        registry.index_token(&monitor);
        if let Some(handle) = registry.tasks.get(&monitor.id) {
            handle.config.send_replace(monitor);
        }
        Ok(true)
    }

    /// Cooperative pause: the in-flight probe completes, then no new cycles start
    pub fn pause(&self, monitor_id: MonitorId) -> bool {
        self.send(monitor_id, TaskCommand::Pause)
    }

    /// Resume a paused monitor, starting a cycle immediately
    pub fn resume(&self, monitor_id: MonitorId) -> bool {
        self.send(monitor_id, TaskCommand::Resume)
    }

    fn send(&self, monitor_id: MonitorId, command: TaskCommand) -> bool {
        self.registry()
            .tasks
            .get(&monitor_id)
            .is_some_and(|handle| handle.commands.send(command).is_ok())
    }

    /// Abort the task immediately, dropping any in-flight probe
    pub fn remove(&self, monitor_id: MonitorId) -> bool {
        let handle = {
            let mut registry = self.registry();
            registry.push_tokens.retain(|_, id| *id != monitor_id);
            registry.tasks.remove(&monitor_id)
        };

        let Some(handle) = handle else {
            return false;
        };
        handle.join.abort();
        handle.state.send_replace(TaskState::Stopped);
        self.shared.deps.statuses.remove(monitor_id);
        info!(monitor_id, "Removed monitor");
        true
    }

    /// Deliver a push outcome to the monitor owning `token`
    pub fn push(&self, token: &str, result: ProbeResult) -> Result<MonitorId, PushError> {
        let registry = self.registry();
        let monitor_id = *registry.push_tokens.get(token).ok_or(PushError::UnknownToken)?;
        let handle = registry.tasks.get(&monitor_id).ok_or(PushError::UnknownToken)?;

        if !handle.config.borrow().active || *handle.state.borrow() == TaskState::Paused {
            return Err(PushError::Inactive);
        }
        handle.commands.send(TaskCommand::Push(result)).map_err(|_| PushError::Inactive)?;
        Ok(monitor_id)
    }

    pub fn task_state(&self, monitor_id: MonitorId) -> Option<TaskState> {
        self.registry().tasks.get(&monitor_id).map(|handle| *handle.state.borrow())
    }

    pub fn watch_state(&self, monitor_id: MonitorId) -> Option<watch::Receiver<TaskState>> {
        self.registry().tasks.get(&monitor_id).map(|handle| handle.state.subscribe())
    }

    /// Current definition of a scheduled monitor
    pub fn monitor(&self, monitor_id: MonitorId) -> Option<Monitor> {
        self.registry().tasks.get(&monitor_id).map(|handle| handle.config.borrow().clone())
    }

    pub fn scheduled_ids(&self) -> Vec<MonitorId> {
        let mut ids: Vec<MonitorId> = self.registry().tasks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Abort every task
    pub fn shutdown(&self) {
        let ids = self.scheduled_ids();
        info!(count = ids.len(), "Stopping all monitor tasks");
        for id in ids {
            self.remove(id);
        }
    }
}

struct MonitorTask {
    shared: Arc<Shared>,
    config: watch::Receiver<Monitor>,
    commands: mpsc::UnboundedReceiver<TaskCommand>,
    state: Arc<watch::Sender<TaskState>>,
    machine: MonitorState,
    last_beat: Option<DateTime<Utc>>,
}

impl MonitorTask {
    async fn run(mut self) {
        let mut monitor = self.config.borrow_and_update().clone();
        self.restore(&monitor).await;

        let mut paused = !monitor.active;
        let mut cadence = Cadence::Normal;
        let mut last_start = Instant::now();
        let mut next_fire = if monitor.is_push() { last_start + self.shared.wait_for(&monitor, cadence) } else { last_start };

        loop {
            if paused {
                self.set_state(TaskState::Paused);
                tokio::select! {
                    command = self.commands.recv() => match command {
                        None => break,
                        Some(TaskCommand::Resume) => {
                            paused = false;
                            last_start = Instant::now();
                            next_fire = if monitor.is_push() {
                                last_start + self.shared.wait_for(&monitor, cadence)
                            } else {
                                last_start
                            };
                            info!(monitor_id = monitor.id, "Monitor resumed");
                        }
                        Some(_) => {}
                    },
                    changed = self.config.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let was_active = monitor.active;
                        monitor = self.config.borrow_and_update().clone();
                        if !was_active && monitor.active {
                            paused = false;
                            last_start = Instant::now();
                            next_fire = if monitor.is_push() {
                                last_start + self.shared.wait_for(&monitor, cadence)
                            } else {
                                last_start
                            };
                            info!(monitor_id = monitor.id, "Monitor activated");
                        }
                    }
                }
                continue;
            }
            self.set_state(TaskState::Running);

            let pushed = tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    None => break,
                    Some(TaskCommand::Pause) => {
                        info!(monitor_id = monitor.id, "Monitor paused");
                        paused = true;
                        continue;
                    }
                    Some(TaskCommand::Resume) => continue,
                    Some(TaskCommand::Push(result)) if monitor.is_push() => Some(result),
                    Some(TaskCommand::Push(_)) => continue,
                },
                changed = self.config.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    monitor = self.config.borrow_and_update().clone();
                    if !monitor.active {
                        paused = true;
                    }
                    next_fire = last_start + self.shared.wait_for(&monitor, cadence);
                    debug!(monitor_id = monitor.id, "Monitor reconfigured");
                    continue;
                }
                _ = sleep_until(next_fire) => None,
            };

            let started = Instant::now();
            let scheduled = if pushed.is_some() { started } else { next_fire };
            if let Some(next_cadence) = self.cycle(&monitor, pushed, started).await {
                cadence = next_cadence;
            }

            last_start = scheduled;
            next_fire = (scheduled + self.shared.wait_for(&monitor, cadence)).max(Instant::now());
        }

        self.set_state(TaskState::Stopped);
    }

    fn set_state(&self, state: TaskState) {
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    async fn restore(&mut self, monitor: &Monitor) {
        let monitor_id = monitor.id;
        let store = &self.shared.deps.store;
        match (store.latest(monitor_id).await, store.latest_important(monitor_id).await) {
            (Ok(latest), Ok(important)) => {
                self.machine = MonitorState::restore(latest.as_ref(), important.as_ref(), RetryPolicy::from(monitor));
                if let Some(latest) = latest {
                    self.last_beat = Some(latest.time);
                    self.shared.deps.statuses.set(monitor_id, self.board_status(latest.status));
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(monitor_id, error = %e, "Failed to restore monitor state, starting from Pending");
            }
        }
    }

    /// Status other monitors see: the confirmed one, so a monitor that is
    /// only retrying does not take its groups down
    fn board_status(&self, heartbeat_status: HeartbeatStatus) -> HeartbeatStatus {
        match heartbeat_status {
            HeartbeatStatus::Maintenance => HeartbeatStatus::Maintenance,
            _ => self.machine.confirmed,
        }
    }

    async fn probe(&self, monitor: &Monitor) -> Option<ProbeResult> {
        let _permit = self.shared.permits.acquire().await.ok()?;
        let statuses: Arc<dyn StatusLookup> = self.shared.deps.statuses.clone();
        let ctx = ProbeContext::new(monitor.timeout(), statuses);
        Some(self.shared.deps.executor.execute(&ctx, monitor).await)
    }

    /// One heartbeat cycle. Returns the next cadence, or `None` when no
    /// heartbeat was stored and the state stays as it was.
    async fn cycle(&mut self, monitor: &Monitor, pushed: Option<ProbeResult>, started: Instant) -> Option<Cadence> {
        let shared = Arc::clone(&self.shared);
        let deps = &shared.deps;
        // Heartbeat times stay strictly increasing even if the wall clock steps back
        let time = match self.last_beat {
            Some(previous) => shared.clock.at(started).max(previous + TimeDelta::milliseconds(1)),
            None => shared.clock.at(started),
        };

        let outcome = if deps.maintenance.in_maintenance(monitor.id, time) {
            None
        } else {
            match pushed {
                Some(result) => Some(result),
                None => Some(self.probe(monitor).await?),
            }
        };

        let observation = outcome.as_ref().map_or(Observation::Maintenance, |result| Observation::Probe(result.status));
        let decision = transition(&self.machine, observation, RetryPolicy::from(monitor));
        let (msg, ping) = match outcome {
            Some(result) => (result.message, result.ping_ms),
            None => (MAINTENANCE_MESSAGE.to_string(), None),
        };

        let heartbeat = Heartbeat {
            id: Uuid::new_v4(),
            monitor_id: monitor.id,
            status: decision.status,
            msg,
            ping,
            duration: self.last_beat.map_or(0, |previous| (time - previous).num_seconds().max(0) as u64),
            down_count: decision.next.down_count,
            retries: decision.next.retries,
            important: decision.important,
            time,
            end_time: time + TimeDelta::from_std(shared.wait_for(monitor, decision.cadence)).unwrap_or(TimeDelta::zero()),
            notified: false,
        };

        if let Err(e) = deps.store.append(&heartbeat).await {
            error!(monitor_id = monitor.id, error = %e, "Failed to store heartbeat, state left unchanged");
            return None;
        }

        self.machine = decision.next;
        self.last_beat = Some(time);
        deps.statuses.set(monitor.id, self.board_status(heartbeat.status));

        if heartbeat.important {
            info!(monitor_id = monitor.id, status = %heartbeat.status, msg = %heartbeat.msg, "Monitor status changed");
        } else {
            debug!(monitor_id = monitor.id, status = %heartbeat.status, retries = heartbeat.retries, "Heartbeat");
        }

        publish_heartbeat(deps.events.as_ref(), &heartbeat);

        if decision.should_notify() && monitor.active && heartbeat.status != HeartbeatStatus::Maintenance {
            deps.dispatcher.dispatch(monitor, &heartbeat).await;
        }

        Some(decision.cadence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MemoryStore, MonitorSource, Page, StorageError, TimeRange};
    use crate::events::BroadcastPublisher;
    use crate::models::{ChannelId, MaintenanceWindow, NotificationChannel};
    use crate::monitoring::checker::{Checker, PushChecker};
    use crate::monitoring::maintenance::MaintenanceWindows;
    use crate::monitoring::types::ProbeFault;
    use crate::notifications::{NotificationMessage, NotificationProvider, SenderError, SenderRegistry};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Plays back queued outcomes, then reports Up
    #[derive(Default)]
    struct Scripted {
        outcomes: Mutex<VecDeque<ProbeResult>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn with(outcomes: impl IntoIterator<Item = ProbeResult>) -> Arc<Self> {
            Arc::new(Self { outcomes: Mutex::new(outcomes.into_iter().collect()), calls: AtomicUsize::new(0) })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Checker for Arc<Scripted> {
        fn validate(&self, _monitor: &Monitor) -> Result<(), ConfigError> {
            Ok(())
        }

        async fn check(&self, _ctx: &ProbeContext, _monitor: &Monitor) -> Result<ProbeResult, ProbeFault> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.outcomes.lock().unwrap().pop_front();
            Ok(next.unwrap_or_else(|| ProbeResult::up("OK", Some(1))))
        }
    }

    struct Panicking;

    #[async_trait]
    impl Checker for Panicking {
        fn validate(&self, _monitor: &Monitor) -> Result<(), ConfigError> {
            Ok(())
        }

        async fn check(&self, _ctx: &ProbeContext, _monitor: &Monitor) -> Result<ProbeResult, ProbeFault> {
            panic!("checker bug")
        }
    }

    /// Memory store whose first `failures` appends fail
    struct Flaky {
        inner: MemoryStore,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl HeartbeatStore for Flaky {
        async fn append(&self, heartbeat: &Heartbeat) -> Result<(), StorageError> {
            if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
                return Err(StorageError::Unavailable("disk full".into()));
            }
            self.inner.append(heartbeat).await
        }

        async fn query(&self, id: MonitorId, range: TimeRange, page: Page) -> Result<Vec<Heartbeat>, StorageError> {
            self.inner.query(id, range, page).await
        }

        async fn latest_before(&self, id: MonitorId, at: DateTime<Utc>) -> Result<Option<Heartbeat>, StorageError> {
            self.inner.latest_before(id, at).await
        }

        async fn latest(&self, id: MonitorId) -> Result<Option<Heartbeat>, StorageError> {
            self.inner.latest(id).await
        }

        async fn latest_important(&self, id: MonitorId) -> Result<Option<Heartbeat>, StorageError> {
            self.inner.latest_important(id).await
        }

        async fn mark_notified(&self, id: Uuid) -> Result<(), StorageError> {
            self.inner.mark_notified(id).await
        }

        async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
            self.inner.prune_before(cutoff).await
        }
    }

    #[derive(Default)]
    struct Outbox(Mutex<Vec<(ChannelId, String)>>);

    #[async_trait]
    impl NotificationProvider for Arc<Outbox> {
        async fn send(&self, channel: &NotificationChannel, message: &NotificationMessage) -> Result<(), SenderError> {
            self.0.lock().unwrap().push((channel.id, message.summary()));
            Ok(())
        }
    }

    struct Harness {
        scheduler: MonitoringScheduler,
        store: Arc<MemoryStore>,
        maintenance: Arc<MaintenanceWindows>,
        outbox: Arc<Outbox>,
    }

    fn harness_with(executor: MonitoringExecutor, store: Arc<dyn HeartbeatStore>, source: Arc<MemoryStore>) -> Harness {
        let maintenance = Arc::new(MaintenanceWindows::new());
        let outbox = Arc::new(Outbox::default());
        let senders = SenderRegistry::default().with_provider("outbox", outbox.clone());
        let dispatcher = NotificationDispatcher::new(source.clone(), store.clone(), senders, Duration::from_secs(5));

        let deps = SchedulerDeps {
            executor: Arc::new(executor),
            store,
            dispatcher: Arc::new(dispatcher),
            events: Arc::new(BroadcastPublisher::default()),
            maintenance: maintenance.clone(),
            statuses: Arc::new(StatusBoard::new()),
        };
        let settings = SchedulerSettings { clock: HeartbeatClock::anchored(), ..Default::default() };
        let scheduler = MonitoringScheduler::new(deps, settings);
        Harness { scheduler, store: source, maintenance, outbox }
    }

    fn harness(executor: MonitoringExecutor) -> Harness {
        let store = Arc::new(MemoryStore::new());
        harness_with(executor, store.clone(), store)
    }

    fn scripted(checker: &Arc<Scripted>) -> MonitoringExecutor {
        MonitoringExecutor::default().with_checker("scripted", Arc::clone(checker))
    }

    fn monitor(id: MonitorId) -> Monitor {
        Monitor::new(id, format!("monitor-{id}"), "scripted")
    }

    /// Offsets in seconds from the first heartbeat
    fn offsets(beats: &[Heartbeat]) -> Vec<i64> {
        beats.iter().map(|hb| (hb.time - beats[0].time).num_seconds()).collect()
    }

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    fn assert_no_overlap(beats: &[Heartbeat]) {
        for pair in beats.windows(2) {
            assert!(pair[0].end_time <= pair[1].time, "{:?} overlaps {:?}", pair[0].end_time, pair[1].time);
        }
    }

    fn stored(time: DateTime<Utc>, status: HeartbeatStatus, important: bool) -> Heartbeat {
        Heartbeat {
            id: Uuid::new_v4(),
            monitor_id: 1,
            status,
            msg: "OK".into(),
            ping: Some(3),
            duration: 60,
            down_count: 0,
            retries: 0,
            important,
            time,
            end_time: time + TimeDelta::seconds(60),
            notified: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_cadence_and_confirmation() {
        let checker = Scripted::with([
            ProbeResult::up("OK", Some(5)),
            ProbeResult::down("Connection refused"),
            ProbeResult::down("Connection refused"),
            ProbeResult::down("Connection refused"),
            ProbeResult::up("OK", Some(5)),
        ]);
        let h = harness(scripted(&checker));

        let mut m = monitor(1);
        m.max_retries = 2;
        m.retry_interval_seconds = 15;
        h.scheduler.schedule(m).unwrap();

        advance(151).await;
        let beats = h.store.heartbeats(1).await;

        assert_eq!(offsets(&beats), vec![0, 60, 75, 90, 150]);
        let important: Vec<bool> = beats.iter().map(|hb| hb.important).collect();
        assert_eq!(important, vec![true, false, false, true, true]);
        let down_counts: Vec<u32> = beats.iter().map(|hb| hb.down_count).collect();
        assert_eq!(down_counts, vec![0, 0, 0, 1, 0]);
        let retries: Vec<u32> = beats.iter().map(|hb| hb.retries).collect();
        assert_eq!(retries, vec![0, 1, 2, 3, 0]);

        assert_eq!(beats[1].end_time - beats[1].time, TimeDelta::seconds(15));
        assert_eq!(beats[3].end_time - beats[3].time, TimeDelta::seconds(60));
        assert_eq!(beats[2].duration, 15);
        assert_eq!(beats[0].duration, 0);
        assert_eq!(h.scheduler.shared.deps.statuses.status_of(1), Some(HeartbeatStatus::Up));
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_resets_dead_man_window() {
        let h = harness(MonitoringExecutor::default().with_checker("push", PushChecker::new()));

        let mut m = Monitor::new(7, "nightly backup", "push");
        m.push_token = Some("backup-token-123".into());
        h.scheduler.schedule(m).unwrap();

        advance(45).await;
        assert_eq!(h.scheduler.push("backup-token-123", ProbeResult::up("OK", Some(30))), Ok(7));
        assert_eq!(h.scheduler.push("nope", ProbeResult::up("OK", None)), Err(PushError::UnknownToken));

        advance(66).await;
        let beats = h.store.heartbeats(7).await;

        assert_eq!(beats.len(), 2);
        assert_eq!(beats[0].status, HeartbeatStatus::Up);
        assert_eq!(beats[0].ping, Some(30));
        assert_eq!(beats[1].status, HeartbeatStatus::Down);
        assert_eq!(beats[1].msg, "No heartbeat in the time window");
        assert!(beats[1].important);
        assert_eq!(offsets(&beats), vec![0, 65]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_first_window_starts_with_task() {
        let h = harness(MonitoringExecutor::default().with_checker("push", PushChecker::new()));
        let mut m = Monitor::new(8, "cron", "push");
        m.push_token = Some("cron-token-456".into());
        h.scheduler.schedule(m).unwrap();

        advance(64).await;
        assert!(h.store.heartbeats(8).await.is_empty());

        advance(2).await;
        assert_eq!(h.store.heartbeats(8).await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_checker_is_isolated() {
        let healthy = Scripted::with([]);
        let executor = scripted(&healthy).with_checker("broken", Panicking);
        let h = harness(executor);

        h.scheduler.schedule(Monitor::new(1, "broken", "broken")).unwrap();
        h.scheduler.schedule(monitor(2)).unwrap();

        advance(121).await;

        let broken = h.store.heartbeats(1).await;
        assert_eq!(broken.len(), 3);
        assert!(broken.iter().all(|hb| hb.status == HeartbeatStatus::Down && hb.msg == "Internal probe error"));

        let fine = h.store.heartbeats(2).await;
        assert_eq!(fine.len(), 3);
        assert!(fine.iter().all(Heartbeat::is_up));
        assert_eq!(h.scheduler.task_state(1), Some(TaskState::Running));
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_failure_leaves_state_unchanged() {
        let checker = Scripted::with([ProbeResult::down("refused"), ProbeResult::down("refused")]);
        let source = Arc::new(MemoryStore::new());
        let flaky = Arc::new(Flaky { inner: MemoryStore::new(), failures: AtomicUsize::new(1) });
        let h = harness_with(scripted(&checker), flaky.clone(), source);

        h.scheduler.schedule(monitor(1)).unwrap();
        advance(61).await;

        let beats = flaky.inner.heartbeats(1).await;
        assert_eq!(beats.len(), 1);
        assert_eq!(checker.calls(), 2);
        assert!(beats[0].important);
        assert_eq!(beats[0].down_count, 1);
        assert_eq!(beats[0].duration, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hot_reconfiguration_recomputes_fire_time() {
        let checker = Scripted::with([]);
        let h = harness(scripted(&checker));
        h.scheduler.schedule(monitor(1)).unwrap();

        advance(10).await;
        let mut faster = monitor(1);
        faster.interval_seconds = 20;
        faster.timeout_seconds = 10;
        assert_eq!(h.scheduler.update(faster), Ok(true));

        advance(31).await;
        let beats = h.store.heartbeats(1).await;
        assert_eq!(offsets(&beats), vec![0, 20, 40]);
        assert_no_overlap(&beats);
        assert_eq!(beats[0].end_time, beats[1].time);
        assert_eq!(h.scheduler.monitor(1).map(|m| m.interval_seconds), Some(20));

        let mut invalid = monitor(1);
        invalid.interval_seconds = 0;
        assert!(h.scheduler.update(invalid).is_err());
        assert_eq!(h.scheduler.update(monitor(99)), Ok(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_resume_remove() {
        let checker = Scripted::with([]);
        let h = harness(scripted(&checker));
        h.scheduler.schedule(monitor(1)).unwrap();
        let mut state = h.scheduler.watch_state(1).unwrap();

        advance(10).await;
        assert_eq!(h.scheduler.task_state(1), Some(TaskState::Running));
        assert!(h.scheduler.pause(1));

        advance(200).await;
        assert_eq!(h.scheduler.task_state(1), Some(TaskState::Paused));
        assert_eq!(h.store.heartbeats(1).await.len(), 1);

        assert!(h.scheduler.resume(1));
        advance(1).await;
        let beats = h.store.heartbeats(1).await;
        assert_eq!(offsets(&beats), vec![0, 210]);

        assert!(h.scheduler.remove(1));
        assert_eq!(*state.borrow_and_update(), TaskState::Stopped);
        assert_eq!(h.scheduler.task_state(1), None);
        assert!(!h.scheduler.remove(1));
        assert!(!h.scheduler.pause(1));

        advance(300).await;
        assert_eq!(h.store.heartbeats(1).await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_monitor_starts_paused_and_rejects_pushes() {
        let h = harness(MonitoringExecutor::default().with_checker("push", PushChecker::new()));
        let mut m = Monitor::new(3, "cron", "push");
        m.push_token = Some("paused-token-789".into());
        m.active = false;
        h.scheduler.schedule(m).unwrap();

        advance(100).await;
        assert_eq!(h.scheduler.task_state(3), Some(TaskState::Paused));
        assert_eq!(h.scheduler.push("paused-token-789", ProbeResult::up("OK", None)), Err(PushError::Inactive));
        assert!(h.store.heartbeats(3).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_skips_probe() {
        let checker = Scripted::with([]);
        let h = harness(scripted(&checker));
        h.maintenance.add(MaintenanceWindow { monitor_id: 1, starts_at: Utc::now() - TimeDelta::days(1), ends_at: None });

        h.scheduler.schedule(monitor(1)).unwrap();
        advance(61).await;

        let beats = h.store.heartbeats(1).await;
        assert_eq!(beats.len(), 2);
        assert!(beats.iter().all(|hb| hb.status == HeartbeatStatus::Maintenance && !hb.important));
        assert_eq!(beats[0].msg, MAINTENANCE_MESSAGE);
        assert_eq!(checker.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_restored_from_history() {
        let checker = Scripted::with([ProbeResult::down("still down")]);
        let h = harness(scripted(&checker));

        let time = Utc::now() - TimeDelta::minutes(1);
        h.store
            .append(&Heartbeat {
                id: Uuid::new_v4(),
                monitor_id: 1,
                status: HeartbeatStatus::Down,
                msg: "refused".into(),
                ping: None,
                duration: 60,
                down_count: 1,
                retries: 1,
                important: true,
                time,
                end_time: time + TimeDelta::seconds(60),
                notified: true,
            })
            .await
            .unwrap();

        h.scheduler.schedule(monitor(1)).unwrap();
        advance(1).await;

        let latest = h.store.latest(1).await.unwrap().unwrap();
        assert_eq!(latest.msg, "still down");
        assert!(!latest.important);
        assert_eq!(latest.down_count, 2);
        assert_eq!(latest.retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_important_heartbeats_are_notified() {
        let checker = Scripted::with([ProbeResult::down("refused"), ProbeResult::down("refused")]);
        let h = harness(scripted(&checker));
        h.store
            .upsert_channel(NotificationChannel {
                id: 4,
                name: "ops".into(),
                channel_type: "outbox".into(),
                config: serde_json::json!({}),
                active: true,
            })
            .await;

        let mut m = monitor(1);
        m.notification_ids = vec![4];
        h.store.upsert_monitor(m.clone()).await;
        h.scheduler.schedule(m).unwrap();

        advance(121).await;

        let sent = h.outbox.0.lock().unwrap().clone();
        assert_eq!(sent, vec![(4, "[monitor-1] [🔴 Down] refused".to_string()), (4, "[monitor-1] [✅ Up] OK".to_string())]);

        let beats = h.store.heartbeats(1).await;
        let notified: Vec<bool> = beats.iter().map(|hb| hb.notified).collect();
        assert_eq!(notified, vec![true, false, true]);
        assert_eq!(h.store.notification_channels(&[4]).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_pushes_close_previous_heartbeat() {
        let h = harness(MonitoringExecutor::default().with_checker("push", PushChecker::new()));
        let mut m = Monitor::new(5, "deploy hook", "push");
        m.push_token = Some("deploy-token-321".into());
        h.scheduler.schedule(m).unwrap();

        advance(1).await;
        assert_eq!(h.scheduler.push("deploy-token-321", ProbeResult::up("OK", None)), Ok(5));
        advance(10).await;
        assert_eq!(h.scheduler.push("deploy-token-321", ProbeResult::up("OK", None)), Ok(5));
        advance(1).await;

        let beats = h.store.heartbeats(5).await;
        assert_eq!(offsets(&beats), vec![0, 10]);
        assert_no_overlap(&beats);
        assert_eq!(beats[0].end_time, beats[1].time);
        assert_eq!(beats[1].end_time - beats[1].time, TimeDelta::seconds(65));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_important_heartbeats_were_pruned() {
        let checker = Scripted::with([]);
        let h = harness(scripted(&checker));
        let now = Utc::now();

        h.store.append(&stored(now - TimeDelta::days(200), HeartbeatStatus::Up, true)).await.unwrap();
        h.store.append(&stored(now - TimeDelta::minutes(1), HeartbeatStatus::Up, false)).await.unwrap();
        assert_eq!(h.store.prune_before(now - TimeDelta::days(180)).await.unwrap(), 1);
        assert_eq!(h.store.latest_important(1).await.unwrap(), None);

        h.scheduler.schedule(monitor(1)).unwrap();
        advance(1).await;

        let beats = h.store.heartbeats(1).await;
        assert_eq!(beats.len(), 2);
        assert_eq!(beats[1].status, HeartbeatStatus::Up);
        assert!(!beats[1].important);
        assert!(h.outbox.0.lock().unwrap().is_empty());
        assert_eq!(h.scheduler.shared.deps.statuses.status_of(1), Some(HeartbeatStatus::Up));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_board_holds_confirmed_status() {
        let checker = Scripted::with([
            ProbeResult::up("OK", Some(5)),
            ProbeResult::down("Connection refused"),
            ProbeResult::down("Connection refused"),
            ProbeResult::down("Connection refused"),
        ]);
        let h = harness(scripted(&checker));
        let statuses = Arc::clone(&h.scheduler.shared.deps.statuses);

        let mut m = monitor(1);
        m.max_retries = 2;
        m.retry_interval_seconds = 15;
        h.scheduler.schedule(m).unwrap();

        advance(1).await;
        assert_eq!(statuses.status_of(1), Some(HeartbeatStatus::Up));

        advance(60).await;
        assert_eq!(h.store.latest(1).await.unwrap().map(|hb| hb.status), Some(HeartbeatStatus::Down));
        assert_eq!(statuses.status_of(1), Some(HeartbeatStatus::Up));

        advance(15).await;
        assert_eq!(statuses.status_of(1), Some(HeartbeatStatus::Up));

        advance(15).await;
        assert_eq!(statuses.status_of(1), Some(HeartbeatStatus::Down));

        advance(60).await;
        assert_eq!(statuses.status_of(1), Some(HeartbeatStatus::Up));
    }
}
