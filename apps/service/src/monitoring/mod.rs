//! Monitoring engine: checkers, the per-monitor scheduler and the heartbeat
//! state machine it drives.

pub mod checker;
pub mod clock;
pub mod executor;
pub mod maintenance;
pub mod push;
pub mod scheduler;
pub mod state;
pub mod status;
pub mod types;
pub mod validation;

pub use checker::Checker;
pub use clock::HeartbeatClock;
pub use executor::MonitoringExecutor;
pub use maintenance::{MaintenanceSchedule, MaintenanceWindows};
pub use push::{PushError, PushIngress, PushRequest, generate_push_token};
pub use scheduler::{MonitoringScheduler, SchedulerDeps, SchedulerSettings, TaskState};
pub use status::StatusBoard;
pub use types::{ConfigError, ProbeContext, ProbeFault, ProbeResult, ProbeStatus, StatusLookup};
