//! Uppe monitoring engine.
//!
//! Probes monitored targets on a schedule, turns raw outcomes into a
//! persisted heartbeat stream, notifies on confirmed state changes and serves
//! uptime statistics computed from that stream.

pub mod config;
pub mod database;
pub mod events;
pub mod models;
pub mod monitoring;
pub mod notifications;
pub mod orchestrator;
pub mod pool;
pub mod uptime;

pub use orchestrator::{Components, MonitorEvent, Orchestrator};
