//! Device-orchestration hub: mediates between API/human callers and remote
//! devices over a pub/sub message bus, running the command lifecycle engine
//! (C6) on top of the dedup cache (C4), device registry (C5), dead-letter
//! queue (C7), and a Postgres persistence gateway (C3).
//!
//! Module layout mirrors the teacher's `services/server` split of
//! `state`/`repo`/`http` into a `bus`/`dedup`/`registry`/`engine`/`dlq`/`repo`/
//! `http` split, one module per SPEC_FULL component.

pub mod bus;
pub mod config;
pub mod db;
pub mod dedup;
pub mod dlq;
pub mod engine;
pub mod health;
pub mod http;
pub mod metrics;
pub mod registry;
pub mod repo;

pub use bus::{BusClient, InProcessBus};
pub use config::Config;
pub use dedup::DedupCache;
pub use dlq::DeadLetterQueue;
pub use engine::{CommandEngine, CommandOutcome, SubmitRequest};
pub use health::HealthState;
pub use registry::DeviceRegistry;
pub use repo::PersistenceGateway;
