//! Boot sequence for the device-orchestration hub, lifted from
//! `services/server::main`'s shape: init logging, connect + migrate, build
//! the shared state, spawn background workers, serve HTTP, shut down
//! gracefully.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hub::bus::{BusClient, InProcessBus};
use hub::config::Config;
use hub::dedup::DedupCache;
use hub::dlq::DeadLetterQueue;
use hub::engine::CommandEngine;
use hub::health::HealthState;
use hub::http::{build_router, HttpState};
use hub::registry::DeviceRegistry;
use hub::repo::PersistenceGateway;
use hub::{db, metrics};
use hub_core::event::kinds;
use hub_core::Event;
use hub_protocol::{
    validate_ack, validate_device_meta, validate_device_status, validate_heartbeat,
    validate_module_status, AckEnvelope, DeviceMetaEnvelope, DeviceStatusEnvelope,
    DlqCommandRequest, HeartbeatEnvelope, ModuleStatusEnvelope,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(log_level)).init();

    let config = Config::from_env().expect("invalid configuration");
    info!(bus_url = %config.bus_url, http_addr = %config.http_addr, "starting hub");

    info!("connecting to database...");
    let pool = db::create_pool(&config.database_url).await;
    db::run_migrations(&pool).await;
    info!("migrations applied");

    let _metrics_handle = metrics::install();

    let repo = PersistenceGateway::new(pool);
    let bus: Arc<dyn BusClient> = InProcessBus::new();
    let registry = DeviceRegistry::new();
    let dedup = Arc::new(DedupCache::new(config.dedup_capacity, config.dedup_ttl));
    let dlq = Arc::new(DeadLetterQueue::new(repo.clone(), bus.clone(), config.dlq_max_retries));
    let engine = CommandEngine::new(dedup, registry.clone(), repo.clone(), bus.clone(), dlq.clone());
    let health = Arc::new(HealthState::new(bus.clone(), repo.clone(), registry.clone()));

    spawn_inbound_workers(&config, bus.clone(), registry.clone(), repo.clone(), engine.clone(), dlq.clone());
    spawn_staleness_sweeper(&config, registry.clone(), repo.clone());
    spawn_retention_sweeper(&config, repo.clone());
    spawn_metrics_sweeper(registry.clone(), repo.clone(), engine.clone());

    let http_state = HttpState { engine: engine.clone(), health, default_timeout: config.command_timeout };
    let router = build_router(http_state);
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await.expect("failed to bind http_addr");
    info!(addr = %config.http_addr, "hub listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    info!("draining in-flight commands before exit");
    engine.drain_on_shutdown().await;
    info!("hub shut down gracefully");
}

/// One task per inbound topic family (§4.1's "five envelope kinds plus acks
/// plus DLQ control"), each independently subscribed so a slow handler for
/// one kind never backpressures another — mirrors `services/forwarder`'s
/// one-task-per-concern split. The ack path additionally fans individual
/// acks out across `worker_pool_size` concurrent handlers (§C0's worker-pool
/// shape), since acks are the hot path under load.
fn spawn_inbound_workers(
    config: &Config,
    bus: Arc<dyn BusClient>,
    registry: Arc<DeviceRegistry>,
    repo: PersistenceGateway,
    engine: CommandEngine,
    dlq: Arc<DeadLetterQueue>,
) {
    spawn_meta_worker(bus.clone(), registry.clone(), repo.clone());
    spawn_status_worker(bus.clone(), registry.clone(), repo.clone());
    spawn_heartbeat_worker(bus.clone(), registry.clone(), repo.clone());
    spawn_module_status_worker(bus.clone(), registry, repo);
    spawn_ack_worker(bus.clone(), engine, config.worker_pool_size.max(1));
    spawn_dlq_control_worker(bus, dlq);
}

fn spawn_meta_worker(bus: Arc<dyn BusClient>, registry: Arc<DeviceRegistry>, repo: PersistenceGateway) {
    tokio::spawn(async move {
        let mut sub = bus.subscribe("/lab/device/+/meta");
        while let Some(msg) = sub.recv().await {
            metrics::record_bus_inbound(&msg.topic, 0);
            let env: DeviceMetaEnvelope = match serde_json::from_value(msg.payload) {
                Ok(env) => env,
                Err(err) => {
                    warn!(%err, topic = %msg.topic, "malformed device-meta envelope, dropped");
                    continue;
                }
            };
            if let Err(err) = validate_device_meta(&env) {
                warn!(%err, device_id = %env.device_id, "device-meta envelope failed validation, dropped");
                continue;
            }
            let now = Utc::now();
            let (update, transition) = registry.apply_meta(&env, now).await;
            if let hub::registry::RegistryUpdate::Device(device) = update {
                if let Err(err) = repo.upsert_device(&device).await {
                    warn!(%err, device_id = %env.device_id, "failed to persist device meta");
                }
            }
            emit_transition_event(&repo, &env.device_id, transition, now).await;
        }
    });
}

fn spawn_status_worker(bus: Arc<dyn BusClient>, registry: Arc<DeviceRegistry>, repo: PersistenceGateway) {
    tokio::spawn(async move {
        let mut sub = bus.subscribe("/lab/device/+/status");
        while let Some(msg) = sub.recv().await {
            metrics::record_bus_inbound(&msg.topic, 0);
            let env: DeviceStatusEnvelope = match serde_json::from_value(msg.payload) {
                Ok(env) => env,
                Err(err) => {
                    warn!(%err, topic = %msg.topic, "malformed device-status envelope, dropped");
                    continue;
                }
            };
            if let Err(err) = validate_device_status(&env) {
                warn!(%err, device_id = %env.device_id, "device-status envelope failed validation, dropped");
                continue;
            }
            let now = Utc::now();
            if let Some((_update, transition)) = registry.apply_status(&env, now).await {
                emit_transition_event(&repo, &env.device_id, transition, now).await;
            }
        }
    });
}

fn spawn_heartbeat_worker(bus: Arc<dyn BusClient>, registry: Arc<DeviceRegistry>, repo: PersistenceGateway) {
    tokio::spawn(async move {
        let mut sub = bus.subscribe("/lab/device/+/heartbeat");
        while let Some(msg) = sub.recv().await {
            metrics::record_bus_inbound(&msg.topic, 0);
            let device_id = match topic_segment(&msg.topic, 2) {
                Some(id) => id,
                None => continue,
            };
            let mut env: HeartbeatEnvelope = match serde_json::from_value(msg.payload) {
                Ok(env) => env,
                Err(err) => {
                    warn!(%err, topic = %msg.topic, "malformed heartbeat envelope, dropped");
                    continue;
                }
            };
            env.device_id = device_id;
            if let Err(err) = validate_heartbeat(&env) {
                warn!(%err, device_id = %env.device_id, "heartbeat envelope failed validation, dropped");
                continue;
            }
            let now = Utc::now();
            if let Some((hub::registry::RegistryUpdate::Heartbeat(hb), transition)) = registry.apply_heartbeat(&env, now).await {
                if let Err(err) = repo.record_heartbeat(&hb.device_id, hb.online, &hb.metadata, hb.timestamp).await {
                    warn!(%err, device_id = %hb.device_id, "failed to persist heartbeat");
                }
                emit_transition_event(&repo, &env.device_id, transition, now).await;
            }
        }
    });
}

fn spawn_module_status_worker(bus: Arc<dyn BusClient>, registry: Arc<DeviceRegistry>, repo: PersistenceGateway) {
    tokio::spawn(async move {
        let mut sub = bus.subscribe("/lab/device/+/+/status");
        while let Some(msg) = sub.recv().await {
            metrics::record_bus_inbound(&msg.topic, 0);
            let (device_id, module) = match (topic_segment(&msg.topic, 2), topic_segment(&msg.topic, 3)) {
                (Some(d), Some(m)) => (d, m),
                _ => continue,
            };
            let mut env: ModuleStatusEnvelope = match serde_json::from_value(msg.payload) {
                Ok(env) => env,
                Err(err) => {
                    warn!(%err, topic = %msg.topic, "malformed module-status envelope, dropped");
                    continue;
                }
            };
            env.device_id = device_id;
            env.module = module;
            if let Err(err) = validate_module_status(&env) {
                warn!(%err, device_id = %env.device_id, module = %env.module, "module-status envelope failed validation, dropped");
                continue;
            }
            let now = Utc::now();
            if let hub::registry::RegistryUpdate::ModuleStatus(status) = registry.apply_module_status(&env, now).await {
                if let Err(err) = repo.record_module_status(&status).await {
                    warn!(%err, device_id = %status.device_id, module = %status.module, "failed to persist module status");
                }
            }
        }
    });
}

fn spawn_ack_worker(bus: Arc<dyn BusClient>, engine: CommandEngine, concurrency: usize) {
    let limiter = Arc::new(tokio::sync::Semaphore::new(concurrency));
    tokio::spawn(async move {
        let mut sub = bus.subscribe("/lab/device/+/+/ack");
        while let Some(msg) = sub.recv().await {
            metrics::record_bus_inbound(&msg.topic, 0);
            let (device_id, module) = match (topic_segment(&msg.topic, 2), topic_segment(&msg.topic, 3)) {
                (Some(d), Some(m)) => (d, m),
                _ => continue,
            };
            let ack: AckEnvelope = match serde_json::from_value(msg.payload) {
                Ok(ack) => ack,
                Err(err) => {
                    warn!(%err, topic = %msg.topic, "malformed ack envelope, dropped");
                    continue;
                }
            };
            if let Err(err) = validate_ack(&ack) {
                warn!(%err, req_id = %ack.req_id, "ack envelope failed validation, dropped");
                continue;
            }
            let engine = engine.clone();
            let permit = limiter.clone().acquire_owned().await.expect("semaphore never closed");
            tokio::spawn(async move {
                let _permit = permit;
                engine.handle_ack(ack, &device_id, &module).await;
            });
        }
    });
}

fn spawn_dlq_control_worker(bus: Arc<dyn BusClient>, dlq: Arc<DeadLetterQueue>) {
    tokio::spawn(async move {
        let mut sub = bus.subscribe(hub_protocol::topics::DLQ_CMD);
        while let Some(msg) = sub.recv().await {
            let req: DlqCommandRequest = match serde_json::from_value(msg.payload) {
                Ok(req) => req,
                Err(err) => {
                    warn!(%err, "malformed dlq control request, dropped");
                    continue;
                }
            };
            let response = dlq.handle_control(req).await;
            let payload = serde_json::to_value(&response).unwrap_or(serde_json::Value::Null);
            if let Err(err) = bus
                .publish(hub_protocol::topics::DLQ_RESPONSE, payload, hub::bus::DeliveryQuality::AtLeastOnce, false)
                .await
            {
                warn!(%err, "failed to publish dlq control response");
            }
        }
    });
}

/// Background sweep (§4.5, default every `staleness_sweep_interval`): flips
/// devices whose `last_seen` exceeds `staleness_threshold` offline and
/// records a `device_offline` event per flip.
fn spawn_staleness_sweeper(config: &Config, registry: Arc<DeviceRegistry>, repo: PersistenceGateway) {
    let interval = config.staleness_sweep_interval;
    let staleness = chrono::Duration::from_std(config.staleness_threshold).unwrap_or(chrono::Duration::seconds(300));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let now = Utc::now();
            let flipped = registry.sweep_stale(now, staleness).await;
            for device in flipped {
                if let Err(err) = repo.upsert_device(&device).await {
                    warn!(%err, device_id = %device.device_id, "failed to persist staleness-triggered offline flip");
                }
                let event = Event::new(kinds::DEVICE_OFFLINE, format!("device {} went stale", device.device_id), now)
                    .with_device(&device.device_id);
                if let Err(err) = repo.record_event(&event).await {
                    warn!(%err, "failed to persist device_offline event");
                }
            }
        }
    });
}

/// §9 Open Question: retention sweep runs once a day, pruning heartbeats,
/// module-status history and events older than `retention_days`, cutoff at
/// start-of-today UTC.
fn spawn_retention_sweeper(config: &Config, repo: PersistenceGateway) {
    let retention_days = config.retention_days;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
        loop {
            ticker.tick().await;
            match repo.cleanup_old(retention_days, Utc::now()).await {
                Ok(report) => info!(
                    heartbeats = report.heartbeats,
                    module_status = report.module_status,
                    events = report.events,
                    "retention sweep complete"
                ),
                Err(err) => warn!(%err, "retention sweep failed"),
            }
        }
    });
}

/// §4.9a: the connected-devices, pending-correlations and active-DLQ-entries
/// gauges are ambient instrumentation, not request-triggered, so they're
/// refreshed on their own tick rather than updated inline everywhere the
/// underlying counts change.
fn spawn_metrics_sweeper(registry: Arc<DeviceRegistry>, repo: PersistenceGateway, engine: CommandEngine) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        loop {
            ticker.tick().await;
            metrics::set_connected_devices(registry.device_count().await);
            metrics::set_pending_correlations(engine.pending_count().await);
            match repo.dead_letter_stats().await {
                Ok(stats) => metrics::set_active_dlq_entries(stats.total),
                Err(err) => warn!(%err, "failed to refresh dead-letter gauge"),
            }
        }
    });
}

async fn emit_transition_event(
    repo: &PersistenceGateway,
    device_id: &str,
    transition: hub::registry::OnlineTransition,
    now: chrono::DateTime<Utc>,
) {
    let kind = match transition {
        hub::registry::OnlineTransition::WentOnline => kinds::DEVICE_ONLINE,
        hub::registry::OnlineTransition::WentOffline => kinds::DEVICE_OFFLINE,
        hub::registry::OnlineTransition::None => return,
    };
    let event = Event::new(kind, format!("device {device_id} transitioned"), now).with_device(device_id);
    if let Err(err) = repo.record_event(&event).await {
        warn!(%err, %device_id, "failed to persist device transition event");
    }
}

/// Extracts the zero-indexed segment of a `/`-separated topic, skipping the
/// leading empty segment produced by the leading slash (so segment 0 is
/// `lab`, segment 1 is `device`, segment 2 is the device id, ...).
fn topic_segment(topic: &str, index: usize) -> Option<String> {
    topic.split('/').filter(|s| !s.is_empty()).nth(index).map(str::to_owned)
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
