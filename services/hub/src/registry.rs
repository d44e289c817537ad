//! Device registry (C5, §4.5) — the authoritative in-memory view of devices
//! and their modules, updated by inbound meta/status/heartbeat messages.
//!
//! Grounded on `services/server::state::AppState`'s single-`RwLock`-guarded
//! map pattern; unlike that teacher state (many independent registries), C5
//! is one map with a richer merge rule per message kind (§4.5).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hub_core::{Device, Heartbeat, ModuleStatus};
use hub_protocol::{DeviceMetaEnvelope, DeviceStatusEnvelope, HeartbeatEnvelope, ModuleStatusEnvelope};
use tokio::sync::RwLock;

/// Outcome of a registry mutation the caller should forward to C3
/// asynchronously — the in-memory view is authoritative and must not block
/// on a persistence round trip (§4.5).
#[derive(Debug, Clone)]
pub enum RegistryUpdate {
    Device(Device),
    ModuleStatus(ModuleStatus),
    Heartbeat(Heartbeat),
}

/// A device transitioning online/offline, for event emission (§3 `Event`
/// kinds `device_online`/`device_offline`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnlineTransition {
    None,
    WentOnline,
    WentOffline,
}

pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Device>>,
    module_status: RwLock<HashMap<(String, String), ModuleStatus>>,
}

impl DeviceRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { devices: RwLock::new(HashMap::new()), module_status: RwLock::new(HashMap::new()) })
    }

    /// §4.5 meta: full or partial upsert; creates the device on first sight.
    pub async fn apply_meta(&self, env: &DeviceMetaEnvelope, now: DateTime<Utc>) -> (RegistryUpdate, OnlineTransition) {
        let mut guard = self.devices.write().await;
        match guard.get_mut(&env.device_id) {
            Some(device) => {
                let was_online = device.online;
                device.merge_meta(env, now);
                (RegistryUpdate::Device(device.clone()), transition(was_online, device.online))
            }
            None => {
                let device = Device::from_meta(env, now);
                guard.insert(env.device_id.clone(), device.clone());
                (RegistryUpdate::Device(device), OnlineTransition::WentOnline)
            }
        }
    }

    /// §4.5 device-status: set `online` and `last_seen`.
    pub async fn apply_status(&self, env: &DeviceStatusEnvelope, now: DateTime<Utc>) -> Option<(RegistryUpdate, OnlineTransition)> {
        let mut guard = self.devices.write().await;
        let device = guard.get_mut(&env.device_id)?;
        let was_online = device.online;
        device.online = env.online;
        device.last_seen = now;
        Some((RegistryUpdate::Device(device.clone()), transition(was_online, device.online)))
    }

    /// §4.5 heartbeat: set `last_seen`, implicitly flipping back online — a
    /// device that is still heartbeating is not stale, regardless of how its
    /// `online` flag last read.
    pub async fn apply_heartbeat(&self, env: &HeartbeatEnvelope, now: DateTime<Utc>) -> Option<(RegistryUpdate, OnlineTransition)> {
        let mut guard = self.devices.write().await;
        let device = guard.get_mut(&env.device_id)?;
        let was_online = device.online;
        device.last_seen = now;
        device.online = true;
        let heartbeat = Heartbeat { device_id: env.device_id.clone(), online: env.online, timestamp: now, metadata: env.metadata.clone() };
        Some((RegistryUpdate::Heartbeat(heartbeat), transition(was_online, device.online)))
    }

    /// §4.5 module-status: update the `(device, module) -> latest` view.
    pub async fn apply_module_status(&self, env: &ModuleStatusEnvelope, now: DateTime<Utc>) -> RegistryUpdate {
        let status = ModuleStatus {
            device_id: env.device_id.clone(),
            module: env.module.clone(),
            state: env.state.clone(),
            fields: env.fields.clone(),
            online: env.online,
            timestamp: now,
        };
        self.module_status.write().await.insert((env.device_id.clone(), env.module.clone()), status.clone());
        RegistryUpdate::ModuleStatus(status)
    }

    pub async fn get(&self, device_id: &str) -> Option<Device> {
        self.devices.read().await.get(device_id).cloned()
    }

    pub async fn list(&self, online_only: bool) -> Vec<Device> {
        self.devices
            .read()
            .await
            .values()
            .filter(|d| !online_only || d.online)
            .cloned()
            .collect()
    }

    pub async fn has_module(&self, device_id: &str, module: &str) -> Option<bool> {
        self.devices.read().await.get(device_id).map(|d| d.has_module(module))
    }

    pub async fn latest_module_status(&self, device_id: &str, module: &str) -> Option<ModuleStatus> {
        self.module_status.read().await.get(&(device_id.to_owned(), module.to_owned())).cloned()
    }

    /// §4.5 sweeper: flips devices stale for longer than `staleness` offline.
    /// Returns the devices that transitioned in this sweep.
    pub async fn sweep_stale(&self, now: DateTime<Utc>, staleness: chrono::Duration) -> Vec<Device> {
        let mut guard = self.devices.write().await;
        let mut flipped = Vec::new();
        for device in guard.values_mut() {
            if device.online && device.is_stale(now, staleness) {
                device.online = false;
                flipped.push(device.clone());
            }
        }
        flipped
    }

    pub async fn online_ratio(&self) -> f64 {
        let guard = self.devices.read().await;
        if guard.is_empty() {
            return 1.0;
        }
        let online = guard.values().filter(|d| d.online).count();
        online as f64 / guard.len() as f64
    }

    pub async fn device_count(&self) -> usize {
        self.devices.read().await.len()
    }
}

fn transition(was_online: bool, is_online: bool) -> OnlineTransition {
    match (was_online, is_online) {
        (false, true) => OnlineTransition::WentOnline,
        (true, false) => OnlineTransition::WentOffline,
        _ => OnlineTransition::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_test_utils::device_meta;

    #[tokio::test]
    async fn first_meta_creates_device_online() {
        let registry = DeviceRegistry::new();
        let now = Utc::now();
        let (_update, transition) = registry.apply_meta(&device_meta("rig-1", &["ndi"]), now).await;
        assert_eq!(transition, OnlineTransition::WentOnline);
        let device = registry.get("rig-1").await.unwrap();
        assert!(device.online);
        assert!(device.has_module("ndi"));
    }

    #[tokio::test]
    async fn heartbeat_on_unknown_device_is_ignored() {
        let registry = DeviceRegistry::new();
        let env = HeartbeatEnvelope { device_id: "ghost".into(), online: true, ts: now_ts(), metadata: serde_json::json!({}) };
        assert!(registry.apply_heartbeat(&env, Utc::now()).await.is_none());
    }

    #[tokio::test]
    async fn sweeper_flips_stale_device_offline() {
        let registry = DeviceRegistry::new();
        let past = Utc::now() - chrono::Duration::seconds(600);
        registry.apply_meta(&device_meta("rig-1", &["ndi"]), past).await;
        let flipped = registry.sweep_stale(Utc::now(), chrono::Duration::seconds(300)).await;
        assert_eq!(flipped.len(), 1);
        assert!(!registry.get("rig-1").await.unwrap().online);
    }

    #[tokio::test]
    async fn sweeper_leaves_fresh_devices_online() {
        let registry = DeviceRegistry::new();
        registry.apply_meta(&device_meta("rig-1", &["ndi"]), Utc::now()).await;
        let flipped = registry.sweep_stale(Utc::now(), chrono::Duration::seconds(300)).await;
        assert!(flipped.is_empty());
        assert!(registry.get("rig-1").await.unwrap().online);
    }

    fn now_ts() -> String {
        Utc::now().to_rfc3339()
    }
}
