use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;

use crate::state::PlugStore;

/// Disconnected -> Connecting -> Connected, retour à Disconnected sur erreur transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Serialize)]
pub struct KernelHealth {
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub uptime_seconds: u64,
    pub plugs_tracked: usize,
    pub mqtt_status: ConnectionState,
    pub mqtt_reconnects: u32,
    pub bootstraps: u32,
    pub bootstrap_failures: u64,
    pub messages_applied: u64,
    pub messages_dropped: u64,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    started_at: OffsetDateTime,
    mqtt_reconnects: Arc<AtomicU32>,
    bootstraps: Arc<AtomicU32>,
    bootstrap_failures: Arc<AtomicU64>,
    messages_applied: Arc<AtomicU64>,
    messages_dropped: Arc<AtomicU64>,
    mqtt_status: Arc<parking_lot::Mutex<ConnectionState>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            started_at: OffsetDateTime::now_utc(),
            mqtt_reconnects: Arc::new(AtomicU32::new(0)),
            bootstraps: Arc::new(AtomicU32::new(0)),
            bootstrap_failures: Arc::new(AtomicU64::new(0)),
            messages_applied: Arc::new(AtomicU64::new(0)),
            messages_dropped: Arc::new(AtomicU64::new(0)),
            mqtt_status: Arc::new(parking_lot::Mutex::new(ConnectionState::Disconnected)),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.mqtt_status.lock()
    }

    pub fn mark_mqtt_connecting(&self) {
        *self.mqtt_status.lock() = ConnectionState::Connecting;
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = ConnectionState::Connected;
    }

    /// Fin d'une séquence de bootstrap, avec le nombre de requêtes refusées
    pub fn record_bootstrap(&self, failed: usize) {
        self.bootstraps.fetch_add(1, Ordering::Relaxed);
        self.bootstrap_failures.fetch_add(failed as u64, Ordering::Relaxed);
    }

    /// Erreur transport : rumqttc retentera la connexion au prochain poll
    pub fn mark_mqtt_disconnected(&self) {
        let mut status = self.mqtt_status.lock();
        if *status != ConnectionState::Disconnected {
            self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        }
        *status = ConnectionState::Disconnected;
    }

    pub fn record_applied(&self) {
        self.messages_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_health(&self, plugs: &PlugStore) -> KernelHealth {
        KernelHealth {
            started_at: self.started_at,
            uptime_seconds: self.start_time.elapsed().as_secs(),
            plugs_tracked: plugs.len(),
            mqtt_status: self.connection_state(),
            mqtt_reconnects: self.mqtt_reconnects.load(Ordering::Relaxed),
            bootstraps: self.bootstraps.load(Ordering::Relaxed),
            bootstrap_failures: self.bootstrap_failures.load(Ordering::Relaxed),
            messages_applied: self.messages_applied.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_transitions() {
        let health = HealthTracker::new();
        assert_eq!(health.connection_state(), ConnectionState::Disconnected);

        // premier échec avant toute connexion : pas une reconnexion
        health.mark_mqtt_disconnected();
        health.mark_mqtt_connecting();
        health.mark_mqtt_connected();
        assert_eq!(health.connection_state(), ConnectionState::Connected);

        health.mark_mqtt_disconnected();
        health.mark_mqtt_connecting();
        health.mark_mqtt_connected();

        let store = PlugStore::from_definitions(&Default::default());
        let report = health.get_health(&store);
        assert_eq!(report.mqtt_reconnects, 1);
        assert_eq!(report.bootstraps, 0);
        assert_eq!(report.mqtt_status, ConnectionState::Connected);
    }

    #[test]
    fn test_bootstrap_failures_reported() {
        let health = HealthTracker::new();
        health.record_bootstrap(0);
        health.record_bootstrap(2);

        let store = PlugStore::from_definitions(&Default::default());
        let json = serde_json::to_value(health.get_health(&store)).unwrap();
        assert_eq!(json["bootstraps"], 2);
        assert_eq!(json["bootstrap_failures"], 2);
        assert_eq!(json["plugs_tracked"], 0);
    }

    #[test]
    fn test_counters_serialize() {
        let health = HealthTracker::new();
        health.record_applied();
        health.record_applied();
        health.record_dropped();
        let store = PlugStore::from_definitions(&Default::default());
        let json = serde_json::to_value(health.get_health(&store)).unwrap();
        assert_eq!(json["messages_applied"], 2);
        assert_eq!(json["messages_dropped"], 1);
        assert_eq!(json["mqtt_status"], "disconnected");
    }
}
