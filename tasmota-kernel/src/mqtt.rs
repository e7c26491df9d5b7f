/**
 * MQTT - Abonnements, re-interrogation des prises et boucle de réception
 *
 * À chaque ConnAck (connexion initiale ou reconnexion, la session broker peut
 * être perdue) : abonnement aux patterns du QueryRegistry puis MODULE, STATE
 * et STATUS 0 vers chaque prise connue. Les messages reçus sont appliqués
 * directement dans la boucle : l'ordre par prise est l'ordre de livraison.
 */

use crate::config::MqttConf;
use crate::health::HealthTracker;
use crate::queries::{QueryRegistry, DISCOVERY_COMMANDS};
use crate::state::{SharedStore, StoreError};
use crate::topic::command_topic;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("subscribe {pattern} failed: {reason}")]
    Subscribe { pattern: String, reason: String },
    #[error("publish {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
}

/// Ce dont le noyau a besoin côté bus : s'abonner et publier
pub trait Transport: Clone + Send + Sync + 'static {
    fn subscribe(&self, pattern: &str) -> impl Future<Output = Result<(), TransportError>> + Send;
    fn publish(&self, topic: &str, payload: &str) -> impl Future<Output = Result<(), TransportError>> + Send;
}

impl Transport for AsyncClient {
    async fn subscribe(&self, pattern: &str) -> Result<(), TransportError> {
        AsyncClient::subscribe(self, pattern, QoS::AtLeastOnce)
            .await
            .map_err(|e| TransportError::Subscribe {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError> {
        AsyncClient::publish(self, topic, QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
            .await
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Nombre de requêtes envoyées par une séquence de bootstrap
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapReport {
    pub subscribed: usize,
    pub published: usize,
    pub failed: usize,
}

/// Abonnements puis commandes de découverte pour chaque prise.
/// Aucune réponse n'est attendue ici : elles arrivent par la boucle de réception.
pub async fn bootstrap<T: Transport>(transport: &T, registry: &QueryRegistry, device_ids: &[String]) -> BootstrapReport {
    let mut report = BootstrapReport::default();

    for pattern in registry.patterns() {
        match transport.subscribe(&pattern).await {
            Ok(()) => {
                debug!("[mqtt] subscribed {pattern}");
                report.subscribed += 1;
            }
            Err(e) => {
                error!("[mqtt] {e}");
                report.failed += 1;
            }
        }
    }

    for device_id in device_ids {
        for cmd in DISCOVERY_COMMANDS.iter() {
            let topic = command_topic(device_id, cmd.command);
            match transport.publish(&topic, cmd.payload).await {
                Ok(()) => report.published += 1,
                Err(e) => {
                    warn!("[mqtt] {e}");
                    report.failed += 1;
                }
            }
        }
    }

    info!(
        "[mqtt] bootstrap done: {} patterns, {} discovery commands, {} failures",
        report.subscribed, report.published, report.failed
    );
    report
}

/// Issue du traitement d'un message entrant
#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    Applied,
    Unmatched,
    Dropped,
}

/// Route un message et l'applique au store. Ne panique jamais : les erreurs
/// sont loggées et le message est abandonné.
pub fn handle_message(registry: &QueryRegistry, store: &SharedStore, topic: &str, payload: &[u8]) -> Delivery {
    let Some(route) = registry.route(topic) else {
        trace!("[mqtt] ignored topic {topic}");
        return Delivery::Unmatched;
    };

    match store.update(route.device_id, route.query, payload) {
        Ok(()) => {
            debug!("[mqtt] {} updated for {}", route.query.kind.as_str(), route.device_id);
            Delivery::Applied
        }
        Err(StoreError::UnknownDevice(id)) => {
            debug!("[mqtt] message for unknown plug {id} dropped");
            Delivery::Dropped
        }
        Err(e) => {
            warn!("[mqtt] {e}");
            Delivery::Dropped
        }
    }
}

pub fn build_mqtt_options(conf: &MqttConf, tls_ca: Option<Vec<u8>>) -> MqttOptions {
    let mut opts = MqttOptions::new(&conf.client_id, &conf.host, conf.port);
    opts.set_keep_alive(Duration::from_secs(conf.keep_alive_secs));
    if let Some(user) = conf.username.as_deref() {
        opts.set_credentials(user, conf.password.clone().unwrap_or_default());
    }
    if let Some(ca) = tls_ca {
        opts.set_transport(rumqttc::Transport::tls(ca, None, None));
    }
    opts
}

pub fn create_mqtt_client(conf: &MqttConf, tls_ca: Option<Vec<u8>>) -> (AsyncClient, EventLoop) {
    AsyncClient::new(build_mqtt_options(conf, tls_ca), conf.capacity)
}

/// Traite un événement de la boucle rumqttc. Sur ConnAck le bootstrap part
/// dans sa propre tâche, dont le handle est renvoyé.
pub fn on_event<T: Transport>(
    event: &Event,
    transport: &T,
    registry: &Arc<QueryRegistry>,
    store: &SharedStore,
    health: &HealthTracker,
    device_ids: &Arc<Vec<String>>,
) -> Option<JoinHandle<()>> {
    match event {
        Event::Incoming(Incoming::ConnAck(ack)) => {
            info!("[mqtt] connected ({:?})", ack.code);
            health.mark_mqtt_connected();
            // tâche séparée : la file du client ne se vide que si on continue de poll
            let transport = transport.clone();
            let registry = registry.clone();
            let device_ids = device_ids.clone();
            let health = health.clone();
            Some(task::spawn(async move {
                let report = bootstrap(&transport, &registry, &device_ids).await;
                health.record_bootstrap(report.failed);
            }))
        }
        Event::Incoming(Incoming::Publish(p)) => {
            match handle_message(registry, store, &p.topic, &p.payload) {
                Delivery::Applied => health.record_applied(),
                Delivery::Dropped => health.record_dropped(),
                Delivery::Unmatched => {}
            }
            None
        }
        _ => None,
    }
}

/// Boucle de réception : bootstrap à chaque ConnAck, application des Publish
pub fn spawn_mqtt_listener(
    client: AsyncClient,
    mut eventloop: EventLoop,
    registry: Arc<QueryRegistry>,
    store: SharedStore,
    health: HealthTracker,
    reconnect_delay: Duration,
) {
    let device_ids: Arc<Vec<String>> = Arc::new(store.device_ids().map(str::to_string).collect());

    task::spawn(async move {
        health.mark_mqtt_connecting();
        loop {
            match eventloop.poll().await {
                Ok(event) => {
                    on_event(&event, &client, &registry, &store, &health, &device_ids);
                }
                Err(e) => {
                    error!("[mqtt] connection error: {e}");
                    health.mark_mqtt_disconnected();
                    tokio::time::sleep(reconnect_delay).await;
                    health.mark_mqtt_connecting();
                }
            }
        }
    });
}
