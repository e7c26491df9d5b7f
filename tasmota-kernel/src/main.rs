/**
 * TASMOTA KERNEL - Point d'entrée du service
 *
 * RÔLE : Charge la config et la liste des prises, crée le state store,
 * démarre la boucle MQTT (abonnements + re-interrogation à chaque connexion)
 * et sert l'état en lecture seule sur HTTP.
 *
 * ARCHITECTURE : une seule boucle MQTT écrit dans le store, les handlers Axum
 * en lisent des copies.
 */

mod config;
mod health;
mod http;
mod models;
mod mqtt;
mod queries;
mod state;
mod topic;
mod view;

use crate::config::{load_config, load_plug_definitions, load_tls_ca};
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::queries::QueryRegistry;
use crate::state::PlugStore;
use crate::view::RelayMap;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await;

    let defs = load_plug_definitions(&cfg.plugs_file).await?;
    info!("[kernel] {} plugs loaded from {}", defs.len(), cfg.plugs_file);

    // les entrées existent avant la première connexion
    let plugs = PlugStore::from_definitions(&defs).shared();
    if plugs.is_empty() {
        warn!("[kernel] no plug defined in {}, nothing to track", cfg.plugs_file);
    }
    let registry = Arc::new(QueryRegistry::tasmota());
    let relays = Arc::new(RelayMap::with_overrides(&cfg.modules));
    info!("[kernel] relay mapping for modules: {:?}", relays.known_modules());

    let health_tracker = HealthTracker::new();

    let tls_ca = load_tls_ca(&cfg.mqtt).await?;
    let (client, eventloop) = mqtt::create_mqtt_client(&cfg.mqtt, tls_ca);
    info!(
        "[kernel] MQTT broker {}:{} (tls: {})",
        cfg.mqtt.host,
        cfg.mqtt.port,
        cfg.mqtt.tls_ca.is_some()
    );
    mqtt::spawn_mqtt_listener(
        client,
        eventloop,
        registry,
        plugs.clone(),
        health_tracker.clone(),
        Duration::from_secs(cfg.mqtt.reconnect_delay_secs),
    );

    let app_state = AppState {
        plugs,
        relays,
        health_tracker,
    };
    let app = http::build_router(app_state);

    let addr: SocketAddr = cfg
        .http
        .bind
        .parse()
        .with_context(|| format!("invalid http.bind address {}", cfg.http.bind))?;
    info!("[kernel] listening on http://{addr}");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
