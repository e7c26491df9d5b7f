/**
 * API REST - Lecture seule de l'état des prises
 *
 * ROUTES :
 * - GET /health                 -> "ok"
 * - GET /system/health          -> état MQTT, compteurs de messages
 * - GET /full-state             -> état complet de toutes les prises
 * - GET /full-state/{id}        -> état complet d'une prise
 * - GET /short-state            -> vue simplifiée (ou champ manquant) par prise
 * - GET /short-state/{id}       -> vue simplifiée, 503 tant qu'elle n'est pas prête
 *
 * Aucune route d'écriture. Les handlers travaillent sur des copies du store.
 */

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::health::{HealthTracker, KernelHealth};
use crate::models::{PlugState, PlugsMap};
use crate::state::SharedStore;
use crate::view::{project, project_all, RelayMap, ShortEntry, ShortView, ViewError};

#[derive(Clone)]
pub struct AppState {
    pub plugs: SharedStore,
    pub relays: Arc<RelayMap>,
    pub health_tracker: HealthTracker,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/full-state", get(full_state))
        .route("/full-state/{*id}", get(full_state_one))
        .route("/short-state", get(short_state))
        .route("/short-state/{*id}", get(short_state_one))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(&app.plugs))
}

// GET /full-state
async fn full_state(State(app): State<AppState>) -> Json<PlugsMap> {
    Json(app.plugs.snapshot())
}

// GET /full-state/{id} (le device-id peut contenir des '/')
async fn full_state_one(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PlugState>, StatusCode> {
    app.plugs.get(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

// GET /short-state
async fn short_state(State(app): State<AppState>) -> Json<BTreeMap<String, ShortEntry>> {
    let plugs = app.plugs.snapshot();
    Json(project_all(&plugs, &app.relays))
}

// GET /short-state/{id}
async fn short_state_one(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ShortView>, (StatusCode, Json<serde_json::Value>)> {
    let Some(plug) = app.plugs.get(&id) else {
        return Err((StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "unknown plug" }))));
    };
    match project(&plug, &app.relays) {
        Ok(view) => Ok(Json(view)),
        Err(ViewError::MissingField(field)) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "not-ready": field })),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PlugDefinition, PlugDefinitions};
    use crate::queries::QueryRegistry;
    use crate::state::PlugStore;
    use crate::mqtt::{handle_message, Delivery};
    use serde_json::{json, Map};
    use tasmota_devkit::TasmotaMessageBuilder;

    fn app() -> AppState {
        let mut defs = PlugDefinitions::new();
        defs.insert("plug-1".into(), PlugDefinition { name: "Desk".into(), extra: Map::new() });
        defs.insert("garden/pump".into(), PlugDefinition { name: "Pump".into(), extra: Map::new() });
        AppState {
            plugs: PlugStore::from_definitions(&defs).shared(),
            relays: Arc::new(RelayMap::default()),
            health_tracker: HealthTracker::new(),
        }
    }

    fn feed_plug_1(app: &AppState) {
        let registry = QueryRegistry::tasmota();
        let msgs = [
            ("tele/plug-1/LWT", TasmotaMessageBuilder::lwt(true)),
            ("stat/plug-1/RESULT", TasmotaMessageBuilder::module_result(1, "Gosund SP1")),
            ("stat/plug-1/RESULT", TasmotaMessageBuilder::state_result("2024-05-01T12:00:00", &["ON"])),
            ("stat/plug-1/STATUS", TasmotaMessageBuilder::status0(1, "plug-1")),
        ];
        for (topic, payload) in msgs {
            assert_eq!(handle_message(&registry, &app.plugs, topic, &payload), Delivery::Applied);
        }
    }

    #[tokio::test]
    async fn test_full_state() {
        let app = app();
        feed_plug_1(&app);

        let Json(all) = full_state(State(app.clone())).await;
        assert_eq!(all.len(), 2);
        assert_eq!(all["plug-1"].online_state.as_deref(), Some("Online"));

        let Json(one) = full_state_one(State(app.clone()), Path("garden/pump".into())).await.unwrap();
        assert_eq!(one.name, "Pump");

        let err = full_state_one(State(app), Path("nope".into())).await.unwrap_err();
        assert_eq!(err, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_short_state() {
        let app = app();
        feed_plug_1(&app);

        let Json(all) = short_state(State(app.clone())).await;
        let json = serde_json::to_value(&all).unwrap();
        assert_eq!(json["plug-1"]["module"], "Gosund SP1");
        assert_eq!(json["plug-1"]["time"], "2024-05-01T12:00:00");
        assert_eq!(json["plug-1"]["relais"], json!({"230V": "ON"}));
        assert_eq!(json["garden/pump"], json!({"not-ready": "online-state"}));

        let Json(view) = short_state_one(State(app.clone()), Path("plug-1".into())).await.unwrap();
        assert_eq!(view.name, "Desk");
        assert_eq!(view.online_state, "Online");

        let (code, _) = short_state_one(State(app.clone()), Path("garden/pump".into())).await.unwrap_err();
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);

        let (code, _) = short_state_one(State(app), Path("ghost".into())).await.unwrap_err();
        assert_eq!(code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_system_health() {
        let app = app();
        let Json(health) = get_system_health(State(app)).await;
        assert_eq!(health.plugs_tracked, 2);
    }
}
