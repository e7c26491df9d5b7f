/**
 * PLUG STATE STORE - État en mémoire de toutes les prises connues
 *
 * RÔLE : Une entrée par prise du fichier de définition, créée au démarrage.
 * La boucle MQTT écrit, les handlers HTTP lisent des copies.
 *
 * CONCURRENCE : la table id -> entrée ne change jamais après construction,
 * chaque entrée a son propre RwLock. Le payload est parsé avant de prendre
 * le verrou : une lecture voit l'état avant ou après fusion, jamais entre les deux.
 */

use crate::models::{PlugDefinitions, PlugState, PlugsMap};
use crate::queries::{MergeStrategy, Query, QueryKind};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown device: {0}")]
    UnknownDevice(String),
    #[error("malformed {kind} payload for {device_id}: {reason}")]
    MalformedPayload {
        device_id: String,
        kind: &'static str,
        reason: String,
    },
}

pub type SharedStore = Arc<PlugStore>;

#[derive(Debug)]
pub struct PlugStore {
    plugs: BTreeMap<String, RwLock<PlugState>>,
}

/// Fragment prêt à être appliqué, déjà validé
enum Fragment {
    Scalar(String),
    Object(Map<String, Value>),
}

impl PlugStore {
    pub fn from_definitions(defs: &PlugDefinitions) -> Self {
        let plugs = defs
            .iter()
            .map(|(id, def)| (id.clone(), RwLock::new(PlugState::from_definition(def))))
            .collect();
        Self { plugs }
    }

    pub fn shared(self) -> SharedStore {
        Arc::new(self)
    }

    pub fn len(&self) -> usize {
        self.plugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugs.is_empty()
    }

    pub fn device_ids(&self) -> impl Iterator<Item = &str> {
        self.plugs.keys().map(String::as_str)
    }

    /// Applique un message entrant à l'état de la prise.
    /// En cas d'erreur l'état n'est pas modifié.
    pub fn update(&self, device_id: &str, query: &Query, payload: &[u8]) -> Result<(), StoreError> {
        let slot = self
            .plugs
            .get(device_id)
            .ok_or_else(|| StoreError::UnknownDevice(device_id.to_string()))?;

        let fragment = parse_fragment(device_id, query, payload)?;

        let mut plug = slot.write();
        match (query.kind, fragment) {
            (QueryKind::OnlineState, Fragment::Scalar(state)) => {
                plug.online_state = Some(state);
            }
            (QueryKind::CommandResult, Fragment::Object(obj)) => {
                merge_into(&mut plug.command_result, obj);
            }
            (QueryKind::CommonStatus, Fragment::Object(obj)) => {
                merge_into(&mut plug.common_status, obj);
            }
            (kind, _) => {
                return Err(StoreError::MalformedPayload {
                    device_id: device_id.to_string(),
                    kind: kind.as_str(),
                    reason: "strategy does not fit target".into(),
                });
            }
        }
        Ok(())
    }

    /// Copie d'une seule prise
    pub fn get(&self, device_id: &str) -> Option<PlugState> {
        self.plugs.get(device_id).map(|slot| slot.read().clone())
    }

    /// Copie de toutes les prises, utilisable sans verrou
    pub fn snapshot(&self) -> PlugsMap {
        self.plugs
            .iter()
            .map(|(id, slot)| (id.clone(), slot.read().clone()))
            .collect()
    }
}

fn parse_fragment(device_id: &str, query: &Query, payload: &[u8]) -> Result<Fragment, StoreError> {
    let malformed = |reason: String| StoreError::MalformedPayload {
        device_id: device_id.to_string(),
        kind: query.kind.as_str(),
        reason,
    };

    match query.strategy {
        MergeStrategy::ReplaceScalar => {
            let txt = std::str::from_utf8(payload).map_err(|e| malformed(e.to_string()))?;
            Ok(Fragment::Scalar(txt.to_string()))
        }
        MergeStrategy::MergeObject => match serde_json::from_slice::<Value>(payload) {
            Ok(Value::Object(obj)) => Ok(Fragment::Object(obj)),
            Ok(other) => Err(malformed(format!("expected JSON object, got {}", json_type(&other)))),
            Err(e) => Err(malformed(e.to_string())),
        },
    }
}

// écrase les clés présentes, garde les autres
fn merge_into(target: &mut Map<String, Value>, fragment: Map<String, Value>) {
    for (key, value) in fragment {
        target.insert(key, value);
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
