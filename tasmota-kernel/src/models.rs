use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Entrée du fichier de définition des prises (TASMOTA_PLUGS.json)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlugDefinition {
    pub name: String,
    /// Champs libres du fichier, renvoyés tels quels dans /full-state
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// device-id -> définition, ordre stable pour les réponses HTTP
pub type PlugDefinitions = BTreeMap<String, PlugDefinition>;

/// État complet d'une prise, tel que reconstruit à partir des messages MQTT
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlugState {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    #[serde(rename = "online-state", skip_serializing_if = "Option::is_none")]
    pub online_state: Option<String>,
    #[serde(rename = "command-result")]
    pub command_result: Map<String, Value>,
    #[serde(rename = "common-status")]
    pub common_status: Map<String, Value>,
}

/// Clés réservées aux résultats des requêtes MQTT
pub const QUERY_KEYS: [&str; 3] = ["online-state", "command-result", "common-status"];

impl PlugState {
    /// Les champs libres qui portent le nom d'une requête sont remplacés
    /// par l'état vide de cette requête.
    pub fn from_definition(def: &PlugDefinition) -> Self {
        let extra = def
            .extra
            .iter()
            .filter(|(key, _)| !QUERY_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Self {
            name: def.name.clone(),
            extra,
            online_state: None,
            command_result: Map::new(),
            common_status: Map::new(),
        }
    }
}

pub type PlugsMap = BTreeMap<String, PlugState>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_keeps_extra_fields() {
        let txt = r#"{"plug-1": {"name": "Desk lamp", "room": "office"}}"#;
        let defs: PlugDefinitions = serde_json::from_str(txt).unwrap();
        let def = &defs["plug-1"];
        assert_eq!(def.name, "Desk lamp");
        assert_eq!(def.extra["room"], "office");

        let state = PlugState::from_definition(def);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["room"], "office");
        assert!(json.get("online-state").is_none());
        assert_eq!(json["command-result"], serde_json::json!({}));
        assert_eq!(json["common-status"], serde_json::json!({}));
    }

    #[test]
    fn test_query_keys_in_definition_are_reset() {
        let txt = r#"{"p": {"name": "X", "command-result": "legacy", "online-state": "Online", "common-status": [1], "room": "hall"}}"#;
        let defs: PlugDefinitions = serde_json::from_str(txt).unwrap();
        let state = PlugState::from_definition(&defs["p"]);
        assert_eq!(state.extra.len(), 1);
        assert!(state.online_state.is_none());

        let out = serde_json::to_string(&state).unwrap();
        for key in QUERY_KEYS {
            let quoted = format!("\"{key}\"");
            assert!(out.matches(&quoted).count() <= 1, "{key} repeated in {out}");
        }
        assert!(!out.contains("online-state"));
        assert!(!out.contains("legacy"));
        assert_eq!(out.matches("\"command-result\":{}").count(), 1);
        assert_eq!(out.matches("\"room\":\"hall\"").count(), 1);
    }
}
