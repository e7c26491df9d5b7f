/**
 * VUE SIMPLIFIÉE - Résumé d'une prise pour /short-state
 *
 * Champs : nom, online-state, heure du dernier RESULT, modèle et relais.
 * Le modèle est résolu via common-status.Status.Module (code) puis
 * command-result.Module[code] (nom affiché). Les relais dépendent du modèle
 * et sont décrits par une table explicite (RelayMap), jamais devinés.
 */

use crate::models::{PlugState, PlugsMap};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ViewError {
    #[error("missing field: {0}")]
    MissingField(String),
}

/// Un relais : libellé affiché et clé lue dans command-result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelaySpec {
    pub label: String,
    pub field: String,
}

impl RelaySpec {
    fn new(label: &str, field: &str) -> Self {
        Self { label: label.into(), field: field.into() }
    }
}

/// Nom de module Tasmota -> relais exposés
#[derive(Debug, Clone)]
pub struct RelayMap {
    modules: HashMap<String, Vec<RelaySpec>>,
}

impl Default for RelayMap {
    fn default() -> Self {
        let mut modules = HashMap::new();
        modules.insert("Gosund SP1".to_string(), vec![RelaySpec::new("230V", "POWER")]);
        modules.insert(
            "Gosund SP112".to_string(),
            vec![RelaySpec::new("230V", "POWER1"), RelaySpec::new("5V", "POWER2")],
        );
        Self { modules }
    }
}

impl RelayMap {
    /// Table par défaut complétée (ou surchargée) par la section `modules` de la config
    pub fn with_overrides(overrides: &HashMap<String, Vec<RelaySpec>>) -> Self {
        let mut map = Self::default();
        for (module, relays) in overrides {
            map.modules.insert(module.clone(), relays.clone());
        }
        map
    }

    /// Module inconnu -> aucun relais
    pub fn relays_for(&self, module: &str) -> &[RelaySpec] {
        self.modules.get(module).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn known_modules(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelayReading {
    pub label: String,
    pub state: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShortView {
    pub name: String,
    #[serde(rename = "online-state")]
    pub online_state: String,
    pub time: Value,
    pub module: String,
    #[serde(rename = "relais", serialize_with = "relays_as_map")]
    pub relays: Vec<RelayReading>,
}

// {"230V": "ON", "5V": "OFF"} dans l'ordre de la table
fn relays_as_map<S: Serializer>(relays: &[RelayReading], s: S) -> Result<S::Ok, S::Error> {
    let mut map = s.serialize_map(Some(relays.len()))?;
    for r in relays {
        map.serialize_entry(&r.label, &r.state)?;
    }
    map.end()
}

/// Entrée de /short-state : vue prête ou champ encore manquant
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ShortEntry {
    Ready(ShortView),
    NotReady {
        #[serde(rename = "not-ready")]
        missing: String,
    },
}

fn missing(field: impl Into<String>) -> ViewError {
    ViewError::MissingField(field.into())
}

/// Code module courant, rendu en texte ("1") qu'il arrive en nombre ou en chaîne
fn current_module_code(plug: &PlugState) -> Result<String, ViewError> {
    let code = plug
        .common_status
        .get("Status")
        .and_then(|s| s.get("Module"))
        .ok_or_else(|| missing("common-status.Status.Module"))?;
    match code {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(missing("common-status.Status.Module")),
    }
}

pub fn project(plug: &PlugState, relay_map: &RelayMap) -> Result<ShortView, ViewError> {
    let online_state = plug.online_state.clone().ok_or_else(|| missing("online-state"))?;
    let time = plug
        .command_result
        .get("Time")
        .cloned()
        .ok_or_else(|| missing("command-result.Time"))?;

    let code = current_module_code(plug)?;
    let module_field = format!("command-result.Module.{code}");
    let module = plug
        .command_result
        .get("Module")
        .and_then(|m| m.get(code.as_str()))
        .and_then(Value::as_str)
        .ok_or_else(|| missing(module_field))?
        .to_string();

    let relays = relay_map
        .relays_for(&module)
        .iter()
        .map(|spec| {
            plug.command_result
                .get(&spec.field)
                .cloned()
                .map(|state| RelayReading { label: spec.label.clone(), state })
                .ok_or_else(|| missing(format!("command-result.{}", spec.field)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ShortView {
        name: plug.name.clone(),
        online_state,
        time,
        module,
        relays,
    })
}

pub fn project_all(plugs: &PlugsMap, relay_map: &RelayMap) -> BTreeMap<String, ShortEntry> {
    plugs
        .iter()
        .map(|(id, plug)| {
            let entry = match project(plug, relay_map) {
                Ok(view) => ShortEntry::Ready(view),
                Err(ViewError::MissingField(field)) => ShortEntry::NotReady { missing: field },
            };
            (id.clone(), entry)
        })
        .collect()
}
