use crate::models::PlugDefinitions;
use crate::view::RelaySpec;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path};
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid plug definitions in {path}: {source}")]
    Definitions {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CommanderConfig {
    pub mqtt: MqttConf,
    pub http: HttpConf,
    /// Fichier JSON des prises : { "<device-id>": { "name": "..." } }
    pub plugs_file: String,
    /// Relais par nom de module, ajoutés à la table par défaut
    pub modules: HashMap<String, Vec<RelaySpec>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Certificat CA du broker ; absent = TCP en clair
    pub tls_ca: Option<String>,
    /// Taille de la file de requêtes du client rumqttc
    pub capacity: usize,
    pub reconnect_delay_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
}

impl Default for CommanderConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConf::default(),
            http: HttpConf::default(),
            plugs_file: "TASMOTA_PLUGS.json".into(),
            modules: HashMap::new(),
        }
    }
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "tasmota-kernel".into(),
            keep_alive_secs: 60,
            username: None,
            password: None,
            tls_ca: None,
            capacity: 64,
            reconnect_delay_secs: 2,
        }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".into() }
    }
}

impl CommanderConfig {
    /// Les identifiants du broker peuvent venir de l'environnement (.env)
    fn apply_env(mut self) -> Self {
        if let Ok(user) = std::env::var("MQTT_USERNAME") {
            self.mqtt.username = Some(user);
        }
        if let Ok(password) = std::env::var("MQTT_PASSWORD") {
            self.mqtt.password = Some(password);
        }
        self
    }
}

pub async fn load_config() -> CommanderConfig {
    let path = std::env::var("TASMOTA_COMMANDER_CONFIG").unwrap_or_else(|_| "commander.yaml".into());
    load_config_from(&path).await.apply_env()
}

pub async fn load_config_from(path: &str) -> CommanderConfig {
    if Path::new(path).exists() {
        let txt = fs::read_to_string(path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            return CommanderConfig::default();
        }
        serde_yaml::from_str(&txt).unwrap_or_else(|e| {
            warn!("[kernel] config invalide ({path}): {e}");
            CommanderConfig::default()
        })
    } else {
        info!("[kernel] pas de {path}, usage config par défaut");
        CommanderConfig::default()
    }
}

/// Charge la liste des prises connues (erreur remontée, pas de valeur par défaut)
pub async fn load_plug_definitions(path: &str) -> Result<PlugDefinitions, ConfigError> {
    let txt = fs::read_to_string(path).await.map_err(|source| ConfigError::Io {
        path: path.to_string(),
        source,
    })?;
    serde_json::from_str(&txt).map_err(|source| ConfigError::Definitions {
        path: path.to_string(),
        source,
    })
}

/// Lit le certificat CA si TLS est configuré
pub async fn load_tls_ca(conf: &MqttConf) -> Result<Option<Vec<u8>>, ConfigError> {
    let Some(path) = conf.tls_ca.as_deref() else { return Ok(None) };
    let ca = fs::read(path).await.map_err(|source| ConfigError::Io {
        path: path.to_string(),
        source,
    })?;
    Ok(Some(ca))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let cfg = load_config_from("/nonexistent/commander.yaml").await;
        assert_eq!(cfg.mqtt.host, "localhost");
        assert_eq!(cfg.mqtt.port, 1883);
        assert_eq!(cfg.http.bind, "0.0.0.0:8080");
        assert_eq!(cfg.plugs_file, "TASMOTA_PLUGS.json");
        assert!(cfg.modules.is_empty());
    }

    #[tokio::test]
    async fn test_partial_yaml() {
        let f = write_tmp(
            "mqtt:\n  host: broker.lan\n  port: 8883\n  tls_ca: ca.crt\nmodules:\n  Sonoff Basic:\n    - label: Main\n      field: POWER\n",
        );
        let cfg = load_config_from(f.path().to_str().unwrap()).await;
        assert_eq!(cfg.mqtt.host, "broker.lan");
        assert_eq!(cfg.mqtt.port, 8883);
        assert_eq!(cfg.mqtt.tls_ca.as_deref(), Some("ca.crt"));
        assert_eq!(cfg.mqtt.client_id, "tasmota-kernel");
        assert_eq!(cfg.modules["Sonoff Basic"][0].field, "POWER");
    }

    #[tokio::test]
    async fn test_invalid_yaml_falls_back() {
        let f = write_tmp("mqtt: [not, a, map");
        let cfg = load_config_from(f.path().to_str().unwrap()).await;
        assert_eq!(cfg.mqtt.host, "localhost");
    }

    #[tokio::test]
    async fn test_plug_definitions() {
        let f = write_tmp(r#"{"plug-1": {"name": "Desk"}, "hall/plug": {"name": "Hall", "floor": 0}}"#);
        let defs = load_plug_definitions(f.path().to_str().unwrap()).await.unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs["hall/plug"].name, "Hall");

        let bad = write_tmp(r#"{"plug-1": {}}"#);
        let err = load_plug_definitions(bad.path().to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, ConfigError::Definitions { .. }));

        let err = load_plug_definitions("/nonexistent/plugs.json").await.unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
