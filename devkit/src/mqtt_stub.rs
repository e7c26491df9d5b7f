/*!
Mock MQTT Client pour tests sans broker

Enregistre abonnements et publications, permet de simuler les messages
qu'enverraient les prises Tasmota.
*/

use rumqttc::QoS;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use anyhow::Result;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl MockMessage {
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap_or("<binary>")
    }
}

/// Mock MQTT Client qui simule rumqttc::AsyncClient
#[derive(Clone)]
pub struct MockMqttClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    message_sender: Arc<Mutex<Option<mpsc::UnboundedSender<MockMessage>>>>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self {
            published_messages: Arc::new(Mutex::new(Vec::new())),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            message_sender: Arc::new(Mutex::new(None)),
        }
    }

    /// Channel qui reçoit les messages simulés (côté "broker -> kernel")
    pub fn setup_receiver(&self) -> mpsc::UnboundedReceiver<MockMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.message_sender.lock().unwrap() = Some(sender);
        receiver
    }

    /// Même signature que AsyncClient::publish
    pub async fn publish<S, V>(&self, topic: S, _qos: QoS, _retain: bool, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = MockMessage {
            topic: topic.into(),
            payload: payload.into(),
        };

        log::debug!("[mock] published to {}: {:?}", message.topic, message.payload_str());
        self.published_messages.lock().unwrap().push(message);
        Ok(())
    }

    /// Même signature que AsyncClient::subscribe
    pub async fn subscribe<S: Into<String>>(&self, topic: S, _qos: QoS) -> Result<()> {
        let topic = topic.into();
        log::debug!("[mock] subscribed to {}", topic);
        self.subscriptions.lock().unwrap().push(topic);
        Ok(())
    }

    /// Simule un message livré par le broker
    pub async fn simulate_incoming<S, V>(&self, topic: S, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = MockMessage {
            topic: topic.into(),
            payload: payload.into(),
        };

        let sender = self.message_sender.lock().unwrap().clone();
        let Some(sender) = sender else {
            anyhow::bail!("no receiver set up for incoming messages");
        };
        log::debug!("[mock] incoming {}", message.topic);
        sender.send(message).map_err(|e| anyhow::anyhow!("Send error: {}", e))?;
        Ok(())
    }

    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().unwrap().clone()
    }

    pub fn get_subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Commandes publiées vers une prise : cmnd/<device-id>/<COMMAND>
    pub fn commands_for(&self, device_id: &str) -> Vec<MockMessage> {
        let prefix = format!("cmnd/{device_id}/");
        self.published_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| {
                msg.topic
                    .strip_prefix(&prefix)
                    .is_some_and(|command| !command.contains('/'))
            })
            .cloned()
            .collect()
    }
}

impl Default for MockMqttClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Payloads au format du firmware Tasmota
pub struct TasmotaMessageBuilder;

impl TasmotaMessageBuilder {
    /// tele/<id>/LWT
    pub fn lwt(online: bool) -> Vec<u8> {
        if online { b"Online".to_vec() } else { b"Offline".to_vec() }
    }

    /// Horodatage local au format Tasmota (sans fuseau)
    pub fn now() -> String {
        chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()
    }

    /// Clés POWER : "POWER" pour un relais, "POWER1".."POWERn" sinon
    fn power_fields(powers: &[&str]) -> Map<String, Value> {
        let mut fields = Map::new();
        if let [single] = powers {
            fields.insert("POWER".into(), json!(single));
        } else {
            for (i, state) in powers.iter().enumerate() {
                fields.insert(format!("POWER{}", i + 1), json!(state));
            }
        }
        fields
    }

    /// stat/<id>/RESULT en réponse à cmnd/<id>/MODULE
    pub fn module_result(code: u32, name: &str) -> Vec<u8> {
        json!({ "Module": { (code.to_string()): name } }).to_string().into_bytes()
    }

    /// stat/<id>/RESULT en réponse à cmnd/<id>/POWER
    pub fn power_result(powers: &[&str]) -> Vec<u8> {
        Value::Object(Self::power_fields(powers)).to_string().into_bytes()
    }

    /// stat/<id>/RESULT en réponse à cmnd/<id>/STATE
    pub fn state_result(time: &str, powers: &[&str]) -> Vec<u8> {
        let mut fields = Map::new();
        fields.insert("Time".into(), json!(time));
        fields.insert("Uptime".into(), json!("0T01:02:03"));
        fields.insert("UptimeSec".into(), json!(3723));
        fields.insert("Heap".into(), json!(26));
        fields.insert("SleepMode".into(), json!("Dynamic"));
        fields.insert("Sleep".into(), json!(50));
        fields.insert("MqttCount".into(), json!(1));
        fields.extend(Self::power_fields(powers));
        fields.insert("Wifi".into(), json!({ "AP": 1, "RSSI": 78, "Signal": -61 }));
        Value::Object(fields).to_string().into_bytes()
    }

    /// stat/<id>/STATUS en réponse à cmnd/<id>/STATUS 0 (extrait)
    pub fn status0(module_code: u32, topic: &str) -> Vec<u8> {
        json!({
            "Status": {
                "Module": module_code,
                "DeviceName": "Tasmota",
                "FriendlyName": ["Tasmota"],
                "Topic": topic,
                "ButtonTopic": "0",
                "Power": 1,
                "PowerOnState": 3,
                "LedState": 1
            },
            "StatusFWR": { "Version": "12.1.1(tasmota)", "Hardware": "ESP8266EX" },
            "StatusNET": { "Hostname": format!("{topic}-1234"), "IPAddress": "192.168.1.50" }
        })
        .to_string()
        .into_bytes()
    }
}
