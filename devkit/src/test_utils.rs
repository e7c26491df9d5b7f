/*!
Test Harness : prises Tasmota simulées

Le harness regarde les commandes publiées par le kernel (cmnd/<id>/...) et
y répond comme le ferait le firmware, via le client MQTT simulé.
*/

use crate::mqtt_stub::{MockMessage, MockMqttClient, TasmotaMessageBuilder};
use anyhow::Result;
use tokio::sync::mpsc;

/// Une prise simulée
#[derive(Debug, Clone)]
pub struct FakePlug {
    pub device_id: String,
    pub module_code: u32,
    pub module_name: String,
    pub powers: Vec<&'static str>,
    pub time: String,
}

impl FakePlug {
    pub fn new(device_id: &str, module_code: u32, module_name: &str, powers: &[&'static str]) -> Self {
        Self {
            device_id: device_id.to_string(),
            module_code,
            module_name: module_name.to_string(),
            powers: powers.to_vec(),
            time: TasmotaMessageBuilder::now(),
        }
    }

    pub fn gosund_sp1(device_id: &str, power: &'static str) -> Self {
        Self::new(device_id, 1, "Gosund SP1", &[power])
    }

    /// POWER1 = relais 230V, POWER2 = sortie USB 5V
    pub fn gosund_sp112(device_id: &str, mains: &'static str, usb: &'static str) -> Self {
        Self::new(device_id, 55, "Gosund SP112", &[mains, usb])
    }

    pub fn at_time(mut self, time: &str) -> Self {
        self.time = time.to_string();
        self
    }

    /// Réponse du firmware à une commande, None si la commande est inconnue
    fn reply_to(&self, command: &str) -> Option<(String, Vec<u8>)> {
        let id = &self.device_id;
        match command {
            "MODULE" => Some((
                format!("stat/{id}/RESULT"),
                TasmotaMessageBuilder::module_result(self.module_code, &self.module_name),
            )),
            "STATE" => Some((
                format!("stat/{id}/RESULT"),
                TasmotaMessageBuilder::state_result(&self.time, &self.powers),
            )),
            "STATUS" => Some((
                format!("stat/{id}/STATUS"),
                TasmotaMessageBuilder::status0(self.module_code, id),
            )),
            _ => None,
        }
    }
}

/// Harness de test : client simulé + prises simulées
pub struct TestHarness {
    pub mqtt_client: MockMqttClient,
    incoming: mpsc::UnboundedReceiver<MockMessage>,
    plugs: Vec<FakePlug>,
}

impl TestHarness {
    pub fn new() -> Self {
        env_logger::builder().is_test(true).try_init().ok();

        let mqtt_client = MockMqttClient::new();
        let incoming = mqtt_client.setup_receiver();
        Self {
            mqtt_client,
            incoming,
            plugs: Vec::new(),
        }
    }

    pub fn with_plug(mut self, plug: FakePlug) -> Self {
        self.plugs.push(plug);
        self
    }

    /// La prise annonce sa présence (tele/<id>/LWT)
    pub async fn bring_online(&self, device_id: &str) -> Result<()> {
        self.mqtt_client
            .simulate_incoming(format!("tele/{device_id}/LWT"), TasmotaMessageBuilder::lwt(true))
            .await
    }

    /// Chaque prise simulée répond aux commandes qu'elle a reçues.
    /// Retourne le nombre de réponses envoyées.
    pub async fn answer_commands(&self) -> Result<usize> {
        let mut answered = 0;
        for plug in &self.plugs {
            for cmd in self.mqtt_client.commands_for(&plug.device_id) {
                let command = cmd.topic.rsplit('/').next().unwrap_or_default();
                match plug.reply_to(command) {
                    Some((topic, payload)) => {
                        self.mqtt_client.simulate_incoming(topic, payload).await?;
                        answered += 1;
                    }
                    None => log::warn!("[harness] {} ignores command {}", plug.device_id, command),
                }
            }
        }
        Ok(answered)
    }

    /// Messages simulés en attente, dans l'ordre d'envoi
    pub fn drain_incoming(&mut self) -> Vec<MockMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.incoming.try_recv() {
            out.push(msg);
        }
        out
    }

    /// Vérifie le nombre de publications par topic
    pub fn assert_published(&self, topic: &str, expected: usize) -> Result<()> {
        let actual = self.mqtt_client.find_messages_by_topic(topic).len();
        if actual != expected {
            anyhow::bail!("topic '{}': expected {} messages, got {}", topic, expected, actual);
        }
        Ok(())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::QoS;
    use serde_json::Value;

    #[tokio::test]
    async fn test_plugs_answer_discovery() {
        let mut harness = TestHarness::new()
            .with_plug(FakePlug::gosund_sp1("plug-1", "ON").at_time("2024-05-01T12:00:00"))
            .with_plug(FakePlug::gosund_sp112("plug-2", "ON", "OFF"));

        for (topic, payload) in [
            ("cmnd/plug-1/MODULE", ""),
            ("cmnd/plug-1/STATE", ""),
            ("cmnd/plug-1/STATUS", "0"),
            ("cmnd/plug-2/STATE", ""),
            ("cmnd/plug-2/POWER", ""),
        ] {
            harness.mqtt_client.publish(topic, QoS::AtLeastOnce, false, payload).await.unwrap();
        }

        let answered = harness.answer_commands().await.unwrap();
        assert_eq!(answered, 4);

        let incoming = harness.drain_incoming();
        let topics: Vec<_> = incoming.iter().map(|m| m.topic.as_str()).collect();
        assert_eq!(
            topics,
            vec!["stat/plug-1/RESULT", "stat/plug-1/RESULT", "stat/plug-1/STATUS", "stat/plug-2/RESULT"]
        );

        let state: Value = serde_json::from_slice(&incoming[1].payload).unwrap();
        assert_eq!(state["Time"], "2024-05-01T12:00:00");
        assert_eq!(state["POWER"], "ON");

        let dual: Value = serde_json::from_slice(&incoming[3].payload).unwrap();
        assert_eq!(dual["POWER1"], "ON");
        assert_eq!(dual["POWER2"], "OFF");
    }

    #[tokio::test]
    async fn test_assert_published_and_incoming() {
        let mut harness = TestHarness::new();
        harness.mqtt_client.publish("cmnd/a/STATE", QoS::AtLeastOnce, false, "").await.unwrap();
        harness.bring_online("a").await.unwrap();

        harness.assert_published("cmnd/a/STATE", 1).unwrap();
        assert!(harness.assert_published("cmnd/a/STATE", 2).is_err());

        let incoming = harness.drain_incoming();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].topic, "tele/a/LWT");
        assert_eq!(incoming[0].payload_str(), "Online");
        assert!(harness.drain_incoming().is_empty());
    }
}
