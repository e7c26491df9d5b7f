/*!
# Tasmota DevKit - Stubs et utilitaires pour les tests du kernel

Bibliothèque de test sans broker :
- Client MQTT simulé (abonnements, publications, messages entrants)
- Builders des payloads envoyés par le firmware Tasmota (LWT, RESULT, STATUS)
- Harness qui joue le rôle des prises et répond aux commandes de découverte
*/

pub mod mqtt_stub;
pub mod test_utils;

pub use mqtt_stub::{MockMessage, MockMqttClient, TasmotaMessageBuilder};
pub use test_utils::{FakePlug, TestHarness};
