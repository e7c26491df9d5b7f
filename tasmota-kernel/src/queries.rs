/**
 * QUERY REGISTRY - Table des abonnements MQTT Tasmota
 *
 * RÔLE : Associe chaque couple (prefix, kind) à une stratégie de fusion dans
 * l'état de la prise. Construite une seule fois au démarrage, lecture seule ensuite.
 *
 * TOPICS :
 * tele/+/LWT     -> online-state   (remplacement)
 * stat/+/RESULT  -> command-result (fusion d'objet JSON)
 * stat/+/STATUS  -> common-status  (fusion d'objet JSON)
 */

use crate::topic::{Topic, SEPARATOR};

/// Emplacement de l'état visé par une requête
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    OnlineState,
    CommandResult,
    CommonStatus,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::OnlineState => "online-state",
            QueryKind::CommandResult => "command-result",
            QueryKind::CommonStatus => "common-status",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Le payload texte remplace la valeur
    ReplaceScalar,
    /// Le payload est un objet JSON dont les clés écrasent celles déjà connues
    MergeObject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub kind: QueryKind,
    pub prefix: &'static str,
    pub message: &'static str,
    pub strategy: MergeStrategy,
}

impl Query {
    /// Pattern d'abonnement, wildcard sur le device-id
    pub fn pattern(&self) -> String {
        format!("{}{SEPARATOR}+{SEPARATOR}{}", self.prefix, self.message)
    }

    fn matches(&self, topic: &Topic<'_>) -> bool {
        self.prefix == topic.prefix && self.message == topic.kind
    }
}

/// Résultat du routage d'un topic entrant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route<'a> {
    pub query: &'a Query,
    pub device_id: &'a str,
}

#[derive(Debug, Clone)]
pub struct QueryRegistry {
    queries: Vec<Query>,
}

impl QueryRegistry {
    /// Les trois requêtes utilisées pour suivre une prise Tasmota
    pub fn tasmota() -> Self {
        Self {
            queries: vec![
                Query {
                    kind: QueryKind::OnlineState,
                    prefix: "tele",
                    message: "LWT",
                    strategy: MergeStrategy::ReplaceScalar,
                },
                Query {
                    kind: QueryKind::CommandResult,
                    prefix: "stat",
                    message: "RESULT",
                    strategy: MergeStrategy::MergeObject,
                },
                Query {
                    kind: QueryKind::CommonStatus,
                    prefix: "stat",
                    message: "STATUS",
                    strategy: MergeStrategy::MergeObject,
                },
            ],
        }
    }

    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    pub fn patterns(&self) -> Vec<String> {
        self.queries.iter().map(Query::pattern).collect()
    }

    /// Trouve la requête correspondant à un topic, `None` si aucune ne correspond
    pub fn route<'a>(&'a self, raw_topic: &'a str) -> Option<Route<'a>> {
        let topic = Topic::parse(raw_topic)?;
        let query = self.queries.iter().find(|q| q.matches(&topic))?;
        Some(Route { query, device_id: topic.device_id })
    }
}

/// Commande envoyée à chaque prise pour forcer une réponse complète
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryCommand {
    pub command: &'static str,
    pub payload: &'static str,
}

/// MODULE et STATE répondent sur stat/.../RESULT, STATUS 0 sur stat/.../STATUS
pub const DISCOVERY_COMMANDS: [DiscoveryCommand; 3] = [
    DiscoveryCommand { command: "MODULE", payload: "" },
    DiscoveryCommand { command: "STATE", payload: "" },
    DiscoveryCommand { command: "STATUS", payload: "0" },
];
