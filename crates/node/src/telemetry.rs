use rumqttc::{AsyncClient, QoS};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

pub(crate) mod topics {
    pub(crate) const TEMP: &str = "sensor/temp";
    pub(crate) const SOIL: &str = "sensor/soil";
    pub(crate) const SOIL_WATERING: &str = "sensor/soil/watering";
    pub(crate) const LIGHT: &str = "sensor/light";
    pub(crate) const WATER: &str = "sensor/water";
    pub(crate) const WATER_WATERING: &str = "sensor/water/watering";
    pub(crate) const BATTERY: &str = "sensor/battery";
    pub(crate) const LOG: &str = "log";
    pub(crate) const PAIRING: &str = "pairing";

    pub(crate) const PUMP_SET_STATE: &str = "pump/-/set/state";
    pub(crate) const WATERING_SET_STATE: &str = "watering/-/set/state";

    /// Topics the node subscribes to.
    pub(crate) const SUBSCRIPTIONS: [&str; 2] = [PUMP_SET_STATE, WATERING_SET_STATE];
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A scalar radio payload.  On the wire it is a bare JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum Payload {
    Int(i64),
    Float(f32),
    Text(String),
}

impl Payload {
    pub(crate) fn encode(&self) -> Vec<u8> {
        // Serialising a scalar cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Decode a JSON scalar.  Anything that is not valid JSON is taken as
    /// plain text.
    pub(crate) fn decode(bytes: &[u8]) -> Self {
        serde_json::from_slice(bytes)
            .unwrap_or_else(|_| Payload::Text(String::from_utf8_lossy(bytes).trim().to_string()))
    }
}

/// Outbound side of the messaging transport.
pub(crate) trait Publish {
    fn publish(&mut self, topic: &str, payload: Payload);
}

// ---------------------------------------------------------------------------
// Topic helpers
// ---------------------------------------------------------------------------

/// Full MQTT topic for a radio topic: "node/<node_id>/<topic>".
pub(crate) fn node_topic(node_id: &str, topic: &str) -> String {
    format!("node/{node_id}/{topic}")
}

/// Strip "node/<node_id>/" from an inbound MQTT topic.  Topics addressed to
/// another node, or outside the node namespace, yield `None`.
pub(crate) fn strip_node_prefix<'a>(topic: &'a str, node_id: &str) -> Option<&'a str> {
    let rest = topic.strip_prefix("node/")?;
    let rest = rest.strip_prefix(node_id)?;
    let rest = rest.strip_prefix('/')?;
    (!rest.is_empty()).then_some(rest)
}

// ---------------------------------------------------------------------------
// MQTT publisher
// ---------------------------------------------------------------------------

/// Publishes through a rumqttc client without awaiting: the request is queued
/// for the event loop task.  A full queue drops the message.
pub(crate) struct MqttPublisher {
    client: AsyncClient,
    node_id: String,
}

impl MqttPublisher {
    pub(crate) fn new(client: AsyncClient, node_id: &str) -> Self {
        Self {
            client,
            node_id: node_id.to_string(),
        }
    }
}

impl Publish for MqttPublisher {
    fn publish(&mut self, topic: &str, payload: Payload) {
        let full = node_topic(&self.node_id, topic);
        debug!(topic = %full, ?payload, "publish");
        if let Err(e) = self
            .client
            .try_publish(&full, QoS::AtLeastOnce, false, payload.encode())
        {
            warn!(topic = %full, "publish failed: {e}");
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
