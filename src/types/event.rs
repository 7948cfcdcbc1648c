use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payloads of every event kind the rest of the system can emit, keyed by the
/// wire tag carried in the `type` field. Endpoints subscribe to these tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    #[serde(rename = "client.created")]
    ClientCreated(ClientCreated),
    #[serde(rename = "client.archived")]
    ClientArchived(ClientArchived),
    #[serde(rename = "kit.completed")]
    KitCompleted(KitCompleted),
    #[serde(rename = "step.completed")]
    StepCompleted(StepCompleted),
    #[serde(rename = "payment.succeeded")]
    PaymentSucceeded(PaymentSucceeded),
}

impl EventPayload {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ClientCreated(_) => "client.created",
            Self::ClientArchived(_) => "client.archived",
            Self::KitCompleted(_) => "kit.completed",
            Self::StepCompleted(_) => "step.completed",
            Self::PaymentSucceeded(_) => "payment.succeeded",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCreated {
    pub client_id: Uuid,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientArchived {
    pub client_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KitCompleted {
    pub kit_id: Uuid,
    pub client_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCompleted {
    pub kit_id: Uuid,
    pub step_id: Uuid,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSucceeded {
    pub payment_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
}

/// An emitted fact. Never persisted on its own; it exists only long enough
/// for the dispatcher to fan it out into delivery records.
#[derive(Debug, Clone)]
pub struct Event {
    pub owner_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub payload: EventPayload,
}

/// The JSON body sent to receivers. Serialized exactly once at delivery
/// creation; the stored bytes are what gets signed and transmitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryEnvelope {
    pub id: Uuid,
    #[serde(flatten)]
    pub event: EventPayload,
    pub timestamp: String,
    pub owner_id: Uuid,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_with_dotted_type_tag() {
        let payload = EventPayload::ClientCreated(ClientCreated {
            client_id: Uuid::new_v4(),
            name: "Acme".to_string(),
            email: None,
        });

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["type"], "client.created");
        assert_eq!(value["data"]["name"], "Acme");
        assert_eq!(payload.event_type(), "client.created");
    }

    #[test]
    fn envelope_wire_shape() {
        let id = Uuid::new_v4();
        let owner_id = Uuid::new_v4();
        let envelope = DeliveryEnvelope {
            id,
            event: EventPayload::PaymentSucceeded(PaymentSucceeded {
                payment_id: Uuid::new_v4(),
                amount_cents: 4_200,
                currency: "usd".to_string(),
            }),
            timestamp: "2026-08-01T00:00:00Z".to_string(),
            owner_id,
        };

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["id"], id.to_string());
        assert_eq!(value["type"], "payment.succeeded");
        assert_eq!(value["data"]["amount_cents"], 4_200);
        assert_eq!(value["timestamp"], "2026-08-01T00:00:00Z");
        assert_eq!(value["ownerId"], owner_id.to_string());
    }

    #[test]
    fn payload_round_trips_through_json() {
        let payload = EventPayload::StepCompleted(StepCompleted {
            kit_id: Uuid::new_v4(),
            step_id: Uuid::new_v4(),
            title: "Sign contract".to_string(),
        });

        let json = serde_json::to_string(&payload).unwrap();
        let back: EventPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "step.completed");
    }
}
