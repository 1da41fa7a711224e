use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::{Order, OrderStatus, RiderOrderView};
use crate::models::rider::RiderSummary;

/// Frames pushed from the server to a connected channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    RiderAssigned {
        rider: RiderSummary,
        order: Box<Order>,
    },
    AssignedToRider {
        order: RiderOrderView,
    },
    StatusChanged {
        order_id: Uuid,
        status: OrderStatus,
        timestamp: DateTime<Utc>,
    },
    LocationChanged {
        order_id: Uuid,
        lat: f64,
        lon: f64,
        timestamp: DateTime<Utc>,
    },
    OrderSnapshot {
        order: Box<Order>,
    },
    RiderOrders {
        orders: Vec<RiderOrderView>,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::RiderAssigned { .. } => "rider-assigned",
            ServerEvent::AssignedToRider { .. } => "assigned-to-rider",
            ServerEvent::StatusChanged { .. } => "status-changed",
            ServerEvent::LocationChanged { .. } => "location-changed",
            ServerEvent::OrderSnapshot { .. } => "order-snapshot",
            ServerEvent::RiderOrders { .. } => "rider-orders",
            ServerEvent::Error { .. } => "error",
        }
    }
}

/// Frames a client may send over its channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinAsRider {
        rider_id: Uuid,
    },
    TrackOrder {
        order_id: Uuid,
    },
    StopTracking {
        order_id: Uuid,
    },
    RiderLocationUpdate {
        rider_id: Uuid,
        order_id: Uuid,
        lat: f64,
        lon: f64,
    },
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{ClientMessage, ServerEvent};
    use crate::models::order::OrderStatus;

    #[test]
    fn server_events_use_event_and_data_envelope() {
        let order_id = Uuid::new_v4();
        let event = ServerEvent::StatusChanged {
            order_id,
            status: OrderStatus::PickedUp,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "status-changed");
        assert_eq!(json["event"], event.name());
        assert_eq!(json["data"]["status"], "picked-up");
        assert_eq!(json["data"]["order_id"], order_id.to_string());
    }

    #[test]
    fn client_messages_parse_from_wire_names() {
        let order_id = Uuid::new_v4();
        let raw = format!(r#"{{"event":"track-order","data":{{"order_id":"{order_id}"}}}}"#);

        let parsed: ClientMessage = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, ClientMessage::TrackOrder { order_id });
    }
}
