//! Per-connection subscription state for the real-time channel.
//!
//! A [`TrackingSession`] is a viewer's membership of one `order:<id>` room; it
//! leaves the room when dropped. A [`ConnectionSession`] owns every tracking
//! session of one socket plus its rider identity, and turns inbound frames into
//! joins, leaves and relay calls.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::lifecycle::{Actor, OrderLifecycle};
use crate::error::AppError;
use crate::models::order::Order;
use crate::rooms::events::{ClientMessage, ServerEvent};
use crate::rooms::{ChannelId, Room, RoomRegistry};
use crate::state::AppState;

pub struct TrackingSession {
    rooms: RoomRegistry,
    channel: ChannelId,
    order_id: Uuid,
}

impl TrackingSession {
    /// Authorizes the viewer, joins the order room, then re-reads the order so
    /// the returned snapshot already reflects anything published before the join.
    pub fn open(
        lifecycle: &OrderLifecycle,
        rooms: &RoomRegistry,
        channel: ChannelId,
        order_id: Uuid,
        viewer: &Actor,
    ) -> Result<(Self, Order), AppError> {
        lifecycle.get(order_id, viewer)?;

        if !rooms.join(channel, Room::Order(order_id)) {
            return Err(AppError::NotFound(format!("channel {channel} is closed")));
        }
        let session = Self {
            rooms: rooms.clone(),
            channel,
            order_id,
        };

        let snapshot = lifecycle.get(order_id, viewer)?;
        Ok((session, snapshot))
    }

    pub fn order_id(&self) -> Uuid {
        self.order_id
    }
}

impl Drop for TrackingSession {
    fn drop(&mut self) {
        self.rooms.leave(self.channel, Room::Order(self.order_id));
    }
}

/// Identity attached to a socket when it is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionIdentity {
    pub user_id: Option<String>,
    pub rider_id: Option<Uuid>,
}

pub struct ConnectionSession {
    state: Arc<AppState>,
    channel: ChannelId,
    identity: ConnectionIdentity,
    tracking: HashMap<Uuid, TrackingSession>,
    rider_room: Option<Uuid>,
}

impl ConnectionSession {
    pub fn new(state: Arc<AppState>, channel: ChannelId, identity: ConnectionIdentity) -> Self {
        Self {
            state,
            channel,
            identity,
            tracking: HashMap::new(),
            rider_room: None,
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn tracked_orders(&self) -> Vec<Uuid> {
        self.tracking.keys().copied().collect()
    }

    /// Handles one inbound frame; failures are reported back on the channel.
    pub fn handle(&mut self, message: ClientMessage) {
        if let Err(err) = self.dispatch(message) {
            debug!(channel_id = %self.channel, error = %err, "client message rejected");
            self.state.rooms.send_to(
                self.channel,
                ServerEvent::Error {
                    message: err.to_string(),
                },
            );
        }
    }

    pub fn handle_text(&mut self, raw: &str) {
        match serde_json::from_str::<ClientMessage>(raw) {
            Ok(message) => self.handle(message),
            Err(err) => {
                self.state.rooms.send_to(
                    self.channel,
                    ServerEvent::Error {
                        message: format!("malformed message: {err}"),
                    },
                );
            }
        }
    }

    fn dispatch(&mut self, message: ClientMessage) -> Result<(), AppError> {
        match message {
            ClientMessage::JoinAsRider { rider_id } => self.join_as_rider(rider_id),
            ClientMessage::TrackOrder { order_id } => self.track(order_id),
            ClientMessage::StopTracking { order_id } => {
                self.tracking.remove(&order_id);
                Ok(())
            }
            ClientMessage::RiderLocationUpdate {
                rider_id,
                order_id,
                lat,
                lon,
            } => {
                self.require_rider(rider_id)?;
                self.state
                    .relay
                    .report_location(rider_id, order_id, lat, lon)
                    .map(|_| ())
            }
        }
    }

    fn join_as_rider(&mut self, rider_id: Uuid) -> Result<(), AppError> {
        self.require_rider(rider_id)?;

        let rooms = &self.state.rooms;
        if let Some(previous) = self.rider_room.take() {
            rooms.leave(self.channel, Room::Rider(previous));
        }
        if !rooms.join(self.channel, Room::Rider(rider_id)) {
            return Err(AppError::NotFound(format!("channel {} is closed", self.channel)));
        }
        self.rider_room = Some(rider_id);

        let orders = self
            .state
            .lifecycle
            .active_for_rider(rider_id)
            .iter()
            .map(Order::rider_view)
            .collect();
        rooms.send_to(self.channel, ServerEvent::RiderOrders { orders });

        info!(channel_id = %self.channel, rider_id = %rider_id, "rider joined");
        Ok(())
    }

    fn track(&mut self, order_id: Uuid) -> Result<(), AppError> {
        let viewer = self.viewer()?;
        // An existing session for this order must leave before the new one joins.
        self.tracking.remove(&order_id);

        let (session, snapshot) = TrackingSession::open(
            &self.state.lifecycle,
            &self.state.rooms,
            self.channel,
            order_id,
            &viewer,
        )?;
        self.tracking.insert(session.order_id(), session);

        self.state.rooms.send_to(
            self.channel,
            ServerEvent::OrderSnapshot {
                order: Box::new(snapshot),
            },
        );
        info!(channel_id = %self.channel, order_id = %order_id, "tracking order");
        Ok(())
    }

    fn viewer(&self) -> Result<Actor, AppError> {
        match (&self.identity.user_id, self.identity.rider_id) {
            (Some(user_id), _) => Ok(Actor::Customer(user_id.clone())),
            (None, Some(rider_id)) => Ok(Actor::Rider(rider_id)),
            (None, None) => Err(AppError::Unauthorized(
                "connect with user_id or rider_token to track orders".to_string(),
            )),
        }
    }

    fn require_rider(&self, rider_id: Uuid) -> Result<(), AppError> {
        match self.identity.rider_id {
            Some(authenticated) if authenticated == rider_id => Ok(()),
            _ => Err(AppError::Unauthorized(format!(
                "connection is not authenticated as rider {rider_id}"
            ))),
        }
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.tracking.clear();
        self.state.rooms.close_channel(self.channel);
    }
}
