//! Room-based fan-out for real-time events.
//!
//! A channel is one live client connection with a bounded outbound buffer. Rooms
//! exist only while they have members: the first `join` creates one and the last
//! `leave` removes it. Publishing never blocks and never replays; a full or closed
//! channel simply misses the event.

pub mod events;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::observability::metrics::Metrics;
use crate::rooms::events::ServerEvent;

pub type ChannelId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    /// Customer (and anyone else allowed) tracking one order.
    Order(Uuid),
    /// A single rider's inbox.
    Rider(Uuid),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::Order(id) => write!(f, "order:{id}"),
            Room::Rider(id) => write!(f, "rider:{id}"),
        }
    }
}

struct ChannelEntry {
    tx: mpsc::Sender<ServerEvent>,
    rooms: HashSet<Room>,
}

#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<Room, HashSet<ChannelId>>>,
    channels: Arc<DashMap<ChannelId, ChannelEntry>>,
    buffer_size: usize,
    metrics: Metrics,
}

impl RoomRegistry {
    pub fn new(buffer_size: usize, metrics: Metrics) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            channels: Arc::new(DashMap::new()),
            buffer_size: buffer_size.max(1),
            metrics,
        }
    }

    pub fn open_channel(&self) -> (ChannelId, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        let id = Uuid::new_v4();
        self.channels.insert(
            id,
            ChannelEntry {
                tx,
                rooms: HashSet::new(),
            },
        );
        self.metrics.connected_channels.inc();
        debug!(channel_id = %id, "channel opened");
        (id, rx)
    }

    /// Drops the channel and removes it from every room it joined.
    pub fn close_channel(&self, channel: ChannelId) {
        if let Some((_, entry)) = self.channels.remove(&channel) {
            for room in entry.rooms {
                self.remove_member(room, channel);
            }
            self.metrics.connected_channels.dec();
            debug!(channel_id = %channel, "channel closed");
        }
    }

    /// Idempotent. Returns false if the channel is not open.
    pub fn join(&self, channel: ChannelId, room: Room) -> bool {
        {
            let Some(mut entry) = self.channels.get_mut(&channel) else {
                return false;
            };
            entry.rooms.insert(room);
        }
        self.rooms.entry(room).or_default().insert(channel);
        debug!(channel_id = %channel, room = %room, "joined room");
        true
    }

    pub fn leave(&self, channel: ChannelId, room: Room) {
        if let Some(mut entry) = self.channels.get_mut(&channel) {
            entry.rooms.remove(&room);
        }
        self.remove_member(room, channel);
    }

    /// Leaves every room but keeps the channel open.
    pub fn leave_all(&self, channel: ChannelId) {
        let joined: Vec<Room> = match self.channels.get_mut(&channel) {
            Some(mut entry) => entry.rooms.drain().collect(),
            None => return,
        };
        for room in joined {
            self.remove_member(room, channel);
        }
    }

    /// Best-effort delivery to every current member of `room`; returns how many
    /// channels accepted the event.
    pub fn publish(&self, room: Room, event: ServerEvent) -> usize {
        self.metrics
            .events_published_total
            .with_label_values(&[event.name()])
            .inc();

        let members: Vec<ChannelId> = match self.rooms.get(&room) {
            Some(members) => members.iter().copied().collect(),
            None => {
                debug!(room = %room, event = event.name(), "publish to empty room");
                return 0;
            }
        };

        let mut delivered = 0;
        for channel in members {
            if self.deliver(channel, event.clone()) {
                delivered += 1;
            } else if !self.channels.contains_key(&channel) {
                self.remove_member(room, channel);
            }
        }

        debug!(room = %room, event = event.name(), delivered, "event published");
        delivered
    }

    /// Sends directly to one channel, outside of any room.
    pub fn send_to(&self, channel: ChannelId, event: ServerEvent) -> bool {
        self.deliver(channel, event)
    }

    pub fn subscriber_count(&self, room: Room) -> usize {
        self.rooms.get(&room).map(|members| members.len()).unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn deliver(&self, channel: ChannelId, event: ServerEvent) -> bool {
        let Some(tx) = self.channels.get(&channel).map(|entry| entry.tx.clone()) else {
            return false;
        };

        match tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(channel_id = %channel, event = event.name(), "channel buffer full; event dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.close_channel(channel);
                false
            }
        }
    }

    fn remove_member(&self, room: Room, channel: ChannelId) {
        if let Some(mut members) = self.rooms.get_mut(&room) {
            members.remove(&channel);
        }
        self.rooms.remove_if(&room, |_, members| members.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{Room, RoomRegistry};
    use crate::models::order::OrderStatus;
    use crate::observability::metrics::Metrics;
    use crate::rooms::events::ServerEvent;

    fn registry() -> RoomRegistry {
        RoomRegistry::new(16, Metrics::new())
    }

    fn status_event(order_id: Uuid, status: OrderStatus) -> ServerEvent {
        ServerEvent::StatusChanged {
            order_id,
            status,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn room_names_use_family_prefix() {
        let id = Uuid::from_u128(7);
        assert_eq!(Room::Order(id).to_string(), format!("order:{id}"));
        assert_eq!(Room::Rider(id).to_string(), format!("rider:{id}"));
    }

    #[tokio::test]
    async fn subscriber_sees_only_events_published_after_join() {
        let rooms = registry();
        let order_id = Uuid::new_v4();
        let room = Room::Order(order_id);
        let (channel, mut rx) = rooms.open_channel();

        assert_eq!(rooms.publish(room, status_event(order_id, OrderStatus::Confirmed)), 0);

        assert!(rooms.join(channel, room));
        assert_eq!(rooms.publish(room, status_event(order_id, OrderStatus::Preparing)), 1);

        match rx.try_recv().unwrap() {
            ServerEvent::StatusChanged { status, .. } => assert_eq!(status, OrderStatus::Preparing),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn join_is_idempotent_and_delivers_once() {
        let rooms = registry();
        let order_id = Uuid::new_v4();
        let room = Room::Order(order_id);
        let (channel, mut rx) = rooms.open_channel();

        rooms.join(channel, room);
        rooms.join(channel, room);
        assert_eq!(rooms.subscriber_count(room), 1);

        rooms.publish(room, status_event(order_id, OrderStatus::Cancelled));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn rooms_are_removed_when_last_member_leaves() {
        let rooms = registry();
        let order_room = Room::Order(Uuid::new_v4());
        let rider_room = Room::Rider(Uuid::new_v4());
        let (a, _rx_a) = rooms.open_channel();
        let (b, _rx_b) = rooms.open_channel();

        rooms.join(a, order_room);
        rooms.join(b, order_room);
        rooms.join(a, rider_room);
        assert_eq!(rooms.room_count(), 2);

        rooms.leave(a, order_room);
        assert_eq!(rooms.subscriber_count(order_room), 1);

        rooms.leave_all(a);
        assert_eq!(rooms.room_count(), 1);

        rooms.close_channel(b);
        assert_eq!(rooms.room_count(), 0);
        assert_eq!(rooms.channel_count(), 1);
    }

    #[test]
    fn join_on_unknown_channel_is_rejected() {
        let rooms = registry();
        assert!(!rooms.join(Uuid::new_v4(), Room::Rider(Uuid::new_v4())));
        assert_eq!(rooms.room_count(), 0);
    }

    #[test]
    fn dropped_receivers_are_pruned_on_publish() {
        let rooms = registry();
        let order_id = Uuid::new_v4();
        let room = Room::Order(order_id);
        let (gone, rx) = rooms.open_channel();
        let (live, _live_rx) = rooms.open_channel();
        rooms.join(gone, room);
        rooms.join(live, room);
        drop(rx);

        let delivered = rooms.publish(room, status_event(order_id, OrderStatus::Confirmed));

        assert_eq!(delivered, 1);
        assert_eq!(rooms.subscriber_count(room), 1);
        assert_eq!(rooms.channel_count(), 1);
    }

    #[test]
    fn full_buffer_drops_without_blocking() {
        let rooms = RoomRegistry::new(1, Metrics::new());
        let order_id = Uuid::new_v4();
        let room = Room::Order(order_id);
        let (channel, _rx) = rooms.open_channel();
        rooms.join(channel, room);

        assert_eq!(rooms.publish(room, status_event(order_id, OrderStatus::Confirmed)), 1);
        assert_eq!(rooms.publish(room, status_event(order_id, OrderStatus::Preparing)), 0);
        assert_eq!(rooms.subscriber_count(room), 1);
    }
}
