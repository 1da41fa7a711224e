use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::OrderStatus;
use crate::models::{GeoPoint, TrackedPosition};
use crate::observability::metrics::Metrics;
use crate::rooms::events::ServerEvent;
use crate::rooms::{Room, RoomRegistry};
use crate::store::Store;

/// Minimum spacing between two `location-changed` publishes for one rider.
pub const DEFAULT_LOCATION_MIN_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Position stored and fanned out to this many channels.
    Published { delivered: usize },
    /// Position stored; the publish was suppressed by the rate limit.
    Throttled,
}

pub struct LocationRelay {
    store: Arc<Store>,
    rooms: RoomRegistry,
    metrics: Metrics,
    min_interval: Duration,
    last_published: DashMap<Uuid, Instant>,
}

impl LocationRelay {
    pub fn new(store: Arc<Store>, rooms: RoomRegistry, metrics: Metrics, min_interval: Duration) -> Self {
        Self {
            store,
            rooms,
            metrics,
            min_interval,
            last_published: DashMap::new(),
        }
    }

    pub fn report_location(
        &self,
        rider_id: Uuid,
        order_id: Uuid,
        lat: f64,
        lon: f64,
    ) -> Result<RelayOutcome, AppError> {
        let point = match GeoPoint::validated(lat, lon) {
            Ok(point) => point,
            Err(err) => {
                self.record("rejected");
                return Err(err);
            }
        };

        self.check_bound(rider_id, order_id)?;

        let now = Utc::now();
        let position = TrackedPosition::at(point, now);

        match self.store.riders.get_mut(&rider_id) {
            Some(mut rider) => rider.location = Some(position),
            None => return Err(AppError::NotFound(format!("rider {rider_id} not found"))),
        }

        // The binding is checked again under the entry lock: the order may have
        // finished while the rider record was updated.
        let mut order = self
            .store
            .orders
            .get_mut(&order_id)
            .filter(|order| order.rider == Some(rider_id))
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        if order.status.is_terminal() {
            self.record("rejected");
            return Err(no_longer_tracked(order_id, order.status));
        }
        order.rider_location = Some(position);

        if !self.admit(rider_id) {
            self.record("throttled");
            debug!(rider_id = %rider_id, order_id = %order_id, "location publish throttled");
            return Ok(RelayOutcome::Throttled);
        }

        let delivered = self.rooms.publish(
            Room::Order(order_id),
            ServerEvent::LocationChanged {
                order_id,
                lat: point.lat,
                lon: point.lon,
                timestamp: now,
            },
        );
        drop(order);
        self.record("published");
        debug!(rider_id = %rider_id, order_id = %order_id, delivered, "rider location relayed");

        Ok(RelayOutcome::Published { delivered })
    }

    /// Updates a rider's position without an order to relay to.
    pub fn update_position(&self, rider_id: Uuid, lat: f64, lon: f64) -> Result<TrackedPosition, AppError> {
        let position = TrackedPosition::at(GeoPoint::validated(lat, lon)?, Utc::now());
        let mut rider = self
            .store
            .riders
            .get_mut(&rider_id)
            .ok_or_else(|| AppError::NotFound(format!("rider {rider_id} not found")))?;
        rider.location = Some(position);
        Ok(position)
    }

    fn check_bound(&self, rider_id: Uuid, order_id: Uuid) -> Result<(), AppError> {
        let order = self
            .store
            .orders
            .get(&order_id)
            .filter(|order| order.rider == Some(rider_id))
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        if order.status.is_terminal() {
            self.record("rejected");
            return Err(no_longer_tracked(order_id, order.status));
        }
        Ok(())
    }

    fn admit(&self, rider_id: Uuid) -> bool {
        let now = Instant::now();
        match self.last_published.entry(rider_id) {
            Entry::Occupied(mut last) => {
                if now.duration_since(*last.get()) < self.min_interval {
                    return false;
                }
                last.insert(now);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    fn record(&self, outcome: &str) {
        self.metrics
            .location_reports_total
            .with_label_values(&[outcome])
            .inc();
    }
}

fn no_longer_tracked(order_id: Uuid, status: OrderStatus) -> AppError {
    AppError::Validation(format!("order {order_id} is {status} and no longer tracked"))
}
