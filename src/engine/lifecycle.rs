//! Order creation, status transitions and scoped reads.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::queue::{AssignmentJob, AssignmentScheduler};
use crate::error::AppError;
use crate::models::GeoPoint;
use crate::models::order::{items_total, Order, OrderItem, OrderStatus};
use crate::observability::metrics::Metrics;
use crate::rooms::events::ServerEvent;
use crate::rooms::{Room, RoomRegistry};
use crate::store::Store;

/// Who is asking. Customers and riders only ever see their own orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Customer(String),
    Rider(Uuid),
    System,
}

impl Actor {
    pub fn can_view(&self, order: &Order) -> bool {
        match self {
            Actor::Customer(user_id) => order.user_id == *user_id,
            Actor::Rider(rider_id) => order.rider == Some(*rider_id),
            Actor::System => true,
        }
    }

    fn may_request(&self, next: OrderStatus) -> bool {
        match self {
            Actor::Customer(_) => next == OrderStatus::Cancelled,
            Actor::Rider(_) => matches!(
                next,
                OrderStatus::PickedUp
                    | OrderStatus::OutForDelivery
                    | OrderStatus::Delivered
                    | OrderStatus::Cancelled
            ),
            Actor::System => true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewOrder {
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub total: Option<Decimal>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub delivery_location: Option<GeoPoint>,
    #[serde(default)]
    pub restaurant_location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutDetails {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub delivery_location: Option<GeoPoint>,
    #[serde(default)]
    pub restaurant_location: Option<GeoPoint>,
}

pub struct OrderLifecycle {
    store: Arc<Store>,
    rooms: RoomRegistry,
    scheduler: Arc<AssignmentScheduler>,
    metrics: Metrics,
    default_delivery_location: GeoPoint,
    assignment_delay: Duration,
}

impl OrderLifecycle {
    pub fn new(
        store: Arc<Store>,
        rooms: RoomRegistry,
        scheduler: Arc<AssignmentScheduler>,
        metrics: Metrics,
        default_delivery_location: GeoPoint,
        assignment_delay: Duration,
    ) -> Self {
        Self {
            store,
            rooms,
            scheduler,
            metrics,
            default_delivery_location,
            assignment_delay,
        }
    }

    /// Stores a new pending order and schedules its automatic assignment.
    pub fn create(&self, user_id: &str, new_order: NewOrder) -> Result<Order, AppError> {
        if new_order.items.is_empty() {
            return Err(AppError::Validation("order must contain at least one item".to_string()));
        }
        for item in &new_order.items {
            item.validate()?;
        }

        let address = new_order.address.trim();
        let phone = new_order.phone.trim();
        if address.is_empty() || phone.is_empty() {
            return Err(AppError::Validation("address and phone are required".to_string()));
        }

        let total = items_total(&new_order.items)?;
        if let Some(claimed) = new_order.total {
            if claimed != total {
                return Err(AppError::Validation(format!(
                    "total {claimed} does not match item sum {total}"
                )));
            }
        }

        let delivery_location = match new_order.delivery_location {
            Some(point) => point.validate()?,
            None => self.default_delivery_location,
        };
        let restaurant_location = new_order
            .restaurant_location
            .map(GeoPoint::validate)
            .transpose()?;

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            items: new_order.items,
            total,
            address: address.to_string(),
            phone: phone.to_string(),
            delivery_location,
            restaurant_location,
            status: OrderStatus::Pending,
            rider: None,
            rider_location: None,
            estimated_delivery_at: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
        };

        self.store.orders.insert(order.id, order.clone());
        self.metrics
            .order_transitions_total
            .with_label_values(&[OrderStatus::Pending.as_str()])
            .inc();
        self.scheduler.schedule(
            AssignmentJob {
                order_id: order.id,
                attempt: 0,
            },
            self.assignment_delay,
        );

        info!(order_id = %order.id, user_id, total = %order.total, "order created");
        Ok(order)
    }

    /// Turns the customer's cart into an order and empties the cart.
    pub fn checkout(&self, user_id: &str, details: CheckoutDetails) -> Result<Order, AppError> {
        let cart = self
            .store
            .carts
            .remove(user_id)
            .map(|(_, cart)| cart)
            .unwrap_or_default();
        if cart.is_empty() {
            return Err(AppError::Validation("cart is empty".to_string()));
        }

        let new_order = NewOrder {
            items: cart.items.clone(),
            total: Some(cart.total),
            address: details.address,
            phone: details.phone,
            delivery_location: details.delivery_location,
            restaurant_location: details.restaurant_location,
        };

        self.create(user_id, new_order).inspect_err(|_| {
            self.store.carts.entry(user_id.to_string()).or_insert(cart);
        })
    }

    pub fn transition(
        &self,
        order_id: Uuid,
        next: OrderStatus,
        actor: &Actor,
    ) -> Result<Order, AppError> {
        let updated = {
            let mut order = self
                .store
                .orders
                .get_mut(&order_id)
                .filter(|order| actor.can_view(order))
                .ok_or_else(|| not_found(order_id))?;

            let current = order.status;
            // `assigned` needs a rider binding and is only entered by the assignment engine.
            if next == OrderStatus::Assigned
                || !current.can_transition_to(next)
                || !actor.may_request(next)
            {
                return Err(AppError::InvalidTransition {
                    from: current,
                    to: next,
                });
            }

            let now = Utc::now();
            order.status = next;
            order.updated_at = now;
            if next == OrderStatus::Delivered {
                order.delivered_at = Some(now);
            }

            self.metrics
                .order_transitions_total
                .with_label_values(&[next.as_str()])
                .inc();

            // Published under the entry lock so subscribers see the same order
            // of changes as the record does.
            let event = ServerEvent::StatusChanged {
                order_id,
                status: next,
                timestamp: now,
            };
            if next == OrderStatus::Cancelled {
                if let Some(rider_id) = order.rider {
                    self.rooms.publish(Room::Rider(rider_id), event.clone());
                }
            }
            self.rooms.publish(Room::Order(order_id), event);

            order.clone()
        };

        if next.is_terminal() {
            self.scheduler.cancel(order_id);
            if let Some(rider_id) = updated.rider {
                let completed = next == OrderStatus::Delivered;
                if !self.store.release_rider(rider_id, order_id, completed) {
                    warn!(order_id = %order_id, rider_id = %rider_id, "rider was not bound to finished order");
                }
            }
        }

        info!(order_id = %order_id, status = %next, actor = ?actor, "order status changed");
        Ok(updated)
    }

    /// Unknown orders and orders the actor may not see look the same.
    pub fn get(&self, order_id: Uuid, actor: &Actor) -> Result<Order, AppError> {
        self.store
            .orders
            .get(&order_id)
            .filter(|order| actor.can_view(order))
            .map(|order| order.value().clone())
            .ok_or_else(|| not_found(order_id))
    }

    /// Newest first.
    pub fn list_for_customer(&self, user_id: &str) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .store
            .orders
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }

    pub fn active_for_rider(&self, rider_id: Uuid) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .store
            .orders
            .iter()
            .filter(|entry| entry.rider == Some(rider_id) && entry.status.is_in_delivery())
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }
}

fn not_found(order_id: Uuid) -> AppError {
    AppError::NotFound(format!("order {order_id} not found"))
}
