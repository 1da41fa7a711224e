use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{GeoPoint, TrackedPosition};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Assigned,
    PickedUp,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Assigned,
        OrderStatus::PickedUp,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Assigned => "assigned",
            OrderStatus::PickedUp => "picked-up",
            OrderStatus::OutForDelivery => "out-for-delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Statuses from which a rider may still be bound to the order.
    pub fn is_assignable(self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Preparing
        )
    }

    /// Statuses during which a rider is actively handling the order.
    pub fn is_in_delivery(self) -> bool {
        matches!(
            self,
            OrderStatus::Assigned | OrderStatus::PickedUp | OrderStatus::OutForDelivery
        )
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        if self.is_terminal() {
            return false;
        }
        if next == Cancelled {
            return true;
        }

        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Assigned)
                | (Confirmed, Preparing)
                | (Confirmed, Assigned)
                | (Preparing, Assigned)
                | (Assigned, PickedUp)
                | (PickedUp, OutForDelivery)
                | (OutForDelivery, Delivered)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog snapshot taken when the order is placed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub food_id: String,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub image: Option<String>,
}

impl OrderItem {
    /// `None` when price times quantity does not fit a `Decimal`.
    pub fn line_total(&self) -> Option<Decimal> {
        self.price.checked_mul(Decimal::from(self.quantity))
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.food_id.trim().is_empty() || self.name.trim().is_empty() {
            return Err(AppError::Validation("items need a food id and a name".to_string()));
        }
        if self.quantity == 0 {
            return Err(AppError::Validation(format!(
                "quantity for {} must be at least 1",
                self.name
            )));
        }
        if self.price.is_sign_negative() {
            return Err(AppError::Validation(format!(
                "price for {} cannot be negative",
                self.name
            )));
        }
        Ok(())
    }
}

pub fn items_total(items: &[OrderItem]) -> Result<Decimal, AppError> {
    items
        .iter()
        .try_fold(Decimal::ZERO, |total, item| {
            item.line_total().and_then(|line| total.checked_add(line))
        })
        .ok_or_else(|| AppError::Validation("order total overflows".to_string()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub items: Vec<OrderItem>,
    pub total: Decimal,
    pub address: String,
    pub phone: String,
    pub delivery_location: GeoPoint,
    pub restaurant_location: Option<GeoPoint>,
    pub status: OrderStatus,
    pub rider: Option<Uuid>,
    pub rider_location: Option<TrackedPosition>,
    pub estimated_delivery_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Where a rider should head first: the restaurant when known, else the drop-off.
    pub fn pickup_point(&self) -> GeoPoint {
        self.restaurant_location.unwrap_or(self.delivery_location)
    }

    pub fn rider_view(&self) -> RiderOrderView {
        RiderOrderView {
            id: self.id,
            items: self.items.clone(),
            total: self.total,
            address: self.address.clone(),
            phone: self.phone.clone(),
            status: self.status,
            delivery_location: self.delivery_location,
        }
    }
}

/// What a rider gets to see of an order: enough to deliver it, nothing more.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiderOrderView {
    pub id: Uuid,
    pub items: Vec<OrderItem>,
    pub total: Decimal,
    pub address: String,
    pub phone: String,
    pub status: OrderStatus,
    pub delivery_location: GeoPoint,
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{items_total, OrderItem, OrderStatus};
    use crate::error::AppError;

    fn item(price: i64, quantity: u32) -> OrderItem {
        OrderItem {
            food_id: format!("food-{price}"),
            name: "Kacchi".to_string(),
            price: Decimal::from(price),
            quantity,
            image: None,
        }
    }

    #[test]
    fn total_is_sum_of_price_times_quantity() {
        let items = vec![item(100, 2), item(50, 1)];
        assert_eq!(items_total(&items).unwrap(), Decimal::from(250));
    }

    #[test]
    fn overflowing_total_is_a_validation_error() {
        let huge = OrderItem {
            price: Decimal::MAX,
            quantity: 2,
            ..item(1, 1)
        };
        assert!(huge.line_total().is_none());
        assert!(matches!(items_total(&[huge]), Err(AppError::Validation(_))));

        let two_max_lines = vec![
            OrderItem { price: Decimal::MAX, ..item(1, 1) },
            OrderItem { price: Decimal::MAX, ..item(2, 1) },
        ];
        assert!(matches!(items_total(&two_max_lines), Err(AppError::Validation(_))));
    }

    #[test]
    fn happy_path_is_a_valid_walk() {
        let walk = [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Preparing,
            OrderStatus::Assigned,
            OrderStatus::PickedUp,
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
        ];

        for pair in walk.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be legal",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn terminal_statuses_allow_nothing() {
        for from in [OrderStatus::Delivered, OrderStatus::Cancelled] {
            assert!(from.is_terminal());
            for to in OrderStatus::ALL {
                assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn cancel_is_reachable_from_every_non_terminal_status() {
        for from in OrderStatus::ALL.into_iter().filter(|s| !s.is_terminal()) {
            assert!(from.can_transition_to(OrderStatus::Cancelled));
        }
    }

    #[test]
    fn cannot_skip_rider_milestones_or_move_backward() {
        assert!(!OrderStatus::Assigned.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Assigned.can_transition_to(OrderStatus::OutForDelivery));
        assert!(!OrderStatus::PickedUp.can_transition_to(OrderStatus::Assigned));
        assert!(!OrderStatus::OutForDelivery.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::PickedUp));
    }

    #[test]
    fn status_serializes_in_kebab_case() {
        let json = serde_json::to_string(&OrderStatus::OutForDelivery).unwrap();
        assert_eq!(json, "\"out-for-delivery\"");

        let parsed: OrderStatus = serde_json::from_str("\"picked-up\"").unwrap();
        assert_eq!(parsed, OrderStatus::PickedUp);
    }
}
