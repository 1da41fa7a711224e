//! In-memory records shared by every component.
//!
//! Each `DashMap` entry is locked for the duration of a `get_mut`, which is what
//! makes the per-record compare-and-set helpers below atomic. An order guard may
//! be held while writing assignments or publishing to rooms; nothing takes an
//! order guard while holding any other lock.

use dashmap::DashMap;
use uuid::Uuid;

use crate::models::assignment::Assignment;
use crate::models::cart::Cart;
use crate::models::order::Order;
use crate::models::rider::Rider;

#[derive(Default)]
pub struct Store {
    pub orders: DashMap<Uuid, Order>,
    pub riders: DashMap<Uuid, Rider>,
    pub assignments: DashMap<Uuid, Assignment>,
    pub carts: DashMap<String, Cart>,
    rider_tokens: DashMap<String, Uuid>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_rider(&self, rider: Rider) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.rider_tokens.insert(token.clone(), rider.id);
        self.riders.insert(rider.id, rider);
        token
    }

    pub fn rider_for_token(&self, token: &str) -> Option<Uuid> {
        self.rider_tokens.get(token).map(|entry| *entry.value())
    }

    /// Binds `order_id` to the rider only if the rider is active and idle.
    pub fn try_reserve_rider(&self, rider_id: Uuid, order_id: Uuid) -> bool {
        match self.riders.get_mut(&rider_id) {
            Some(mut rider) if rider.is_available() => {
                rider.current_order = Some(order_id);
                true
            }
            _ => false,
        }
    }

    /// Clears the rider's current order if it still points at `order_id`.
    pub fn release_rider(&self, rider_id: Uuid, order_id: Uuid, completed: bool) -> bool {
        match self.riders.get_mut(&rider_id) {
            Some(mut rider) if rider.current_order == Some(order_id) => {
                rider.current_order = None;
                if completed {
                    rider.total_deliveries = rider.total_deliveries.saturating_add(1);
                }
                true
            }
            _ => false,
        }
    }
}
