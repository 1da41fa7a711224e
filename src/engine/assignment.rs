use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::queue::{AssignmentJob, AssignmentScheduler};
use crate::engine::scoring::{RiderSelector, Selection};
use crate::error::AppError;
use crate::geo::{haversine_km, travel_minutes};
use crate::models::assignment::Assignment;
use crate::models::order::{Order, OrderStatus};
use crate::models::rider::Rider;
use crate::observability::metrics::Metrics;
use crate::rooms::events::ServerEvent;
use crate::rooms::{Room, RoomRegistry};
use crate::state::AppState;
use crate::store::Store;

/// Rider selection is retried this many extra times when the chosen rider is
/// taken by a concurrent assignment.
const RESERVATION_RETRIES: usize = 1;

pub struct AssignmentEngine {
    store: Arc<Store>,
    rooms: RoomRegistry,
    scheduler: Arc<AssignmentScheduler>,
    selector: Box<dyn RiderSelector>,
    metrics: Metrics,
    base_eta_minutes: i64,
}

impl AssignmentEngine {
    pub fn new(
        store: Arc<Store>,
        rooms: RoomRegistry,
        scheduler: Arc<AssignmentScheduler>,
        selector: Box<dyn RiderSelector>,
        metrics: Metrics,
        base_eta_minutes: i64,
    ) -> Self {
        Self {
            store,
            rooms,
            scheduler,
            selector,
            metrics,
            base_eta_minutes,
        }
    }

    pub fn policy(&self) -> &'static str {
        self.selector.name()
    }

    /// Binds one idle rider to the order and notifies both rooms.
    ///
    /// The rider is reserved first (its `current_order` must be empty), then the
    /// order is bound (it must be assignable and unbound). If the order side
    /// loses, the reservation is rolled back. Events go out only once both
    /// records hold the binding.
    pub fn assign(&self, order_id: Uuid) -> Result<Assignment, AppError> {
        for attempt in 0..=RESERVATION_RETRIES {
            let order = self.assignable_order(order_id)?;

            let candidates: Vec<Rider> = self
                .store
                .riders
                .iter()
                .filter(|entry| entry.is_available())
                .map(|entry| entry.value().clone())
                .collect();

            let selection = self
                .selector
                .select(&order, &candidates)
                .ok_or(AppError::NoAvailableRiders)?;

            if !self.store.try_reserve_rider(selection.rider_id, order_id) {
                debug!(
                    order_id = %order_id,
                    rider_id = %selection.rider_id,
                    attempt,
                    "rider taken concurrently; reselecting"
                );
                continue;
            }

            let Some(rider) = self
                .store
                .riders
                .get(&selection.rider_id)
                .map(|entry| entry.value().clone())
            else {
                return Err(AppError::NotFound(format!(
                    "rider {} not found",
                    selection.rider_id
                )));
            };

            return match self.bind_and_announce(order_id, &rider, selection) {
                Ok(assignment) => {
                    self.scheduler.cancel(order_id);
                    info!(
                        order_id = %assignment.order_id,
                        rider_id = %assignment.rider_id,
                        policy = %assignment.policy,
                        score = assignment.score,
                        "order assigned"
                    );
                    Ok(assignment)
                }
                Err(err) => {
                    self.store.release_rider(rider.id, order_id, false);
                    Err(err)
                }
            };
        }

        Err(AppError::AlreadyAssigned(order_id.to_string()))
    }

    /// Entry point for the delayed trigger: orders that went away or left the
    /// assignable statuses are skipped without error.
    pub fn assign_scheduled(&self, order_id: Uuid) -> Result<Option<Assignment>, AppError> {
        match self.assign(order_id) {
            Ok(assignment) => Ok(Some(assignment)),
            Err(
                AppError::NotFound(_)
                | AppError::AlreadyAssigned(_)
                | AppError::InvalidTransition { .. },
            ) => {
                debug!(order_id = %order_id, "order no longer assignable; skipping scheduled assignment");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn assignable_order(&self, order_id: Uuid) -> Result<Order, AppError> {
        let order = self
            .store
            .orders
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        check_assignable(&order)?;
        Ok(order)
    }

    /// Binds the order and announces it while the order entry is still locked,
    /// so a concurrent transition on the same order is published strictly before
    /// or strictly after the assignment events.
    fn bind_and_announce(
        &self,
        order_id: Uuid,
        rider: &Rider,
        selection: Selection,
    ) -> Result<Assignment, AppError> {
        let mut order = self
            .store
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        check_assignable(&order)?;

        let now = Utc::now();
        let eta = self.eta_minutes(&order, rider);
        order.rider = Some(rider.id);
        order.status = OrderStatus::Assigned;
        order.rider_location = rider.location;
        order.estimated_delivery_at = Some(now + chrono::Duration::minutes(eta));
        order.updated_at = now;

        let assignment = Assignment {
            id: Uuid::new_v4(),
            order_id,
            rider_id: rider.id,
            policy: self.selector.name().to_string(),
            score: selection.score,
            score_breakdown: selection.breakdown,
            assigned_at: now,
        };
        self.store.assignments.insert(assignment.id, assignment.clone());
        self.metrics
            .order_transitions_total
            .with_label_values(&[OrderStatus::Assigned.as_str()])
            .inc();

        self.rooms.publish(
            Room::Order(order_id),
            ServerEvent::RiderAssigned {
                rider: rider.summary(),
                order: Box::new(order.clone()),
            },
        );
        self.rooms.publish(
            Room::Rider(rider.id),
            ServerEvent::AssignedToRider {
                order: order.rider_view(),
            },
        );

        Ok(assignment)
    }

    fn eta_minutes(&self, order: &Order, rider: &Rider) -> i64 {
        let to_pickup = rider
            .location
            .map(|position| haversine_km(&position.point(), &order.pickup_point()))
            .unwrap_or(0.0);
        let to_dropoff = haversine_km(&order.pickup_point(), &order.delivery_location);

        self.base_eta_minutes + travel_minutes(to_pickup + to_dropoff, rider.vehicle_type)
    }
}

fn check_assignable(order: &Order) -> Result<(), AppError> {
    if order.rider.is_some() {
        return Err(AppError::AlreadyAssigned(order.id.to_string()));
    }
    if !order.status.is_assignable() {
        return Err(AppError::InvalidTransition {
            from: order.status,
            to: OrderStatus::Assigned,
        });
    }
    Ok(())
}

pub async fn run_assignment_engine(state: Arc<AppState>, mut job_rx: mpsc::Receiver<AssignmentJob>) {
    info!(policy = state.assignment.policy(), "assignment engine started");

    while let Some(job) = job_rx.recv().await {
        state.metrics.assignment_jobs_in_queue.dec();
        state.scheduler.forget(job.order_id);

        let start = Instant::now();
        let outcome = match state.assignment.assign_scheduled(job.order_id) {
            Ok(Some(_)) => "success",
            Ok(None) => "skipped",
            Err(AppError::NoAvailableRiders) => {
                warn!(
                    order_id = %job.order_id,
                    attempt = job.attempt,
                    "no available riders; rescheduling assignment"
                );
                state.scheduler.schedule(
                    AssignmentJob {
                        order_id: job.order_id,
                        attempt: job.attempt.saturating_add(1),
                    },
                    retry_delay(state.config.assignment_retry),
                );
                "no_riders"
            }
            Err(err) => {
                error!(order_id = %job.order_id, error = %err, "failed to process assignment job");
                "error"
            }
        };

        let elapsed = start.elapsed().as_secs_f64();
        state
            .metrics
            .assignment_latency_seconds
            .with_label_values(&[outcome])
            .observe(elapsed);
        state
            .metrics
            .assignments_total
            .with_label_values(&[outcome])
            .inc();
    }

    warn!("assignment engine stopped: queue channel closed");
}

fn retry_delay(configured: Duration) -> Duration {
    configured.max(Duration::from_millis(10))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use chrono::Utc;
    use rust_decimal::Decimal;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::AssignmentEngine;
    use crate::engine::lifecycle::{Actor, NewOrder, OrderLifecycle};
    use crate::engine::queue::{AssignmentJob, AssignmentScheduler};
    use crate::engine::scoring::WeightedScore;
    use crate::error::AppError;
    use crate::models::order::{OrderItem, OrderStatus};
    use crate::models::rider::{Rider, VehicleType};
    use crate::models::{GeoPoint, TrackedPosition};
    use crate::observability::metrics::Metrics;
    use crate::rooms::events::ServerEvent;
    use crate::rooms::{Room, RoomRegistry};
    use crate::store::Store;

    struct Fixture {
        store: Arc<Store>,
        rooms: RoomRegistry,
        lifecycle: OrderLifecycle,
        engine: Arc<AssignmentEngine>,
        _queue_rx: mpsc::Receiver<AssignmentJob>,
    }

    fn fixture() -> Fixture {
        let metrics = Metrics::new();
        let store = Arc::new(Store::new());
        let rooms = RoomRegistry::new(16, metrics.clone());
        let (tx, rx) = mpsc::channel(16);
        let scheduler = Arc::new(AssignmentScheduler::new(tx, metrics.clone()));
        let lifecycle = OrderLifecycle::new(
            store.clone(),
            rooms.clone(),
            scheduler.clone(),
            metrics.clone(),
            GeoPoint { lat: 23.8103, lon: 90.4125 },
            Duration::from_secs(60),
        );
        let engine = Arc::new(AssignmentEngine::new(
            store.clone(),
            rooms.clone(),
            scheduler,
            Box::new(WeightedScore),
            metrics,
            10,
        ));
        Fixture {
            store,
            rooms,
            lifecycle,
            engine,
            _queue_rx: rx,
        }
    }

    fn add_rider(store: &Store, seed: u128, active: bool) -> Uuid {
        let rider = Rider {
            id: Uuid::from_u128(seed),
            name: format!("rider {seed}"),
            email: format!("rider{seed}@test.com"),
            phone: "+8801700000001".to_string(),
            vehicle_type: VehicleType::Bike,
            vehicle_number: None,
            is_active: active,
            location: Some(TrackedPosition::at(
                GeoPoint { lat: 23.8103, lon: 90.4125 },
                Utc::now(),
            )),
            current_order: None,
            rating: 5.0,
            total_deliveries: 0,
            created_at: Utc::now(),
        };
        let id = rider.id;
        store.insert_rider(rider);
        id
    }

    fn new_order() -> NewOrder {
        NewOrder {
            items: vec![
                OrderItem {
                    food_id: "kacchi".to_string(),
                    name: "Kacchi".to_string(),
                    price: Decimal::from(100),
                    quantity: 2,
                    image: None,
                },
                OrderItem {
                    food_id: "borhani".to_string(),
                    name: "Borhani".to_string(),
                    price: Decimal::from(50),
                    quantity: 1,
                    image: None,
                },
            ],
            address: "Road 27, Dhanmondi".to_string(),
            phone: "+8801711111111".to_string(),
            ..NewOrder::default()
        }
    }

    #[tokio::test]
    async fn assignment_binds_both_sides_and_notifies_both_rooms() {
        let f = fixture();
        let rider_id = add_rider(&f.store, 1, true);
        let order = f.lifecycle.create("alice", new_order()).unwrap();

        let (customer, mut customer_rx) = f.rooms.open_channel();
        let (rider_channel, mut rider_rx) = f.rooms.open_channel();
        f.rooms.join(customer, Room::Order(order.id));
        f.rooms.join(rider_channel, Room::Rider(rider_id));

        let assignment = f.engine.assign(order.id).unwrap();
        assert_eq!(assignment.rider_id, rider_id);

        let stored = f.store.orders.get(&order.id).unwrap().clone();
        assert_eq!(stored.status, OrderStatus::Assigned);
        assert_eq!(stored.rider, Some(rider_id));
        assert!(stored.rider_location.is_some());
        assert!(stored.estimated_delivery_at.is_some());
        assert_eq!(f.store.riders.get(&rider_id).unwrap().current_order, Some(order.id));

        match customer_rx.try_recv().unwrap() {
            ServerEvent::RiderAssigned { rider, order: snapshot } => {
                assert_eq!(rider.id, rider_id);
                assert_eq!(snapshot.rider, Some(rider_id));
            }
            other => panic!("unexpected event {other:?}"),
        }
        match rider_rx.try_recv().unwrap() {
            ServerEvent::AssignedToRider { order: view } => {
                assert_eq!(view.id, order.id);
                assert_eq!(view.total, Decimal::from(250));
                assert_eq!(view.status, OrderStatus::Assigned);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_assign_fails_deterministically() {
        let f = fixture();
        add_rider(&f.store, 1, true);
        add_rider(&f.store, 2, true);
        let order = f.lifecycle.create("alice", new_order()).unwrap();

        f.engine.assign(order.id).unwrap();
        let again = f.engine.assign(order.id);

        assert!(matches!(again, Err(AppError::AlreadyAssigned(_))));
        let bound = f
            .store
            .riders
            .iter()
            .filter(|rider| rider.current_order.is_some())
            .count();
        assert_eq!(bound, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_assigns_bind_exactly_one_rider() {
        for _ in 0..20 {
            let f = fixture();
            for seed in 1..=3 {
                add_rider(&f.store, seed, true);
            }
            let order_id = f.lifecycle.create("alice", new_order()).unwrap().id;

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let engine = f.engine.clone();
                    tokio::spawn(async move { engine.assign(order_id) })
                })
                .collect();

            let mut successes = 0;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(_) => successes += 1,
                    Err(err) => assert!(matches!(err, AppError::AlreadyAssigned(_)), "{err}"),
                }
            }

            assert_eq!(successes, 1);
            let bound: Vec<_> = f
                .store
                .riders
                .iter()
                .filter_map(|rider| rider.current_order)
                .collect();
            assert_eq!(bound, vec![order_id]);
        }
    }

    #[tokio::test]
    async fn no_idle_rider_is_reported() {
        let f = fixture();
        add_rider(&f.store, 1, false);
        let order = f.lifecycle.create("alice", new_order()).unwrap();

        assert!(matches!(f.engine.assign(order.id), Err(AppError::NoAvailableRiders)));
        assert!(matches!(f.engine.assign(Uuid::new_v4()), Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn busy_rider_is_not_picked_for_second_order() {
        let f = fixture();
        let rider_id = add_rider(&f.store, 1, true);
        let first = f.lifecycle.create("alice", new_order()).unwrap();
        let second = f.lifecycle.create("bob", new_order()).unwrap();

        assert_eq!(f.engine.assign(first.id).unwrap().rider_id, rider_id);
        assert!(matches!(f.engine.assign(second.id), Err(AppError::NoAvailableRiders)));
    }

    #[tokio::test]
    async fn scheduled_assignment_skips_cancelled_order() {
        let f = fixture();
        let rider_id = add_rider(&f.store, 1, true);
        let order = f.lifecycle.create("alice", new_order()).unwrap();
        f.lifecycle
            .transition(order.id, OrderStatus::Cancelled, &Actor::Customer("alice".to_string()))
            .unwrap();

        assert!(f.engine.assign_scheduled(order.id).unwrap().is_none());
        assert!(f.store.orders.get(&order.id).unwrap().rider.is_none());
        assert!(f.store.riders.get(&rider_id).unwrap().current_order.is_none());
        assert!(matches!(
            f.engine.assign(order.id),
            Err(AppError::InvalidTransition { from: OrderStatus::Cancelled, .. })
        ));
    }

    #[tokio::test]
    async fn delivery_walk_releases_rider_and_counts_delivery() {
        let f = fixture();
        let rider_id = add_rider(&f.store, 1, true);
        let order = f.lifecycle.create("alice", new_order()).unwrap();
        f.engine.assign(order.id).unwrap();

        let rider = Actor::Rider(rider_id);
        for next in [OrderStatus::PickedUp, OrderStatus::OutForDelivery, OrderStatus::Delivered] {
            f.lifecycle.transition(order.id, next, &rider).unwrap();
        }

        let stored_rider = f.store.riders.get(&rider_id).unwrap().clone();
        assert!(stored_rider.current_order.is_none());
        assert_eq!(stored_rider.total_deliveries, 1);
        assert!(f.store.orders.get(&order.id).unwrap().delivered_at.is_some());
        assert!(matches!(
            f.lifecycle.transition(order.id, OrderStatus::Cancelled, &rider),
            Err(AppError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn cancelling_assigned_order_notifies_rider_and_frees_them() {
        let f = fixture();
        let rider_id = add_rider(&f.store, 1, true);
        let order = f.lifecycle.create("alice", new_order()).unwrap();
        f.engine.assign(order.id).unwrap();

        let (channel, mut rx) = f.rooms.open_channel();
        f.rooms.join(channel, Room::Rider(rider_id));

        f.lifecycle
            .transition(order.id, OrderStatus::Cancelled, &Actor::Customer("alice".to_string()))
            .unwrap();

        assert!(f.store.riders.get(&rider_id).unwrap().current_order.is_none());
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerEvent::StatusChanged { status: OrderStatus::Cancelled, .. }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn assignment_racing_a_cancel_is_announced_before_the_cancel() {
        let f = fixture();
        let rider_id = add_rider(&f.store, 1, true);
        let customer = Actor::Customer("alice".to_string());

        for _ in 0..500 {
            let order_id = f.lifecycle.create("alice", new_order()).unwrap().id;
            let (order_channel, mut order_rx) = f.rooms.open_channel();
            let (rider_channel, mut rider_rx) = f.rooms.open_channel();
            f.rooms.join(order_channel, Room::Order(order_id));
            f.rooms.join(rider_channel, Room::Rider(rider_id));

            let barrier = Barrier::new(2);
            thread::scope(|scope| {
                scope.spawn(|| {
                    barrier.wait();
                    let _ = f.engine.assign(order_id);
                });
                scope.spawn(|| {
                    barrier.wait();
                    f.lifecycle
                        .transition(order_id, OrderStatus::Cancelled, &customer)
                        .unwrap();
                });
            });

            let mut order_events = Vec::new();
            while let Ok(event) = order_rx.try_recv() {
                order_events.push(event);
            }
            let cancelled_at = order_events
                .iter()
                .position(|event| {
                    matches!(event, ServerEvent::StatusChanged { status: OrderStatus::Cancelled, .. })
                })
                .expect("cancel is always published");
            assert_eq!(cancelled_at, order_events.len() - 1, "{order_events:?}");

            let mut rider_events = Vec::new();
            while let Ok(event) = rider_rx.try_recv() {
                rider_events.push(event);
            }
            if rider_events
                .iter()
                .any(|event| matches!(event, ServerEvent::AssignedToRider { .. }))
            {
                assert!(
                    matches!(
                        rider_events.last(),
                        Some(ServerEvent::StatusChanged { status: OrderStatus::Cancelled, .. })
                    ),
                    "{rider_events:?}"
                );
            }

            assert!(f.store.riders.get(&rider_id).unwrap().current_order.is_none());
            f.rooms.close_channel(order_channel);
            f.rooms.close_channel(rider_channel);
        }
    }
}
