use std::sync::Arc;

use tokio::sync::mpsc;

use crate::chat::ChatService;
use crate::config::Config;
use crate::engine::assignment::AssignmentEngine;
use crate::engine::lifecycle::OrderLifecycle;
use crate::engine::queue::{AssignmentJob, AssignmentScheduler};
use crate::engine::relay::LocationRelay;
use crate::engine::scoring::selector_for;
use crate::error::AppError;
use crate::observability::metrics::Metrics;
use crate::rooms::RoomRegistry;
use crate::store::Store;

pub struct AppState {
    pub config: Config,
    pub store: Arc<Store>,
    pub rooms: RoomRegistry,
    pub scheduler: Arc<AssignmentScheduler>,
    pub lifecycle: OrderLifecycle,
    pub assignment: AssignmentEngine,
    pub relay: LocationRelay,
    pub chat: ChatService,
    pub metrics: Metrics,
}

impl AppState {
    /// Wires every component around one store and one room registry. The
    /// returned receiver feeds `run_assignment_engine`.
    pub fn new(config: Config) -> Result<(Self, mpsc::Receiver<AssignmentJob>), AppError> {
        let metrics = Metrics::new();
        let store = Arc::new(Store::new());
        let rooms = RoomRegistry::new(config.channel_buffer_size, metrics.clone());

        let (job_tx, job_rx) = mpsc::channel(config.order_queue_size.max(1));
        let scheduler = Arc::new(AssignmentScheduler::new(job_tx, metrics.clone()));

        let lifecycle = OrderLifecycle::new(
            store.clone(),
            rooms.clone(),
            scheduler.clone(),
            metrics.clone(),
            config.default_delivery_location.validate()?,
            config.assignment_delay,
        );
        let assignment = AssignmentEngine::new(
            store.clone(),
            rooms.clone(),
            scheduler.clone(),
            selector_for(config.assignment_policy),
            metrics.clone(),
            config.delivery_eta_minutes,
        );
        let relay = LocationRelay::new(
            store.clone(),
            rooms.clone(),
            metrics.clone(),
            config.location_min_interval,
        );
        let chat = ChatService::new(&config)?;

        Ok((
            Self {
                config,
                store,
                rooms,
                scheduler,
                lifecycle,
                assignment,
                relay,
                chat,
                metrics,
            },
            job_rx,
        ))
    }
}
