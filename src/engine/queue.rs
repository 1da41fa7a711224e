use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignmentJob {
    pub order_id: Uuid,
    pub attempt: u32,
}

pub async fn enqueue_job(
    queue_tx: &mpsc::Sender<AssignmentJob>,
    metrics: &Metrics,
    job: AssignmentJob,
) -> Result<(), AppError> {
    queue_tx
        .send(job)
        .await
        .map_err(|err| AppError::Internal(format!("assignment queue send failed: {err}")))?;

    metrics.assignment_jobs_in_queue.inc();
    Ok(())
}

/// One delayed assignment timer per order, cancellable until it fires.
pub struct AssignmentScheduler {
    queue_tx: mpsc::Sender<AssignmentJob>,
    timers: DashMap<Uuid, JoinHandle<()>>,
    metrics: Metrics,
}

impl AssignmentScheduler {
    pub fn new(queue_tx: mpsc::Sender<AssignmentJob>, metrics: Metrics) -> Self {
        Self {
            queue_tx,
            timers: DashMap::new(),
            metrics,
        }
    }

    /// Replaces any timer already pending for the same order.
    pub fn schedule(&self, job: AssignmentJob, delay: Duration) {
        let queue_tx = self.queue_tx.clone();
        let metrics = self.metrics.clone();

        let handle = tokio::spawn(async move {
            sleep(delay).await;
            if let Err(err) = enqueue_job(&queue_tx, &metrics, job).await {
                warn!(order_id = %job.order_id, error = %err, "failed to enqueue assignment job");
            }
        });

        if let Some(previous) = self.timers.insert(job.order_id, handle) {
            previous.abort();
        }
        debug!(
            order_id = %job.order_id,
            attempt = job.attempt,
            delay_ms = delay.as_millis() as u64,
            "assignment scheduled"
        );
    }

    /// Returns true if a timer was still registered for the order.
    pub fn cancel(&self, order_id: Uuid) -> bool {
        match self.timers.remove(&order_id) {
            Some((_, handle)) => {
                handle.abort();
                debug!(order_id = %order_id, "scheduled assignment cancelled");
                true
            }
            None => false,
        }
    }

    /// Called by the worker once a job has been dequeued.
    pub fn forget(&self, order_id: Uuid) {
        self.timers.remove(&order_id);
    }

    pub fn is_scheduled(&self, order_id: Uuid) -> bool {
        self.timers.contains_key(&order_id)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use uuid::Uuid;

    use super::{AssignmentJob, AssignmentScheduler};
    use crate::observability::metrics::Metrics;

    #[tokio::test]
    async fn fired_timer_enqueues_job() {
        let (tx, mut rx) = mpsc::channel(8);
        let scheduler = AssignmentScheduler::new(tx, Metrics::new());
        let job = AssignmentJob {
            order_id: Uuid::new_v4(),
            attempt: 0,
        };

        scheduler.schedule(job, Duration::from_millis(10));
        assert!(scheduler.is_scheduled(job.order_id));

        let received = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(received, Some(job));
    }

    #[tokio::test]
    async fn cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::channel(8);
        let scheduler = AssignmentScheduler::new(tx, Metrics::new());
        let order_id = Uuid::new_v4();

        scheduler.schedule(AssignmentJob { order_id, attempt: 0 }, Duration::from_millis(30));
        assert!(scheduler.cancel(order_id));
        assert!(!scheduler.cancel(order_id));

        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn rescheduling_replaces_previous_timer() {
        let (tx, mut rx) = mpsc::channel(8);
        let scheduler = AssignmentScheduler::new(tx, Metrics::new());
        let order_id = Uuid::new_v4();

        scheduler.schedule(AssignmentJob { order_id, attempt: 0 }, Duration::from_millis(20));
        scheduler.schedule(AssignmentJob { order_id, attempt: 1 }, Duration::from_millis(20));

        let first = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(first.map(|job| job.attempt), Some(1));
        assert!(timeout(Duration::from_millis(60), rx.recv()).await.is_err());
    }
}
