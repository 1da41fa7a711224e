use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub assignment_jobs_in_queue: IntGauge,
    pub assignment_latency_seconds: HistogramVec,
    pub order_transitions_total: IntCounterVec,
    pub events_published_total: IntCounterVec,
    pub location_reports_total: IntCounterVec,
    pub connected_channels: IntGauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Total assignment attempts by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let assignment_jobs_in_queue = IntGauge::new(
            "assignment_jobs_in_queue",
            "Delayed assignment jobs waiting for the worker",
        )
        .expect("valid assignment_jobs_in_queue metric");

        let assignment_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "assignment_latency_seconds",
                "Latency of assignment processing in seconds",
            ),
            &["outcome"],
        )
        .expect("valid assignment_latency_seconds metric");

        let order_transitions_total = IntCounterVec::new(
            Opts::new("order_transitions_total", "Applied order status changes"),
            &["status"],
        )
        .expect("valid order_transitions_total metric");

        let events_published_total = IntCounterVec::new(
            Opts::new("events_published_total", "Room publishes by event name"),
            &["event"],
        )
        .expect("valid events_published_total metric");

        let location_reports_total = IntCounterVec::new(
            Opts::new("location_reports_total", "Rider location reports by outcome"),
            &["outcome"],
        )
        .expect("valid location_reports_total metric");

        let connected_channels =
            IntGauge::new("connected_channels", "Currently open real-time channels")
                .expect("valid connected_channels metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(assignment_jobs_in_queue.clone()))
            .expect("register assignment_jobs_in_queue");
        registry
            .register(Box::new(assignment_latency_seconds.clone()))
            .expect("register assignment_latency_seconds");
        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(events_published_total.clone()))
            .expect("register events_published_total");
        registry
            .register(Box::new(location_reports_total.clone()))
            .expect("register location_reports_total");
        registry
            .register(Box::new(connected_channels.clone()))
            .expect("register connected_channels");

        Self {
            registry,
            assignments_total,
            assignment_jobs_in_queue,
            assignment_latency_seconds,
            order_transitions_total,
            events_published_total,
            location_reports_total,
            connected_channels,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
