use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub listings_created_total: IntCounter,
    pub task_accepts_total: IntCounterVec,
    pub task_transitions_total: IntCounterVec,
    pub listing_transitions_total: IntCounterVec,
    pub audit_failures_total: IntCounter,
    pub nearby_query_seconds: Histogram,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let listings_created_total =
            IntCounter::new("listings_created_total", "Total food listings created")
                .expect("valid listings_created_total metric");

        let task_accepts_total = IntCounterVec::new(
            Opts::new("task_accepts_total", "Listing accept attempts by outcome"),
            &["outcome"],
        )
        .expect("valid task_accepts_total metric");

        let task_transitions_total = IntCounterVec::new(
            Opts::new("task_transitions_total", "Task status transitions by target status"),
            &["status"],
        )
        .expect("valid task_transitions_total metric");

        let listing_transitions_total = IntCounterVec::new(
            Opts::new(
                "listing_transitions_total",
                "Listing status transitions by target status",
            ),
            &["status"],
        )
        .expect("valid listing_transitions_total metric");

        let audit_failures_total =
            IntCounter::new("audit_failures_total", "Audit events the sink failed to store")
                .expect("valid audit_failures_total metric");

        let nearby_query_seconds = Histogram::with_opts(HistogramOpts::new(
            "nearby_query_seconds",
            "Latency of nearby listing queries in seconds",
        ))
        .expect("valid nearby_query_seconds metric");

        registry
            .register(Box::new(listings_created_total.clone()))
            .expect("register listings_created_total");
        registry
            .register(Box::new(task_accepts_total.clone()))
            .expect("register task_accepts_total");
        registry
            .register(Box::new(task_transitions_total.clone()))
            .expect("register task_transitions_total");
        registry
            .register(Box::new(listing_transitions_total.clone()))
            .expect("register listing_transitions_total");
        registry
            .register(Box::new(audit_failures_total.clone()))
            .expect("register audit_failures_total");
        registry
            .register(Box::new(nearby_query_seconds.clone()))
            .expect("register nearby_query_seconds");

        Self {
            registry,
            listings_created_total,
            task_accepts_total,
            task_transitions_total,
            listing_transitions_total,
            audit_failures_total,
            nearby_query_seconds,
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
