use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub match_attempts_total: IntCounterVec,
    pub match_latency_seconds: HistogramVec,
    pub transitions_total: IntCounterVec,
    pub pending_requests: IntGauge,
    pub online_drivers: IntGauge,
    pub rematch_queue_depth: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let match_attempts_total = IntCounterVec::new(
            Opts::new("match_attempts_total", "Matching attempts by outcome"),
            &["outcome"],
        )
        .expect("valid match_attempts_total metric");

        let match_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "match_latency_seconds",
                "Latency of a matching attempt in seconds",
            ),
            &["outcome"],
        )
        .expect("valid match_latency_seconds metric");

        let transitions_total = IntCounterVec::new(
            Opts::new("transitions_total", "Request lifecycle transitions by target status"),
            &["status"],
        )
        .expect("valid transitions_total metric");

        let pending_requests = IntGauge::new("pending_requests", "Requests waiting for a driver")
            .expect("valid pending_requests metric");

        let online_drivers = IntGauge::new("online_drivers", "Online drivers with a fresh heartbeat")
            .expect("valid online_drivers metric");

        let rematch_queue_depth =
            IntGauge::new("rematch_queue_depth", "Rematch jobs waiting in the queue")
                .expect("valid rematch_queue_depth metric");

        registry
            .register(Box::new(match_attempts_total.clone()))
            .expect("register match_attempts_total");
        registry
            .register(Box::new(match_latency_seconds.clone()))
            .expect("register match_latency_seconds");
        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(pending_requests.clone()))
            .expect("register pending_requests");
        registry
            .register(Box::new(online_drivers.clone()))
            .expect("register online_drivers");
        registry
            .register(Box::new(rematch_queue_depth.clone()))
            .expect("register rematch_queue_depth");

        Self {
            registry,
            match_attempts_total,
            match_latency_seconds,
            transitions_total,
            pending_requests,
            online_drivers,
            rematch_queue_depth,
        }
    }

    pub fn observe_match(&self, outcome: &str, elapsed_secs: f64) {
        self.match_attempts_total.with_label_values(&[outcome]).inc();
        self.match_latency_seconds
            .with_label_values(&[outcome])
            .observe(elapsed_secs);
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
