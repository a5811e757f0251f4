use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub searches_total: IntCounterVec,
    pub search_latency_seconds: HistogramVec,
    pub active_orders: IntGauge,
    pub archives_total: IntCounterVec,
    pub replacement_searches_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let searches_total = IntCounterVec::new(
            Opts::new("searches_total", "Radius ladder searches by outcome"),
            &["outcome"],
        )
        .expect("valid searches_total metric");

        let search_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "search_latency_seconds",
                "Latency of one whole radius ladder in seconds",
            ),
            &["kind"],
        )
        .expect("valid search_latency_seconds metric");

        let active_orders = IntGauge::new("active_orders", "Current number of active orders")
            .expect("valid active_orders metric");

        let archives_total = IntCounterVec::new(
            Opts::new("archives_total", "Archival transactions by outcome"),
            &["outcome"],
        )
        .expect("valid archives_total metric");

        let replacement_searches_total = IntCounterVec::new(
            Opts::new(
                "replacement_searches_total",
                "Background replacement searches by outcome",
            ),
            &["outcome"],
        )
        .expect("valid replacement_searches_total metric");

        registry
            .register(Box::new(searches_total.clone()))
            .expect("register searches_total");
        registry
            .register(Box::new(search_latency_seconds.clone()))
            .expect("register search_latency_seconds");
        registry
            .register(Box::new(active_orders.clone()))
            .expect("register active_orders");
        registry
            .register(Box::new(archives_total.clone()))
            .expect("register archives_total");
        registry
            .register(Box::new(replacement_searches_total.clone()))
            .expect("register replacement_searches_total");

        Self {
            registry,
            searches_total,
            search_latency_seconds,
            active_orders,
            archives_total,
            replacement_searches_total,
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
