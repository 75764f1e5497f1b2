use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub deliveries_created_total: IntCounterVec,
    pub subscriptions_skipped_total: IntCounter,
    pub expansion_runs_total: IntCounter,
    pub routes_planned_total: IntCounterVec,
    pub route_planning_latency_seconds: Histogram,
    pub route_stop_updates_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let deliveries_created_total = IntCounterVec::new(
            Opts::new(
                "deliveries_created_total",
                "Subscription deliveries requested by expansion, by outcome",
            ),
            &["outcome"],
        )
        .expect("valid deliveries_created_total metric");

        let subscriptions_skipped_total = IntCounter::new(
            "subscriptions_skipped_total",
            "Subscriptions skipped during expansion because of a malformed weekday set",
        )
        .expect("valid subscriptions_skipped_total metric");

        let expansion_runs_total =
            IntCounter::new("expansion_runs_total", "Completed expansion runs")
                .expect("valid expansion_runs_total metric");

        let routes_planned_total = IntCounterVec::new(
            Opts::new("routes_planned_total", "Per-agent route planning results"),
            &["outcome"],
        )
        .expect("valid routes_planned_total metric");

        let route_planning_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "route_planning_latency_seconds",
            "Latency of planning one agent's route in seconds",
        ))
        .expect("valid route_planning_latency_seconds metric");

        let route_stop_updates_total = IntCounterVec::new(
            Opts::new("route_stop_updates_total", "Route stop status changes"),
            &["status"],
        )
        .expect("valid route_stop_updates_total metric");

        registry
            .register(Box::new(deliveries_created_total.clone()))
            .expect("register deliveries_created_total");
        registry
            .register(Box::new(subscriptions_skipped_total.clone()))
            .expect("register subscriptions_skipped_total");
        registry
            .register(Box::new(expansion_runs_total.clone()))
            .expect("register expansion_runs_total");
        registry
            .register(Box::new(routes_planned_total.clone()))
            .expect("register routes_planned_total");
        registry
            .register(Box::new(route_planning_latency_seconds.clone()))
            .expect("register route_planning_latency_seconds");
        registry
            .register(Box::new(route_stop_updates_total.clone()))
            .expect("register route_stop_updates_total");

        Self {
            registry,
            deliveries_created_total,
            subscriptions_skipped_total,
            expansion_runs_total,
            routes_planned_total,
            route_planning_latency_seconds,
            route_stop_updates_total,
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
