use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub dispatch_latency_seconds: HistogramVec,
    pub location_reports_total: IntCounterVec,
    pub location_queue_depth: IntGauge,
    pub fanout_events_total: IntCounterVec,
    pub active_subscriptions: IntGaugeVec,
    pub drivers_online: IntGauge,
    pub notifications_total: IntCounterVec,
    pub presence_demotions_total: IntCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new(
                "order_transitions_total",
                "Order lifecycle operations by operation and outcome",
            ),
            &["operation", "outcome"],
        )
        .expect("valid order_transitions_total metric");

        let dispatch_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of dispatch operations in seconds",
            ),
            &["operation"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let location_reports_total = IntCounterVec::new(
            Opts::new(
                "location_reports_total",
                "Driver location reports by outcome",
            ),
            &["outcome"],
        )
        .expect("valid location_reports_total metric");

        let location_queue_depth = IntGauge::new(
            "location_queue_depth",
            "Accepted location samples waiting for fan-out",
        )
        .expect("valid location_queue_depth metric");

        let fanout_events_total = IntCounterVec::new(
            Opts::new(
                "fanout_events_total",
                "Tracking events pushed to subscribers by outcome",
            ),
            &["outcome"],
        )
        .expect("valid fanout_events_total metric");

        let active_subscriptions = IntGaugeVec::new(
            Opts::new("active_subscriptions", "Open tracking subscriptions"),
            &["interest"],
        )
        .expect("valid active_subscriptions metric");

        let drivers_online = IntGauge::new("drivers_online", "Drivers currently online")
            .expect("valid drivers_online metric");

        let notifications_total = IntCounterVec::new(
            Opts::new(
                "notifications_total",
                "Best-effort notifications by kind and outcome",
            ),
            &["kind", "outcome"],
        )
        .expect("valid notifications_total metric");

        let presence_demotions_total = IntCounter::new(
            "presence_demotions_total",
            "Drivers taken offline after staying silent past the grace period",
        )
        .expect("valid presence_demotions_total metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(location_reports_total.clone()))
            .expect("register location_reports_total");
        registry
            .register(Box::new(location_queue_depth.clone()))
            .expect("register location_queue_depth");
        registry
            .register(Box::new(fanout_events_total.clone()))
            .expect("register fanout_events_total");
        registry
            .register(Box::new(active_subscriptions.clone()))
            .expect("register active_subscriptions");
        registry
            .register(Box::new(drivers_online.clone()))
            .expect("register drivers_online");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(presence_demotions_total.clone()))
            .expect("register presence_demotions_total");

        Self {
            registry,
            transitions_total,
            dispatch_latency_seconds,
            location_reports_total,
            location_queue_depth,
            fanout_events_total,
            active_subscriptions,
            drivers_online,
            notifications_total,
            presence_demotions_total,
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
