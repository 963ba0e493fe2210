use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUESTS: MetricDef = MetricDef {
    name: "http.requests",
    metric_type: MetricType::Counter,
    description: "Requests handled, tagged with endpoint and status class.",
};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "http.request.duration",
    metric_type: MetricType::Histogram,
    description: "Request duration in seconds.",
};

pub const ANALYSES: MetricDef = MetricDef {
    name: "feedback.analyses",
    metric_type: MetricType::Counter,
    description: "Feedback analyses completed, tagged with sentiment.",
};

pub const PROBE_FAILURES: MetricDef = MetricDef {
    name: "warehouse.probe.failures",
    metric_type: MetricType::Counter,
    description: "Individual table probes that came back inaccessible.",
};

pub const ALL_METRICS: &[MetricDef] = &[REQUESTS, REQUEST_DURATION, ANALYSES, PROBE_FAILURES];
