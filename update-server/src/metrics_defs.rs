//! Metrics definitions for the update server.

use shared::metrics_defs::{MetricDef, MetricType};

pub const UPDATE_CHECKS: MetricDef = MetricDef {
    name: "update_check.requests",
    metric_type: MetricType::Counter,
    description: "Number of update checks. Tagged with result.",
};

pub const ROLLOUT_DECISIONS: MetricDef = MetricDef {
    name: "update_check.rollout_decision",
    metric_type: MetricType::Counter,
    description: "Rollout gate outcomes for served updates. Tagged with decision.",
};

pub const HISTORY_FETCH_DURATION: MetricDef = MetricDef {
    name: "history.fetch.duration",
    metric_type: MetricType::Histogram,
    description: "Time to fetch a deployment's package history in seconds",
};

pub const STATUS_REPORTS: MetricDef = MetricDef {
    name: "status_report.received",
    metric_type: MetricType::Counter,
    description: "Number of status reports. Tagged with kind, status.",
};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Request duration in seconds. Tagged with route, status.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    UPDATE_CHECKS,
    ROLLOUT_DECISIONS,
    HISTORY_FETCH_DURATION,
    STATUS_REPORTS,
    REQUEST_DURATION,
];
