// Metric Names
//
// All metric names and label keys live here so dashboards and alerts
// have a single place to look. Recording goes through the `metrics`
// facade; the daemon decides which exporter (if any) is installed.

/// Metric names, grouped by subsystem.
pub mod names {
    /// Deployment requests finished, labeled by project and terminal
    /// status.
    pub const DEPLOYMENTS_TOTAL: &str = "gantry_deployments_total";

    /// Wall-clock seconds spent processing one deployment request.
    pub const DEPLOY_DURATION_SECONDS: &str = "gantry_deploy_duration_seconds";

    /// Notification batches handed to the transport, labeled by outcome.
    pub const NOTIFY_BATCHES_TOTAL: &str = "gantry_notify_batches_total";

    /// Events dropped because their batch failed to send.
    pub const NOTIFY_EVENTS_DROPPED_TOTAL: &str = "gantry_notify_events_dropped_total";

    /// Queries against sibling control planes that failed.
    pub const EXTERNAL_RESOLVER_ERRORS_TOTAL: &str = "gantry_external_resolver_errors_total";

    /// Backup runs finished, labeled by outcome.
    pub const BACKUPS_TOTAL: &str = "gantry_backups_total";
}

/// Label keys used across the metrics above.
pub mod labels {
    pub const STATUS: &str = "status";
    pub const PROJECT: &str = "project";
    pub const MANAGER: &str = "manager";
}
