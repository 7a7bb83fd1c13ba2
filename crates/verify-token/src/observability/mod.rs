//! Observability for token verification.
//!
//! Metrics are recorded through the `metrics` facade; the host installs the
//! exporter (for example `metrics-exporter-prometheus`).

pub mod metrics;
