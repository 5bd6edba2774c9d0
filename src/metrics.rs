//! Prometheus metrics for the request queue.
//!
//! Counters go through the `metrics` facade only:
//! - `registrar_request_transitions_total{from, to}`, bumped once per
//!   persisted transition
//! - `registrar_mail_total{outcome}` and `registrar_mail_retries_total`
//!
//! This module adds an optional Prometheus registry wrapper for the queue
//! gauges, which are sampled state rather than events:
//! - `registrar_queue_length{request_type}`
//! - `registrar_estimated_wait_minutes{request_type}`

#[cfg(feature = "metrics")]
use prometheus::{GaugeVec, Opts, Registry};

#[cfg(feature = "metrics")]
use crate::error::Result;

/// Prometheus metrics registry for the request queue.
#[cfg(feature = "metrics")]
#[derive(Clone)]
pub struct RegistrarMetrics {
    registry: Registry,

    queue_length: GaugeVec,
    estimated_wait_minutes: GaugeVec,
}

#[cfg(feature = "metrics")]
impl RegistrarMetrics {
    /// Create a new instance and register its metrics with `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if metrics fail to register (e.g., duplicate registration).
    pub fn new(registry: Registry) -> Result<Self> {
        let queue_length = GaugeVec::new(
            Opts::new(
                "registrar_queue_length",
                "Number of pending requests per request type",
            ),
            &["request_type"],
        )
        .map_err(|e| anyhow::anyhow!("Failed to create queue_length gauge: {}", e))?;

        let estimated_wait_minutes = GaugeVec::new(
            Opts::new(
                "registrar_estimated_wait_minutes",
                "Wall-clock minutes until a newly submitted request is expected to complete",
            ),
            &["request_type"],
        )
        .map_err(|e| anyhow::anyhow!("Failed to create estimated_wait_minutes gauge: {}", e))?;

        registry
            .register(Box::new(queue_length.clone()))
            .map_err(|e| anyhow::anyhow!("Failed to register queue_length: {}", e))?;
        registry
            .register(Box::new(estimated_wait_minutes.clone()))
            .map_err(|e| anyhow::anyhow!("Failed to register estimated_wait_minutes: {}", e))?;

        Ok(Self {
            registry,
            queue_length,
            estimated_wait_minutes,
        })
    }

    /// Get the underlying Prometheus registry.
    ///
    /// Useful for exporting metrics via HTTP endpoint.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record the current queue for one request type.
    pub fn set_queue(&self, request_type: &str, length: u64, wait_minutes: i64) {
        self.queue_length
            .with_label_values(&[request_type])
            .set(length as f64);
        self.estimated_wait_minutes
            .with_label_values(&[request_type])
            .set(wait_minutes.max(0) as f64);
    }
}
