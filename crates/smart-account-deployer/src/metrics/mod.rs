// Metrics for broadcasts and workflow steps

#[cfg(feature = "metrics")]
use prometheus::{CounterVec, Histogram, HistogramOpts, Opts, Registry};
use std::sync::Arc;
use std::time::Duration;

/// Deployer metrics, registered on a private registry
#[cfg(feature = "metrics")]
pub struct DeployerMetrics {
    pub steps_completed: CounterVec,
    pub steps_failed: CounterVec,
    pub broadcast_timeouts: CounterVec,
    pub broadcast_duration: Histogram,

    registry: Arc<Registry>,
}

#[cfg(feature = "metrics")]
impl DeployerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let steps_completed = CounterVec::new(
            Opts::new("pyxis_workflow_steps_completed_total", "Workflow steps confirmed on chain"),
            &["step"],
        )?;
        let steps_failed = CounterVec::new(
            Opts::new("pyxis_workflow_steps_failed_total", "Workflow steps that failed"),
            &["step", "reason"],
        )?;
        let broadcast_timeouts = CounterVec::new(
            Opts::new("pyxis_broadcast_timeouts_total", "Broadcasts whose inclusion was not observed in time"),
            &["step"],
        )?;
        let broadcast_duration = Histogram::with_opts(HistogramOpts::new(
            "pyxis_broadcast_duration_seconds",
            "Time from broadcast to confirmed inclusion",
        ))?;

        registry.register(Box::new(steps_completed.clone()))?;
        registry.register(Box::new(steps_failed.clone()))?;
        registry.register(Box::new(broadcast_timeouts.clone()))?;
        registry.register(Box::new(broadcast_duration.clone()))?;

        Ok(Self {
            steps_completed,
            steps_failed,
            broadcast_timeouts,
            broadcast_duration,
            registry,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn record_success(&self, step: &str, elapsed: Duration) {
        self.steps_completed.with_label_values(&[step]).inc();
        self.broadcast_duration.observe(elapsed.as_secs_f64());
    }

    pub fn record_failure(&self, step: &str, reason: &str) {
        self.steps_failed.with_label_values(&[step, reason]).inc();
    }

    pub fn record_timeout(&self, step: &str) {
        self.broadcast_timeouts.with_label_values(&[step]).inc();
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> String {
        use prometheus::Encoder;

        let mut buffer = Vec::new();
        let encoder = prometheus::TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&buffer).to_string()
    }
}

/// Stand-in used when the `metrics` feature is disabled
#[cfg(not(feature = "metrics"))]
#[derive(Default)]
pub struct DeployerMetrics;

#[cfg(not(feature = "metrics"))]
impl DeployerMetrics {
    pub fn new() -> Result<Self, std::convert::Infallible> {
        Ok(Self)
    }

    pub fn record_success(&self, _step: &str, _elapsed: Duration) {}

    pub fn record_failure(&self, _step: &str, _reason: &str) {}

    pub fn record_timeout(&self, _step: &str) {}

    pub fn render(&self) -> String {
        String::new()
    }
}

/// Shared handle passed to the workflow
pub type SharedMetrics = Arc<DeployerMetrics>;
