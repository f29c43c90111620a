//! Prometheus counters for run outcomes, served on `/metrics`.
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    runs: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let runs = IntCounterVec::new(
            Opts::new("lockstep_runs_total", "Orchestrator runs by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(runs.clone()))?;
        Ok(Self { registry, runs })
    }

    /// Count one run; `outcome` is committed, rolled_back, rollback_failed or rejected
    pub fn observe(&self, outcome: &str) {
        self.runs.with_label_values(&[outcome]).inc();
    }

    pub fn count(&self, outcome: &str) -> u64 {
        self.runs.with_label_values(&[outcome]).get()
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}
