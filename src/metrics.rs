//! Pipeline counters
//!
//! Every counter is registered with a private prometheus [`Registry`]; the
//! binary reads them back through [`Metrics::snapshot`] or the text
//! exposition format from [`Metrics::encode`].

use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};

use crate::error::{Error, Result};

const NAMESPACE: &str = "credsweep";

pub struct Metrics {
    registry: Registry,

    pub clone_success: IntCounter,
    pub clone_failed: IntCounter,
    pub scan_success: IntCounter,
    pub scan_failed: IntCounter,
    pub violations: IntCounter,
    pub jobs_succeeded: IntCounter,
    pub jobs_failed: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        Ok(Self {
            clone_success: register(&registry, "clone_success_total", "Repositories cloned")?,
            clone_failed: register(&registry, "clone_failed_total", "Clone attempts that failed")?,
            scan_success: register(&registry, "scan_success_total", "Scans started by the cloner")?,
            scan_failed: register(&registry, "scan_failed_total", "Scans the cloner could not start")?,
            violations: register(&registry, "violations_total", "Credentials reported")?,
            jobs_succeeded: register(&registry, "jobs_succeeded_total", "Scan jobs completed")?,
            jobs_failed: register(&registry, "jobs_failed_total", "Scan jobs that returned an error")?,
            registry,
        })
    }

    /// `(name, value)` for every registered counter, sorted by name
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        self.registry
            .gather()
            .iter()
            .flat_map(|family| {
                family
                    .get_metric()
                    .iter()
                    .map(move |metric| (family.get_name().to_string(), metric.get_counter().get_value() as u64))
            })
            .collect()
    }

    /// Prometheus text exposition of every counter
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::Metrics(e.to_string()))
    }
}

fn register(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, help).namespace(NAMESPACE))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}
